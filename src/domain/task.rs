//! Task domain model.
//!
//! A task optionally references the user it is assigned to and caches that
//! user's display name. The serialized form is the stored document, so the
//! serde field names here are also the names used by `where`, `sort` and
//! `select` query parameters.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use super::user::UserId;

/// Display name cached on a task that has no (valid) assignee.
pub const UNASSIGNED_NAME: &str = "unassigned";

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Unique identifier for a task.
///
/// This is a newtype wrapper around UUID to provide type safety.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new time-ordered `TaskId` (UUID v7).
    ///
    /// Time ordering keeps the in-memory store's natural order equal to
    /// insertion order.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parses a `TaskId` from its textual form.
    ///
    /// # Errors
    ///
    /// Returns `uuid::Error` if the value is not a UUID.
    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A point in time with millisecond precision.
///
/// Serialized as an RFC 3339 string with exactly three fractional digits so
/// that stored timestamps compare correctly as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

/// `0000-01-01T00:00:00.000Z`
const MIN_MILLIS: i64 = -62_167_219_200_000;
/// `9999-12-31T23:59:59.999Z`
const MAX_MILLIS: i64 = 253_402_300_799_999;

impl Timestamp {
    fn from_datetime(datetime: DateTime<Utc>) -> Option<Self> {
        Self::from_millis(datetime.timestamp_millis())
    }

    /// Creates a `Timestamp` from milliseconds since the Unix epoch.
    ///
    /// Returns `None` outside years 0000 to 9999, which RFC 3339 cannot
    /// express.
    #[must_use]
    pub fn from_millis(millis: i64) -> Option<Self> {
        (MIN_MILLIS..=MAX_MILLIS)
            .contains(&millis)
            .then(|| Utc.timestamp_millis_opt(millis).single().map(Self))
            .flatten()
    }

    /// Parses an RFC 3339 timestamp, truncating it to milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError`] if the value is not RFC 3339 or its UTC
    /// form falls outside years 0000 to 9999.
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        let datetime = DateTime::parse_from_rfc3339(value.trim())?.with_timezone(&Utc);
        Self::from_datetime(datetime).ok_or_else(|| TimestampError::OutOfRange(value.to_string()))
    }

    /// Returns the current time as a `Timestamp`.
    ///
    /// **Note**: This is an impure function (side effect: system clock).
    #[must_use]
    pub fn now() -> Self {
        let now = Utc::now();
        Self::from_datetime(now).unwrap_or(Self(now))
    }
}

/// Error returned by [`Timestamp::parse`].
#[derive(Debug, Error)]
pub enum TimestampError {
    #[error(transparent)]
    Invalid(#[from] chrono::ParseError),
    #[error("timestamp {0} is outside years 0000 to 9999")]
    OutOfRange(String),
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Task Entity
// =============================================================================

/// A unit of work with an optional deadline, a completion flag and an
/// optional assignee.
///
/// `assigned_user_name` is a denormalized copy of the assignee's name and is
/// recomputed whenever `assigned_user` is written (see [`Task::assign`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Timestamp>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "assigned_user_serde")]
    pub assigned_user: Option<UserId>,
    #[serde(default = "default_assigned_user_name")]
    pub assigned_user_name: String,
    pub date_created: Timestamp,
}

fn default_assigned_user_name() -> String {
    UNASSIGNED_NAME.to_string()
}

impl Task {
    /// Creates an unassigned, incomplete task.
    #[must_use]
    pub fn new(id: TaskId, date_created: Timestamp) -> Self {
        Self {
            id,
            name: None,
            description: None,
            deadline: None,
            completed: false,
            assigned_user: None,
            assigned_user_name: default_assigned_user_name(),
            date_created,
        }
    }

    /// Sets the task name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the task description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the task deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Timestamp) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the completion flag.
    #[must_use]
    pub const fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Assigns the task to `user_id` whose current name is `user_name`.
    ///
    /// A missing or empty name caches [`UNASSIGNED_NAME`].
    #[must_use]
    pub fn assign(mut self, user_id: UserId, user_name: Option<&str>) -> Self {
        self.assigned_user = Some(user_id);
        self.assigned_user_name = user_name
            .filter(|name| !name.is_empty())
            .unwrap_or(UNASSIGNED_NAME)
            .to_string();
        self
    }

    /// Clears the assignee and resets the cached name.
    #[must_use]
    pub fn unassign(mut self) -> Self {
        self.assigned_user = None;
        self.assigned_user_name = default_assigned_user_name();
        self
    }

    /// Returns the assignee if this task currently counts towards that
    /// user's pending tasks (assigned and not completed).
    #[must_use]
    pub const fn pending_assignee(&self) -> Option<&UserId> {
        if self.completed {
            None
        } else {
            self.assigned_user.as_ref()
        }
    }
}

/// Stores an absent assignee as the empty string, the way documents
/// written by earlier clients represent "unassigned".
mod assigned_user_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::domain::UserId;

    pub fn serialize<S: Serializer>(
        value: &Option<UserId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(user_id) => serializer.collect_str(user_id),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<UserId>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        UserId::parse(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
