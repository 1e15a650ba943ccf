//! User domain model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskId;

/// Unique identifier for a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new time-ordered `UserId` (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parses a `UserId` from its textual form.
    ///
    /// # Errors
    ///
    /// Returns `uuid::Error` if the value is not a UUID.
    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// An actor that tasks can be assigned to.
///
/// `pending_tasks` is a derived index: the identifiers of tasks assigned to
/// this user that are not completed. Task documents remain the source of
/// truth; the set is kept in step by the reconciliation in
/// [`crate::api::consistency`]. Identifiers are held as strings because
/// clients may seed the set with arbitrary values on create and replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub pending_tasks: BTreeSet<String>,
}

impl User {
    /// Creates a user with no pending tasks.
    #[must_use]
    pub const fn new(id: UserId) -> Self {
        Self {
            id,
            name: None,
            email: None,
            pending_tasks: BTreeSet::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Replaces the pending task set.
    #[must_use]
    pub fn with_pending_tasks<I, S>(mut self, pending_tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending_tasks = pending_tasks.into_iter().map(Into::into).collect();
        self
    }

    /// Adds `task_id` to the pending set. Returns `false` if already present.
    pub fn add_pending_task(&mut self, task_id: &TaskId) -> bool {
        self.pending_tasks.insert(task_id.to_string())
    }

    /// Removes `task_id` from the pending set. Returns `false` if absent.
    pub fn remove_pending_task(&mut self, task_id: &TaskId) -> bool {
        self.pending_tasks.remove(&task_id.to_string())
    }

    /// Returns `true` if `task_id` is in the pending set.
    #[must_use]
    pub fn has_pending_task(&self, task_id: &TaskId) -> bool {
        self.pending_tasks.contains(&task_id.to_string())
    }
}
