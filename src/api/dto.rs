//! Data Transfer Objects for API requests and responses.
//!
//! Request bodies are deliberately lenient: scalar fields accept numbers and
//! booleans as text, and a missing or `null` field means "not supplied".

use std::collections::BTreeSet;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{Task, TaskId, Timestamp, User, UserId};

// =============================================================================
// Response Envelope
// =============================================================================

/// The `{message, data}` envelope wrapping every response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Creates an envelope.
    #[must_use]
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }

    /// Creates an `OK` envelope.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self::new("OK", data)
    }
}

// =============================================================================
// Task DTOs
// =============================================================================

/// Body of `POST /tasks` and `PUT /tasks/{id}`.
///
/// `assigned_user` is kept as raw text; the handler resolves it against the
/// user store before anything is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    #[serde(default, deserialize_with = "optional_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "optional_deadline")]
    pub deadline: Option<Timestamp>,
    #[serde(default, deserialize_with = "literal_true")]
    pub completed: bool,
    #[serde(default, deserialize_with = "optional_text")]
    pub assigned_user: Option<String>,
}

impl TaskRequest {
    /// Returns the requested assignee text, with empty meaning unassigned.
    #[must_use]
    pub fn assignee(&self) -> Option<&str> {
        self.assigned_user
            .as_deref()
            .map(str::trim)
            .filter(|user_id| !user_id.is_empty())
    }

    /// Builds the full task document this request describes.
    ///
    /// `assignee` must already be resolved; its name becomes the cached
    /// `assignedUserName`.
    #[must_use]
    pub fn into_task(self, id: TaskId, date_created: Timestamp, assignee: Option<&User>) -> Task {
        let mut task = Task::new(id, date_created).with_completed(self.completed);
        task.name = self.name;
        task.description = self.description;
        task.deadline = self.deadline;

        match assignee {
            Some(user) => task.assign(user.id.clone(), user.name.as_deref()),
            None => task,
        }
    }
}

// =============================================================================
// User DTOs
// =============================================================================

/// Body of `POST /users` and `PUT /users/{id}`.
///
/// `pending_tasks` is accepted as given; its entries are not checked
/// against stored tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[serde(default, deserialize_with = "optional_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "pending_task_ids")]
    pub pending_tasks: BTreeSet<String>,
}

impl UserRequest {
    /// Builds the full user document this request describes.
    #[must_use]
    pub fn into_user(self, id: UserId) -> User {
        let mut user = User::new(id).with_pending_tasks(self.pending_tasks);
        user.name = self.name;
        user.email = self.email;
        user
    }
}

// =============================================================================
// Lenient Field Deserializers
// =============================================================================

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(_) | Value::Object(_) => Err(D::Error::custom(format!(
            "expected a string, found {value}"
        ))),
        scalar => Ok(scalar_text(scalar)),
    }
}

fn literal_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

fn optional_deadline<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Timestamp>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => Timestamp::parse(&text)
            .map(Some)
            .map_err(|_| D::Error::custom(format!("Cast to date failed for value \"{text}\""))),
        Value::Number(number) => number
            .as_i64()
            .and_then(Timestamp::from_millis)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("Cast to date failed for value {number}"))),
        other => Err(D::Error::custom(format!(
            "Cast to date failed for value {other}"
        ))),
    }
}

fn pending_task_ids<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeSet<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        _ => BTreeSet::new(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNASSIGNED_NAME;
    use rstest::rstest;
    use serde_json::json;

    fn task_request(body: Value) -> Result<TaskRequest, serde_json::Error> {
        serde_json::from_value(body)
    }

    #[rstest]
    #[case(json!({}), false)]
    #[case(json!({"completed": true}), true)]
    #[case(json!({"completed": "true"}), false)]
    #[case(json!({"completed": 1}), false)]
    #[case(json!({"completed": null}), false)]
    fn test_completed_requires_literal_true(#[case] body: Value, #[case] expected: bool) {
        assert_eq!(task_request(body).unwrap().completed, expected);
    }

    #[rstest]
    #[case(json!({"deadline": "2024-03-01T12:00:00Z"}), Some("2024-03-01T12:00:00.000Z"))]
    #[case(json!({"deadline": 0}), Some("1970-01-01T00:00:00.000Z"))]
    #[case(json!({"deadline": -62_167_219_200_000_i64}), Some("0000-01-01T00:00:00.000Z"))]
    #[case(json!({"deadline": 253_402_300_799_999_i64}), Some("9999-12-31T23:59:59.999Z"))]
    #[case(json!({"deadline": null}), None)]
    #[case(json!({}), None)]
    fn test_deadline_forms(#[case] body: Value, #[case] expected: Option<&str>) {
        let deadline = task_request(body).unwrap().deadline;
        assert_eq!(deadline.map(|d| d.to_string()).as_deref(), expected);
    }

    #[rstest]
    #[case(json!({"deadline": "next tuesday"}))]
    #[case(json!({"deadline": 253_402_300_800_000_i64}))]
    #[case(json!({"deadline": -62_167_219_200_001_i64}))]
    #[case(json!({"deadline": "9999-12-31T23:00:00-02:00"}))]
    #[case(json!({"deadline": true}))]
    #[case(json!({"deadline": [1]}))]
    #[case(json!({"name": {"first": "x"}}))]
    fn test_rejected_task_bodies(#[case] body: Value) {
        assert!(task_request(body).is_err());
    }

    #[rstest]
    #[case(json!({}), None)]
    #[case(json!({"assignedUser": ""}), None)]
    #[case(json!({"assignedUser": "  "}), None)]
    #[case(json!({"assignedUser": null}), None)]
    #[case(json!({"assignedUser": "abc"}), Some("abc"))]
    fn test_assignee(#[case] body: Value, #[case] expected: Option<&str>) {
        assert_eq!(task_request(body).unwrap().assignee(), expected);
    }

    #[rstest]
    fn test_into_task_caches_assignee_name() {
        let user = User::new(UserId::generate()).with_name("Ann");
        let request = task_request(json!({"name": "X", "assignedUser": user.id.to_string()})).unwrap();

        let task = request.into_task(TaskId::generate(), Timestamp::now(), Some(&user));

        assert_eq!(task.name.as_deref(), Some("X"));
        assert_eq!(task.assigned_user, Some(user.id.clone()));
        assert_eq!(task.assigned_user_name, "Ann");
    }

    #[rstest]
    fn test_into_task_without_assignee() {
        let request = task_request(json!({"name": 42})).unwrap();
        let task = request.into_task(TaskId::generate(), Timestamp::now(), None);

        assert_eq!(task.name.as_deref(), Some("42"));
        assert!(task.assigned_user.is_none());
        assert_eq!(task.assigned_user_name, UNASSIGNED_NAME);
    }

    #[rstest]
    #[case(json!({"pendingTasks": ["a", "b", "a"]}), vec!["a", "b"])]
    #[case(json!({"pendingTasks": [1, true, null]}), vec!["1", "true"])]
    #[case(json!({"pendingTasks": "a"}), vec![])]
    #[case(json!({}), vec![])]
    fn test_pending_tasks_input(#[case] body: Value, #[case] expected: Vec<&str>) {
        let request: UserRequest = serde_json::from_value(body).unwrap();
        let expected: BTreeSet<String> = expected.into_iter().map(String::from).collect();
        assert_eq!(request.pending_tasks, expected);
    }

    #[rstest]
    fn test_envelope_serialization() {
        let body = serde_json::to_value(ApiResponse::ok(json!([]))).unwrap();
        assert_eq!(body, json!({"message": "OK", "data": []}));
    }
}
