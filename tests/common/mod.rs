//! Common test helpers for integration tests.
//!
//! # Note
//!
//! Each integration test file is compiled as its own crate, so helpers used
//! by only one of them would otherwise warn as dead code.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use taskboard_api::api::{AppConfig, AppState, create_router};
use taskboard_api::domain::{TaskId, User, UserId};
use taskboard_api::infrastructure::{
    Filter, FindOptions, InMemoryTaskRepository, InMemoryUserRepository, RepositoryError,
    RepositoryResult, Repositories, UserRepository,
};

// =============================================================================
// AppState Creation Helpers
// =============================================================================

/// Creates a test `AppState` with empty in-memory repositories.
pub fn create_test_app_state() -> AppState {
    AppState::from_repositories(Repositories::in_memory())
}

/// Creates a test `AppState` with the given configuration.
pub fn create_test_app_state_with_config(config: AppConfig) -> AppState {
    AppState::with_config(Repositories::in_memory(), config)
}

/// Creates a test `AppState` whose pending-task updates always fail.
pub fn create_test_app_state_with_failing_pending_tasks() -> AppState {
    AppState::from_repositories(Repositories {
        task_repository: Arc::new(InMemoryTaskRepository::new()),
        user_repository: Arc::new(FailingPendingTasks::default()),
    })
}

// =============================================================================
// HTTP Helpers
// =============================================================================

/// Sends one request through the router and decodes the JSON body.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    send_request(router, request).await
}

/// Sends a prepared request and decodes the JSON body.
pub async fn send_request(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Percent-encodes a query parameter value.
pub fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|byte| match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (byte as char).to_string()
            }
            _ => format!("%{byte:02X}"),
        })
        .collect()
}

/// Creates a user through the API and returns its id.
pub async fn create_user(router: &Router, body: Value) -> String {
    let (status, response) = send(router, Method::POST, "/users", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{response}");
    response["data"]["_id"].as_str().unwrap().to_string()
}

/// Creates a task through the API and returns its id.
pub async fn create_task(router: &Router, body: Value) -> String {
    let (status, response) = send(router, Method::POST, "/tasks", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{response}");
    response["data"]["_id"].as_str().unwrap().to_string()
}

/// Fetches a user's `pendingTasks` through the API.
pub async fn pending_tasks(router: &Router, user_id: &str) -> Vec<String> {
    let (status, response) = send(router, Method::GET, &format!("/users/{user_id}"), None).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    response["data"]["pendingTasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_str().unwrap().to_string())
        .collect()
}

/// Builds a router over fresh in-memory repositories.
pub fn create_test_router() -> Router {
    create_router(create_test_app_state())
}

// =============================================================================
// Failing User Repository
// =============================================================================

/// A user store whose documents work but whose pending-task updates fail.
#[derive(Default)]
pub struct FailingPendingTasks {
    inner: InMemoryUserRepository,
}

fn unavailable() -> RepositoryError {
    RepositoryError::DatabaseError("pending task update unavailable".to_string())
}

impl UserRepository for FailingPendingTasks {
    fn find(&self, options: FindOptions) -> RepositoryResult<Vec<User>> {
        self.inner.find(options)
    }

    fn count(&self, filter: Filter) -> RepositoryResult<u64> {
        self.inner.count(filter)
    }

    fn find_by_id(&self, id: &UserId) -> RepositoryResult<Option<User>> {
        self.inner.find_by_id(id)
    }

    fn insert(&self, user: &User) -> RepositoryResult<()> {
        self.inner.insert(user)
    }

    fn replace(&self, user: &User) -> RepositoryResult<Option<User>> {
        self.inner.replace(user)
    }

    fn delete(&self, id: &UserId) -> RepositoryResult<Option<User>> {
        self.inner.delete(id)
    }

    fn add_pending_task(&self, _user_id: &UserId, _task_id: &TaskId) -> RepositoryResult<bool> {
        Box::pin(async { Err(unavailable()) })
    }

    fn remove_pending_task(&self, _user_id: &UserId, _task_id: &TaskId) -> RepositoryResult<bool> {
        Box::pin(async { Err(unavailable()) })
    }
}
