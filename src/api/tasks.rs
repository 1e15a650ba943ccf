//! Task CRUD handlers.
//!
//! Every mutation resolves the assignee before writing, writes the task, and
//! then reconciles the pending-task sets of the users involved.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::Value;

use super::consistency::{reconcile, release_deleted_task};
use super::dto::{ApiResponse, TaskRequest};
use super::error::ApiErrorResponse;
use super::handlers::{AppState, project, respond_list};
use super::query::{ListQuery, SelectQuery};
use crate::domain::{Task, TaskId, Timestamp, User, UserId};
use crate::infrastructure::UserRepository;

const RESOURCE: &str = "Task";

fn parse_task_id(raw: &str) -> Result<TaskId, ApiErrorResponse> {
    TaskId::parse(raw).map_err(|_| ApiErrorResponse::invalid_id(RESOURCE, raw))
}

/// Looks up the user named by `assignedUser`.
///
/// An identifier that is malformed or names no user is rejected before
/// anything is written.
async fn resolve_assignee(
    users: &dyn UserRepository,
    request: &TaskRequest,
) -> Result<Option<User>, ApiErrorResponse> {
    let Some(raw) = request.assignee() else {
        return Ok(None);
    };
    let user_id = UserId::parse(raw).map_err(|_| ApiErrorResponse::invalid_assigned_user())?;

    users
        .find_by_id(&user_id)
        .await?
        .map(Some)
        .ok_or_else(ApiErrorResponse::invalid_assigned_user)
}

/// `GET /tasks`
///
/// # Errors
///
/// Returns 400 for an invalid query or a store failure.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<Value>>, ApiErrorResponse> {
    let query: ListQuery = pairs.into_iter().collect();
    let request = query.parse(state.config.default_task_limit)?;
    let tasks = &state.task_repository;
    respond_list(
        request,
        |filter| tasks.count(filter),
        |options| tasks.find(options),
    )
    .await
}

/// `POST /tasks`
///
/// # Errors
///
/// Returns 400 for an invalid body, an unresolvable `assignedUser`, or a
/// store failure.
pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Task>>), ApiErrorResponse> {
    let Json(request) = body?;
    let assignee = resolve_assignee(state.user_repository.as_ref(), &request).await?;

    let task = request.into_task(TaskId::generate(), Timestamp::now(), assignee.as_ref());
    state.task_repository.insert(&task).await?;
    tracing::debug!(task_id = %task.id, "task created");

    reconcile(state.user_repository.as_ref(), None, Some(&task)).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Task created", task)),
    ))
}

/// `GET /tasks/{id}`
///
/// # Errors
///
/// Returns 404 if the task does not exist, 400 for a malformed id.
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<Value>>, ApiErrorResponse> {
    let task_id = parse_task_id(&id)?;
    let query: SelectQuery = pairs.into_iter().collect();
    let projection = query.parse()?;

    let task = state
        .task_repository
        .find_by_id(&task_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(RESOURCE))?;

    Ok(Json(ApiResponse::ok(project(&task, projection.as_ref())?)))
}

/// `PUT /tasks/{id}`: full replacement.
///
/// Fields missing from the body take their defaults; `dateCreated` is
/// stamped anew.
///
/// # Errors
///
/// Returns 404 if the task does not exist, 400 for an invalid body or
/// `assignedUser`, or a store failure.
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Task>>, ApiErrorResponse> {
    let task_id = parse_task_id(&id)?;
    let Json(request) = body?;

    let before = state
        .task_repository
        .find_by_id(&task_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(RESOURCE))?;

    let assignee = resolve_assignee(state.user_repository.as_ref(), &request).await?;
    let replacement = request.into_task(task_id, Timestamp::now(), assignee.as_ref());

    // A concurrent delete between the read and the write leaves nothing to
    // reconcile; that delete already released the old assignee.
    let after = state
        .task_repository
        .replace(&replacement)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(RESOURCE))?;

    reconcile(state.user_repository.as_ref(), Some(&before), Some(&after)).await?;

    Ok(Json(ApiResponse::new("Task updated", after)))
}

/// `DELETE /tasks/{id}`
///
/// # Errors
///
/// Returns 404 if the task does not exist, 400 for a malformed id or a
/// store failure.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Task>>, ApiErrorResponse> {
    let task_id = parse_task_id(&id)?;

    let deleted = state
        .task_repository
        .delete(&task_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(RESOURCE))?;
    tracing::debug!(task_id = %deleted.id, "task deleted");

    release_deleted_task(state.user_repository.as_ref(), &deleted).await?;

    Ok(Json(ApiResponse::new("Task deleted", deleted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{InMemoryUserRepository, Repositories};
    use rstest::rstest;
    use serde_json::json;

    fn state() -> AppState {
        AppState::from_repositories(Repositories::in_memory())
    }

    fn request(body: Value) -> TaskRequest {
        serde_json::from_value(body).unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn test_resolve_assignee() {
        let users = InMemoryUserRepository::new();
        let ann = User::new(UserId::generate()).with_name("Ann");
        users.insert(&ann).await.unwrap();

        let resolved = resolve_assignee(&users, &request(json!({"assignedUser": ann.id.to_string()})))
            .await
            .unwrap();
        assert_eq!(resolved, Some(ann));

        let unassigned = resolve_assignee(&users, &request(json!({"assignedUser": ""})))
            .await
            .unwrap();
        assert_eq!(unassigned, None);
    }

    #[rstest]
    #[case(json!({"assignedUser": "not-an-id"}))]
    #[case(json!({"assignedUser": UserId::generate().to_string()}))]
    #[tokio::test]
    async fn test_resolve_assignee_rejects(#[case] body: Value) {
        let users = InMemoryUserRepository::new();
        let error = resolve_assignee(&users, &request(body)).await.unwrap_err();
        assert_eq!(error, ApiErrorResponse::invalid_assigned_user());
    }

    #[rstest]
    #[tokio::test]
    async fn test_create_then_complete_updates_pending_tasks() {
        let state = state();
        let ann = User::new(UserId::generate()).with_name("Ann");
        state.user_repository.insert(&ann).await.unwrap();

        let (status, Json(created)) = create_task(
            State(state.clone()),
            Ok(Json(request(json!({"name": "X", "assignedUser": ann.id.to_string()})))),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.data.assigned_user_name, "Ann");

        let stored = state.user_repository.find_by_id(&ann.id).await.unwrap().unwrap();
        assert!(stored.has_pending_task(&created.data.id));

        let Json(updated) = update_task(
            State(state.clone()),
            Path(created.data.id.to_string()),
            Ok(Json(request(json!({"name": "X", "assignedUser": ann.id.to_string(), "completed": true})))),
        )
        .await
        .unwrap();
        assert!(updated.data.completed);

        let stored = state.user_repository.find_by_id(&ann.id).await.unwrap().unwrap();
        assert!(stored.pending_tasks.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_missing_task_is_not_found() {
        let error = update_task(
            State(state()),
            Path(TaskId::generate().to_string()),
            Ok(Json(TaskRequest::default())),
        )
        .await
        .unwrap_err();

        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.message, "Task not found");
    }

    #[rstest]
    #[tokio::test]
    async fn test_get_task_malformed_id() {
        let error = get_task(
            State(state()),
            Path("123".to_string()),
            Query(Vec::new()),
        )
        .await
        .unwrap_err();

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.message, "Bad Request");
    }
}
