//! User CRUD handlers.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::Value;

use super::dto::{ApiResponse, UserRequest};
use super::error::ApiErrorResponse;
use super::handlers::{AppState, project, respond_list};
use super::query::{ListQuery, SelectQuery};
use crate::domain::{User, UserId};

const RESOURCE: &str = "User";

fn parse_user_id(raw: &str) -> Result<UserId, ApiErrorResponse> {
    UserId::parse(raw).map_err(|_| ApiErrorResponse::invalid_id(RESOURCE, raw))
}

/// `GET /users`
///
/// # Errors
///
/// Returns 400 for an invalid query or a store failure.
pub async fn list_users(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<Value>>, ApiErrorResponse> {
    let query: ListQuery = pairs.into_iter().collect();
    let request = query.parse(state.config.default_user_limit)?;
    let users = &state.user_repository;
    respond_list(
        request,
        |filter| users.count(filter),
        |options| users.find(options),
    )
    .await
}

/// `POST /users`
///
/// # Errors
///
/// Returns 400 for an invalid body or a store failure.
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), ApiErrorResponse> {
    let Json(request) = body?;
    let user = request.into_user(UserId::generate());

    state.user_repository.insert(&user).await?;
    tracing::debug!(user_id = %user.id, "user created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("User created", user)),
    ))
}

/// `GET /users/{id}`
///
/// # Errors
///
/// Returns 404 if the user does not exist, 400 for a malformed id.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ApiResponse<Value>>, ApiErrorResponse> {
    let user_id = parse_user_id(&id)?;
    let query: SelectQuery = pairs.into_iter().collect();
    let projection = query.parse()?;

    let user = state
        .user_repository
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(RESOURCE))?;

    Ok(Json(ApiResponse::ok(project(&user, projection.as_ref())?)))
}

/// `PUT /users/{id}`: full replacement, including `pendingTasks`.
///
/// A user rename is not copied into the `assignedUserName` of their tasks.
///
/// # Errors
///
/// Returns 404 if the user does not exist, 400 for an invalid body or a
/// store failure.
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<User>>, ApiErrorResponse> {
    let user_id = parse_user_id(&id)?;
    let Json(request) = body?;

    let user = state
        .user_repository
        .replace(&request.into_user(user_id))
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(RESOURCE))?;

    Ok(Json(ApiResponse::new("User updated", user)))
}

/// `DELETE /users/{id}`
///
/// Every task assigned to the user, completed or not, is unassigned.
///
/// # Errors
///
/// Returns 404 if the user does not exist, 400 for a malformed id or a
/// store failure.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<User>>, ApiErrorResponse> {
    let user_id = parse_user_id(&id)?;

    let deleted = state
        .user_repository
        .delete(&user_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(RESOURCE))?;

    let unassigned = state.task_repository.unassign_user(&deleted.id).await?;
    tracing::debug!(user_id = %deleted.id, unassigned, "user deleted");

    Ok(Json(ApiResponse::new("User deleted", deleted)))
}
