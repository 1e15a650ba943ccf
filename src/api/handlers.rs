//! Application state and the handlers shared by both resources.

use std::env;
use std::sync::Arc;

use axum::Json;
use serde::Serialize;
use serde_json::Value;

use super::dto::ApiResponse;
use super::error::ApiErrorResponse;
use super::query::ListRequest;
use crate::infrastructure::{
    Filter, FindOptions, Projection, Repositories, RepositoryResult, TaskRepository,
    UserRepository,
};

// =============================================================================
// Application Configuration
// =============================================================================

/// Default number of tasks returned by `GET /tasks` without `limit`.
pub const DEFAULT_TASK_LIST_LIMIT: u64 = 100;

/// Runtime settings for the handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Default `limit` for task listings. `None` means unlimited.
    pub default_task_limit: Option<u64>,
    /// Default `limit` for user listings. `None` means unlimited.
    pub default_user_limit: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_task_limit: Some(DEFAULT_TASK_LIST_LIMIT),
            default_user_limit: None,
        }
    }
}

impl AppConfig {
    /// Reads `TASK_LIST_LIMIT` (`0` means unlimited).
    ///
    /// An unparsable value is logged and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var("TASK_LIST_LIMIT") {
            match value.trim().parse::<u64>() {
                Ok(0) => config.default_task_limit = None,
                Ok(limit) => config.default_task_limit = Some(limit),
                Err(error) => tracing::warn!(
                    %error,
                    value,
                    "TASK_LIST_LIMIT is not a valid number, using default"
                ),
            }
        }
        config
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Trait objects let the backend be chosen at start-up by
/// [`crate::infrastructure::RepositoryFactory`].
#[derive(Clone)]
pub struct AppState {
    /// Task documents.
    pub task_repository: Arc<dyn TaskRepository + Send + Sync>,
    /// User documents.
    pub user_repository: Arc<dyn UserRepository + Send + Sync>,
    /// Application configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Creates a new `AppState` with default configuration.
    #[must_use]
    pub fn from_repositories(repositories: Repositories) -> Self {
        Self::with_config(repositories, AppConfig::default())
    }

    /// Creates a new `AppState` from repositories and custom configuration.
    #[must_use]
    pub fn with_config(repositories: Repositories, config: AppConfig) -> Self {
        Self {
            task_repository: repositories.task_repository,
            user_repository: repositories.user_repository,
            config,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Shared Response Helpers
// =============================================================================

/// Serializes a document and applies the projection, if any.
pub(super) fn project<T: Serialize>(
    document: &T,
    projection: Option<&Projection>,
) -> Result<Value, ApiErrorResponse> {
    let value = serde_json::to_value(document)
        .map_err(|error| ApiErrorResponse::bad_request(error.to_string()))?;
    Ok(match projection {
        Some(projection) => projection.apply(value),
        None => value,
    })
}

/// Answers a list request with either the match count or the documents.
pub(super) async fn respond_list<T, C, F>(
    request: ListRequest,
    count: C,
    find: F,
) -> Result<Json<ApiResponse<Value>>, ApiErrorResponse>
where
    T: Serialize,
    C: FnOnce(Filter) -> RepositoryResult<u64>,
    F: FnOnce(FindOptions) -> RepositoryResult<Vec<T>>,
{
    if request.count {
        let total = count(request.options.filter).await?;
        return Ok(Json(ApiResponse::ok(Value::from(total))));
    }

    let documents = find(request.options)
        .await?
        .iter()
        .map(|document| project(document, request.projection.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ApiResponse::ok(Value::Array(documents))))
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check endpoint.
///
/// ```json
/// { "status": "healthy", "version": "0.1.0" }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
