//! API module for HTTP handlers.
//!
//! This module contains route definitions and request/response handlers.

pub mod consistency;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod query;
pub mod routes;
pub mod tasks;
pub mod users;

pub use consistency::{ConsistencyError, reconcile, release_deleted_task};
pub use dto::{ApiResponse, TaskRequest, UserRequest};
pub use error::ApiErrorResponse;
pub use handlers::{AppConfig, AppState, DEFAULT_TASK_LIST_LIMIT, HealthResponse, health_check};
pub use query::{ListQuery, ListRequest, SelectQuery};
pub use routes::create_router;
pub use tasks::{create_task, delete_task, get_task, list_tasks, update_task};
pub use users::{create_user, delete_user, get_user, list_users, update_user};
