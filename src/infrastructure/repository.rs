//! Repository traits for tasks and users.
//!
//! Every method returns a boxed `'static` future: implementations clone what
//! they need out of `self` and the arguments, then move it into an
//! `async move` block. Nothing runs until the future is awaited.

use futures::future::BoxFuture;
use thiserror::Error;

use super::query::{Filter, FindOptions};
use crate::domain::{Task, TaskId, User, UserId};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Database connection or statement error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type returned by repository futures.
pub type RepositoryResult<T> = BoxFuture<'static, Result<T, RepositoryError>>;

// =============================================================================
// Task Repository
// =============================================================================

/// Persistence for [`Task`] documents.
pub trait TaskRepository: Send + Sync {
    /// Returns the tasks selected by `options`.
    fn find(&self, options: FindOptions) -> RepositoryResult<Vec<Task>>;

    /// Counts the tasks matching `filter`.
    fn count(&self, filter: Filter) -> RepositoryResult<u64>;

    /// Finds a task by its ID.
    fn find_by_id(&self, id: &TaskId) -> RepositoryResult<Option<Task>>;

    /// Inserts a new task.
    fn insert(&self, task: &Task) -> RepositoryResult<()>;

    /// Replaces the stored task with the same ID.
    ///
    /// Returns the stored document, or `None` if no task has that ID.
    fn replace(&self, task: &Task) -> RepositoryResult<Option<Task>>;

    /// Deletes a task, returning the removed document if it existed.
    fn delete(&self, id: &TaskId) -> RepositoryResult<Option<Task>>;

    /// Clears the assignee of every task assigned to `user_id`.
    ///
    /// Sets `assignedUser` to empty and `assignedUserName` to `unassigned`,
    /// regardless of completion. Returns the number of tasks changed.
    fn unassign_user(&self, user_id: &UserId) -> RepositoryResult<u64>;
}

// =============================================================================
// User Repository
// =============================================================================

/// Persistence for [`User`] documents.
pub trait UserRepository: Send + Sync {
    /// Returns the users selected by `options`.
    fn find(&self, options: FindOptions) -> RepositoryResult<Vec<User>>;

    /// Counts the users matching `filter`.
    fn count(&self, filter: Filter) -> RepositoryResult<u64>;

    /// Finds a user by its ID.
    fn find_by_id(&self, id: &UserId) -> RepositoryResult<Option<User>>;

    /// Inserts a new user.
    fn insert(&self, user: &User) -> RepositoryResult<()>;

    /// Replaces the stored user with the same ID.
    ///
    /// Returns the stored document, or `None` if no user has that ID.
    fn replace(&self, user: &User) -> RepositoryResult<Option<User>>;

    /// Deletes a user, returning the removed document if it existed.
    fn delete(&self, id: &UserId) -> RepositoryResult<Option<User>>;

    /// Adds `task_id` to the user's pending tasks in place.
    ///
    /// Returns `false` if the user does not exist or already had the task.
    fn add_pending_task(&self, user_id: &UserId, task_id: &TaskId) -> RepositoryResult<bool>;

    /// Removes `task_id` from the user's pending tasks in place.
    ///
    /// Returns `false` if the user does not exist or did not have the task.
    fn remove_pending_task(&self, user_id: &UserId, task_id: &TaskId)
    -> RepositoryResult<bool>;
}
