//! Keeps `User.pendingTasks` in step with task mutations.
//!
//! The planning is pure ([`crate::domain::plan_reconciliation`]); this module
//! runs the planned set operations against the user store and logs each one.
//!
//! # Consistency Model
//!
//! The task write and the pending-task updates are separate store
//! operations. If an update fails after the task write has committed, the
//! request fails with a 400 while the task change stays in place, and the
//! pending set is stale until the next mutation of that task. Concurrent
//! updates of one task may also interleave their reconciliations; the last
//! one to run decides the final membership. Updates that target a user who
//! no longer exists are no-ops.

use thiserror::Error;

use super::error::ApiErrorResponse;
use crate::domain::{PendingTaskChange, Task, plan_deletion, plan_reconciliation};
use crate::infrastructure::{RepositoryError, UserRepository};

/// A pending-task update that failed after the primary write committed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{source}")]
pub struct ConsistencyError {
    /// The change that could not be applied.
    pub change: PendingTaskChange,
    /// The store failure.
    pub source: RepositoryError,
}

impl From<ConsistencyError> for ApiErrorResponse {
    fn from(error: ConsistencyError) -> Self {
        tracing::warn!(
            task_id = %error.change.task_id(),
            user_id = %error.change.user_id(),
            error = %error.source,
            "task write committed but pending tasks were not reconciled"
        );
        Self::bad_request(error.source.to_string())
    }
}

/// Reconciles pending tasks for a task going from `before` to `after`.
///
/// # Errors
///
/// Returns [`ConsistencyError`] for the first change the store rejects.
/// Changes planned after it are not attempted.
pub async fn reconcile(
    users: &dyn UserRepository,
    before: Option<&Task>,
    after: Option<&Task>,
) -> Result<(), ConsistencyError> {
    apply_changes(users, plan_reconciliation(before, after)).await
}

/// Removes a deleted task from its assignee's pending tasks.
///
/// # Errors
///
/// Returns [`ConsistencyError`] if the store rejects the removal.
pub async fn release_deleted_task(
    users: &dyn UserRepository,
    deleted: &Task,
) -> Result<(), ConsistencyError> {
    apply_changes(users, plan_deletion(deleted)).await
}

async fn apply_changes(
    users: &dyn UserRepository,
    changes: Vec<PendingTaskChange>,
) -> Result<(), ConsistencyError> {
    for change in changes {
        let result = match &change {
            PendingTaskChange::Remove { user_id, task_id } => {
                users.remove_pending_task(user_id, task_id).await
            }
            PendingTaskChange::Add { user_id, task_id } => {
                users.add_pending_task(user_id, task_id).await
            }
        };

        match result {
            Ok(changed) => tracing::debug!(
                ?change,
                changed,
                "pending task change applied"
            ),
            Err(source) => return Err(ConsistencyError { change, source }),
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
