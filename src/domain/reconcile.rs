//! Planning of pending-task updates for a task mutation.
//!
//! A task mutation is described by the document before it (absent on
//! create) and after it (absent on delete). The "was pending" and "is
//! pending" conditions are evaluated independently, so a single plan covers
//! creation, deletion, reassignment and completion flips alike.

use super::task::{Task, TaskId};
use super::user::UserId;

/// One set operation against a user's pending tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingTaskChange {
    /// Set-remove `task_id` from `user_id`'s pending tasks.
    Remove { user_id: UserId, task_id: TaskId },
    /// Set-add `task_id` to `user_id`'s pending tasks.
    Add { user_id: UserId, task_id: TaskId },
}

impl PendingTaskChange {
    /// Returns the user this change targets.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::Remove { user_id, .. } | Self::Add { user_id, .. } => user_id,
        }
    }

    /// Returns the task this change concerns.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Remove { task_id, .. } | Self::Add { task_id, .. } => task_id,
        }
    }
}

/// Computes the changes that bring pending-task sets in line with a task
/// mutation.
///
/// Removals always precede additions. When the task stays pending under the
/// same user, both a removal and an addition are planned; applied in order
/// they leave the membership unchanged.
#[must_use]
pub fn plan_reconciliation(before: Option<&Task>, after: Option<&Task>) -> Vec<PendingTaskChange> {
    let removal = before.and_then(|task| {
        task.pending_assignee()
            .map(|user_id| PendingTaskChange::Remove {
                user_id: user_id.clone(),
                task_id: task.id.clone(),
            })
    });

    let addition = after.and_then(|task| {
        task.pending_assignee().map(|user_id| PendingTaskChange::Add {
            user_id: user_id.clone(),
            task_id: task.id.clone(),
        })
    });

    removal.into_iter().chain(addition).collect()
}

/// Plans the cleanup for a deleted task.
///
/// The assignee loses the id whether or not the task was completed; a
/// completed task is normally absent already and the removal is a no-op.
#[must_use]
pub fn plan_deletion(deleted: &Task) -> Vec<PendingTaskChange> {
    deleted
        .assigned_user
        .iter()
        .map(|user_id| PendingTaskChange::Remove {
            user_id: user_id.clone(),
            task_id: deleted.id.clone(),
        })
        .collect()
}
