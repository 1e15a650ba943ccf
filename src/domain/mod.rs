//! Domain module for tasks and users.
//!
//! This module contains the entities, their identifiers, and the pure
//! planning of pending-task updates.

pub mod reconcile;
pub mod task;
pub mod user;

pub use reconcile::{PendingTaskChange, plan_deletion, plan_reconciliation};
pub use task::{Task, TaskId, Timestamp, TimestampError, UNASSIGNED_NAME};
pub use user::{User, UserId};
