//! In-memory repository implementations.
//!
//! Suitable for tests and local development. Each collection is a
//! `BTreeMap` keyed by a time-ordered UUID, so iteration order is insertion
//! order, wrapped in `Arc<RwLock<...>>` for sharing across request tasks.
//!
//! Single-document updates (`add_pending_task`, `remove_pending_task`,
//! `unassign_user`) happen under one write lock and never read-modify-write
//! across an `.await`.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::{Task, TaskId, User, UserId};
use crate::infrastructure::{
    Filter, FindOptions, RepositoryError, RepositoryResult, TaskRepository, UserRepository,
};

/// Pairs each entity with its JSON document for query evaluation.
fn with_documents<T: Serialize>(
    entities: impl Iterator<Item = T>,
) -> Result<Vec<(Value, T)>, RepositoryError> {
    entities
        .map(|entity| {
            serde_json::to_value(&entity)
                .map(|document| (document, entity))
                .map_err(|error| RepositoryError::SerializationError(error.to_string()))
        })
        .collect()
}

fn count_matching<'a, T: Serialize + 'a>(
    mut entities: impl Iterator<Item = &'a T>,
    filter: &Filter,
) -> Result<u64, RepositoryError> {
    if filter.is_all() {
        return Ok(entities.count() as u64);
    }
    entities.try_fold(0_u64, |count, entity| {
        let document = serde_json::to_value(entity)
            .map_err(|error| RepositoryError::SerializationError(error.to_string()))?;
        Ok(if filter.matches(&document) {
            count + 1
        } else {
            count
        })
    })
}

// =============================================================================
// In-Memory Task Repository
// =============================================================================

/// In-memory implementation of `TaskRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<BTreeMap<TaskId, Task>>>,
}

impl InMemoryTaskRepository {
    /// Creates a new empty in-memory task repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::significant_drop_tightening)]
impl TaskRepository for InMemoryTaskRepository {
    fn find(&self, options: FindOptions) -> RepositoryResult<Vec<Task>> {
        let tasks = Arc::clone(&self.tasks);
        async move {
            let rows = {
                let guard = tasks.read().await;
                with_documents(guard.values().cloned())?
            };
            Ok(options.execute(rows))
        }
        .boxed()
    }

    fn count(&self, filter: Filter) -> RepositoryResult<u64> {
        let tasks = Arc::clone(&self.tasks);
        async move {
            let guard = tasks.read().await;
            count_matching(guard.values(), &filter)
        }
        .boxed()
    }

    fn find_by_id(&self, id: &TaskId) -> RepositoryResult<Option<Task>> {
        let tasks = Arc::clone(&self.tasks);
        let id = id.clone();
        async move {
            let guard = tasks.read().await;
            Ok(guard.get(&id).cloned())
        }
        .boxed()
    }

    fn insert(&self, task: &Task) -> RepositoryResult<()> {
        let tasks = Arc::clone(&self.tasks);
        let task = task.clone();
        async move {
            let mut guard = tasks.write().await;
            if guard.contains_key(&task.id) {
                return Err(RepositoryError::DatabaseError(format!(
                    "duplicate key error: _id {}",
                    task.id
                )));
            }
            guard.insert(task.id.clone(), task);
            Ok(())
        }
        .boxed()
    }

    fn replace(&self, task: &Task) -> RepositoryResult<Option<Task>> {
        let tasks = Arc::clone(&self.tasks);
        let task = task.clone();
        async move {
            let mut guard = tasks.write().await;
            let Some(stored) = guard.get_mut(&task.id) else {
                return Ok(None);
            };
            *stored = task.clone();
            Ok(Some(task))
        }
        .boxed()
    }

    fn delete(&self, id: &TaskId) -> RepositoryResult<Option<Task>> {
        let tasks = Arc::clone(&self.tasks);
        let id = id.clone();
        async move {
            let mut guard = tasks.write().await;
            Ok(guard.remove(&id))
        }
        .boxed()
    }

    fn unassign_user(&self, user_id: &UserId) -> RepositoryResult<u64> {
        let tasks = Arc::clone(&self.tasks);
        let user_id = user_id.clone();
        async move {
            let mut guard = tasks.write().await;
            let mut changed = 0;
            for task in guard.values_mut() {
                if task.assigned_user.as_ref() == Some(&user_id) {
                    *task = task.clone().unassign();
                    changed += 1;
                }
            }
            Ok(changed)
        }
        .boxed()
    }
}

// =============================================================================
// In-Memory User Repository
// =============================================================================

/// In-memory implementation of `UserRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<BTreeMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    /// Creates a new empty in-memory user repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::significant_drop_tightening)]
impl UserRepository for InMemoryUserRepository {
    fn find(&self, options: FindOptions) -> RepositoryResult<Vec<User>> {
        let users = Arc::clone(&self.users);
        async move {
            let rows = {
                let guard = users.read().await;
                with_documents(guard.values().cloned())?
            };
            Ok(options.execute(rows))
        }
        .boxed()
    }

    fn count(&self, filter: Filter) -> RepositoryResult<u64> {
        let users = Arc::clone(&self.users);
        async move {
            let guard = users.read().await;
            count_matching(guard.values(), &filter)
        }
        .boxed()
    }

    fn find_by_id(&self, id: &UserId) -> RepositoryResult<Option<User>> {
        let users = Arc::clone(&self.users);
        let id = id.clone();
        async move {
            let guard = users.read().await;
            Ok(guard.get(&id).cloned())
        }
        .boxed()
    }

    fn insert(&self, user: &User) -> RepositoryResult<()> {
        let users = Arc::clone(&self.users);
        let user = user.clone();
        async move {
            let mut guard = users.write().await;
            if guard.contains_key(&user.id) {
                return Err(RepositoryError::DatabaseError(format!(
                    "duplicate key error: _id {}",
                    user.id
                )));
            }
            guard.insert(user.id.clone(), user);
            Ok(())
        }
        .boxed()
    }

    fn replace(&self, user: &User) -> RepositoryResult<Option<User>> {
        let users = Arc::clone(&self.users);
        let user = user.clone();
        async move {
            let mut guard = users.write().await;
            let Some(stored) = guard.get_mut(&user.id) else {
                return Ok(None);
            };
            *stored = user.clone();
            Ok(Some(user))
        }
        .boxed()
    }

    fn delete(&self, id: &UserId) -> RepositoryResult<Option<User>> {
        let users = Arc::clone(&self.users);
        let id = id.clone();
        async move {
            let mut guard = users.write().await;
            Ok(guard.remove(&id))
        }
        .boxed()
    }

    fn add_pending_task(&self, user_id: &UserId, task_id: &TaskId) -> RepositoryResult<bool> {
        let users = Arc::clone(&self.users);
        let user_id = user_id.clone();
        let task_id = task_id.clone();
        async move {
            let mut guard = users.write().await;
            Ok(guard
                .get_mut(&user_id)
                .is_some_and(|user| user.add_pending_task(&task_id)))
        }
        .boxed()
    }

    fn remove_pending_task(
        &self,
        user_id: &UserId,
        task_id: &TaskId,
    ) -> RepositoryResult<bool> {
        let users = Arc::clone(&self.users);
        let user_id = user_id.clone();
        let task_id = task_id.clone();
        async move {
            let mut guard = users.write().await;
            Ok(guard
                .get_mut(&user_id)
                .is_some_and(|user| user.remove_pending_task(&task_id)))
        }
        .boxed()
    }
}

// =============================================================================
// Tests
// =============================================================================
