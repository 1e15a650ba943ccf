//! Property tests for the pending-task invariant.
//!
//! Random sequences of task and user mutations are applied through the
//! handlers. After every step, each user's `pendingTasks` must equal the set
//! of tasks assigned to that user and not completed, and no task may point
//! at a user that no longer exists.

mod common;

use std::collections::BTreeSet;

use axum::Json;
use axum::extract::{Path, State};
use proptest::prelude::*;

use common::create_test_app_state;
use taskboard_api::api::{
    AppState, TaskRequest, UserRequest, create_task, create_user, delete_task, delete_user,
    update_task,
};
use taskboard_api::domain::{Task, User};
use taskboard_api::infrastructure::FindOptions;

#[derive(Debug, Clone)]
enum Operation {
    CreateUser,
    DeleteUser { user: usize },
    CreateTask { assignee: Option<usize>, completed: bool },
    UpdateTask { task: usize, assignee: Option<usize>, completed: bool },
    DeleteTask { task: usize },
    /// Replaces `task` with its own current contents.
    RepeatUpdate { task: usize },
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        2 => Just(Operation::CreateUser),
        1 => (0usize..8).prop_map(|user| Operation::DeleteUser { user }),
        4 => (proptest::option::of(0usize..8), any::<bool>())
            .prop_map(|(assignee, completed)| Operation::CreateTask { assignee, completed }),
        4 => (0usize..16, proptest::option::of(0usize..8), any::<bool>()).prop_map(
            |(task, assignee, completed)| Operation::UpdateTask { task, assignee, completed }
        ),
        2 => (0usize..16).prop_map(|task| Operation::DeleteTask { task }),
        1 => (0usize..16).prop_map(|task| Operation::RepeatUpdate { task }),
    ]
}

/// Ids handed out so far, including ones since deleted.
#[derive(Default)]
struct Known {
    users: Vec<String>,
    tasks: Vec<String>,
}

fn pick(ids: &[String], index: usize) -> Option<String> {
    (!ids.is_empty()).then(|| ids[index % ids.len()].clone())
}

fn task_request(assignee: Option<String>, completed: bool) -> TaskRequest {
    TaskRequest {
        name: Some("task".to_string()),
        completed,
        assigned_user: assignee,
        ..TaskRequest::default()
    }
}

async fn apply(state: &AppState, known: &mut Known, operation: Operation) {
    // Requests naming deleted users or tasks are expected to fail; only the
    // resulting store state matters here.
    match operation {
        Operation::CreateUser => {
            let request = UserRequest {
                name: Some("user".to_string()),
                ..UserRequest::default()
            };
            if let Ok((_, Json(response))) = create_user(State(state.clone()), Ok(Json(request))).await {
                known.users.push(response.data.id.to_string());
            }
        }
        Operation::DeleteUser { user } => {
            if let Some(user) = pick(&known.users, user) {
                let _ = delete_user(State(state.clone()), Path(user)).await;
            }
        }
        Operation::CreateTask { assignee, completed } => {
            let assignee = assignee.and_then(|index| pick(&known.users, index));
            let request = task_request(assignee, completed);
            if let Ok((_, Json(response))) = create_task(State(state.clone()), Ok(Json(request))).await {
                known.tasks.push(response.data.id.to_string());
            }
        }
        Operation::UpdateTask { task, assignee, completed } => {
            if let Some(task) = pick(&known.tasks, task) {
                let assignee = assignee.and_then(|index| pick(&known.users, index));
                let request = task_request(assignee, completed);
                let _ = update_task(State(state.clone()), Path(task), Ok(Json(request))).await;
            }
        }
        Operation::DeleteTask { task } => {
            if let Some(task) = pick(&known.tasks, task) {
                let _ = delete_task(State(state.clone()), Path(task)).await;
            }
        }
        Operation::RepeatUpdate { task } => {
            let Some(task_id) = pick(&known.tasks, task) else {
                return;
            };
            let current = state
                .task_repository
                .find(FindOptions::all())
                .await
                .unwrap()
                .into_iter()
                .find(|stored| stored.id.to_string() == task_id);
            if let Some(current) = current {
                let request = task_request(
                    current.assigned_user.map(|user_id| user_id.to_string()),
                    current.completed,
                );
                let _ = update_task(State(state.clone()), Path(task_id), Ok(Json(request))).await;
            }
        }
    }
}

async fn check_invariant(state: &AppState) -> Result<(), TestCaseError> {
    let tasks: Vec<Task> = state.task_repository.find(FindOptions::all()).await.unwrap();
    let users: Vec<User> = state.user_repository.find(FindOptions::all()).await.unwrap();

    for user in &users {
        let expected: BTreeSet<String> = tasks
            .iter()
            .filter(|task| task.assigned_user.as_ref() == Some(&user.id) && !task.completed)
            .map(|task| task.id.to_string())
            .collect();
        prop_assert_eq!(&user.pending_tasks, &expected, "user {}", user.id);
    }

    for task in &tasks {
        if let Some(user_id) = &task.assigned_user {
            prop_assert!(
                users.iter().any(|user| &user.id == user_id),
                "task {} points at deleted user {}",
                task.id,
                user_id
            );
        } else {
            prop_assert_eq!(task.assigned_user_name.as_str(), "unassigned");
        }
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_pending_tasks_track_assignments(
        operations in proptest::collection::vec(operation_strategy(), 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let state = create_test_app_state();
            let mut known = Known::default();

            for operation in operations {
                apply(&state, &mut known, operation).await;
                check_invariant(&state).await?;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
