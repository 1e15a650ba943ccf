//! # taskboard-api
//!
//! A task and user CRUD service. Each task may be assigned to a user and
//! caches that user's name; each user keeps the set of task identifiers that
//! are assigned to them and not yet completed.
//!
//! - [`domain`]: tasks, users and the pending-task reconciliation plan
//! - [`infrastructure`]: repositories, the query language and storage backends
//! - [`api`]: axum handlers and the router

pub mod api;
pub mod domain;
pub mod infrastructure;
