//! Infrastructure layer: storage backends and the document query language.

pub mod factory;
pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod repository;

pub use factory::{
    ConfigurationError, FactoryError, Repositories, RepositoryConfig, RepositoryConfigBuilder,
    RepositoryFactory, StorageMode,
};
pub use in_memory::{InMemoryTaskRepository, InMemoryUserRepository};
pub use postgres::{PostgresTaskRepository, PostgresUserRepository};
pub use query::{Condition, Filter, FindOptions, Projection, QueryError, SortDirection, SortSpec};
pub use repository::{RepositoryError, RepositoryResult, TaskRepository, UserRepository};
