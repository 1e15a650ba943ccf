//! `PostgreSQL` repository implementations.
//!
//! Each collection is a table holding one JSONB document per row. Filters
//! and sorts from [`crate::infrastructure::query`] are translated into JSONB
//! expressions; field paths and operands are always bound as parameters,
//! never spliced into the statement text.
//!
//! # Table Schema
//!
//! ```sql
//! CREATE TABLE tasks (
//!     id UUID PRIMARY KEY,
//!     data JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY,
//!     data JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Pending-task updates are single `UPDATE` statements, so concurrent
//! add/remove calls on the same user do not lose each other's writes.

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::QueryAs;
use uuid::Uuid;

use crate::domain::{Task, TaskId, UNASSIGNED_NAME, User, UserId};
use crate::infrastructure::query::{Condition, Filter, FindOptions, SortDirection, path_segments};
use crate::infrastructure::{RepositoryError, RepositoryResult, TaskRepository, UserRepository};

const TASKS_TABLE: &str = "tasks";
const USERS_TABLE: &str = "users";

/// Creates the document tables if they do not exist yet.
pub const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS tasks (
    id UUID PRIMARY KEY,
    data JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_tasks_assigned_user ON tasks ((data->>'assignedUser'));
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    data JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);";

fn database_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(error.to_string())
}

fn serialization_error(error: serde_json::Error) -> RepositoryError {
    RepositoryError::SerializationError(error.to_string())
}

// =============================================================================
// SQL Translation
// =============================================================================

/// A value bound to a numbered placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParameter {
    /// A JSON path, bound as `TEXT[]` for the `#>` operator.
    Path(Vec<String>),
    /// A JSON operand, bound as `JSONB`.
    Json(Value),
    /// An optional integer, bound as `BIGINT` (`NULL` for `None`).
    Integer(Option<i64>),
}

/// Accumulates statement text and its parameters.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    pub sql: String,
    pub parameters: Vec<SqlParameter>,
}

impl SqlBuilder {
    fn placeholder(&mut self, parameter: SqlParameter) -> String {
        self.parameters.push(parameter);
        format!("${}", self.parameters.len())
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Appends a boolean SQL expression equivalent to `filter`.
    pub fn push_filter(&mut self, filter: &Filter) {
        match filter {
            Filter::And(clauses) => self.push_junction(clauses, " AND ", "TRUE"),
            Filter::Or(clauses) => self.push_junction(clauses, " OR ", "FALSE"),
            Filter::Nor(clauses) => {
                self.push("NOT ");
                self.push_junction(clauses, " OR ", "FALSE");
            }
            Filter::Field { path, condition } => self.push_condition(path, condition),
        }
    }

    fn push_junction(&mut self, clauses: &[Filter], separator: &str, empty: &str) {
        if clauses.is_empty() {
            self.push(empty);
            return;
        }
        self.push("(");
        for (index, clause) in clauses.iter().enumerate() {
            if index > 0 {
                self.push(separator);
            }
            self.push_filter(clause);
        }
        self.push(")");
    }

    /// Leaf conditions are wrapped in `COALESCE(.., FALSE)` so a missing
    /// field never yields SQL `NULL` and negations stay two-valued.
    fn push_condition(&mut self, path: &str, condition: &Condition) {
        match condition {
            Condition::Eq(value) => {
                self.push("COALESCE(");
                self.push_equality(path, value);
                self.push(", FALSE)");
            }
            Condition::Ne(value) => {
                self.push("NOT COALESCE(");
                self.push_equality(path, value);
                self.push(", FALSE)");
            }
            Condition::Gt(value) => self.push_ordering(path, ">", value),
            Condition::Gte(value) => self.push_ordering(path, ">=", value),
            Condition::Lt(value) => self.push_ordering(path, "<", value),
            Condition::Lte(value) => self.push_ordering(path, "<=", value),
            Condition::In(values) => self.push_membership(path, values, false),
            Condition::Nin(values) => self.push_membership(path, values, true),
            Condition::Exists(expected) => {
                let field = self.placeholder(SqlParameter::Path(path_segments(path)));
                let test = if *expected { "IS NOT NULL" } else { "IS NULL" };
                self.push(&format!("(data #> {field}) {test}"));
            }
        }
    }

    fn push_equality(&mut self, path: &str, value: &Value) {
        let field = self.placeholder(SqlParameter::Path(path_segments(path)));
        if value.is_null() {
            self.push(&format!(
                "(data #> {field} IS NULL OR data #> {field} = 'null'::jsonb)"
            ));
            return;
        }
        let operand = self.placeholder(SqlParameter::Json(value.clone()));
        self.push(&format!(
            "(data #> {field} = {operand} OR (jsonb_typeof(data #> {field}) = 'array' \
             AND jsonb_typeof({operand}) <> 'array' \
             AND data #> {field} @> jsonb_build_array({operand})))"
        ));
    }

    fn push_ordering(&mut self, path: &str, operator: &str, value: &Value) {
        let field = self.placeholder(SqlParameter::Path(path_segments(path)));
        let operand = self.placeholder(SqlParameter::Json(value.clone()));
        self.push(&format!(
            "COALESCE(jsonb_typeof(data #> {field}) = jsonb_typeof({operand}) \
             AND jsonb_typeof({operand}) IN ('number', 'string', 'boolean') \
             AND data #> {field} {operator} {operand}, FALSE)"
        ));
    }

    fn push_membership(&mut self, path: &str, values: &[Value], negate: bool) {
        if negate {
            self.push("NOT ");
        }
        if values.is_empty() {
            self.push("FALSE");
            return;
        }
        self.push("(");
        for (index, value) in values.iter().enumerate() {
            if index > 0 {
                self.push(" OR ");
            }
            self.push_condition(path, &Condition::Eq(value.clone()));
        }
        self.push(")");
    }

    /// Appends the `ORDER BY` clause. Insertion order breaks ties.
    pub fn push_order_by(&mut self, options: &FindOptions) {
        self.push(" ORDER BY ");
        if let Some(sort) = &options.sort {
            for (path, direction) in &sort.keys {
                let field = self.placeholder(SqlParameter::Path(path_segments(path)));
                let direction = match direction {
                    SortDirection::Ascending => "ASC NULLS FIRST",
                    SortDirection::Descending => "DESC NULLS LAST",
                };
                self.push(&format!("data #> {field} {direction}, "));
            }
        }
        self.push("created_at ASC, id ASC");
    }

    /// Appends `OFFSET` and `LIMIT`; a `NULL` limit means no limit.
    pub fn push_window(&mut self, options: &FindOptions) {
        let offset = self.placeholder(SqlParameter::Integer(Some(
            i64::try_from(options.skip).unwrap_or(i64::MAX),
        )));
        let limit = self.placeholder(SqlParameter::Integer(
            options
                .limit
                .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX)),
        ));
        self.push(&format!(" OFFSET {offset} LIMIT {limit}"));
    }

    fn bind<'q, O>(
        &self,
        mut query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> QueryAs<'q, Postgres, O, PgArguments> {
        for parameter in &self.parameters {
            query = match parameter {
                SqlParameter::Path(path) => query.bind(path.clone()),
                SqlParameter::Json(value) => query.bind(value.clone()),
                SqlParameter::Integer(value) => query.bind(*value),
            };
        }
        query
    }
}

/// Builds the `SELECT` statement for a find.
#[must_use]
pub fn select_statement(table: &str, options: &FindOptions) -> SqlBuilder {
    let mut builder = SqlBuilder::default();
    builder.push(&format!("SELECT data FROM {table} WHERE "));
    builder.push_filter(&options.filter);
    builder.push_order_by(options);
    builder.push_window(options);
    builder
}

/// Builds the `SELECT COUNT(*)` statement for a count.
#[must_use]
pub fn count_statement(table: &str, filter: &Filter) -> SqlBuilder {
    let mut builder = SqlBuilder::default();
    builder.push(&format!("SELECT COUNT(*) FROM {table} WHERE "));
    builder.push_filter(filter);
    builder
}

// =============================================================================
// Document Table
// =============================================================================

/// Shared JSONB document operations for one table.
#[derive(Debug, Clone)]
struct DocumentTable {
    pool: PgPool,
    table: &'static str,
}

impl DocumentTable {
    const fn new(pool: PgPool, table: &'static str) -> Self {
        Self { pool, table }
    }

    async fn find<T: DeserializeOwned>(&self, options: &FindOptions) -> Result<Vec<T>, RepositoryError> {
        let statement = select_statement(self.table, options);
        let rows: Vec<(Value,)> = statement
            .bind(sqlx::query_as(&statement.sql))
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.into_iter()
            .map(|(data,)| serde_json::from_value(data).map_err(serialization_error))
            .collect()
    }

    async fn count(&self, filter: &Filter) -> Result<u64, RepositoryError> {
        let statement = count_statement(self.table, filter);
        let (count,): (i64,) = statement
            .bind(sqlx::query_as(&statement.sql))
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn find_by_id<T: DeserializeOwned>(&self, id: &Uuid) -> Result<Option<T>, RepositoryError> {
        let row: Option<(Value,)> =
            sqlx::query_as(&format!("SELECT data FROM {} WHERE id = $1", self.table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

        row.map(|(data,)| serde_json::from_value(data))
            .transpose()
            .map_err(serialization_error)
    }

    async fn insert<T: Serialize>(&self, id: &Uuid, document: &T) -> Result<(), RepositoryError> {
        let data = serde_json::to_value(document).map_err(serialization_error)?;
        sqlx::query(&format!(
            "INSERT INTO {} (id, data, created_at) VALUES ($1, $2, NOW())",
            self.table
        ))
        .bind(id)
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;
        Ok(())
    }

    async fn replace<T: Serialize + DeserializeOwned>(
        &self,
        id: &Uuid,
        document: &T,
    ) -> Result<Option<T>, RepositoryError> {
        let data = serde_json::to_value(document).map_err(serialization_error)?;
        let row: Option<(Value,)> = sqlx::query_as(&format!(
            "UPDATE {} SET data = $2 WHERE id = $1 RETURNING data",
            self.table
        ))
        .bind(id)
        .bind(&data)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(|(data,)| serde_json::from_value(data))
            .transpose()
            .map_err(serialization_error)
    }

    async fn delete<T: DeserializeOwned>(&self, id: &Uuid) -> Result<Option<T>, RepositoryError> {
        let row: Option<(Value,)> = sqlx::query_as(&format!(
            "DELETE FROM {} WHERE id = $1 RETURNING data",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(|(data,)| serde_json::from_value(data))
            .transpose()
            .map_err(serialization_error)
    }
}

// =============================================================================
// PostgreSQL Task Repository
// =============================================================================

/// `PostgreSQL` implementation of `TaskRepository`.
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    documents: DocumentTable,
}

impl PostgresTaskRepository {
    /// Creates a new `PostgreSQL` task repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            documents: DocumentTable::new(pool, TASKS_TABLE),
        }
    }
}

impl TaskRepository for PostgresTaskRepository {
    fn find(&self, options: FindOptions) -> RepositoryResult<Vec<Task>> {
        let documents = self.documents.clone();
        async move { documents.find(&options).await }.boxed()
    }

    fn count(&self, filter: Filter) -> RepositoryResult<u64> {
        let documents = self.documents.clone();
        async move { documents.count(&filter).await }.boxed()
    }

    fn find_by_id(&self, id: &TaskId) -> RepositoryResult<Option<Task>> {
        let documents = self.documents.clone();
        let id = *id.as_uuid();
        async move { documents.find_by_id(&id).await }.boxed()
    }

    fn insert(&self, task: &Task) -> RepositoryResult<()> {
        let documents = self.documents.clone();
        let task = task.clone();
        async move { documents.insert(task.id.as_uuid(), &task).await }.boxed()
    }

    fn replace(&self, task: &Task) -> RepositoryResult<Option<Task>> {
        let documents = self.documents.clone();
        let task = task.clone();
        async move { documents.replace(task.id.as_uuid(), &task).await }.boxed()
    }

    fn delete(&self, id: &TaskId) -> RepositoryResult<Option<Task>> {
        let documents = self.documents.clone();
        let id = *id.as_uuid();
        async move { documents.delete(&id).await }.boxed()
    }

    fn unassign_user(&self, user_id: &UserId) -> RepositoryResult<u64> {
        let pool = self.documents.pool.clone();
        let user_id = user_id.to_string();
        async move {
            let result = sqlx::query(
                "UPDATE tasks \
                 SET data = data || jsonb_build_object('assignedUser', '', 'assignedUserName', $2::text) \
                 WHERE data->>'assignedUser' = $1",
            )
            .bind(&user_id)
            .bind(UNASSIGNED_NAME)
            .execute(&pool)
            .await
            .map_err(database_error)?;

            Ok(result.rows_affected())
        }
        .boxed()
    }
}

// =============================================================================
// PostgreSQL User Repository
// =============================================================================

/// `PostgreSQL` implementation of `UserRepository`.
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    documents: DocumentTable,
}

impl PostgresUserRepository {
    /// Creates a new `PostgreSQL` user repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            documents: DocumentTable::new(pool, USERS_TABLE),
        }
    }
}

impl UserRepository for PostgresUserRepository {
    fn find(&self, options: FindOptions) -> RepositoryResult<Vec<User>> {
        let documents = self.documents.clone();
        async move { documents.find(&options).await }.boxed()
    }

    fn count(&self, filter: Filter) -> RepositoryResult<u64> {
        let documents = self.documents.clone();
        async move { documents.count(&filter).await }.boxed()
    }

    fn find_by_id(&self, id: &UserId) -> RepositoryResult<Option<User>> {
        let documents = self.documents.clone();
        let id = *id.as_uuid();
        async move { documents.find_by_id(&id).await }.boxed()
    }

    fn insert(&self, user: &User) -> RepositoryResult<()> {
        let documents = self.documents.clone();
        let user = user.clone();
        async move { documents.insert(user.id.as_uuid(), &user).await }.boxed()
    }

    fn replace(&self, user: &User) -> RepositoryResult<Option<User>> {
        let documents = self.documents.clone();
        let user = user.clone();
        async move { documents.replace(user.id.as_uuid(), &user).await }.boxed()
    }

    fn delete(&self, id: &UserId) -> RepositoryResult<Option<User>> {
        let documents = self.documents.clone();
        let id = *id.as_uuid();
        async move { documents.delete(&id).await }.boxed()
    }

    fn add_pending_task(&self, user_id: &UserId, task_id: &TaskId) -> RepositoryResult<bool> {
        let pool = self.documents.pool.clone();
        let user_id = *user_id.as_uuid();
        let task_id = task_id.to_string();
        async move {
            let result = sqlx::query(
                "UPDATE users \
                 SET data = jsonb_set(data, '{pendingTasks}', \
                     COALESCE(data->'pendingTasks', '[]'::jsonb) || jsonb_build_array($2::text)) \
                 WHERE id = $1 \
                   AND NOT COALESCE(data->'pendingTasks' @> jsonb_build_array($2::text), FALSE)",
            )
            .bind(user_id)
            .bind(&task_id)
            .execute(&pool)
            .await
            .map_err(database_error)?;

            Ok(result.rows_affected() > 0)
        }
        .boxed()
    }

    fn remove_pending_task(
        &self,
        user_id: &UserId,
        task_id: &TaskId,
    ) -> RepositoryResult<bool> {
        let pool = self.documents.pool.clone();
        let user_id = *user_id.as_uuid();
        let task_id = task_id.to_string();
        async move {
            let result = sqlx::query(
                "UPDATE users \
                 SET data = jsonb_set(data, '{pendingTasks}', COALESCE( \
                     (SELECT jsonb_agg(element) \
                      FROM jsonb_array_elements(data->'pendingTasks') AS element \
                      WHERE element <> to_jsonb($2::text)), \
                     '[]'::jsonb)) \
                 WHERE id = $1 \
                   AND data->'pendingTasks' @> jsonb_build_array($2::text)",
            )
            .bind(user_id)
            .bind(&task_id)
            .execute(&pool)
            .await
            .map_err(database_error)?;

            Ok(result.rows_affected() > 0)
        }
        .boxed()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::SortSpec;
    use rstest::rstest;
    use serde_json::json;

    fn path(segments: &[&str]) -> SqlParameter {
        SqlParameter::Path(segments.iter().map(|s| (*s).to_string()).collect())
    }

    #[rstest]
    fn test_empty_filter_selects_everything() {
        let statement = count_statement(TASKS_TABLE, &Filter::all());
        assert_eq!(statement.sql, "SELECT COUNT(*) FROM tasks WHERE TRUE");
        assert!(statement.parameters.is_empty());
    }

    #[rstest]
    fn test_equality_binds_path_and_operand() {
        let statement = count_statement(TASKS_TABLE, &Filter::eq("assignedUser", "u1"));

        assert!(statement.sql.starts_with("SELECT COUNT(*) FROM tasks WHERE COALESCE((data #> $1 = $2"));
        assert_eq!(
            statement.parameters,
            vec![path(&["assignedUser"]), SqlParameter::Json(json!("u1"))]
        );
    }

    #[rstest]
    fn test_null_equality_matches_missing() {
        let statement = count_statement(TASKS_TABLE, &Filter::eq("deadline", Value::Null));
        assert!(statement.sql.contains("data #> $1 IS NULL"));
        assert_eq!(statement.parameters.len(), 1);
    }

    #[rstest]
    fn test_nested_filter_numbering() {
        let filter = Filter::parse(&json!({
            "$or": [{"completed": true}, {"name": {"$in": ["a", "b"]}}],
            "deadline": {"$lt": "2024-01-01T00:00:00.000Z"}
        }))
        .unwrap();

        let statement = count_statement(TASKS_TABLE, &filter);

        assert_eq!(statement.parameters.len(), 8);
        assert!(statement.sql.contains(" OR "));
        assert!(statement.sql.contains("data #> $7 < $8"));
        assert!(!statement.sql.contains("completed"));
    }

    #[rstest]
    fn test_nor_and_nin_are_negated() {
        let filter = Filter::parse(&json!({
            "$nor": [{"completed": true}],
            "_id": {"$nin": []}
        }))
        .unwrap();

        let statement = count_statement(USERS_TABLE, &filter);

        assert!(statement.sql.contains("NOT (COALESCE("));
        assert!(statement.sql.ends_with("NOT FALSE)"));
    }

    #[rstest]
    fn test_exists_condition() {
        let filter = Filter::parse(&json!({"email": {"$exists": false}})).unwrap();
        let statement = count_statement(USERS_TABLE, &filter);
        assert!(statement.sql.ends_with("(data #> $1) IS NULL"));
    }

    #[rstest]
    fn test_select_statement_orders_and_windows() {
        let options = FindOptions::all()
            .with_sort(SortSpec::parse(&json!({"name": 1, "dateCreated": -1})).unwrap())
            .with_skip(20)
            .with_limit(Some(10));

        let statement = select_statement(TASKS_TABLE, &options);

        assert_eq!(
            statement.sql,
            "SELECT data FROM tasks WHERE TRUE ORDER BY data #> $1 ASC NULLS FIRST, \
             data #> $2 DESC NULLS LAST, created_at ASC, id ASC OFFSET $3 LIMIT $4"
        );
        assert_eq!(
            statement.parameters,
            vec![
                path(&["name"]),
                path(&["dateCreated"]),
                SqlParameter::Integer(Some(20)),
                SqlParameter::Integer(Some(10)),
            ]
        );
    }

    #[rstest]
    fn test_unlimited_binds_null_limit() {
        let statement = select_statement(USERS_TABLE, &FindOptions::all());
        assert_eq!(
            statement.parameters.last(),
            Some(&SqlParameter::Integer(None))
        );
    }

    #[rstest]
    fn test_field_names_never_reach_sql_text() {
        let filter = Filter::eq("name'; DROP TABLE tasks; --", "x");
        let statement = count_statement(TASKS_TABLE, &filter);
        assert!(!statement.sql.contains("DROP"));
    }
}
