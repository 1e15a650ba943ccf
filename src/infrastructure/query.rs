//! Constrained query language over stored documents.
//!
//! List endpoints accept JSON `where`, `sort` and `select` parameters. Rather
//! than passing arbitrary JSON to the store, they are parsed into the typed
//! expressions below, which both backends understand:
//!
//! - [`Filter`]: field conditions combined with `$and` / `$or` / `$nor`
//! - [`SortSpec`]: an ordered list of `(field, direction)` keys
//! - [`Projection`]: an inclusion or exclusion list of top-level fields
//!
//! The in-memory backend evaluates these directly against a document's JSON
//! form; the `PostgreSQL` backend translates filters and sorts to JSONB SQL.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Query Error
// =============================================================================

/// Errors raised by well-formed JSON that does not describe a valid query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A `$`-prefixed key that is not part of the language.
    #[error("unknown operator: {0}")]
    UnsupportedOperator(String),

    /// An operator received an operand of the wrong shape.
    #[error("{operator} {reason}")]
    InvalidOperand {
        operator: String,
        reason: &'static str,
    },

    /// A parameter that must be a JSON object was something else.
    #[error("Parameter \"{0}\" must be an object")]
    ExpectedObject(&'static str),

    /// A sort key with a direction other than 1 / -1 / asc / desc.
    #[error("Invalid sort value: {{ {field}: {value} }}")]
    InvalidSortDirection { field: String, value: String },

    /// A projection value other than 0 / 1 / true / false.
    #[error("Invalid projection value for field \"{0}\"")]
    InvalidProjection(String),

    /// A projection mixing inclusion and exclusion of non-`_id` fields.
    #[error("Projection cannot have a mix of inclusion and exclusion")]
    MixedProjection,

    /// A negative `skip`.
    #[error("BadValue: skip value must be non-negative, but received: {0}")]
    NegativeSkip(i64),
}

// =============================================================================
// Filter
// =============================================================================

/// A condition on a single document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

/// A boolean expression over document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All sub-filters match. An empty conjunction matches everything.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// No sub-filter matches.
    Nor(Vec<Filter>),
    /// A condition on the field at a dotted `path`.
    Field { path: String, condition: Condition },
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl Filter {
    /// A filter that matches every document.
    #[must_use]
    pub const fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Equality on a single field.
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field {
            path: path.into(),
            condition: Condition::Eq(value.into()),
        }
    }

    /// Returns `true` if this filter matches every document.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::And(clauses) if clauses.is_empty())
    }

    /// Parses a filter from a JSON object such as
    /// `{"completed": false, "deadline": {"$lt": "2024-01-01T00:00:00.000Z"}}`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if the value is not an object, uses an unknown
    /// operator, or gives an operator a malformed operand.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Object(map) => parse_filter_object(map),
            _ => Err(QueryError::ExpectedObject("filter")),
        }
    }

    /// Evaluates this filter against a document.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::And(clauses) => clauses.iter().all(|clause| clause.matches(document)),
            Self::Or(clauses) => clauses.iter().any(|clause| clause.matches(document)),
            Self::Nor(clauses) => !clauses.iter().any(|clause| clause.matches(document)),
            Self::Field { path, condition } => condition.matches(lookup(document, path)),
        }
    }
}

fn parse_filter_object(map: &Map<String, Value>) -> Result<Filter, QueryError> {
    let mut clauses = Vec::with_capacity(map.len());

    for (key, value) in map {
        let clause = match key.as_str() {
            "$and" => Filter::And(parse_filter_list(key, value)?),
            "$or" => Filter::Or(parse_filter_list(key, value)?),
            "$nor" => Filter::Nor(parse_filter_list(key, value)?),
            operator if operator.starts_with('$') => {
                return Err(QueryError::UnsupportedOperator(operator.to_string()));
            }
            path => parse_field(path, value)?,
        };
        clauses.push(clause);
    }

    if clauses.len() == 1 {
        Ok(clauses.remove(0))
    } else {
        Ok(Filter::And(clauses))
    }
}

fn parse_filter_list(operator: &str, value: &Value) -> Result<Vec<Filter>, QueryError> {
    let Value::Array(items) = value else {
        return Err(QueryError::InvalidOperand {
            operator: operator.to_string(),
            reason: "must be an array",
        });
    };
    if items.is_empty() {
        return Err(QueryError::InvalidOperand {
            operator: operator.to_string(),
            reason: "must be a nonempty array",
        });
    }
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => parse_filter_object(map),
            _ => Err(QueryError::InvalidOperand {
                operator: operator.to_string(),
                reason: "entries must be objects",
            }),
        })
        .collect()
}

fn parse_field(path: &str, value: &Value) -> Result<Filter, QueryError> {
    let operators = match value {
        Value::Object(map) if map.keys().any(|key| key.starts_with('$')) => map,
        _ => return Ok(Filter::eq(path, value.clone())),
    };

    let mut clauses = Vec::with_capacity(operators.len());
    for (operator, operand) in operators {
        let condition = parse_condition(operator, operand)?;
        clauses.push(Filter::Field {
            path: path.to_string(),
            condition,
        });
    }

    if clauses.len() == 1 {
        Ok(clauses.remove(0))
    } else {
        Ok(Filter::And(clauses))
    }
}

fn parse_condition(operator: &str, operand: &Value) -> Result<Condition, QueryError> {
    let condition = match operator {
        "$eq" => Condition::Eq(operand.clone()),
        "$ne" => Condition::Ne(operand.clone()),
        "$gt" => Condition::Gt(operand.clone()),
        "$gte" => Condition::Gte(operand.clone()),
        "$lt" => Condition::Lt(operand.clone()),
        "$lte" => Condition::Lte(operand.clone()),
        "$in" | "$nin" => {
            let Value::Array(values) = operand else {
                return Err(QueryError::InvalidOperand {
                    operator: operator.to_string(),
                    reason: "needs an array",
                });
            };
            if operator == "$in" {
                Condition::In(values.clone())
            } else {
                Condition::Nin(values.clone())
            }
        }
        "$exists" => Condition::Exists(is_truthy(operand)),
        // A `$` key next to plain keys, or any other operator.
        _ => return Err(QueryError::UnsupportedOperator(operator.to_string())),
    };
    Ok(condition)
}

impl Condition {
    /// Evaluates the condition against a field value (`None` when missing).
    #[must_use]
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => equality_matches(field, expected),
            Self::Ne(expected) => !equality_matches(field, expected),
            Self::Gt(bound) => ordering_matches(field, bound, Ordering::is_gt),
            Self::Gte(bound) => ordering_matches(field, bound, Ordering::is_ge),
            Self::Lt(bound) => ordering_matches(field, bound, Ordering::is_lt),
            Self::Lte(bound) => ordering_matches(field, bound, Ordering::is_le),
            Self::In(candidates) => candidates
                .iter()
                .any(|candidate| equality_matches(field, candidate)),
            Self::Nin(candidates) => !candidates
                .iter()
                .any(|candidate| equality_matches(field, candidate)),
            Self::Exists(expected) => field.is_some() == *expected,
        }
    }
}

/// Equality with array membership: `{"pendingTasks": "abc"}` matches a
/// document whose `pendingTasks` contains `"abc"`. `null` also matches a
/// missing field.
fn equality_matches(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| json_equal(item, expected))
        }
        Some(actual) => json_equal(actual, expected),
    }
}

/// Ordering comparisons only match values of the same JSON type.
fn ordering_matches(field: Option<&Value>, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    field
        .and_then(|actual| compare_same_type(actual, bound))
        .is_some_and(accept)
}

fn json_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => left == right,
    }
}

fn compare_same_type(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

/// Resolves a dotted path inside a document.
#[must_use]
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

/// Splits a dotted path into its segments.
#[must_use]
pub fn path_segments(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// =============================================================================
// Sort
// =============================================================================

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Ordered sort keys. Earlier keys take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub keys: Vec<(String, SortDirection)>,
}

impl SortSpec {
    /// Parses `{"field": 1, "other": -1}` (or `"asc"` / `"desc"`).
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for non-object input or unknown directions.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(QueryError::ExpectedObject("sort"));
        };

        let keys = map
            .iter()
            .map(|(field, direction)| {
                parse_direction(direction)
                    .map(|direction| (field.clone(), direction))
                    .ok_or_else(|| QueryError::InvalidSortDirection {
                        field: field.clone(),
                        value: direction.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { keys })
    }

    /// Returns `true` if there are no sort keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares two documents by the sort keys.
    #[must_use]
    pub fn compare(&self, left: &Value, right: &Value) -> Ordering {
        self.keys
            .iter()
            .map(|(path, direction)| {
                let ordering = total_order(lookup(left, path), lookup(right, path));
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

fn parse_direction(value: &Value) -> Option<SortDirection> {
    match value {
        Value::Number(number) => match number.as_f64() {
            Some(n) if (n - 1.0).abs() < f64::EPSILON => Some(SortDirection::Ascending),
            Some(n) if (n + 1.0).abs() < f64::EPSILON => Some(SortDirection::Descending),
            _ => None,
        },
        Value::String(text) => match text.to_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(SortDirection::Ascending),
            "desc" | "descending" | "-1" => Some(SortDirection::Descending),
            _ => None,
        },
        _ => None,
    }
}

/// Orders values across types: missing/null, numbers, strings, objects,
/// arrays, booleans.
fn total_order(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    const fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    rank(left).cmp(&rank(right)).then_with(|| match (left, right) {
        (Some(left), Some(right)) => compare_same_type(left, right)
            .unwrap_or_else(|| left.to_string().cmp(&right.to_string())),
        _ => Ordering::Equal,
    })
}

// =============================================================================
// Projection
// =============================================================================

/// A field projection applied to response documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only `fields`, plus `_id` when `include_id` is set.
    Include {
        fields: Vec<String>,
        include_id: bool,
    },
    /// Drop `fields`.
    Exclude { fields: Vec<String> },
}

const ID_FIELD: &str = "_id";

impl Projection {
    /// Parses `{"name": 1, "_id": 0}` or the string form `"name -_id"`.
    ///
    /// Returns `Ok(None)` for an empty projection.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for non-flag values or mixed inclusion and
    /// exclusion.
    pub fn parse(value: &Value) -> Result<Option<Self>, QueryError> {
        let flags: Vec<(String, bool)> = match value {
            Value::Object(map) => map
                .iter()
                .map(|(field, flag)| {
                    projection_flag(flag)
                        .map(|include| (field.clone(), include))
                        .ok_or_else(|| QueryError::InvalidProjection(field.clone()))
                })
                .collect::<Result<_, _>>()?,
            Value::String(text) => text
                .split_whitespace()
                .map(|token| match token.strip_prefix('-') {
                    Some(field) => (field.to_string(), false),
                    None => (token.trim_start_matches('+').to_string(), true),
                })
                .collect(),
            _ => return Err(QueryError::ExpectedObject("select")),
        };

        Self::from_flags(flags)
    }

    fn from_flags(flags: Vec<(String, bool)>) -> Result<Option<Self>, QueryError> {
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut include_id = true;

        for (field, include) in flags {
            if field == ID_FIELD {
                include_id = include;
                if !include {
                    excluded.push(field);
                }
            } else if include {
                included.push(field);
            } else {
                excluded.push(field);
            }
        }

        let excludes_other_fields = excluded.iter().any(|field| field != ID_FIELD);
        match (included.is_empty(), excluded.is_empty()) {
            (false, _) if excludes_other_fields => Err(QueryError::MixedProjection),
            (false, _) => Ok(Some(Self::Include {
                fields: included,
                include_id,
            })),
            (true, false) => Ok(Some(Self::Exclude { fields: excluded })),
            (true, true) => Ok(None),
        }
    }

    /// Applies the projection to a document. Non-object values pass through.
    #[must_use]
    pub fn apply(&self, document: Value) -> Value {
        let Value::Object(map) = document else {
            return document;
        };

        let projected: Map<String, Value> = match self {
            Self::Include { fields, include_id } => map
                .into_iter()
                .filter(|(key, _)| {
                    (key == ID_FIELD && *include_id) || fields.iter().any(|field| field == key)
                })
                .collect(),
            Self::Exclude { fields } => map
                .into_iter()
                .filter(|(key, _)| !fields.iter().any(|field| field == key))
                .collect(),
        };

        Value::Object(projected)
    }
}

fn projection_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        _ => None,
    }
}

// =============================================================================
// Find Options
// =============================================================================

/// Everything a `find` needs besides the projection, which is applied to
/// the serialized results by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindOptions {
    pub filter: Filter,
    pub sort: Option<SortSpec>,
    pub skip: u64,
    /// `None` means unlimited.
    pub limit: Option<u64>,
}

impl FindOptions {
    /// Options that return every document in natural order.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the sort specification.
    #[must_use]
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the number of documents to skip.
    #[must_use]
    pub const fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of documents to return.
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Runs filter, sort, skip and limit over `(document, entity)` pairs.
    ///
    /// Used by stores that hold their data in process.
    #[must_use]
    pub fn execute<T>(&self, mut rows: Vec<(Value, T)>) -> Vec<T> {
        rows.retain(|(document, _)| self.filter.matches(document));
        if let Some(sort) = self.sort.as_ref().filter(|sort| !sort.is_empty()) {
            rows.sort_by(|(left, _), (right, _)| sort.compare(left, right));
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = self
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        rows.into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, entity)| entity)
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
