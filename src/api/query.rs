//! List query-string parsing.
//!
//! `where`, `sort` and `select` arrive as JSON text. Text that is not JSON,
//! or JSON that is falsy (`null`, `false`, `0`, `""`), is treated as if the
//! parameter were absent. `skip` and `limit` take the leading integer of the
//! text, if any. A key given more than once keeps its first value.

use serde_json::Value;

use crate::infrastructure::{Filter, FindOptions, Projection, QueryError, SortSpec};

/// Raw query parameters of `GET /tasks` and `GET /users`.
///
/// Built from the decoded key/value pairs of the query string; unknown keys
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub select: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub count: Option<String>,
}

/// Query parameters accepted by the single-document `GET` routes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub select: Option<String>,
}

impl FromIterator<(String, String)> for ListQuery {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "where" => &mut query.filter,
                "sort" => &mut query.sort,
                "select" => &mut query.select,
                "skip" => &mut query.skip,
                "limit" => &mut query.limit,
                "count" => &mut query.count,
                _ => continue,
            };
            slot.get_or_insert(value);
        }
        query
    }
}

impl FromIterator<(String, String)> for SelectQuery {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        Self {
            select: pairs
                .into_iter()
                .find_map(|(key, value)| (key == "select").then_some(value)),
        }
    }
}

/// A parsed list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub options: FindOptions,
    pub projection: Option<Projection>,
    /// Return the number of matches instead of the documents.
    pub count: bool,
}

impl ListQuery {
    /// Parses the parameters. `default_limit` applies when `limit` is absent.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for well-formed JSON that is not a valid
    /// filter, sort or projection, and for a negative `skip`.
    pub fn parse(&self, default_limit: Option<u64>) -> Result<ListRequest, QueryError> {
        let filter = json_parameter(self.filter.as_deref())
            .map(|value| match value {
                Value::Object(_) => Filter::parse(&value),
                _ => Err(QueryError::ExpectedObject("where")),
            })
            .transpose()?
            .unwrap_or_default();

        let sort = json_parameter(self.sort.as_deref())
            .map(|value| SortSpec::parse(&value))
            .transpose()?;

        let projection = parse_select(self.select.as_deref())?;

        let skip = match integer_parameter(self.skip.as_deref()) {
            Some(skip) if skip < 0 => return Err(QueryError::NegativeSkip(skip)),
            Some(skip) => skip.unsigned_abs(),
            None => 0,
        };

        let limit = match integer_parameter(self.limit.as_deref()) {
            Some(0) => None,
            Some(limit) => Some(limit.unsigned_abs()),
            None => default_limit,
        };

        let mut options = FindOptions::all()
            .with_filter(filter)
            .with_skip(skip)
            .with_limit(limit);
        if let Some(sort) = sort {
            options = options.with_sort(sort);
        }

        Ok(ListRequest {
            options,
            projection,
            count: self
                .count
                .as_deref()
                .is_some_and(|count| count.trim().eq_ignore_ascii_case("true")),
        })
    }
}

impl SelectQuery {
    /// Parses `select`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for an invalid projection.
    pub fn parse(&self) -> Result<Option<Projection>, QueryError> {
        parse_select(self.select.as_deref())
    }
}

fn parse_select(raw: Option<&str>) -> Result<Option<Projection>, QueryError> {
    json_parameter(raw).map_or(Ok(None), |value| Projection::parse(&value))
}

/// Parses a JSON parameter, discarding malformed or falsy values.
fn json_parameter(raw: Option<&str>) -> Option<Value> {
    let value: Value = serde_json::from_str(raw?).ok()?;
    let falsy = match &value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    };
    (!falsy).then_some(value)
}

/// Reads the leading integer of `raw`: optional whitespace and sign, then
/// digits. Anything after the digits is ignored; no digits means absent.
fn integer_parameter(raw: Option<&str>) -> Option<i64> {
    let text = raw?.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let digits_end = rest
        .find(|character: char| !character.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..digits_end];
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn query(pairs: &[(&str, &str)]) -> ListQuery {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some("10"), Some(10))]
    #[case(Some("  7abc"), Some(7))]
    #[case(Some("-3"), Some(-3))]
    #[case(Some("+4"), Some(4))]
    #[case(Some("2.9"), Some(2))]
    #[case(Some("abc"), None)]
    #[case(Some(""), None)]
    #[case(Some("-"), None)]
    fn test_integer_parameter(#[case] raw: Option<&str>, #[case] expected: Option<i64>) {
        assert_eq!(integer_parameter(raw), expected);
    }

    #[rstest]
    #[case("{\"completed\":", None)]
    #[case("null", None)]
    #[case("false", None)]
    #[case("0", None)]
    #[case("\"\"", None)]
    #[case("{}", Some(json!({})))]
    #[case("\"name\"", Some(json!("name")))]
    fn test_json_parameter(#[case] raw: &str, #[case] expected: Option<Value>) {
        assert_eq!(json_parameter(Some(raw)), expected);
    }

    #[rstest]
    fn test_defaults() {
        let request = ListQuery::default().parse(Some(100)).unwrap();
        assert!(request.options.filter.is_all());
        assert_eq!(request.options.sort, None);
        assert_eq!(request.options.skip, 0);
        assert_eq!(request.options.limit, Some(100));
        assert_eq!(request.projection, None);
        assert!(!request.count);
    }

    #[rstest]
    #[case("0", None)]
    #[case("5", Some(5))]
    #[case("-5", Some(5))]
    #[case("junk", Some(100))]
    fn test_limit(#[case] limit: &str, #[case] expected: Option<u64>) {
        let request = query(&[("limit", limit)]).parse(Some(100)).unwrap();
        assert_eq!(request.options.limit, expected);
    }

    #[rstest]
    fn test_negative_skip_is_rejected() {
        let error = query(&[("skip", "-1")]).parse(None).unwrap_err();
        assert_eq!(error, QueryError::NegativeSkip(-1));
    }

    #[rstest]
    fn test_malformed_where_is_ignored() {
        let request = query(&[("where", "{not json")]).parse(None).unwrap();
        assert!(request.options.filter.is_all());
    }

    #[rstest]
    #[case("[1]")]
    #[case("\"completed\"")]
    #[case("{\"name\": {\"$regex\": \"a\"}}")]
    fn test_invalid_where_is_rejected(#[case] raw: &str) {
        assert!(query(&[("where", raw)]).parse(None).is_err());
    }

    #[rstest]
    fn test_full_query() {
        let request = query(&[
            ("where", r#"{"completed": false}"#),
            ("sort", r#"{"name": -1}"#),
            ("select", r#"{"name": 1}"#),
            ("skip", "2"),
            ("limit", "3"),
            ("count", "TRUE"),
        ])
        .parse(None)
        .unwrap();

        assert_eq!(request.options.filter, Filter::parse(&json!({"completed": false})).unwrap());
        assert_eq!(request.options.sort, Some(SortSpec::parse(&json!({"name": -1})).unwrap()));
        assert_eq!(request.options.skip, 2);
        assert_eq!(request.options.limit, Some(3));
        assert!(request.projection.is_some());
        assert!(request.count);
    }

    #[rstest]
    #[case("true", true)]
    #[case("false", false)]
    #[case("1", false)]
    fn test_count_flag(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(query(&[("count", raw)]).parse(None).unwrap().count, expected);
    }

    #[rstest]
    fn test_repeated_keys_keep_first_value() {
        let parsed = query(&[
            ("skip", "1"),
            ("skip", "2"),
            ("count", "true"),
            ("count", "false"),
            ("page", "9"),
        ]);

        assert_eq!(parsed.skip.as_deref(), Some("1"));
        assert_eq!(parsed.count.as_deref(), Some("true"));
        assert_eq!(parsed.parse(None).unwrap().options.skip, 1);
    }

    #[rstest]
    fn test_select_query_from_pairs() {
        let select: SelectQuery = [
            ("limit".to_string(), "1".to_string()),
            ("select".to_string(), "\"name\"".to_string()),
            ("select".to_string(), "\"email\"".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(select.select.as_deref(), Some("\"name\""));
    }

    #[rstest]
    fn test_select_query_string_form() {
        let select = SelectQuery {
            select: Some("\"name -_id\"".to_string()),
        };
        assert_eq!(
            select.parse().unwrap(),
            Some(Projection::Include {
                fields: vec!["name".to_string()],
                include_id: false,
            })
        );
    }
}
