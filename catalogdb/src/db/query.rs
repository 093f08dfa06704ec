//! Dynamic query construction.
//!
//! Two independent steps, both pure string transforms that never touch the database:
//!
//! - [`expand`] / [`expand_in`] turn a dialect-neutral template using `?` markers into one
//!   whose list arguments are spelled out (`IN (?)` becomes `IN (?, ?, ?)`), flattening the
//!   arguments in marker order.
//! - [`rebind`] rewrites `?` markers into the target engine's placeholder style.
//!
//! Keeping them apart lets the same filter-building code run against every engine by
//! swapping only the rebind step:
//!
//! ```
//! use catalogdb::db::query::{Dialect, expand_in, rebind};
//!
//! let (sql, args) = expand_in("DELETE FROM t WHERE id IN (?)", [7, 9]).unwrap();
//! let sql = rebind(Dialect::Dollar, &sql, args.len());
//! assert_eq!(sql, "DELETE FROM t WHERE id IN ($1, $2)");
//! ```
//!
//! Named parameters (`:name`) are compiled by [`compile_named`] and bound from any
//! `Serialize` value by [`bind_named`]. Quoted literals and comments are skipped by every
//! scanner here.

use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::Range;

use crate::db::errors::{DbError, Result};

/// A single positional argument
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Scalar from a JSON value; arrays and objects bind as their JSON text
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if n.is_u64() {
                    return Err(DbError::invalid_argument(format!("integer {n} does not fit in a signed 64-bit column")));
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
        })
    }
}

macro_rules! sql_value_from {
    ($variant:ident <- $($ty:ty),+) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v.into())
                }
            }
        )+
    };
}

sql_value_from!(Int <- i8, i16, i32, i64, u8, u16, u32);
sql_value_from!(Float <- f32, f64);
sql_value_from!(Bool <- bool);
sql_value_from!(Text <- String, &str);
sql_value_from!(Bytes <- Vec<u8>, &[u8]);

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One argument for [`expand`]: a scalar, or a list that fills an `IN (?)` slot
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(SqlValue),
    List(Vec<SqlValue>),
}

impl Param {
    pub fn value(v: impl Into<SqlValue>) -> Self {
        Param::Value(v.into())
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Param::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<SqlValue> for Param {
    fn from(v: SqlValue) -> Self {
        Param::Value(v)
    }
}

/// Placeholder style of a database engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `?` (SQLite, MySQL)
    Question,
    /// `$1, $2, ...` (Postgres and wire-compatible engines)
    Dollar,
    /// `:arg1, :arg2, ...` (Oracle)
    Named,
    /// `@p1, @p2, ...` (SQL Server)
    At,
}

impl Dialect {
    /// Placeholder style for a driver name, `None` when unknown
    pub fn for_driver(driver: &str) -> Option<Self> {
        match driver.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgx" | "pq-timeouts" | "cloudsqlpostgres" | "cockroach" | "nrpostgres" => {
                Some(Dialect::Dollar)
            }
            "mysql" | "mariadb" | "sqlite" | "sqlite3" | "nrmysql" | "nrsqlite3" => Some(Dialect::Question),
            "oracle" | "oci8" | "ora" | "goracle" | "godror" => Some(Dialect::Named),
            "sqlserver" | "mssql" | "azuresql" => Some(Dialect::At),
            _ => None,
        }
    }

    /// The `n`th (one-based) placeholder
    pub fn marker(self, n: usize) -> String {
        match self {
            Dialect::Question => "?".to_string(),
            Dialect::Dollar => format!("${n}"),
            Dialect::Named => format!(":arg{n}"),
            Dialect::At => format!("@p{n}"),
        }
    }
}

/// Byte ranges of `sql` outside quoted literals, quoted identifiers, dollar-quoted bodies
/// and comments. Only these ranges are scanned for placeholders.
fn code_spans(sql: &str) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let find = |from: usize, needle: &[u8]| find_bytes(bytes, from, needle);

    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < len {
        let skip_to = match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => Some(find(i + 1, &[q][..]).map_or(len, |end| end + 1)),
            b'-' if bytes.get(i + 1) == Some(&b'-') => Some(find(i + 2, &b"\n"[..]).map_or(len, |end| end + 1)),
            b'/' if bytes.get(i + 1) == Some(&b'*') => Some(find(i + 2, &b"*/"[..]).map_or(len, |end| end + 2)),
            b'$' => dollar_tag(bytes, i).map(|tag| find(i + tag.len(), tag).map_or(len, |end| end + tag.len())),
            _ => None,
        };
        match skip_to {
            Some(end) => {
                if start < i {
                    spans.push(start..i);
                }
                i = end;
                start = end;
            }
            None => i += 1,
        }
    }
    if start < len {
        spans.push(start..len);
    }
    spans
}

fn find_bytes(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)
        .and_then(|rest| rest.windows(needle.len()).position(|window| window == needle))
        .map(|offset| from + offset)
}

/// `$$` or `$tag$` opening a dollar-quoted body at `at`; `$1` is a placeholder, not a tag
fn dollar_tag(bytes: &[u8], at: usize) -> Option<&[u8]> {
    let first = *bytes.get(at + 1)?;
    if first.is_ascii_digit() {
        return None;
    }
    let mut end = at + 1;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    (bytes.get(end) == Some(&b'$')).then(|| &bytes[at..=end])
}

/// Byte offsets of `?` markers outside quotes and comments
fn markers(sql: &str) -> Vec<usize> {
    code_spans(sql)
        .into_iter()
        .flat_map(|span| {
            sql[span.clone()]
                .match_indices('?')
                .map(move |(offset, _)| span.start + offset)
        })
        .collect()
}

/// Expand every list param into as many markers as it has values.
///
/// Each `?` in `sql` consumes one param, in order. A count mismatch, an empty list or a
/// null inside a list is an invalid-argument error: a query built from zero values is
/// caller error, not a zero-match query.
pub fn expand(sql: &str, params: Vec<Param>) -> Result<(String, Vec<SqlValue>)> {
    let positions = markers(sql);
    if positions.len() != params.len() {
        return Err(DbError::invalid_argument(format!(
            "query has {} placeholders but {} arguments were supplied",
            positions.len(),
            params.len()
        )));
    }

    let mut expanded = String::with_capacity(sql.len());
    let mut args = Vec::with_capacity(params.len());
    let mut last = 0;

    for (position, param) in positions.into_iter().zip(params) {
        expanded.push_str(&sql[last..position]);
        match param {
            Param::Value(value) => {
                expanded.push('?');
                args.push(value);
            }
            Param::List(values) => {
                if values.is_empty() {
                    return Err(DbError::invalid_argument("empty list passed for an IN (?) placeholder"));
                }
                if values.iter().any(SqlValue::is_null) {
                    return Err(DbError::invalid_argument("null value in list passed for an IN (?) placeholder"));
                }
                expanded.push_str(&vec!["?"; values.len()].join(", "));
                args.extend(values);
            }
        }
        last = position + 1;
    }
    expanded.push_str(&sql[last..]);

    Ok((expanded, args))
}

/// Expand the single `IN (?)` placeholder of `sql` with `values`
pub fn expand_in<I, V>(sql: &str, values: I) -> Result<(String, Vec<SqlValue>)>
where
    I: IntoIterator<Item = V>,
    V: Into<SqlValue>,
{
    expand(sql, vec![Param::list(values)])
}

/// Rewrite the first `count` `?` markers into `dialect`'s placeholders.
///
/// `count` is expected to match the number of markers; it is not validated, and a
/// mismatch leaves the query malformed. Queries already in the target style contain no
/// `?` markers, so rebinding twice is a no-op.
pub fn rebind(dialect: Dialect, sql: &str, count: usize) -> String {
    if dialect == Dialect::Question {
        return sql.to_string();
    }

    let mut rebound = String::with_capacity(sql.len() + count * 3);
    let mut last = 0;
    for (n, position) in markers(sql).into_iter().take(count).enumerate() {
        rebound.push_str(&sql[last..position]);
        rebound.push_str(&dialect.marker(n + 1));
        last = position + 1;
    }
    rebound.push_str(&sql[last..]);
    rebound
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.'
}

/// Replace `:name` references with `dialect` placeholders, returning the names in order.
///
/// `::` (Postgres casts), quoted literals and comments pass through untouched. A name used
/// twice produces two placeholders.
pub fn compile_named(dialect: Dialect, sql: &str) -> (String, Vec<String>) {
    let mut compiled = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let mut last = 0;

    for span in code_spans(sql) {
        compiled.push_str(&sql[last..span.start]);
        let code = &sql[span.clone()];
        let mut chars = code.char_indices().peekable();

        while let Some((idx, ch)) = chars.next() {
            if ch != ':' {
                compiled.push(ch);
                continue;
            }
            match chars.peek() {
                Some(&(_, ':')) => {
                    chars.next();
                    compiled.push_str("::");
                }
                Some(&(_, next)) if next.is_alphanumeric() || next == '_' => {
                    let start = idx + 1;
                    let mut end = start;
                    while let Some(&(i, c)) = chars.peek() {
                        if !is_name_char(c) {
                            break;
                        }
                        end = i + c.len_utf8();
                        chars.next();
                    }
                    names.push(code[start..end].to_string());
                    compiled.push_str(&dialect.marker(names.len()));
                }
                _ => compiled.push(':'),
            }
        }
        last = span.end;
    }
    compiled.push_str(&sql[last..]);

    (compiled, names)
}

/// Replace every `$n` placeholder bound to a null with a literal `NULL` and renumber the
/// rest, dropping the nulls from `args`. Returns `None` when no argument is null.
///
/// Postgres infers the type of a `NULL` literal from where it is used, while a bound null
/// must carry a concrete type that may not match its column.
pub fn inline_nulls(sql: &str, args: &[SqlValue]) -> Option<(String, Vec<SqlValue>)> {
    if !args.iter().any(SqlValue::is_null) {
        return None;
    }

    let mut renumbered = Vec::with_capacity(args.len());
    let mut next = 0;
    for arg in args {
        if arg.is_null() {
            renumbered.push(None);
        } else {
            next += 1;
            renumbered.push(Some(next));
        }
    }

    let bytes = sql.as_bytes();
    let mut rewritten = String::with_capacity(sql.len());
    let mut last = 0;
    for span in code_spans(sql) {
        let mut i = span.start;
        while i < span.end {
            if bytes[i] != b'$' {
                i += 1;
                continue;
            }
            let digits_end = (i + 1..span.end).find(|&j| !bytes[j].is_ascii_digit()).unwrap_or(span.end);
            let slot = sql[i + 1..digits_end]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| renumbered.get(index));
            if let Some(slot) = slot {
                rewritten.push_str(&sql[last..i]);
                match slot {
                    Some(n) => rewritten.push_str(&format!("${n}")),
                    None => rewritten.push_str("NULL"),
                }
                last = digits_end;
            }
            i = digits_end.max(i + 1);
        }
    }
    rewritten.push_str(&sql[last..]);

    let values = args.iter().filter(|arg| !arg.is_null()).cloned().collect();
    Some((rewritten, values))
}

fn lookup<'v>(fields: &'v Map<String, Value>, name: &str) -> Option<&'v Value> {
    let mut segments = name.split('.');
    let first = fields.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| value.get(segment))
}

/// Compile `sql`'s named references and pull their values out of `arg`.
///
/// `arg` must serialize to a map (a struct or a map type). Dotted names walk nested
/// fields. A reference with no matching field is an invalid-argument error.
pub fn bind_named<A>(dialect: Dialect, sql: &str, arg: &A) -> Result<(String, Vec<SqlValue>)>
where
    A: Serialize + ?Sized,
{
    let (compiled, names) = compile_named(dialect, sql);

    let value = serde_json::to_value(arg)
        .map_err(|e| DbError::invalid_argument(format!("named argument could not be serialized: {e}")))?;
    let Value::Object(fields) = value else {
        return Err(DbError::invalid_argument("named argument must serialize to a map or struct"));
    };

    let args = names
        .iter()
        .map(|name| {
            lookup(&fields, name)
                .ok_or_else(|| DbError::invalid_argument(format!("could not find name '{name}' in named argument")))
                .and_then(SqlValue::from_json)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((compiled, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_expand_in_spells_out_markers() {
        let (sql, args) = expand_in("SELECT * FROM tags WHERE id IN (?) ORDER BY id", [1, 2, 3]).unwrap();

        assert_eq!(sql, "SELECT * FROM tags WHERE id IN (?, ?, ?) ORDER BY id");
        assert_eq!(args, vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]);
    }

    #[test]
    fn test_expand_in_then_rebind_for_dollar_dialect() {
        let (sql, args) = expand_in("DELETE FROM t WHERE id IN (?)", [7, 9]).unwrap();
        let sql = rebind(Dialect::Dollar, &sql, args.len());

        assert_eq!(sql, "DELETE FROM t WHERE id IN ($1, $2)");
        assert_eq!(args, vec![SqlValue::Int(7), SqlValue::Int(9)]);
    }

    #[test]
    fn test_expand_in_rejects_empty_and_null() {
        let err = expand_in("SELECT 1 WHERE id IN (?)", Vec::<i64>::new()).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));

        let err = expand_in("SELECT 1 WHERE id IN (?)", [None::<i64>]).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));

        let err = expand_in("SELECT 1 WHERE id IN (?)", [Some(1), None]).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));
    }

    #[test]
    fn test_expand_mixes_scalars_and_lists() {
        let (sql, args) = expand(
            "SELECT * FROM entries WHERE owner = ? AND tag IN (?) AND color IN (?)",
            vec![Param::value("alice"), Param::list(["red", "blue"]), Param::list([3])],
        )
        .unwrap();

        assert_eq!(
            sql,
            "SELECT * FROM entries WHERE owner = ? AND tag IN (?, ?) AND color IN (?)"
        );
        assert_eq!(
            args,
            vec![
                SqlValue::Text("alice".to_string()),
                SqlValue::Text("red".to_string()),
                SqlValue::Text("blue".to_string()),
                SqlValue::Int(3),
            ]
        );
    }

    #[test]
    fn test_expand_allows_null_scalars() {
        let (sql, args) = expand("UPDATE entries SET color = ? WHERE id IN (?)", vec![Param::value(None::<String>), Param::list([1])]).unwrap();
        assert_eq!(sql, "UPDATE entries SET color = ? WHERE id IN (?)");
        assert_eq!(args, vec![SqlValue::Null, SqlValue::Int(1)]);
    }

    #[test]
    fn test_expand_rejects_marker_count_mismatch() {
        let err = expand("SELECT * FROM t WHERE a = ? AND b IN (?)", vec![Param::list([1, 2])]).unwrap_err();
        assert!(err.to_string().contains("2 placeholders but 1 arguments"));
    }

    #[test]
    fn test_markers_inside_literals_are_ignored() {
        let (sql, args) = expand_in("SELECT '?' AS q, \"odd?\" FROM t WHERE id IN (?)", [5]).unwrap();
        assert_eq!(sql, "SELECT '?' AS q, \"odd?\" FROM t WHERE id IN (?)");
        assert_eq!(args, vec![SqlValue::Int(5)]);

        let rebound = rebind(Dialect::Dollar, "SELECT 'it''s ?' WHERE a = ? AND b = ?", 2);
        assert_eq!(rebound, "SELECT 'it''s ?' WHERE a = $1 AND b = $2");
    }

    #[test]
    fn test_markers_inside_comments_are_ignored() {
        let sql = "SELECT id FROM entries -- owner = ?\nWHERE id IN (?) /* rank > ? */ AND rank > ?";
        let (expanded, args) = expand(sql, vec![Param::list([1, 2]), Param::value(3)]).unwrap();
        assert_eq!(
            expanded,
            "SELECT id FROM entries -- owner = ?\nWHERE id IN (?, ?) /* rank > ? */ AND rank > ?"
        );
        assert_eq!(args, vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]);

        let rebound = rebind(Dialect::Dollar, &expanded, args.len());
        assert_eq!(
            rebound,
            "SELECT id FROM entries -- owner = ?\nWHERE id IN ($1, $2) /* rank > ? */ AND rank > $3"
        );

        assert_eq!(rebind(Dialect::Dollar, "SELECT 1 -- trailing ?", 0), "SELECT 1 -- trailing ?");
        assert_eq!(rebind(Dialect::Dollar, "SELECT ? /* unterminated ?", 1), "SELECT $1 /* unterminated ?");
    }

    #[test]
    fn test_markers_inside_dollar_quotes_are_ignored() {
        let sql = "SELECT $$what?$$, $tag$ ? $tag$ WHERE a = ?";
        assert_eq!(rebind(Dialect::Dollar, sql, 1), "SELECT $$what?$$, $tag$ ? $tag$ WHERE a = $1");
    }

    #[test]
    fn test_inline_nulls_renumbers_remaining_placeholders() {
        assert_eq!(inline_nulls("UPDATE t SET a = $1", &[SqlValue::Int(1)]), None);

        let (sql, args) = inline_nulls(
            "INSERT INTO t (a, b, c) VALUES ($1, $2, $3) RETURNING '$2' -- $2",
            &[SqlValue::Int(1), SqlValue::Null, SqlValue::Text("c".to_string())],
        )
        .unwrap();
        assert_eq!(sql, "INSERT INTO t (a, b, c) VALUES ($1, NULL, $2) RETURNING '$2' -- $2");
        assert_eq!(args, vec![SqlValue::Int(1), SqlValue::Text("c".to_string())]);

        let (sql, args) = inline_nulls("SELECT $1::bigint, $1, $12", &[SqlValue::Null]).unwrap();
        assert_eq!(sql, "SELECT NULL::bigint, NULL, $12");
        assert!(args.is_empty());
    }

    #[test]
    fn test_rebind_styles() {
        let sql = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert_eq!(rebind(Dialect::Question, sql, 2), sql);
        assert_eq!(rebind(Dialect::Dollar, sql, 2), "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(rebind(Dialect::Named, sql, 2), "SELECT * FROM t WHERE a = :arg1 AND b = :arg2");
        assert_eq!(rebind(Dialect::At, sql, 2), "SELECT * FROM t WHERE a = @p1 AND b = @p2");
    }

    #[test]
    fn test_rebind_is_stable_on_rebound_queries() {
        let sql = "UPDATE t SET a = ? WHERE id IN (?, ?)";
        for dialect in [Dialect::Question, Dialect::Dollar, Dialect::Named, Dialect::At] {
            let once = rebind(dialect, sql, 3);
            assert_eq!(rebind(dialect, &once, 3), once, "{dialect:?}");
        }
    }

    #[test]
    fn test_rebind_only_touches_count_markers() {
        assert_eq!(rebind(Dialect::Dollar, "a = ? AND b = ?", 1), "a = $1 AND b = ?");
    }

    #[test]
    fn test_dialect_for_driver() {
        assert_eq!(Dialect::for_driver("postgres"), Some(Dialect::Dollar));
        assert_eq!(Dialect::for_driver("PGX"), Some(Dialect::Dollar));
        assert_eq!(Dialect::for_driver("sqlite3"), Some(Dialect::Question));
        assert_eq!(Dialect::for_driver("mysql"), Some(Dialect::Question));
        assert_eq!(Dialect::for_driver("godror"), Some(Dialect::Named));
        assert_eq!(Dialect::for_driver("sqlserver"), Some(Dialect::At));
        assert_eq!(Dialect::for_driver("dbase"), None);
    }

    #[test]
    fn test_compile_named() {
        let (sql, names) = compile_named(
            Dialect::Dollar,
            "INSERT INTO styles (name, color) VALUES (:name, :color) RETURNING id, created_at::text",
        );
        assert_eq!(
            sql,
            "INSERT INTO styles (name, color) VALUES ($1, $2) RETURNING id, created_at::text"
        );
        assert_eq!(names, vec!["name", "color"]);

        let (sql, names) = compile_named(Dialect::Question, "SELECT ':skip' WHERE a = :a OR b = :a");
        assert_eq!(sql, "SELECT ':skip' WHERE a = ? OR b = ?");
        assert_eq!(names, vec!["a", "a"]);

        let (sql, names) = compile_named(
            Dialect::Dollar,
            "UPDATE t SET a = :a -- was :old\n/* :gone */ WHERE id = :id",
        );
        assert_eq!(sql, "UPDATE t SET a = $1 -- was :old\n/* :gone */ WHERE id = $2");
        assert_eq!(names, vec!["a", "id"]);
    }

    #[derive(Serialize)]
    struct Style {
        name: String,
        color: Option<String>,
        weight: i32,
        owner: Owner,
    }

    #[derive(Serialize)]
    struct Owner {
        id: i64,
    }

    #[test]
    fn test_bind_named_from_struct() {
        let style = Style {
            name: "bold".to_string(),
            color: None,
            weight: 700,
            owner: Owner { id: 12 },
        };

        let (sql, args) = bind_named(
            Dialect::Dollar,
            "INSERT INTO styles (name, color, weight, owner_id) VALUES (:name, :color, :weight, :owner.id)",
            &style,
        )
        .unwrap();

        assert_eq!(
            sql,
            "INSERT INTO styles (name, color, weight, owner_id) VALUES ($1, $2, $3, $4)"
        );
        assert_eq!(
            args,
            vec![
                SqlValue::Text("bold".to_string()),
                SqlValue::Null,
                SqlValue::Int(700),
                SqlValue::Int(12),
            ]
        );
    }

    #[test]
    fn test_bind_named_from_map() {
        let mut arg = HashMap::new();
        arg.insert("id", json!(3));
        arg.insert("meta", json!({"k": "v"}));

        let (sql, args) = bind_named(Dialect::Question, "UPDATE t SET meta = :meta WHERE id = :id", &arg).unwrap();
        assert_eq!(sql, "UPDATE t SET meta = ? WHERE id = ?");
        assert_eq!(args, vec![SqlValue::Text(r#"{"k":"v"}"#.to_string()), SqlValue::Int(3)]);
    }

    #[test]
    fn test_bind_named_errors() {
        let arg = json!({"name": "x"});
        let err = bind_named(Dialect::Question, "SELECT :missing", &arg).unwrap_err();
        assert!(err.to_string().contains("missing"));

        let err = bind_named(Dialect::Question, "SELECT :a", &[1, 2]).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));

        let err = bind_named(Dialect::Question, "SELECT :big", &json!({"big": u64::MAX})).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));
    }

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(SqlValue::from(5u8), SqlValue::Int(5));
        assert_eq!(SqlValue::from(2.5f32), SqlValue::Float(2.5));
        assert_eq!(SqlValue::from("x"), SqlValue::Text("x".to_string()));
        assert_eq!(SqlValue::from(&"y".to_string()), SqlValue::Text("y".to_string()));
        assert_eq!(SqlValue::from(Some(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(&b"ab"[..]), SqlValue::Bytes(vec![b'a', b'b']));
    }
}
