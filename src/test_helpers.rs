//! In-memory executor for tests.
//!
//! [`MockExecutor`] keeps one table of `serde_json::Value` rows and evaluates the
//! statements repository queries produce: `SELECT` (optionally `DISTINCT`, with
//! `WHERE`, `ORDER BY` and the statement window), `SELECT COUNT(*)` in both the plain
//! and the wrapped form, `DELETE` and `UPDATE ... SET`. Conditions support
//! `AND`/`OR`, comparisons, `BETWEEN`, `[NOT] LIKE`, `[NOT] IN`, `IS [NOT] NULL` and
//! `LOWER(...)`. Anything else is reported as a `LifeError::QueryError`.
//!
//! It also models a session identity cache keyed by `id`: rows read are cached and
//! later reads return the cached instance, until the cache is cleared.

use crate::executor::{IdentityCache, LifeError, LifeExecutor, Statement};
use crate::query::value_conversion::is_null;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::Value;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

static COUNT_WRAPPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^select\s+count\(\*\)\s+from\s+\((.+)\)\s+as\s+count_subquery$").expect("regex"));
static SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^select\s+(distinct\s+)?(.+?)\s+from\s+("?\w+"?)(?:\s+(?:as\s+)?(\w+))?(?:\s+where\s+(.+?))?(?:\s+order\s+by\s+(.+?))?$"#,
    )
    .expect("regex")
});
static DELETE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^delete\s+from\s+("?\w+"?)(?:\s+(?:as\s+)?(\w+))?(?:\s+where\s+(.+))?$"#).expect("regex")
});
static UPDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^update\s+("?\w+"?)(?:\s+(?:as\s+)?(\w+))?\s+set\s+(.+?)(?:\s+where\s+(.+))?$"#)
        .expect("regex")
});
static OPERAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^(lower\()?(?:\w+\.)?"?(\w+)"?\)?$"#).expect("regex"));
static IS_NULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^(.+?)\s+is\s+(not\s+)?null$").expect("regex"));
static IN_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^(.+?)\s+(not\s+)?in\s*\((.*)\)$").expect("regex"));
static BETWEEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^(.+?)\s+between\s+(\S+)\s+and\s+(\S+)$").expect("regex"));
static LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^(.+?)\s+(not\s+)?like\s+(\S+)$").expect("regex"));
static COMPARISON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.+?)\s*(<>|!=|<=|>=|=|<|>)\s*(.+)$").expect("regex"));
static EMPTY_SUBQUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^select\s+null\s+where\s+false$").expect("regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("regex"));
static BETWEEN_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\sbetween\s+\S+$").expect("regex"));

fn unsupported(what: &str) -> LifeError {
    LifeError::QueryError(format!("MockExecutor cannot evaluate: {what}"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory stand-in for a database session.
#[derive(Default)]
pub struct MockExecutor {
    rows: Mutex<Vec<Json>>,
    statements: Arc<Mutex<Vec<Statement>>>,
    cache: Mutex<HashMap<String, Json>>,
    cache_clears: AtomicUsize,
    failure: Mutex<Option<LifeError>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = Json>) -> Self {
        let executor = Self::new();
        lock(&executor.rows).extend(rows);
        executor
    }

    pub fn insert(&self, row: Json) {
        lock(&self.rows).push(row);
    }

    /// Current table contents, ignoring the identity cache.
    pub fn rows(&self) -> Vec<Json> {
        lock(&self.rows).clone()
    }

    /// Every statement received, in order.
    pub fn statements(&self) -> Vec<Statement> {
        lock(&self.statements).clone()
    }

    /// Shared handle to the statement log.
    pub fn statement_log(&self) -> Arc<Mutex<Vec<Statement>>> {
        Arc::clone(&self.statements)
    }

    /// Makes the next statement fail with `error`.
    pub fn fail_next(&self, error: LifeError) {
        *lock(&self.failure) = Some(error);
    }

    /// Puts every current row into the identity cache.
    pub fn cache_all(&self) {
        let rows = self.rows();
        let mut cache = lock(&self.cache);
        for row in rows {
            if let Some(id) = identity(&row) {
                cache.insert(id, row);
            }
        }
    }

    pub fn cached_count(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn cache_clears(&self) -> usize {
        self.cache_clears.load(AtomicOrdering::SeqCst)
    }

    fn begin(&self, statement: &Statement) -> Result<(), LifeError> {
        lock(&self.statements).push(statement.clone());
        match lock(&self.failure).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn select(&self, sql: &str, values: &[Value]) -> Result<Vec<Json>, LifeError> {
        let caps = SELECT.captures(sql.trim()).ok_or_else(|| unsupported(sql))?;
        let rows = self.rows();
        let mut selected = Vec::new();
        for row in rows {
            let keep = match caps.get(5) {
                Some(condition) => eval(condition.as_str(), &row, values)?,
                None => true,
            };
            if keep {
                selected.push(row);
            }
        }
        if caps.get(1).is_some() {
            let mut distinct: Vec<Json> = Vec::new();
            for row in selected {
                if !distinct.contains(&row) {
                    distinct.push(row);
                }
            }
            selected = distinct;
        }
        if let Some(order) = caps.get(6) {
            sort_rows(&mut selected, order.as_str())?;
        }
        Ok(selected)
    }

    fn count(&self, sql: &str, values: &[Value]) -> Result<u64, LifeError> {
        let sql = sql.trim();
        let rows = match COUNT_WRAPPED.captures(sql) {
            Some(caps) => self.select(&caps[1], values)?,
            None => self.select(sql, values)?,
        };
        Ok(rows.len() as u64)
    }
}

impl IdentityCache for MockExecutor {
    fn clear_identity_cache(&self) {
        lock(&self.cache).clear();
        self.cache_clears.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

impl LifeExecutor for MockExecutor {
    type Row = Json;

    fn execute(&self, statement: &Statement) -> Result<u64, LifeError> {
        self.begin(statement)?;
        let sql = statement.sql.trim();
        let values = &statement.values;

        if let Some(caps) = DELETE.captures(sql) {
            let mut rows = lock(&self.rows);
            let mut kept = Vec::with_capacity(rows.len());
            let mut removed = 0;
            for row in rows.iter() {
                let matched = match caps.get(3) {
                    Some(condition) => eval(condition.as_str(), row, values)?,
                    None => true,
                };
                if matched {
                    removed += 1;
                } else {
                    kept.push(row.clone());
                }
            }
            *rows = kept;
            return Ok(removed);
        }

        if let Some(caps) = UPDATE.captures(sql) {
            let assignments = split_top_level(&caps[3], ",")
                .into_iter()
                .map(|a| {
                    let (column, rhs) = a.split_once('=').ok_or_else(|| unsupported(a))?;
                    let column = column_name(column.trim())?.1;
                    Ok((column, operand_value(rhs.trim(), values)?))
                })
                .collect::<Result<Vec<_>, LifeError>>()?;
            let mut rows = lock(&self.rows);
            let mut affected = 0;
            for row in rows.iter_mut() {
                let matched = match caps.get(4) {
                    Some(condition) => eval(condition.as_str(), row, values)?,
                    None => true,
                };
                if matched {
                    if let Some(object) = row.as_object_mut() {
                        for (column, value) in &assignments {
                            object.insert(column.clone(), value.clone());
                        }
                    }
                    affected += 1;
                }
            }
            return Ok(affected);
        }

        Err(unsupported(sql))
    }

    fn query_all(&self, statement: &Statement) -> Result<Vec<Json>, LifeError> {
        self.begin(statement)?;
        let mut rows = self.select(&statement.sql, &statement.values)?;
        if let Some(window) = statement.window {
            let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
            let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);
            rows = rows.into_iter().skip(offset).take(limit).collect();
        }

        let mut cache = lock(&self.cache);
        Ok(rows
            .into_iter()
            .map(|row| match identity(&row) {
                Some(id) => cache.entry(id).or_insert(row).clone(),
                None => row,
            })
            .collect())
    }

    fn query_count(&self, statement: &Statement) -> Result<u64, LifeError> {
        self.begin(statement)?;
        self.count(&statement.sql, &statement.values)
    }

    fn identity_cache(&self) -> Option<&dyn IdentityCache> {
        Some(self)
    }
}

fn identity(row: &Json) -> Option<String> {
    row.get("id").filter(|id| !id.is_null()).map(Json::to_string)
}

/// Splits at `separator` outside parentheses and quotes, case-insensitively.
fn split_top_level<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let bytes = text.as_bytes();
    let upper = text.to_ascii_uppercase();
    let sep = separator.to_ascii_uppercase();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ if depth == 0 && upper.as_bytes()[i..].starts_with(sep.as_bytes()) => {
                    parts.push(text[start..i].trim());
                    i += sep.len();
                    start = i;
                    continue;
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push(text[start..].trim());
    parts
}

/// Removes parentheses that wrap the whole expression.
fn strip_outer_parens(text: &str) -> &str {
    let mut text = text.trim();
    while text.starts_with('(') && text.ends_with(')') {
        let inner = &text[1..text.len() - 1];
        let mut depth = 0i32;
        let balanced = inner.bytes().all(|b| {
            match b {
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
            depth >= 0
        });
        if !balanced {
            break;
        }
        text = inner.trim();
    }
    text
}

fn eval(condition: &str, row: &Json, values: &[Value]) -> Result<bool, LifeError> {
    let condition = strip_outer_parens(condition);

    let ors = split_top_level(condition, " OR ");
    if ors.len() > 1 {
        for part in ors {
            if eval(part, row, values)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    // re-join `x BETWEEN a` with the `b` that follows its AND
    let mut ands: Vec<String> = Vec::new();
    for part in split_top_level(condition, " AND ") {
        match ands.last_mut() {
            Some(last) if BETWEEN_TAIL.is_match(last) => {
                last.push_str(" AND ");
                last.push_str(part);
            }
            _ => ands.push(part.to_string()),
        }
    }
    if ands.len() > 1 {
        for part in &ands {
            if !eval(part, row, values)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    eval_term(condition, row, values)
}

fn eval_term(term: &str, row: &Json, values: &[Value]) -> Result<bool, LifeError> {
    if let Some(caps) = IS_NULL.captures(term) {
        let (_, column) = column_name(&caps[1])?;
        let null = row.get(&column).map_or(true, Json::is_null);
        return Ok(null != caps.get(2).is_some());
    }
    if let Some(caps) = BETWEEN.captures(term) {
        let lhs = column_value(&caps[1], row)?;
        let low = operand_value(&caps[2], values)?;
        let high = operand_value(&caps[3], values)?;
        return Ok(matches!(compare(&lhs, &low), Some(Ordering::Greater | Ordering::Equal))
            && matches!(compare(&lhs, &high), Some(Ordering::Less | Ordering::Equal)));
    }
    if let Some(caps) = IN_LIST.captures(term) {
        let negated = caps.get(2).is_some();
        let list = caps[3].trim();
        if list.is_empty() || EMPTY_SUBQUERY.is_match(list) {
            return Ok(negated);
        }
        let lhs = column_value(&caps[1], row)?;
        let mut found = false;
        let mut unknown = lhs.is_null();
        for item in split_top_level(list, ",") {
            let candidate = operand_value(item, values)?;
            unknown |= candidate.is_null();
            if compare(&lhs, &candidate) == Some(Ordering::Equal) {
                found = true;
            }
        }
        // no match against a NULL is unknown, which filters the row either way
        return Ok(if found { !negated } else { negated && !unknown });
    }
    if let Some(caps) = LIKE.captures(term) {
        let lhs = column_value(&caps[1], row)?;
        let pattern = operand_value(&caps[3], values)?;
        let (Some(text), Some(pattern)) = (lhs.as_str(), pattern.as_str()) else {
            return Ok(false);
        };
        return Ok(like(text, pattern)? != caps.get(2).is_some());
    }
    if let Some(caps) = COMPARISON.captures(term) {
        let lhs = column_value(&caps[1], row)?;
        let rhs = operand_value(&caps[3], values)?;
        if lhs.is_null() || rhs.is_null() {
            return Ok(false);
        }
        let ordering = compare(&lhs, &rhs);
        return Ok(match &caps[2] {
            "=" => ordering == Some(Ordering::Equal),
            "<>" | "!=" => ordering.is_some_and(|o| o != Ordering::Equal),
            "<" => ordering == Some(Ordering::Less),
            "<=" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            ">" => ordering == Some(Ordering::Greater),
            ">=" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            other => return Err(unsupported(other)),
        });
    }
    Err(unsupported(term))
}

/// `(lowered, column)` for `col`, `"col"`, `u.col`, `LOWER("col")`.
fn column_name(text: &str) -> Result<(bool, String), LifeError> {
    let caps = OPERAND.captures(text.trim()).ok_or_else(|| unsupported(text))?;
    Ok((caps.get(1).is_some(), caps[2].to_string()))
}

fn column_value(text: &str, row: &Json) -> Result<Json, LifeError> {
    let text = text.trim();
    // numeric literals such as sea-query's `1 = 2` for an empty IN
    if NUMBER.is_match(text) {
        return serde_json::from_str(text).map_err(|_| unsupported(text));
    }
    let (lowered, column) = column_name(text)?;
    let value = row.get(&column).cloned().unwrap_or(Json::Null);
    Ok(if lowered { lowercase(value) } else { value })
}

/// Right-hand side: `$n`, `LOWER($n)` or a literal.
fn operand_value(text: &str, values: &[Value]) -> Result<Json, LifeError> {
    let text = text.trim();
    let lower_prefix = "LOWER(";
    if text.len() > lower_prefix.len() && text[..lower_prefix.len()].eq_ignore_ascii_case(lower_prefix) && text.ends_with(')') {
        return operand_value(&text[lower_prefix.len()..text.len() - 1], values).map(lowercase);
    }
    if let Some(index) = text.strip_prefix('$') {
        let index: usize = index.parse().map_err(|_| unsupported(text))?;
        let value = index
            .checked_sub(1)
            .and_then(|i| values.get(i))
            .ok_or_else(|| LifeError::QueryError(format!("No value bound to {text}")))?;
        return Ok(to_json(value));
    }
    if text.eq_ignore_ascii_case("null") {
        return Ok(Json::Null);
    }
    if text.eq_ignore_ascii_case("true") {
        return Ok(Json::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Ok(Json::Bool(false));
    }
    if let Some(s) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(Json::String(s.replace("''", "'")));
    }
    serde_json::from_str::<Json>(text).map_err(|_| unsupported(text))
}

fn lowercase(value: Json) -> Json {
    match value {
        Json::String(s) => Json::String(s.to_lowercase()),
        other => other,
    }
}

/// Converts a bound value into the JSON the mock table stores.
pub fn to_json(value: &Value) -> Json {
    if is_null(value) {
        return Json::Null;
    }
    match value {
        Value::Bool(Some(b)) => Json::Bool(*b),
        Value::TinyInt(Some(i)) => Json::from(*i),
        Value::SmallInt(Some(i)) => Json::from(*i),
        Value::Int(Some(i)) => Json::from(*i),
        Value::BigInt(Some(i)) => Json::from(*i),
        Value::TinyUnsigned(Some(u)) => Json::from(*u),
        Value::SmallUnsigned(Some(u)) => Json::from(*u),
        Value::Unsigned(Some(u)) => Json::from(*u),
        Value::BigUnsigned(Some(u)) => Json::from(*u),
        Value::Float(Some(f)) => Json::from(f64::from(*f)),
        Value::Double(Some(d)) => Json::from(*d),
        Value::String(Some(s)) => Json::String(s.to_string()),
        Value::Char(Some(c)) => Json::String(c.to_string()),
        Value::Uuid(Some(u)) => Json::String(u.to_string()),
        Value::Json(Some(j)) => serde_json::Value::clone(j),
        other => Json::String(format!("{other:?}")),
    }
}

fn compare(a: &Json, b: &Json) -> Option<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Json::String(x), Json::String(y)) => Some(x.cmp(y)),
        (Json::Bool(x), Json::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like(text: &str, pattern: &str) -> Result<bool, LifeError> {
    let mut regex = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    regex.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex)
        .map(|re| re.is_match(text))
        .map_err(|e| LifeError::QueryError(format!("Bad LIKE pattern {pattern}: {e}")))
}

fn sort_rows(rows: &mut [Json], order_by: &str) -> Result<(), LifeError> {
    let mut keys = Vec::new();
    for term in split_top_level(order_by, ",") {
        let (expr, descending) = match term.rsplit_once(char::is_whitespace) {
            Some((expr, dir)) if dir.eq_ignore_ascii_case("desc") => (expr, true),
            Some((expr, dir)) if dir.eq_ignore_ascii_case("asc") => (expr, false),
            _ => (term, false),
        };
        keys.push((expr.trim().to_string(), descending));
    }

    let mut failure = None;
    rows.sort_by(|a, b| {
        for (expr, descending) in &keys {
            let (x, y) = match (column_value(expr, a), column_value(expr, b)) {
                (Ok(x), Ok(y)) => (x, y),
                (Err(e), _) | (_, Err(e)) => {
                    failure = Some(e);
                    return Ordering::Equal;
                }
            };
            // nulls sort last ascending, first descending
            let ordering = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => compare(&x, &y).unwrap_or(Ordering::Equal),
            };
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> MockExecutor {
        MockExecutor::with_rows([
            json!({ "id": 1, "last_name": "Lee", "age": 30, "email": null }),
            json!({ "id": 2, "last_name": "Kim", "age": 25, "email": "kim@example.com" }),
            json!({ "id": 3, "last_name": "lee", "age": 41, "email": null }),
        ])
    }

    fn ids(rows: &[Json]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[test]
    fn test_select_with_where_and_order() {
        let mock = people();
        let rows = mock
            .query_all(&Statement::new(
                r#"SELECT * FROM "people" WHERE "age" > $1 ORDER BY "age" DESC"#,
                vec![Value::from(20i32)],
            ))
            .unwrap();
        assert_eq!(ids(&rows), [3, 1, 2]);
    }

    #[test]
    fn test_or_of_and_groups_and_between() {
        let mock = people();
        let rows = mock
            .query_all(&Statement::new(
                r#"SELECT * FROM "people" WHERE ("last_name" = $1 AND "age" BETWEEN $2 AND $3) OR "email" IS NOT NULL"#,
                vec![Value::from("Lee"), Value::from(29i32), Value::from(31i32)],
            ))
            .unwrap();
        assert_eq!(ids(&rows), [1, 2]);
    }

    #[test]
    fn test_lower_like_and_in() {
        let mock = people();
        let rows = mock
            .query_all(&Statement::new(
                r#"SELECT * FROM "people" WHERE LOWER("last_name") LIKE $1 AND "id" IN ($2, $3)"#,
                vec![Value::from("le%"), Value::from(1i32), Value::from(3i32)],
            ))
            .unwrap();
        assert_eq!(ids(&rows), [1, 3]);
    }

    #[test]
    fn test_in_lists_follow_null_semantics() {
        let mock = people();
        let query = |sql: &str, values: Vec<Value>| ids(&mock.query_all(&Statement::new(sql, values)).unwrap());

        assert_eq!(query(r#"SELECT * FROM "people" WHERE "id" NOT IN (SELECT NULL WHERE FALSE)"#, vec![]), [1, 2, 3]);
        assert!(query(r#"SELECT * FROM "people" WHERE "id" IN (SELECT NULL WHERE FALSE)"#, vec![]).is_empty());
        assert!(query(r#"SELECT * FROM "people" WHERE "id" NOT IN (NULL)"#, vec![]).is_empty());
        assert_eq!(query(r#"SELECT * FROM "people" WHERE "id" NOT IN ($1)"#, vec![Value::from(2i32)]), [1, 3]);
        assert_eq!(query(r#"SELECT * FROM "people" WHERE "email" NOT IN ($1)"#, vec![Value::from("x")]), [2]);
        assert_eq!(query(r#"SELECT * FROM "people" WHERE 1 = 1"#, vec![]), [1, 2, 3]);
        assert!(query(r#"SELECT * FROM "people" WHERE 1 = 2"#, vec![]).is_empty());
    }

    #[test]
    fn test_window_and_count_forms() {
        let mock = people();
        let rows = mock
            .query_all(
                &Statement::new(r#"SELECT * FROM "people" ORDER BY "id" ASC"#, vec![])
                    .with_window(crate::executor::Window { offset: 1, limit: 1 }),
            )
            .unwrap();
        assert_eq!(ids(&rows), [2]);

        let plain = Statement::new(r#"SELECT COUNT(*) FROM "people" WHERE "email" IS NULL"#, vec![]);
        assert_eq!(mock.query_count(&plain).unwrap(), 2);
        let wrapped = Statement::new(
            r#"SELECT COUNT(*) FROM (SELECT DISTINCT * FROM "people") AS count_subquery"#,
            vec![],
        );
        assert_eq!(mock.query_count(&wrapped).unwrap(), 3);
    }

    #[test]
    fn test_update_and_delete() {
        let mock = people();
        let updated = mock
            .execute(&Statement::new(
                "UPDATE people SET age = $1 WHERE last_name = $2",
                vec![Value::from(31i32), Value::from("Lee")],
            ))
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(mock.rows()[0]["age"], json!(31));

        let deleted = mock
            .execute(&Statement::new("DELETE FROM people p WHERE p.age < $1", vec![Value::from(40i32)]))
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(ids(&mock.rows()), [3]);
    }

    #[test]
    fn test_identity_cache_returns_cached_rows_until_cleared() {
        let mock = people();
        let select = Statement::new(r#"SELECT * FROM "people" WHERE "id" = $1"#, vec![Value::from(1i32)]);
        mock.query_all(&select).unwrap();
        mock.execute(&Statement::new("UPDATE people SET age = $1 WHERE id = $2", vec![Value::from(99i32), Value::from(1i32)]))
            .unwrap();

        assert_eq!(mock.query_all(&select).unwrap()[0]["age"], json!(30));
        mock.clear_identity_cache();
        assert_eq!(mock.query_all(&select).unwrap()[0]["age"], json!(99));
        assert_eq!(mock.cache_clears(), 1);
    }

    #[test]
    fn test_unsupported_sql_is_an_error() {
        let mock = people();
        let err = mock.execute(&Statement::new("TRUNCATE people", vec![])).unwrap_err();
        assert!(err.to_string().contains("MockExecutor cannot evaluate"));
    }

    #[test]
    fn test_fail_next_and_statement_log() {
        let mock = people();
        mock.fail_next(LifeError::Other("boom".into()));
        assert!(mock.query_all(&Statement::new("SELECT * FROM people", vec![])).is_err());
        assert!(mock.query_all(&Statement::new("SELECT * FROM people", vec![])).is_ok());
        assert_eq!(mock.statements().len(), 2);
    }
}
