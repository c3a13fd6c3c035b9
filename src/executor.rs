//! `LifeExecutor` Module
//!
//! Provides the `LifeExecutor` trait, the outbound seam between repository queries
//! and the persistence runtime.
//!
//! Repository queries never talk to a database directly. They build a [`Statement`]
//! (SQL text, ordered bind values and an optional offset/limit [`Window`]) and hand it
//! to an executor. The executor owns connections, sessions and transactions; this
//! crate only decides which statement to run and how to shape the rows it returns.

use may_postgres::{Client, Error as PostgresError, Row};
use sea_query::Value;
use std::fmt;
use std::time::Instant;

use crate::query::rewrite;
use crate::query::value_conversion::with_converted_params;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// `LifeExecutor` error type
#[derive(Debug)]
pub enum LifeError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for LifeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifeError::PostgresError(e) => {
                write!(f, "PostgreSQL error: {e}")
            }
            LifeError::QueryError(s) => {
                write!(f, "Query error: {s}")
            }
            LifeError::ParseError(s) => {
                write!(f, "Parse error: {s}")
            }
            LifeError::Other(s) => {
                write!(f, "Execution error: {s}")
            }
        }
    }
}

impl std::error::Error for LifeError {}

impl From<PostgresError> for LifeError {
    fn from(err: PostgresError) -> Self {
        LifeError::PostgresError(err)
    }
}

/// Offset/limit applied to a statement by the runtime, not baked into its text.
///
/// Keeping the window outside the SQL lets a paged query and its count query share
/// one filter text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

/// A fully built query: SQL with `$n` placeholders plus the values bound to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<Value>,
    pub window: Option<Window>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
            window: None,
        }
    }

    /// Returns a copy of this statement restricted to `window`.
    pub fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    /// SQL text with the window rendered as `LIMIT`/`OFFSET`.
    ///
    /// Used by executors whose driver has no separate first-result/max-results API.
    /// Text that already limits its rows is wrapped, so the window applies to its result.
    pub fn windowed_sql(&self) -> String {
        match self.window {
            Some(Window { offset, limit }) if rewrite::has_row_limit(&self.sql) => {
                format!("SELECT * FROM ({}) AS windowed LIMIT {} OFFSET {}", self.sql, limit, offset)
            }
            Some(Window { offset, limit }) => {
                format!("{} LIMIT {} OFFSET {}", self.sql, limit, offset)
            }
            None => self.sql.clone(),
        }
    }
}

/// Session-level identity cache of the persistence runtime.
///
/// Handed to modifying executions as an explicit capability so the only code able
/// to clear it is the code that was given it.
pub trait IdentityCache {
    /// Drop every tracked instance so later reads hit the database again.
    fn clear_identity_cache(&self);
}

/// Trait for executing database operations
///
/// This trait abstracts the persistence runtime, allowing different implementations
/// (a pooled `may_postgres` client, a transaction, an in-memory fake) to be used
/// interchangeably by repository queries.
pub trait LifeExecutor {
    /// Raw row type produced by this runtime.
    type Row;

    /// Execute a write statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the statement execution fails.
    fn execute(&self, statement: &Statement) -> Result<u64, LifeError>;

    /// Execute a query and return all rows, honouring the statement window
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the query execution fails.
    fn query_all(&self, statement: &Statement) -> Result<Vec<Self::Row>, LifeError>;

    /// Execute a `COUNT` query and return its single value
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the query fails or does not yield a count.
    fn query_count(&self, statement: &Statement) -> Result<u64, LifeError>;

    /// The session's identity cache, if this runtime keeps one.
    fn identity_cache(&self) -> Option<&dyn IdentityCache> {
        None
    }
}

/// Maps a raw runtime row into a domain model.
pub trait FromRow<R>: Sized {
    /// # Errors
    ///
    /// Returns `LifeError::ParseError` if the row cannot be converted.
    fn from_row(row: &R) -> Result<Self, LifeError>;
}

impl<M> FromRow<serde_json::Value> for M
where
    M: serde::de::DeserializeOwned,
{
    fn from_row(row: &serde_json::Value) -> Result<Self, LifeError> {
        M::deserialize(row).map_err(|e| LifeError::ParseError(format!("Failed to parse row: {e}")))
    }
}

/// Implementation of `LifeExecutor` for `may_postgres::Client`
///
/// `may_postgres` has no session identity cache, so `identity_cache()` stays `None`
/// and clear-on-modify requests are a no-op against this executor.
pub struct PostgresExecutor {
    client: Client,
}

impl PostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Consume the executor and return the underlying client
    pub fn into_client(self) -> Client {
        self.client
    }
}

impl LifeExecutor for PostgresExecutor {
    type Row = Row;

    fn execute(&self, statement: &Statement) -> Result<u64, LifeError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(&statement.sql).entered();

        let start = Instant::now();
        let sql = statement.windowed_sql();
        let result = with_converted_params(&statement.values, |params| {
            self.client.execute(sql.as_str(), params).map_err(LifeError::PostgresError)
        });
        record(start, result.is_err());
        result
    }

    fn query_all(&self, statement: &Statement) -> Result<Vec<Row>, LifeError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(&statement.sql).entered();

        let start = Instant::now();
        let sql = statement.windowed_sql();
        let result = with_converted_params(&statement.values, |params| {
            self.client.query(sql.as_str(), params).map_err(LifeError::PostgresError)
        });
        record(start, result.is_err());
        result
    }

    fn query_count(&self, statement: &Statement) -> Result<u64, LifeError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(&statement.sql).entered();

        let start = Instant::now();
        let result = with_converted_params(&statement.values, |params| {
            let row = self
                .client
                .query_one(statement.sql.as_str(), params)
                .map_err(LifeError::PostgresError)?;
            let count = row
                .try_get::<usize, i64>(0)
                .map_err(|e| LifeError::ParseError(format!("Failed to extract count: {e}")))?;
            u64::try_from(count)
                .map_err(|_| LifeError::Other(format!("Count cannot be negative: {count}")))
        });
        record(start, result.is_err());
        result
    }
}

fn record(start: Instant, failed: bool) {
    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    {
        if failed {
            METRICS.record_query_error();
        }
        METRICS.record_query(duration);
    }
    log::trace!("statement finished in {duration:?} (failed: {failed})");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_life_error_display() {
        let err = LifeError::QueryError("test error".to_string());
        assert!(err.to_string().contains("Query error"));
    }

    #[test]
    fn test_life_error_all_variants() {
        let err2 = LifeError::QueryError("test".to_string());
        assert!(err2.to_string().contains("Query error"));

        let err3 = LifeError::ParseError("test".to_string());
        assert!(err3.to_string().contains("Parse error"));

        let err4 = LifeError::Other("test".to_string());
        assert!(err4.to_string().contains("Execution error"));
    }

    #[test]
    fn test_windowed_sql_appends_limit_offset() {
        let stmt = Statement::new("SELECT * FROM \"users\"", vec![])
            .with_window(Window { offset: 20, limit: 10 });
        assert_eq!(stmt.windowed_sql(), "SELECT * FROM \"users\" LIMIT 10 OFFSET 20");
    }

    #[test]
    fn test_windowed_sql_wraps_existing_limit() {
        let stmt = Statement::new("SELECT * FROM users ORDER BY id LIMIT 10", vec![])
            .with_window(Window { offset: 0, limit: 2 });
        assert_eq!(
            stmt.windowed_sql(),
            "SELECT * FROM (SELECT * FROM users ORDER BY id LIMIT 10) AS windowed LIMIT 2 OFFSET 0"
        );
    }

    #[test]
    fn test_windowed_sql_without_window_is_unchanged() {
        let stmt = Statement::new("SELECT 1", vec![Value::from(1i32)]);
        assert_eq!(stmt.windowed_sql(), "SELECT 1");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        last_name: String,
    }

    #[test]
    fn test_json_rows_map_through_serde() {
        let row = serde_json::json!({ "id": 7, "last_name": "Lee" });
        let user = User::from_row(&row).unwrap();
        assert_eq!(user, User { id: 7, last_name: "Lee".into() });
    }

    #[test]
    fn test_json_row_mismatch_is_parse_error() {
        let row = serde_json::json!({ "id": "seven" });
        let err = User::from_row(&row).unwrap_err();
        assert!(matches!(err, LifeError::ParseError(_)));
    }
}
