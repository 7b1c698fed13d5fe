//! Query Execution Module
//!
//! Runs a [`QueryPlan`] against the shared read-only store with:
//! - Re-validation of the statement before anything is prepared
//! - Row cap with truncation flag
//! - Statement timeout enforced inside SQLite via the progress handler

mod limits;
mod pool;
mod timeout;

pub use limits::ExecutionLimits;
pub use pool::{ConnectionPool, PooledConnection};
pub use timeout::{Deadline, TimeoutError};

use crate::error::GatewayError;
use crate::translator::{parse_single_query, QueryPlan};
use crate::value::Scalar;
use rusqlite::{Connection, ErrorCode, ToSql};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// SQLite VM instructions between deadline checks
const PROGRESS_INTERVAL: i32 = 1000;

/// Extra wall time the async backstop allows beyond the statement timeout
const BACKSTOP_GRACE: Duration = Duration::from_millis(250);

pub type Row = Vec<Scalar>;

/// Rows returned by one statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Equals `rows.len()`
    pub row_count: usize,
    /// True when the statement produced more rows than the cap
    pub truncated: bool,
}

impl QueryResult {
    pub fn empty(columns: Vec<String>) -> Self {
        QueryResult {
            columns,
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell at `row` under column `name`
    pub fn get(&self, row: usize, name: &str) -> Option<&Scalar> {
        let index = self.column_index(name)?;
        self.rows.get(row)?.get(index)
    }
}

pub struct QueryExecutor {
    pool: Arc<ConnectionPool>,
}

impl QueryExecutor {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        QueryExecutor { pool }
    }

    /// Open a pool over `path` and wrap it
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, GatewayError> {
        Ok(QueryExecutor::new(ConnectionPool::open(path, pool_size)?))
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Run a plan within `limits`.
    ///
    /// The statement is parsed again and checked by SQLite itself before
    /// preparation, so plans built by hand get the same guarantees as
    /// translated ones.
    pub async fn execute(
        &self,
        plan: &QueryPlan,
        limits: ExecutionLimits,
    ) -> Result<QueryResult, GatewayError> {
        parse_single_query(&plan.generated_statement)?;

        let started = Instant::now();
        let conn = self.pool.acquire().await?;
        let remaining = limits.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(timeout_error(limits.timeout, started));
        }

        let sql = plan.generated_statement.clone();
        let parameters: Vec<(String, Scalar)> = plan
            .bound_parameters
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let max_rows = limits.max_rows;

        let task = tokio::task::spawn_blocking(move || {
            run_bounded(&conn, &sql, &parameters, max_rows, remaining)
        });

        let outcome = match tokio::time::timeout(remaining + BACKSTOP_GRACE, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join)) => {
                return Err(GatewayError::Execution(format!("execution task failed: {join}")))
            }
            Err(_) => return Err(timeout_error(limits.timeout, started)),
        };

        match outcome {
            Ok(result) => {
                tracing::debug!(
                    rows = result.row_count,
                    truncated = result.truncated,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "statement_executed"
                );
                Ok(result)
            }
            Err(RunError::Interrupted) => Err(timeout_error(limits.timeout, started)),
            Err(RunError::NotReadOnly) => Err(GatewayError::unsafe_query(
                "statement is not read-only",
                plan.generated_statement.clone(),
            )),
            Err(RunError::Sqlite(e)) => Err(GatewayError::Execution(e.to_string())),
        }
    }
}

fn timeout_error(timeout: Duration, started: Instant) -> GatewayError {
    GatewayError::Timeout(TimeoutError {
        timeout,
        elapsed: started.elapsed(),
    })
}

enum RunError {
    Interrupted,
    NotReadOnly,
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for RunError {
    fn from(e: rusqlite::Error) -> Self {
        if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
            RunError::Interrupted
        } else {
            RunError::Sqlite(e)
        }
    }
}

/// Runs on a blocking thread. The progress handler is always cleared before
/// the connection goes back to the pool.
fn run_bounded(
    conn: &Connection,
    sql: &str,
    parameters: &[(String, Scalar)],
    max_rows: usize,
    timeout: Duration,
) -> Result<QueryResult, RunError> {
    let deadline = Instant::now() + timeout;
    conn.progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));
    let result = collect_rows(conn, sql, parameters, max_rows);
    conn.progress_handler(0, None::<fn() -> bool>);
    result
}

fn collect_rows(
    conn: &Connection,
    sql: &str,
    parameters: &[(String, Scalar)],
    max_rows: usize,
) -> Result<QueryResult, RunError> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(RunError::NotReadOnly);
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let params: Vec<(&str, &dyn ToSql)> = parameters
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect();

    let mut result = QueryResult::empty(columns);
    let mut rows = stmt.query(params.as_slice())?;
    while let Some(row) = rows.next()? {
        if result.rows.len() == max_rows {
            result.truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(Scalar::from(row.get_ref(i)?));
        }
        result.rows.push(values);
    }
    result.row_count = result.rows.len();
    Ok(result)
}
