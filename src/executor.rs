//! The engine executor seam and execution-context resolution.
//!
//! Domain code never talks to the driver directly; it goes through
//! [`Executor`], which both the pool-backed default session and a
//! caller-owned transaction implement (see [`crate::pg`]). Tests swap in a
//! fake. This is the composition seam that keeps the accessor independent
//! of any concrete engine type.

use async_trait::async_trait;

use crate::error::AccessError;
use crate::value::{Row, Value};

/// Outcome of a non-returning statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
    pub rows_affected: u64,
    /// The engine-generated key for single-row inserts, on engines that
    /// surface one (MySQL-style). Postgres leaves this `None`; use a
    /// RETURNING clause there instead.
    pub last_insert_id: Option<i64>,
}

/// One statement target: the default session or an explicit transaction.
///
/// All statements are positional-parameterized; values are bound by the
/// engine, never interpolated.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, AccessError>;

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, AccessError>;

    async fn execute(&self, sql: &str, params: &[Value])
        -> Result<StatementOutcome, AccessError>;
}

/// Picks the executor for one operation.
///
/// An explicit transaction wins; its absence means the default session, not
/// an error. Every public accessor operation calls this exactly once and
/// reuses the result for all of its sub-steps, so a single operation never
/// switches context between building and executing.
pub fn resolve<'a>(
    session: &'a dyn Executor,
    explicit: Option<&'a dyn Executor>,
) -> &'a dyn Executor {
    match explicit {
        Some(tx) => tx,
        None => session,
    }
}
