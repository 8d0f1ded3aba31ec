//! sqlx/Postgres executors: the pool-backed default session and the
//! caller-owned transaction handle.
//!
//! The session auto-commits per statement and is safe to share across
//! concurrent independent calls. A transaction spans multiple operations and
//! is committed or rolled back by the caller; accessor operations only
//! consume it. The mutex inside [`PgTransaction`] serializes statements on
//! the handle, but exclusive ownership by one call site remains the caller's
//! contract.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, Transaction, TypeInfo, ValueRef as _};
use tokio::sync::Mutex;

use crate::error::AccessError;
use crate::executor::{Executor, StatementOutcome};
use crate::value::{Row, Value};

/// Pool settings for [`PgSession::connect_with`].
#[derive(Debug, Clone)]
pub struct PgSessionConfig {
    pub max_connections: u32,
}

impl Default for PgSessionConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// The default session: a connection pool, one auto-committed statement per
/// call.
#[derive(Clone)]
pub struct PgSession {
    pool: PgPool,
}

impl PgSession {
    pub async fn connect(database_url: &str) -> Result<Self, AccessError> {
        Self::connect_with(database_url, &PgSessionConfig::default()).await
    }

    pub async fn connect_with(
        database_url: &str,
        config: &PgSessionConfig,
    ) -> Result<Self, AccessError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(database_url)
            .await
            .map_err(map_err)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens a caller-owned transaction. Committing or rolling it back is
    /// the caller's job; accessor operations never do either.
    pub async fn begin(&self) -> Result<PgTransaction, AccessError> {
        let tx = self.pool.begin().await.map_err(map_err)?;
        Ok(PgTransaction {
            inner: Mutex::new(tx),
        })
    }
}

/// A caller-owned transaction handle.
pub struct PgTransaction {
    inner: Mutex<Transaction<'static, Postgres>>,
}

impl PgTransaction {
    pub async fn commit(self) -> Result<(), AccessError> {
        self.inner.into_inner().commit().await.map_err(map_err)
    }

    pub async fn rollback(self) -> Result<(), AccessError> {
        self.inner.into_inner().rollback().await.map_err(map_err)
    }
}

#[async_trait]
impl Executor for PgSession {
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, AccessError> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, AccessError> {
        let row = bind_all(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<StatementOutcome, AccessError> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(StatementOutcome {
            rows_affected: result.rows_affected(),
            // Postgres has no generated-key report; RETURNING covers it.
            last_insert_id: None,
        })
    }
}

#[async_trait]
impl Executor for PgTransaction {
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, AccessError> {
        let mut tx = self.inner.lock().await;
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut **tx)
            .await
            .map_err(map_err)?;
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, AccessError> {
        let mut tx = self.inner.lock().await;
        let row = bind_all(sqlx::query(sql), params)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_err)?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<StatementOutcome, AccessError> {
        let mut tx = self.inner.lock().await;
        let result = bind_all(sqlx::query(sql), params)
            .execute(&mut **tx)
            .await
            .map_err(map_err)?;
        Ok(StatementOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in params {
        query = match value {
            // The wire type for a null parameter is unknowable here; text is
            // the coercion-friendliest choice Postgres accepts.
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Timestamp(v) => query.bind(*v),
            Value::Uuid(v) => query.bind(*v),
            Value::Json(v) => query.bind(v.clone()),
            Value::Bytes(v) => query.bind(v.clone()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, AccessError> {
    let mut out = Row::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_cell(row, index)?);
    }
    Ok(out)
}

fn decode_cell(row: &PgRow, index: usize) -> Result<Value, AccessError> {
    let column = &row.columns()[index];
    let name = column.name();
    if row
        .try_get_raw(index)
        .map_err(|e| AccessError::decode(name, e.to_string()))?
        .is_null()
    {
        return Ok(Value::Null);
    }

    let type_name = column.type_info().name();
    let value = match type_name {
        "BOOL" => Value::Bool(get(row, index, name)?),
        "INT2" => Value::Int(get::<i16>(row, index, name)? as i64),
        "INT4" => Value::Int(get::<i32>(row, index, name)? as i64),
        "INT8" => Value::Int(get(row, index, name)?),
        "FLOAT4" => Value::Float(get::<f32>(row, index, name)? as f64),
        "FLOAT8" => Value::Float(get(row, index, name)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => Value::Text(get(row, index, name)?),
        "TIMESTAMPTZ" => Value::Timestamp(get(row, index, name)?),
        "TIMESTAMP" => {
            let naive: chrono::NaiveDateTime = get(row, index, name)?;
            Value::Timestamp(naive.and_utc())
        }
        "UUID" => Value::Uuid(get(row, index, name)?),
        "JSON" | "JSONB" => Value::Json(get(row, index, name)?),
        "BYTEA" => Value::Bytes(get(row, index, name)?),
        other => {
            return Err(AccessError::decode(
                name,
                format!("unsupported column type `{other}`"),
            ));
        }
    };
    Ok(value)
}

fn get<'r, T>(row: &'r PgRow, index: usize, name: &str) -> Result<T, AccessError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(index)
        .map_err(|e| AccessError::decode(name, e.to_string()))
}

fn map_err(err: sqlx::Error) -> AccessError {
    // SQLSTATE class 23 is integrity-constraint violation.
    let constraint = matches!(
        &err,
        sqlx::Error::Database(db) if db.code().is_some_and(|c| c.starts_with("23"))
    );
    if constraint {
        AccessError::ConstraintViolation(Box::new(err))
    } else {
        AccessError::Execution(Box::new(err))
    }
}
