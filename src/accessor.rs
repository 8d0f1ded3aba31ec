//! The generic per-entity-type data-access facade.
//!
//! Every operation takes an optional explicit transaction executor as its
//! last argument. The executor for the whole operation is resolved once up
//! front ([`resolve`]); callers never branch on whether they are inside a
//! transaction.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::criteria::{Criteria, Selector};
use crate::entity::{Entity, Partial, RowGet};
use crate::error::AccessError;
use crate::executor::{Executor, StatementOutcome, resolve};
use crate::list::ListQuery;
use crate::sql::{self, Dialect};
use crate::value::{Row, Value};

/// Options for [`EntityAccessor::save_from_partial`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Read the persisted row back after the save and copy every column into
    /// the partial, so it reflects database-computed defaults.
    pub reload: bool,
}

/// Options for [`EntityAccessor::pure_insert`].
#[derive(Debug, Clone, Default)]
pub struct PureInsertOptions {
    /// Column of the partial to receive the engine's generated key.
    pub insert_id_at: Option<String>,
    /// Perform a post-insert read-back so the partial reflects all
    /// database-computed columns, not just the key. Skipped when the engine
    /// reported no generated key.
    pub update_entity: bool,
}

/// Options for [`EntityAccessor::pure_insert_returning`].
///
/// There is no post-insert read-back flag here: listing the wanted columns
/// in `returning` retrieves them in the insert's own round trip, which is
/// what the read-back on [`PureInsertOptions`] exists to approximate on
/// engines without a returning clause.
#[derive(Debug, Clone, Default)]
pub struct PureInsertReturningOptions {
    /// Columns the insert statement asks the engine to return. Names must
    /// match the column names the engine reports, which this layer assumes
    /// are identical to the entity's field names.
    pub returning: Vec<String>,
}

/// Outcome of an insert operation.
#[derive(Debug, Clone, Default)]
pub struct InsertOutcome {
    pub rows_affected: u64,
    /// Single generated key, on engines that surface one.
    pub last_insert_id: Option<i64>,
    /// Rows produced by a RETURNING clause, if one was requested.
    pub returned: Vec<Row>,
}

impl From<StatementOutcome> for InsertOutcome {
    fn from(outcome: StatementOutcome) -> Self {
        InsertOutcome {
            rows_affected: outcome.rows_affected,
            last_insert_id: outcome.last_insert_id,
            returned: Vec::new(),
        }
    }
}

/// Typed CRUD, bulk-insert, raw-query, and list access for one entity type.
///
/// Holds the default session executor; an explicit transaction supplied per
/// call takes precedence over it for that call only. The accessor never
/// begins, commits, or rolls back a transaction.
pub struct EntityAccessor<T: Entity> {
    session: Arc<dyn Executor>,
    dialect: Dialect,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for EntityAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            dialect: self.dialect,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> EntityAccessor<T> {
    pub fn new(session: Arc<dyn Executor>, dialect: Dialect) -> Self {
        Self {
            session,
            dialect,
            _entity: PhantomData,
        }
    }

    fn check_criteria(&self, criteria: &Criteria) -> Result<(), AccessError> {
        for column in criteria.columns() {
            if !T::COLUMNS.contains(&column) {
                return Err(AccessError::invalid(format!(
                    "unknown column `{column}` for table `{}`",
                    T::TABLE
                )));
            }
        }
        Ok(())
    }

    /// Returns the first entity matching `criteria`, or `None`.
    pub async fn find_one(
        &self,
        criteria: &Criteria,
        tx: Option<&dyn Executor>,
    ) -> Result<Option<T>, AccessError> {
        debug!(table = T::TABLE, op = "find_one");
        let executor = resolve(self.session.as_ref(), tx);
        self.check_criteria(criteria)?;
        let one = criteria.clone().limit(1);
        let (stmt, params) = sql::select(self.dialect, T::TABLE, T::COLUMNS, &one)?;
        let row = executor.fetch_optional(&stmt, &params).await?;
        row.as_ref().map(T::from_row).transpose()
    }

    /// Returns all entities matching `criteria`, in criteria order.
    pub async fn find(
        &self,
        criteria: &Criteria,
        tx: Option<&dyn Executor>,
    ) -> Result<Vec<T>, AccessError> {
        debug!(table = T::TABLE, op = "find");
        let executor = resolve(self.session.as_ref(), tx);
        self.check_criteria(criteria)?;
        let (stmt, params) = sql::select(self.dialect, T::TABLE, T::COLUMNS, criteria)?;
        let rows = executor.fetch_all(&stmt, &params).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// Equality-match variant of [`find_one`](Self::find_one).
    pub async fn find_one_by(
        &self,
        keys: Vec<(&str, Value)>,
        tx: Option<&dyn Executor>,
    ) -> Result<Option<T>, AccessError> {
        self.find_one(&Criteria::from_keys(keys), tx).await
    }

    /// Equality-match variant of [`find`](Self::find).
    pub async fn find_by(
        &self,
        keys: Vec<(&str, Value)>,
        tx: Option<&dyn Executor>,
    ) -> Result<Vec<T>, AccessError> {
        self.find(&Criteria::from_keys(keys), tx).await
    }

    /// Counts rows matching `criteria` (ordering/pagination ignored).
    pub async fn count(
        &self,
        criteria: &Criteria,
        tx: Option<&dyn Executor>,
    ) -> Result<i64, AccessError> {
        debug!(table = T::TABLE, op = "count");
        let executor = resolve(self.session.as_ref(), tx);
        self.check_criteria(criteria)?;
        let (stmt, params) = sql::count(self.dialect, T::TABLE, criteria)?;
        let row = executor
            .fetch_optional(&stmt, &params)
            .await?
            .ok_or_else(|| AccessError::decode("count", "count query returned no row"))?;
        row.int("count")
    }

    /// Equality-match variant of [`count`](Self::count).
    pub async fn count_by(
        &self,
        keys: Vec<(&str, Value)>,
        tx: Option<&dyn Executor>,
    ) -> Result<i64, AccessError> {
        self.count(&Criteria::from_keys(keys), tx).await
    }

    /// Forwards the resolved executor to the list-building collaborator and
    /// returns its output unmodified.
    pub async fn get_list<L: ListQuery>(
        &self,
        list: &L,
        tx: Option<&dyn Executor>,
    ) -> Result<L::Output, AccessError> {
        debug!(table = T::TABLE, op = "get_list");
        let executor = resolve(self.session.as_ref(), tx);
        list.run(executor).await
    }

    /// Raw parameterized statement, returning raw rows.
    ///
    /// Escape hatch only: parameters must be positional-placeholder-matched
    /// to `stmt`, and safety rests entirely on the engine's binding. Never
    /// assemble `stmt` from untrusted values.
    pub async fn query(
        &self,
        stmt: &str,
        params: &[Value],
        tx: Option<&dyn Executor>,
    ) -> Result<Vec<Row>, AccessError> {
        debug!(table = T::TABLE, op = "query");
        let executor = resolve(self.session.as_ref(), tx);
        executor.fetch_all(stmt, params).await
    }

    /// Upsert-like save: updates when the partial carries a primary-key
    /// value, inserts otherwise. On insert the generated key is written into
    /// the partial; with [`SaveOptions::reload`] every persisted column is.
    pub async fn save_from_partial(
        &self,
        partial: &mut Partial<T>,
        options: &SaveOptions,
        tx: Option<&dyn Executor>,
    ) -> Result<InsertOutcome, AccessError> {
        debug!(table = T::TABLE, op = "save");
        let executor = resolve(self.session.as_ref(), tx);
        partial.check_columns()?;

        let has_key = partial.get(T::ID).is_some_and(|v| !v.is_null());
        let outcome = if has_key {
            let id = partial.get(T::ID).cloned().unwrap_or(Value::Null);
            let (set_columns, set_values): (Vec<&str>, Vec<Value>) = partial
                .iter()
                .filter(|&(c, _)| c != T::ID)
                .map(|(c, v)| (c, v.clone()))
                .unzip();
            if set_columns.is_empty() {
                return Err(AccessError::invalid("save with only a primary key"));
            }
            let (stmt, params) = sql::update(
                self.dialect,
                T::TABLE,
                T::ID,
                &Selector::Id(id),
                &set_columns,
                set_values,
            )?;
            InsertOutcome::from(executor.execute(&stmt, &params).await?)
        } else {
            // Capture the generated key the way the dialect allows: a
            // RETURNING clause where supported, the generated-key report
            // otherwise.
            let outcome = match self.dialect {
                Dialect::Postgres => self.run_insert(executor, partial, &[T::ID]).await?,
                Dialect::MySql => {
                    let (stmt, params) = sql::insert(
                        self.dialect,
                        T::TABLE,
                        &partial.columns(),
                        partial.values(),
                        &[],
                    )?;
                    InsertOutcome::from(executor.execute(&stmt, &params).await?)
                }
            };
            if let Some(id) = outcome.returned.first().and_then(|row| row.get(T::ID)) {
                partial.put(T::ID, id.clone());
            } else if let Some(id) = outcome.last_insert_id {
                partial.put(T::ID, id);
            }
            outcome
        };

        if options.reload {
            self.reload_into(executor, partial).await?;
        }
        Ok(outcome)
    }

    /// Pure insert: no presence check, no update-on-conflict.
    pub async fn insert_from_partial(
        &self,
        partial: &Partial<T>,
        tx: Option<&dyn Executor>,
    ) -> Result<InsertOutcome, AccessError> {
        debug!(table = T::TABLE, op = "insert");
        let executor = resolve(self.session.as_ref(), tx);
        partial.check_columns()?;
        let (stmt, params) = sql::insert(
            self.dialect,
            T::TABLE,
            &partial.columns(),
            partial.values(),
            &[],
        )?;
        Ok(executor.execute(&stmt, &params).await?.into())
    }

    /// Alias of [`insert_from_partial`](Self::insert_from_partial), kept for
    /// caller ergonomics.
    pub async fn insert(
        &self,
        partial: &Partial<T>,
        tx: Option<&dyn Executor>,
    ) -> Result<InsertOutcome, AccessError> {
        self.insert_from_partial(partial, tx).await
    }

    /// Updates all rows matched by `selector`, setting the columns present
    /// in `partial`. Returns the affected-row descriptor.
    pub async fn update(
        &self,
        selector: &Selector,
        partial: &Partial<T>,
        tx: Option<&dyn Executor>,
    ) -> Result<StatementOutcome, AccessError> {
        debug!(table = T::TABLE, op = "update");
        let executor = resolve(self.session.as_ref(), tx);
        partial.check_columns()?;
        let (stmt, params) = sql::update(
            self.dialect,
            T::TABLE,
            T::ID,
            selector,
            &partial.columns(),
            partial.values(),
        )?;
        executor.execute(&stmt, &params).await
    }

    /// Deletes all rows matched by `selector`.
    pub async fn delete(
        &self,
        selector: &Selector,
        tx: Option<&dyn Executor>,
    ) -> Result<StatementOutcome, AccessError> {
        debug!(table = T::TABLE, op = "delete");
        let executor = resolve(self.session.as_ref(), tx);
        let (stmt, params) = sql::delete(self.dialect, T::TABLE, T::ID, selector)?;
        executor.execute(&stmt, &params).await
    }

    /// Insert-then-read-generated-key variant, for engines that surface a
    /// single integer generated key (MySQL-style).
    ///
    /// With `insert_id_at`, the generated key is written into the partial at
    /// that column; with `update_entity`, the persisted row is read back and
    /// every column copied in. Both copy-backs quietly do nothing when the
    /// engine reported no generated key.
    pub async fn pure_insert(
        &self,
        partial: &mut Partial<T>,
        options: &PureInsertOptions,
        tx: Option<&dyn Executor>,
    ) -> Result<InsertOutcome, AccessError> {
        debug!(table = T::TABLE, op = "pure_insert");
        let executor = resolve(self.session.as_ref(), tx);
        partial.check_columns()?;
        let (stmt, params) = sql::insert(
            self.dialect,
            T::TABLE,
            &partial.columns(),
            partial.values(),
            &[],
        )?;
        let outcome: InsertOutcome = executor.execute(&stmt, &params).await?.into();

        if let (Some(column), Some(id)) = (&options.insert_id_at, outcome.last_insert_id) {
            partial.put(column.clone(), id);
        }
        if options.update_entity && outcome.last_insert_id.is_some() {
            self.reload_into(executor, partial).await?;
        }
        Ok(outcome)
    }

    /// Insert-with-returning-clause variant, for engines that can return
    /// arbitrary columns from the insert itself (Postgres-style).
    ///
    /// From the first returned row, every column named in
    /// `options.returning` is copied into the partial. An empty `returning`
    /// set or zero returned rows means no copy-back, still a success.
    pub async fn pure_insert_returning(
        &self,
        partial: &mut Partial<T>,
        options: &PureInsertReturningOptions,
        tx: Option<&dyn Executor>,
    ) -> Result<InsertOutcome, AccessError> {
        debug!(table = T::TABLE, op = "pure_insert_returning");
        let executor = resolve(self.session.as_ref(), tx);
        partial.check_columns()?;

        if options.returning.is_empty() {
            let (stmt, params) = sql::insert(
                self.dialect,
                T::TABLE,
                &partial.columns(),
                partial.values(),
                &[],
            )?;
            return Ok(executor.execute(&stmt, &params).await?.into());
        }

        let returning: Vec<&str> = options.returning.iter().map(String::as_str).collect();
        let outcome = self.run_insert(executor, partial, &returning).await?;
        if let Some(row) = outcome.returned.first() {
            for (column, value) in row {
                if options.returning.iter().any(|r| r == column) {
                    partial.put(column.clone(), value.clone());
                }
            }
        }
        Ok(outcome)
    }

    /// One parameterized multi-row insert covering `items`.
    ///
    /// All items must carry the same column set in the same order. With
    /// `ignore_duplicates`, the statement is rewritten to the dialect's
    /// skip-conflicting-rows form; the parameter list is passed through
    /// unchanged. An empty batch is an `InvalidArgument` error.
    pub async fn bulk_insert(
        &self,
        items: &[Partial<T>],
        ignore_duplicates: bool,
        tx: Option<&dyn Executor>,
    ) -> Result<StatementOutcome, AccessError> {
        debug!(table = T::TABLE, op = "bulk_insert", items = items.len());
        let executor = resolve(self.session.as_ref(), tx);

        let first = items
            .first()
            .ok_or_else(|| AccessError::invalid("empty bulk-insert batch"))?;
        first.check_columns()?;
        let columns = first.columns();
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            if item.columns() != columns {
                return Err(AccessError::invalid(
                    "bulk-insert items must share one column set",
                ));
            }
            rows.push(item.values());
        }

        let (built, params) = sql::insert_many(self.dialect, T::TABLE, &columns, rows)?;
        let stmt = if ignore_duplicates {
            sql::rewrite_ignore_duplicates(self.dialect, &built)
        } else {
            built
        };
        executor.execute(&stmt, &params).await
    }

    /// Insert carrying a RETURNING clause; rows come back on the same
    /// resolved executor in the same round trip.
    async fn run_insert(
        &self,
        executor: &dyn Executor,
        partial: &Partial<T>,
        returning: &[&str],
    ) -> Result<InsertOutcome, AccessError> {
        let (stmt, params) = sql::insert(
            self.dialect,
            T::TABLE,
            &partial.columns(),
            partial.values(),
            returning,
        )?;
        let returned = executor.fetch_all(&stmt, &params).await?;
        Ok(InsertOutcome {
            rows_affected: returned.len() as u64,
            last_insert_id: None,
            returned,
        })
    }

    /// Reads the row identified by the partial's primary key back and copies
    /// every column into the partial. No-op when the key is absent.
    async fn reload_into(
        &self,
        executor: &dyn Executor,
        partial: &mut Partial<T>,
    ) -> Result<(), AccessError> {
        let Some(id) = partial.get(T::ID).cloned() else {
            return Ok(());
        };
        let criteria = Criteria::new().eq(T::ID, id).limit(1);
        let (stmt, params) = sql::select(self.dialect, T::TABLE, T::COLUMNS, &criteria)?;
        if let Some(row) = executor.fetch_optional(&stmt, &params).await? {
            for (column, value) in &row {
                partial.put(column.clone(), value.clone());
            }
        }
        Ok(())
    }
}
