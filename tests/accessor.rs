//! End-to-end accessor behavior against fake executors: context routing,
//! identifier copy-back, bulk-insert rewriting, and a round trip.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use txrepo::{
    AccessError, Criteria, Dialect, Entity, EntityAccessor, Executor, ListQuery, Partial,
    PureInsertOptions, PureInsertReturningOptions, Row, SaveOptions, Selector, StatementOutcome,
    Value,
};

#[derive(Debug, PartialEq)]
struct Gadget {
    id: Option<i64>,
    name: Option<String>,
    kind: Option<String>,
}

impl Entity for Gadget {
    const TABLE: &'static str = "gadgets";
    const ID: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "name", "kind", "created_at", "other"];

    fn from_row(row: &Row) -> Result<Self, AccessError> {
        let int = |c: &str| match row.get(c) {
            Some(Value::Int(v)) => Some(*v),
            _ => None,
        };
        let text = |c: &str| match row.get(c) {
            Some(Value::Text(v)) => Some(v.clone()),
            _ => None,
        };
        Ok(Gadget {
            id: int("id"),
            name: text("name"),
            kind: text("kind"),
        })
    }
}

#[derive(Debug, Clone)]
struct Call {
    kind: &'static str,
    sql: String,
    params: Vec<Value>,
}

/// Records every statement and answers from queued canned results.
#[derive(Default)]
struct FakeExecutor {
    calls: Mutex<Vec<Call>>,
    rows: Mutex<VecDeque<Vec<Row>>>,
    outcomes: Mutex<VecDeque<StatementOutcome>>,
}

impl FakeExecutor {
    fn push_rows(&self, rows: Vec<Row>) {
        self.rows.lock().unwrap().push_back(rows);
    }

    fn push_outcome(&self, outcome: StatementOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, kind: &'static str, sql: &str, params: &[Value]) {
        self.calls.lock().unwrap().push(Call {
            kind,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, AccessError> {
        self.record("fetch_all", sql, params);
        Ok(self.rows.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, AccessError> {
        self.record("fetch_optional", sql, params);
        let rows = self.rows.lock().unwrap().pop_front().unwrap_or_default();
        Ok(rows.into_iter().next())
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<StatementOutcome, AccessError> {
        self.record("execute", sql, params);
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StatementOutcome {
                rows_affected: 1,
                last_insert_id: None,
            }))
    }
}

fn row(cells: &[(&str, Value)]) -> Row {
    cells
        .iter()
        .map(|(c, v)| (c.to_string(), v.clone()))
        .collect()
}

fn accessor(session: &Arc<FakeExecutor>, dialect: Dialect) -> EntityAccessor<Gadget> {
    EntityAccessor::new(Arc::clone(session) as Arc<dyn Executor>, dialect)
}

#[tokio::test]
async fn test_explicit_transaction_bypasses_default_session() {
    let session = Arc::new(FakeExecutor::default());
    let tx = FakeExecutor::default();
    let gadgets = accessor(&session, Dialect::Postgres);

    gadgets
        .find_one(&Criteria::new().eq("id", 1i64), Some(&tx))
        .await
        .unwrap();
    gadgets
        .insert(&Partial::new().set("name", "bolt"), Some(&tx))
        .await
        .unwrap();
    gadgets
        .delete(&Selector::id(1i64), Some(&tx))
        .await
        .unwrap();
    gadgets
        .bulk_insert(&[Partial::new().set("name", "a")], true, Some(&tx))
        .await
        .unwrap();

    assert_eq!(session.call_count(), 0);
    assert_eq!(tx.call_count(), 4);
}

#[tokio::test]
async fn test_default_session_used_without_transaction() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);

    gadgets.find(&Criteria::new(), None).await.unwrap();
    gadgets
        .count(&Criteria::new().eq("kind", "m3"), None)
        .await
        .unwrap_err(); // no canned count row, decode error is fine here
    assert_eq!(session.call_count(), 2);
}

#[tokio::test]
async fn test_find_one_decodes_row() {
    let session = Arc::new(FakeExecutor::default());
    session.push_rows(vec![row(&[
        ("id", Value::Int(7)),
        ("name", Value::Text("bolt".into())),
        ("kind", Value::Null),
    ])]);
    let gadgets = accessor(&session, Dialect::Postgres);

    let found = gadgets
        .find_one(&Criteria::new().eq("id", 7i64), None)
        .await
        .unwrap();
    assert_eq!(
        found,
        Some(Gadget {
            id: Some(7),
            name: Some("bolt".into()),
            kind: None,
        })
    );

    let calls = session.calls();
    assert_eq!(calls[0].kind, "fetch_optional");
    // find_one forces single-row semantics regardless of caller criteria.
    assert!(calls[0].sql.contains("LIMIT"));
}

#[tokio::test]
async fn test_count_reads_count_column() {
    let session = Arc::new(FakeExecutor::default());
    session.push_rows(vec![row(&[("count", Value::Int(3))])]);
    let gadgets = accessor(&session, Dialect::Postgres);

    let n = gadgets
        .count_by(vec![("kind", Value::Text("m3".into()))], None)
        .await
        .unwrap();
    assert_eq!(n, 3);
}

#[tokio::test]
async fn test_criteria_with_unknown_column_is_rejected_before_execution() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);

    let err = gadgets
        .find(&Criteria::new().eq("colour", "red"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidArgument(_)));
    assert_eq!(session.call_count(), 0);
}

#[tokio::test]
async fn test_pure_insert_copies_generated_id_into_partial() {
    let session = Arc::new(FakeExecutor::default());
    session.push_outcome(StatementOutcome {
        rows_affected: 1,
        last_insert_id: Some(42),
    });
    let gadgets = accessor(&session, Dialect::MySql);

    let mut partial = Partial::new().set("name", "bolt");
    let options = PureInsertOptions {
        insert_id_at: Some("id".into()),
        update_entity: false,
    };
    let outcome = gadgets
        .pure_insert(&mut partial, &options, None)
        .await
        .unwrap();

    assert_eq!(outcome.last_insert_id, Some(42));
    assert_eq!(partial.get("id"), Some(&Value::Int(42)));
}

#[tokio::test]
async fn test_pure_insert_without_generated_id_leaves_partial_untouched() {
    let session = Arc::new(FakeExecutor::default());
    session.push_outcome(StatementOutcome {
        rows_affected: 1,
        last_insert_id: None,
    });
    let gadgets = accessor(&session, Dialect::MySql);

    let mut partial = Partial::new().set("name", "bolt");
    let options = PureInsertOptions {
        insert_id_at: Some("id".into()),
        update_entity: true,
    };
    gadgets
        .pure_insert(&mut partial, &options, None)
        .await
        .unwrap();

    assert_eq!(partial.get("id"), None);
    // No generated key, so the read-back was skipped too.
    assert_eq!(session.call_count(), 1);
}

#[tokio::test]
async fn test_pure_insert_update_entity_reads_row_back() {
    let session = Arc::new(FakeExecutor::default());
    session.push_outcome(StatementOutcome {
        rows_affected: 1,
        last_insert_id: Some(5),
    });
    session.push_rows(vec![row(&[
        ("id", Value::Int(5)),
        ("name", Value::Text("bolt".into())),
        ("kind", Value::Text("m3".into())),
    ])]);
    let gadgets = accessor(&session, Dialect::MySql);

    let mut partial = Partial::new().set("name", "bolt");
    let options = PureInsertOptions {
        insert_id_at: Some("id".into()),
        update_entity: true,
    };
    gadgets
        .pure_insert(&mut partial, &options, None)
        .await
        .unwrap();

    assert_eq!(partial.get("id"), Some(&Value::Int(5)));
    assert_eq!(partial.get("kind"), Some(&Value::Text("m3".into())));
    let calls = session.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].kind, "fetch_optional");
}

#[tokio::test]
async fn test_pure_insert_returning_copies_only_requested_columns() {
    let session = Arc::new(FakeExecutor::default());
    let stamp = Value::Text("2025-06-01T00:00:00Z".into());
    session.push_rows(vec![row(&[
        ("id", Value::Int(7)),
        ("created_at", stamp.clone()),
        ("other", Value::Text("x".into())),
    ])]);
    let gadgets = accessor(&session, Dialect::Postgres);

    let mut partial = Partial::new().set("name", "bolt");
    let options = PureInsertReturningOptions {
        returning: vec!["id".into(), "created_at".into()],
    };
    gadgets
        .pure_insert_returning(&mut partial, &options, None)
        .await
        .unwrap();

    assert_eq!(partial.get("id"), Some(&Value::Int(7)));
    assert_eq!(partial.get("created_at"), Some(&stamp));
    assert_eq!(partial.get("other"), None);

    let calls = session.calls();
    assert!(calls[0].sql.ends_with("RETURNING id, created_at"));
}

#[tokio::test]
async fn test_pure_insert_returning_zero_rows_is_success() {
    let session = Arc::new(FakeExecutor::default());
    session.push_rows(Vec::new());
    let gadgets = accessor(&session, Dialect::Postgres);

    let mut partial = Partial::new().set("name", "bolt");
    let options = PureInsertReturningOptions {
        returning: vec!["id".into()],
    };
    let outcome = gadgets
        .pure_insert_returning(&mut partial, &options, None)
        .await
        .unwrap();

    assert_eq!(outcome.rows_affected, 0);
    assert_eq!(partial.get("id"), None);
}

#[tokio::test]
async fn test_pure_insert_returning_empty_set_skips_returning_clause() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);

    let mut partial = Partial::new().set("name", "bolt");
    gadgets
        .pure_insert_returning(&mut partial, &PureInsertReturningOptions::default(), None)
        .await
        .unwrap();

    let calls = session.calls();
    assert_eq!(calls[0].kind, "execute");
    assert!(!calls[0].sql.contains("RETURNING"));
}

#[tokio::test]
async fn test_save_inserts_without_key_and_captures_id() {
    let session = Arc::new(FakeExecutor::default());
    session.push_rows(vec![row(&[("id", Value::Int(9))])]);
    let gadgets = accessor(&session, Dialect::Postgres);

    let mut partial = Partial::new().set("name", "bolt");
    gadgets
        .save_from_partial(&mut partial, &SaveOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(partial.get("id"), Some(&Value::Int(9)));
    let calls = session.calls();
    assert!(calls[0].sql.starts_with("INSERT INTO gadgets"));
    assert!(calls[0].sql.ends_with("RETURNING id"));
}

#[tokio::test]
async fn test_save_reload_reads_persisted_columns_back() {
    let session = Arc::new(FakeExecutor::default());
    session.push_rows(vec![row(&[("id", Value::Int(9))])]);
    session.push_rows(vec![row(&[
        ("id", Value::Int(9)),
        ("name", Value::Text("bolt".into())),
        ("kind", Value::Text("m3".into())),
    ])]);
    let gadgets = accessor(&session, Dialect::Postgres);

    let mut partial = Partial::new().set("name", "bolt");
    gadgets
        .save_from_partial(&mut partial, &SaveOptions { reload: true }, None)
        .await
        .unwrap();

    // Database-computed columns from the read-back land in the partial.
    assert_eq!(partial.get("id"), Some(&Value::Int(9)));
    assert_eq!(partial.get("kind"), Some(&Value::Text("m3".into())));
    let calls = session.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].kind, "fetch_optional");
    assert_eq!(calls[1].params, vec![Value::Int(9), Value::Int(1)]);
}

#[tokio::test]
async fn test_update_with_empty_partial_fails_without_touching_engine() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);

    let err = gadgets
        .update(&Selector::id(4i64), &Partial::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InvalidArgument(_)));
    assert_eq!(session.call_count(), 0);
}

#[tokio::test]
async fn test_save_updates_when_key_present() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);

    let mut partial = Partial::new().set("id", 4i64).set("name", "nut");
    gadgets
        .save_from_partial(&mut partial, &SaveOptions::default(), None)
        .await
        .unwrap();

    let calls = session.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].sql, "UPDATE gadgets SET name = $1 WHERE id = $2");
    assert_eq!(
        calls[0].params,
        vec![Value::Text("nut".into()), Value::Int(4)]
    );
}

#[tokio::test]
async fn test_bulk_insert_rewrite_keeps_parameter_list_and_order() {
    let items = vec![
        Partial::<Gadget>::new().set("name", "a").set("kind", "m1"),
        Partial::<Gadget>::new().set("name", "b").set("kind", "m2"),
        Partial::<Gadget>::new().set("name", "c").set("kind", "m3"),
    ];

    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);
    gadgets.bulk_insert(&items, false, None).await.unwrap();
    gadgets.bulk_insert(&items, true, None).await.unwrap();

    let calls = session.calls();
    let (plain, skipping) = (&calls[0], &calls[1]);
    assert_eq!(plain.params, skipping.params);
    assert_eq!(plain.params.len(), 6);
    assert_eq!(
        skipping.sql,
        format!("{} ON CONFLICT DO NOTHING", plain.sql)
    );
}

#[tokio::test]
async fn test_bulk_insert_mysql_rewrite_swaps_insert_keyword() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::MySql);

    let items = vec![Partial::<Gadget>::new().set("name", "a")];
    gadgets.bulk_insert(&items, true, None).await.unwrap();

    let calls = session.calls();
    assert!(calls[0].sql.starts_with("INSERT IGNORE INTO gadgets"));
    assert_eq!(calls[0].params.len(), 1);
}

#[tokio::test]
async fn test_bulk_insert_empty_batch_fails_without_touching_engine() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);

    let err = gadgets.bulk_insert(&[], false, None).await.unwrap_err();
    assert!(matches!(err, AccessError::InvalidArgument(_)));
    assert_eq!(session.call_count(), 0);
}

#[tokio::test]
async fn test_bulk_insert_mismatched_items_are_rejected() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);

    let items = vec![
        Partial::<Gadget>::new().set("name", "a"),
        Partial::<Gadget>::new().set("kind", "m2"),
    ];
    let err = gadgets.bulk_insert(&items, false, None).await.unwrap_err();
    assert!(matches!(err, AccessError::InvalidArgument(_)));
    assert_eq!(session.call_count(), 0);
}

#[tokio::test]
async fn test_query_passes_sql_and_params_through() {
    let session = Arc::new(FakeExecutor::default());
    let gadgets = accessor(&session, Dialect::Postgres);

    gadgets
        .query(
            "SELECT name FROM gadgets WHERE kind = $1",
            &[Value::Text("m3".into())],
            None,
        )
        .await
        .unwrap();

    let calls = session.calls();
    assert_eq!(calls[0].sql, "SELECT name FROM gadgets WHERE kind = $1");
    assert_eq!(calls[0].params, vec![Value::Text("m3".into())]);
}

struct ProbeList;

#[async_trait]
impl ListQuery for ProbeList {
    type Output = usize;

    async fn run(&self, executor: &dyn Executor) -> Result<usize, AccessError> {
        let rows = executor.fetch_all("SELECT 1 AS one", &[]).await?;
        Ok(rows.len())
    }
}

#[tokio::test]
async fn test_get_list_hands_resolved_executor_to_collaborator() {
    let session = Arc::new(FakeExecutor::default());
    let tx = FakeExecutor::default();
    let gadgets = accessor(&session, Dialect::Postgres);

    gadgets.get_list(&ProbeList, Some(&tx)).await.unwrap();
    assert_eq!(session.call_count(), 0);
    assert_eq!(tx.call_count(), 1);

    gadgets.get_list(&ProbeList, None).await.unwrap();
    assert_eq!(session.call_count(), 1);
}

/// A one-table in-memory engine, good enough for the statements the builder
/// emits: stores inserted rows, answers `WHERE id = $1` lookups.
#[derive(Default)]
struct MemoryExecutor {
    rows: Mutex<Vec<Row>>,
    next_id: AtomicI64,
}

impl MemoryExecutor {
    fn insert_from(&self, sql: &str, params: &[Value]) -> StatementOutcome {
        let columns: Vec<&str> = sql
            .split_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .map(|(cols, _)| cols.split(", ").collect())
            .unwrap_or_default();
        let mut row: Row = columns
            .iter()
            .zip(params)
            .map(|(c, v)| (c.to_string(), v.clone()))
            .collect();
        let id = match row.get("id").and_then(Value::as_int) {
            Some(id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                row.insert("id".into(), Value::Int(id));
                id
            }
        };
        self.rows.lock().unwrap().push(row);
        StatementOutcome {
            rows_affected: 1,
            last_insert_id: Some(id),
        }
    }

    fn lookup(&self, params: &[Value]) -> Option<Row> {
        let wanted = params.first()?;
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.get("id") == Some(wanted))
            .cloned()
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, AccessError> {
        Ok(self.fetch_optional(sql, params).await?.into_iter().collect())
    }

    async fn fetch_optional(
        &self,
        _sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, AccessError> {
        Ok(self.lookup(params))
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<StatementOutcome, AccessError> {
        assert!(sql.starts_with("INSERT INTO"), "unexpected statement: {sql}");
        Ok(self.insert_from(sql, params))
    }
}

#[tokio::test]
async fn test_insert_then_find_one_round_trip() {
    let session = Arc::new(MemoryExecutor::default());
    let gadgets: EntityAccessor<Gadget> =
        EntityAccessor::new(Arc::clone(&session) as Arc<dyn Executor>, Dialect::Postgres);

    let partial = Partial::new()
        .set("id", 11i64)
        .set("name", "bolt")
        .set("kind", "m3");
    gadgets.insert(&partial, None).await.unwrap();

    let found = gadgets
        .find_one(&Criteria::new().eq("id", 11i64), None)
        .await
        .unwrap()
        .expect("inserted row should be found");
    assert_eq!(
        found,
        Gadget {
            id: Some(11),
            name: Some("bolt".into()),
            kind: Some("m3".into()),
        }
    );
}
