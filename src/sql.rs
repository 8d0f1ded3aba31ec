//! Dialect-aware statement builder.
//!
//! Every builder returns `(sql, params)` where the SQL text contains only
//! positional placeholders and `params` carries the bound values in
//! placeholder order. Values never appear in the statement text.

use crate::criteria::{Criteria, Selector};
use crate::error::AccessError;
use crate::value::Value;

/// Target SQL dialect. Controls placeholder syntax and the
/// duplicate-skipping insert form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::MySql => "?".to_string(),
        }
    }
}

/// Rewrites an insert statement to skip rows that would violate a
/// uniqueness constraint.
///
/// The rewrite touches only the insert-clause keyword (MySQL) or appends a
/// conflict clause after the values region (Postgres); the placeholder
/// region and parameter order are never altered, so the original parameter
/// list remains valid for the rewritten text.
pub(crate) fn rewrite_ignore_duplicates(dialect: Dialect, sql: &str) -> String {
    match dialect {
        Dialect::MySql => sql.replacen("INSERT INTO", "INSERT IGNORE INTO", 1),
        Dialect::Postgres => format!("{sql} ON CONFLICT DO NOTHING"),
    }
}

/// Identifiers are interpolated into statement text, so they are restricted
/// to the safe subset. Anything else is a caller error, not an escape task.
fn check_ident(name: &str) -> Result<(), AccessError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(AccessError::invalid(format!("invalid identifier `{name}`")))
    }
}

fn check_idents<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<(), AccessError> {
    for name in names {
        check_ident(name)?;
    }
    Ok(())
}

struct Placeholders {
    dialect: Dialect,
    next: usize,
}

impl Placeholders {
    fn new(dialect: Dialect) -> Self {
        Self { dialect, next: 1 }
    }

    fn next(&mut self) -> String {
        let p = self.dialect.placeholder(self.next);
        self.next += 1;
        p
    }
}

fn where_clause(
    criteria: &Criteria,
    ph: &mut Placeholders,
    params: &mut Vec<Value>,
) -> String {
    if criteria.conds.is_empty() {
        return String::new();
    }
    let conds: Vec<String> = criteria
        .conds
        .iter()
        .map(|c| {
            params.push(c.value.clone());
            format!("{} {} {}", c.column, c.op.sql(), ph.next())
        })
        .collect();
    format!(" WHERE {}", conds.join(" AND "))
}

fn selector_clause(
    selector: &Selector,
    id_column: &str,
    ph: &mut Placeholders,
    params: &mut Vec<Value>,
) -> Result<String, AccessError> {
    match selector {
        Selector::Id(value) => {
            params.push(value.clone());
            Ok(format!(" WHERE {id_column} = {}", ph.next()))
        }
        Selector::Ids(values) => {
            if values.is_empty() {
                return Err(AccessError::invalid("empty key set in selector"));
            }
            let slots: Vec<String> = values
                .iter()
                .map(|v| {
                    params.push(v.clone());
                    ph.next()
                })
                .collect();
            Ok(format!(" WHERE {id_column} IN ({})", slots.join(", ")))
        }
        Selector::Fields(pairs) => {
            if pairs.is_empty() {
                return Err(AccessError::invalid("empty field match in selector"));
            }
            check_idents(pairs.iter().map(|(c, _)| c.as_str()))?;
            let conds: Vec<String> = pairs
                .iter()
                .map(|(column, value)| {
                    params.push(value.clone());
                    format!("{column} = {}", ph.next())
                })
                .collect();
            Ok(format!(" WHERE {}", conds.join(" AND ")))
        }
    }
}

fn order_page_clause(
    criteria: &Criteria,
    ph: &mut Placeholders,
    params: &mut Vec<Value>,
) -> String {
    let mut sql = String::new();
    if !criteria.order.is_empty() {
        let order: Vec<String> = criteria
            .order
            .iter()
            .map(|(column, dir)| format!("{column} {}", dir.sql()))
            .collect();
        sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
    }
    if let Some(limit) = criteria.limit {
        params.push(Value::Int(limit));
        sql.push_str(&format!(" LIMIT {}", ph.next()));
    }
    if let Some(offset) = criteria.offset {
        params.push(Value::Int(offset));
        sql.push_str(&format!(" OFFSET {}", ph.next()));
    }
    sql
}

pub(crate) fn select(
    dialect: Dialect,
    table: &str,
    columns: &[&str],
    criteria: &Criteria,
) -> Result<(String, Vec<Value>), AccessError> {
    check_ident(table)?;
    check_idents(columns.iter().copied())?;
    check_idents(criteria.columns())?;

    let mut ph = Placeholders::new(dialect);
    let mut params = Vec::new();
    let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));
    sql.push_str(&where_clause(criteria, &mut ph, &mut params));
    sql.push_str(&order_page_clause(criteria, &mut ph, &mut params));
    Ok((sql, params))
}

pub(crate) fn count(
    dialect: Dialect,
    table: &str,
    criteria: &Criteria,
) -> Result<(String, Vec<Value>), AccessError> {
    check_ident(table)?;
    check_idents(criteria.columns())?;

    let mut ph = Placeholders::new(dialect);
    let mut params = Vec::new();
    let mut sql = format!("SELECT COUNT(*) AS count FROM {table}");
    // Ordering and pagination are meaningless for a count; only the filter
    // portion of the criteria applies.
    sql.push_str(&where_clause(criteria, &mut ph, &mut params));
    Ok((sql, params))
}

pub(crate) fn insert(
    dialect: Dialect,
    table: &str,
    columns: &[&str],
    values: Vec<Value>,
    returning: &[&str],
) -> Result<(String, Vec<Value>), AccessError> {
    if columns.is_empty() {
        return Err(AccessError::invalid("insert with no columns"));
    }
    check_ident(table)?;
    check_idents(columns.iter().copied())?;
    check_idents(returning.iter().copied())?;

    let mut ph = Placeholders::new(dialect);
    let slots: Vec<String> = values.iter().map(|_| ph.next()).collect();
    let mut sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        slots.join(", ")
    );
    if !returning.is_empty() {
        sql.push_str(&format!(" RETURNING {}", returning.join(", ")));
    }
    Ok((sql, values))
}

/// Multi-row insert. All rows must carry the same column set in the same
/// order; the batch must be non-empty.
pub(crate) fn insert_many(
    dialect: Dialect,
    table: &str,
    columns: &[&str],
    rows: Vec<Vec<Value>>,
) -> Result<(String, Vec<Value>), AccessError> {
    if rows.is_empty() {
        return Err(AccessError::invalid("empty bulk-insert batch"));
    }
    if columns.is_empty() {
        return Err(AccessError::invalid("bulk insert with no columns"));
    }
    check_ident(table)?;
    check_idents(columns.iter().copied())?;

    let mut ph = Placeholders::new(dialect);
    let mut params = Vec::with_capacity(rows.len() * columns.len());
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() != columns.len() {
            return Err(AccessError::invalid(
                "bulk-insert rows must share one column set",
            ));
        }
        let slots: Vec<String> = row
            .into_iter()
            .map(|value| {
                params.push(value);
                ph.next()
            })
            .collect();
        tuples.push(format!("({})", slots.join(", ")));
    }
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES {}",
        columns.join(", "),
        tuples.join(", ")
    );
    Ok((sql, params))
}

pub(crate) fn update(
    dialect: Dialect,
    table: &str,
    id_column: &str,
    selector: &Selector,
    set_columns: &[&str],
    set_values: Vec<Value>,
) -> Result<(String, Vec<Value>), AccessError> {
    if set_columns.is_empty() {
        return Err(AccessError::invalid("update with no columns to set"));
    }
    check_ident(table)?;
    check_ident(id_column)?;
    check_idents(set_columns.iter().copied())?;

    let mut ph = Placeholders::new(dialect);
    let mut params = Vec::new();
    let assignments: Vec<String> = set_columns
        .iter()
        .zip(set_values)
        .map(|(column, value)| {
            params.push(value);
            format!("{column} = {}", ph.next())
        })
        .collect();
    let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
    sql.push_str(&selector_clause(selector, id_column, &mut ph, &mut params)?);
    Ok((sql, params))
}

pub(crate) fn delete(
    dialect: Dialect,
    table: &str,
    id_column: &str,
    selector: &Selector,
) -> Result<(String, Vec<Value>), AccessError> {
    check_ident(table)?;
    check_ident(id_column)?;

    let mut ph = Placeholders::new(dialect);
    let mut params = Vec::new();
    let mut sql = format!("DELETE FROM {table}");
    sql.push_str(&selector_clause(selector, id_column, &mut ph, &mut params)?);
    Ok((sql, params))
}
