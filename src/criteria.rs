//! Read criteria and write selectors.
//!
//! Criteria express equality/comparison filters, ordering, and pagination in
//! terms of an entity's declared columns only. Selectors are the narrower
//! shapes accepted by `update` and `delete`: a single key, a set of keys, or
//! a field-match predicate.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "<>",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Cond {
    pub column: String,
    pub op: Cmp,
    pub value: Value,
}

/// A filter/order/page description for the find and count operations.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    pub(crate) conds: Vec<Cond>,
    pub(crate) order: Vec<(String, Order)>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<i64>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, op: Cmp, value: impl Into<Value>) -> Self {
        self.conds.push(Cond {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Cmp::Eq, value)
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Equality-only criteria from `(column, value)` pairs, the shape the
    /// `find_by`/`count_by` family accepts.
    pub fn from_keys<I, C, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        keys.into_iter()
            .fold(Self::new(), |criteria, (column, value)| criteria.eq(column, value))
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = &str> {
        self.conds
            .iter()
            .map(|c| c.column.as_str())
            .chain(self.order.iter().map(|(c, _)| c.as_str()))
    }
}

/// Row selection for `update` and `delete`.
#[derive(Debug, Clone)]
pub enum Selector {
    /// A single primary-key value.
    Id(Value),
    /// A set of primary-key values.
    Ids(Vec<Value>),
    /// Equality match on the named columns.
    Fields(Vec<(String, Value)>),
}

impl Selector {
    pub fn id(value: impl Into<Value>) -> Self {
        Selector::Id(value.into())
    }

    pub fn ids<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Selector::Ids(values.into_iter().map(Into::into).collect())
    }

    pub fn fields<I, C, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        Selector::Fields(
            pairs
                .into_iter()
                .map(|(c, v)| (c.into(), v.into()))
                .collect(),
        )
    }
}
