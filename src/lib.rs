//! Transaction-aware generic data access over sqlx.
//!
//! Every [`EntityAccessor`] operation takes an optional explicit transaction
//! as its last argument, so domain code works identically inside and outside
//! a transaction without branching:
//!
//! ```ignore
//! let session = Arc::new(PgSession::connect(&database_url).await?);
//! let users: EntityAccessor<User> = EntityAccessor::new(session.clone(), Dialect::Postgres);
//!
//! // Default session, auto-commit per statement.
//! let user = users.find_one(&Criteria::new().eq("id", 7i64), None).await?;
//!
//! // Caller-owned transaction spanning several operations.
//! let tx = session.begin().await?;
//! users.insert(&partial, Some(&tx)).await?;
//! users.delete(&Selector::id(3i64), Some(&tx)).await?;
//! tx.commit().await?;
//! ```
//!
//! # Transaction boundaries
//!
//! Accessor operations never begin, commit, or roll back a transaction; the
//! handle is created and finished by the caller. Within one operation the
//! executor is resolved once and used for every sub-step.
//!
//! # Identifier capture
//!
//! The insert variants that retrieve engine-generated values
//! ([`EntityAccessor::pure_insert`], [`EntityAccessor::pure_insert_returning`],
//! [`EntityAccessor::save_from_partial`]) write those values back into the
//! caller's [`Partial`] — mutation of the input is their documented contract.

mod accessor;
mod criteria;
mod entity;
mod error;
mod executor;
mod list;
mod pg;
mod sql;
mod value;

pub use accessor::{
    EntityAccessor, InsertOutcome, PureInsertOptions, PureInsertReturningOptions, SaveOptions,
};
pub use criteria::{Cmp, Criteria, Order, Selector};
pub use entity::{Entity, Partial, RowGet};
pub use error::AccessError;
pub use executor::{Executor, StatementOutcome, resolve};
pub use list::ListQuery;
pub use pg::{PgSession, PgSessionConfig, PgTransaction};
pub use sql::Dialect;
pub use value::{Row, Value};
