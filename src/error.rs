//! Error taxonomy for the access layer.
//!
//! The layer performs no local recovery: engine failures are passed through
//! as [`AccessError::Execution`] (or [`AccessError::ConstraintViolation`]
//! when the engine reports a constraint breach), and the only locally
//! synthesized failures are argument-validation ones at the accessor
//! boundary.

use thiserror::Error;

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AccessError {
    /// Malformed criteria or partial shape, unknown column name, or an
    /// empty bulk-insert batch.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A uniqueness or other integrity constraint was violated
    /// (SQLSTATE class 23 on Postgres).
    #[error("constraint violation")]
    ConstraintViolation(#[source] Source),

    /// Any other engine-level failure, propagated unmodified.
    #[error("statement execution failed")]
    Execution(#[source] Source),

    /// A returned row cell could not be converted to the expected type.
    #[error("failed to decode column `{column}`: {detail}")]
    Decode { column: String, detail: String },
}

impl AccessError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AccessError::InvalidArgument(msg.into())
    }

    pub(crate) fn decode(column: impl Into<String>, detail: impl Into<String>) -> Self {
        AccessError::Decode {
            column: column.into(),
            detail: detail.into(),
        }
    }
}
