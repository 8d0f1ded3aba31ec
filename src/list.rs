//! Seam for the external list-building collaborator.
//!
//! Filtered/paged/sorted listing is owned by a collaborator this layer does
//! not interpret: [`crate::accessor::EntityAccessor::get_list`] resolves the
//! execution context and hands it over, nothing more.

use async_trait::async_trait;

use crate::error::AccessError;
use crate::executor::Executor;

/// A black-box list query. Implementations build and run whatever statements
/// they need against the executor they are given and define their own output
/// shape.
#[async_trait]
pub trait ListQuery: Send + Sync {
    type Output;

    async fn run(&self, executor: &dyn Executor) -> Result<Self::Output, AccessError>;
}
