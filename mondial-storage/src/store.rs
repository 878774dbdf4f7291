//! The store boundary: execute one parameterized statement, get rows back.

use std::sync::Arc;

use async_trait::async_trait;
use mondial_core::{MondialResult, Row};

use crate::QueryPlan;

/// A relational store.
///
/// Implementations run the plan's SQL with its binds in order. Any failure of
/// the underlying driver surfaces as a single `FetchFailure`; callers never see
/// driver-specific errors.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run a query and return its rows as column-name to value maps.
    async fn query(&self, plan: &QueryPlan) -> MondialResult<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, plan: &QueryPlan) -> MondialResult<u64>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn query(&self, plan: &QueryPlan) -> MondialResult<Vec<Row>> {
        (**self).query(plan).await
    }

    async fn execute(&self, plan: &QueryPlan) -> MondialResult<u64> {
        (**self).execute(plan).await
    }
}

/// Shared, type-erased store handle.
pub type SharedStore = Arc<dyn Store>;
