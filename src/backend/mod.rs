//! Backend Module
//!
//! Contracts for the hosted data service: table-scoped CRUD and the
//! change-feed subscription mechanism. The service itself is external; the
//! in-memory implementation stands in for it locally and in tests.

mod memory;
mod types;

use async_trait::async_trait;
use tokio::sync::watch;

pub use memory::MemoryBackend;
pub use types::{
    BackendError, BackendErrorKind, ChangeEvent, ConnectionState, Filter, Operation,
    OperationFilter, Order, Row, Select, Subscription, SubscriptionError, SubscriptionId,
};

/// Convenience Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Table-scoped CRUD over the hosted relational store.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Reads rows matching the query.
    async fn select(&self, query: &Select) -> BackendResult<Vec<Row>>;

    /// Inserts a row and returns it as stored (with `id` and `created_at`).
    async fn insert(&self, table: &str, row: Row) -> BackendResult<Row>;

    /// Merges `patch` into the row with the given id.
    async fn update(&self, table: &str, id: i64, patch: Row) -> BackendResult<Row>;

    /// Deletes the row with the given id and returns it.
    async fn delete(&self, table: &str, id: i64) -> BackendResult<Row>;

    /// Fetches exactly one row by id.
    async fn get(&self, table: &str, id: i64) -> BackendResult<Row> {
        let rows = self.select(&Select::from(table).eq("id", id).limit(1)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::not_found(format!("{} row {} not found", table, id)))
    }
}

/// Realtime change notifications keyed by table and operation.
///
/// Delivery is at-least-once: notifications may be duplicated or reordered.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription for one table/operation combination.
    async fn subscribe(&self, table: &str, filter: OperationFilter) -> BackendResult<Subscription>;

    /// Releases a subscription previously returned by [`ChangeFeed::subscribe`].
    async fn unsubscribe(&self, id: SubscriptionId) -> BackendResult<()>;

    /// Observes the transport's connection state.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}
