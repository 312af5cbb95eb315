//! Outbox module
//!
//! Transactional repository. Saving an aggregate writes its current-state
//! row, replaces its child rows and appends one outbox row per pending event,
//! all in one transaction guarded by the aggregate version.

mod error;
mod memory;
mod postgres;
mod record;

pub use error::RepositoryError;
pub use memory::InMemoryStore;
pub use postgres::{Persistable, PgStore};
pub use record::OutboxRecord;

use async_trait::async_trait;
use uuid::Uuid;

/// Persistence contract shared by the Postgres and in-memory stores
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Persist state and pending events atomically.
    ///
    /// Returns the aggregate with its pending events drained. Fails with
    /// [`RepositoryError::ConcurrencyConflict`] when the stored row is no
    /// longer at the version this instance was derived from.
    async fn save<A: Persistable>(&self, aggregate: A) -> Result<A, RepositoryError>;

    /// Persist two aggregates in one transaction
    async fn save_pair<A: Persistable, B: Persistable>(
        &self,
        first: A,
        second: B,
    ) -> Result<(A, B), RepositoryError>;

    /// Load an aggregate owned by `tenant_id`, with no pending events
    async fn find<A: Persistable>(&self, tenant_id: Uuid, id: Uuid) -> Result<A, RepositoryError>;

    /// All aggregates of one kind owned by `tenant_id`, oldest first
    async fn list<A: Persistable>(&self, tenant_id: Uuid) -> Result<Vec<A>, RepositoryError>;
}

/// Read side of the outbox used by the relay
#[async_trait]
pub trait OutboxSource: Send + Sync {
    /// Unpublished rows ordered by `created_at`, ties in write order
    async fn fetch_unpublished(
        &self,
        batch_size: i64,
    ) -> Result<Vec<OutboxRecord>, RepositoryError>;

    /// Stamp `published_at` on rows that are still unpublished
    async fn mark_published(&self, ids: &[Uuid]) -> Result<u64, RepositoryError>;
}
