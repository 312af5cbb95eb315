//! In-memory store
//!
//! Same version check and outbox semantics as [`PgStore`](super::PgStore),
//! kept behind one lock so a pair save is all-or-nothing. Used by the unit
//! and API tests and for running without a database.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::AggregateRoot;

use super::record::records_for;
use super::{AggregateStore, OutboxRecord, OutboxSource, Persistable, RepositoryError};

type RowKey = (&'static str, Uuid);

struct StoredRow {
    seq: u64,
    tenant_id: Uuid,
    version: i64,
    value: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct State {
    rows: HashMap<RowKey, StoredRow>,
    outbox: Vec<OutboxRecord>,
    next_seq: u64,
}

impl State {
    /// Mirrors the conditional upsert: absent rows insert, present rows must
    /// match the expected version and tenant.
    fn check<A: AggregateRoot>(&self, aggregate: &A) -> Result<(), RepositoryError> {
        let expected_version = aggregate.expected_prior_version();
        match self.rows.get(&(A::AGGREGATE_TYPE, aggregate.id())) {
            Some(row)
                if row.version != expected_version || row.tenant_id != aggregate.tenant_id() =>
            {
                tracing::warn!(
                    aggregate_type = A::AGGREGATE_TYPE,
                    aggregate_id = %aggregate.id(),
                    expected_version,
                    stored_version = row.version,
                    "Concurrency conflict on save"
                );
                Err(RepositoryError::ConcurrencyConflict {
                    aggregate_type: A::AGGREGATE_TYPE,
                    aggregate_id: aggregate.id(),
                    expected_version,
                })
            }
            _ => Ok(()),
        }
    }

    fn write<A: AggregateRoot>(&mut self, aggregate: &A, records: Vec<OutboxRecord>) {
        let key = (A::AGGREGATE_TYPE, aggregate.id());
        let seq = match self.rows.get(&key) {
            Some(row) => row.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        tracing::debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %aggregate.id(),
            version = aggregate.version(),
            outbox_rows = records.len(),
            "Aggregate saved"
        );
        self.rows.insert(
            key,
            StoredRow {
                seq,
                tenant_id: aggregate.tenant_id(),
                version: aggregate.version(),
                value: Box::new(aggregate.clone().clear_events()),
            },
        );
        self.outbox.extend(records);
    }
}

/// Aggregate store held in process memory
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every outbox row written so far, in write order
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.read().await.outbox.clone()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl AggregateStore for InMemoryStore {
    async fn save<A: Persistable>(&self, aggregate: A) -> Result<A, RepositoryError> {
        if aggregate.pending_events().is_empty() {
            return Ok(aggregate);
        }
        let records = records_for(aggregate.pending_events())?;

        let mut state = self.state.write().await;
        state.check(&aggregate)?;
        state.write(&aggregate, records);

        Ok(aggregate.clear_events())
    }

    async fn save_pair<A: Persistable, B: Persistable>(
        &self,
        first: A,
        second: B,
    ) -> Result<(A, B), RepositoryError> {
        let first_records = records_for(first.pending_events())?;
        let second_records = records_for(second.pending_events())?;

        let mut state = self.state.write().await;
        if !first_records.is_empty() {
            state.check(&first)?;
        }
        if !second_records.is_empty() {
            state.check(&second)?;
        }
        if !first_records.is_empty() {
            state.write(&first, first_records);
        }
        if !second_records.is_empty() {
            state.write(&second, second_records);
        }

        Ok((first.clear_events(), second.clear_events()))
    }

    async fn find<A: Persistable>(&self, tenant_id: Uuid, id: Uuid) -> Result<A, RepositoryError> {
        let state = self.state.read().await;
        state
            .rows
            .get(&(A::AGGREGATE_TYPE, id))
            .filter(|row| row.tenant_id == tenant_id)
            .and_then(|row| row.value.downcast_ref::<A>())
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(A::AGGREGATE_TYPE, id))
    }

    async fn list<A: Persistable>(&self, tenant_id: Uuid) -> Result<Vec<A>, RepositoryError> {
        let state = self.state.read().await;
        let mut rows: Vec<&StoredRow> = state
            .rows
            .iter()
            .filter(|((aggregate_type, _), row)| {
                *aggregate_type == A::AGGREGATE_TYPE && row.tenant_id == tenant_id
            })
            .map(|(_, row)| row)
            .collect();
        rows.sort_by_key(|row| row.seq);

        Ok(rows
            .into_iter()
            .filter_map(|row| row.value.downcast_ref::<A>().cloned())
            .collect())
    }
}

#[async_trait]
impl OutboxSource for InMemoryStore {
    async fn fetch_unpublished(
        &self,
        batch_size: i64,
    ) -> Result<Vec<OutboxRecord>, RepositoryError> {
        let limit = usize::try_from(batch_size).unwrap_or(0);
        let state = self.state.read().await;
        let mut pending: Vec<OutboxRecord> = state
            .outbox
            .iter()
            .filter(|record| !record.is_published())
            .cloned()
            .collect();
        // Stable sort keeps write order for shared timestamps
        pending.sort_by_key(|record| record.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_published(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut marked = 0;
        for record in state.outbox.iter_mut() {
            if record.published_at.is_none() && ids.contains(&record.id) {
                record.published_at = Some(now);
                marked += 1;
            }
        }
        Ok(marked)
    }
}
