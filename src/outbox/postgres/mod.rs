//! Postgres store
//!
//! Conditional upsert on the expected prior version, wholesale child
//! replacement and outbox inserts inside a single transaction.

mod deposit;
mod identity;
mod lending;
mod payment;

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::domain::Amount;

use super::record::records_for;
use super::{AggregateStore, OutboxRecord, OutboxSource, RepositoryError};

/// Row mapping for an aggregate kind
#[async_trait]
pub trait Persistable: AggregateRoot {
    /// Current-state table
    const TABLE: &'static str;

    /// Insert, or update only where the stored version equals
    /// `expected_version` and the tenant matches. Returns rows affected.
    async fn upsert(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> Result<u64, sqlx::Error>;

    /// Delete and reinsert owned child rows
    async fn replace_children(&self, _conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn fetch(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, RepositoryError>;

    async fn fetch_by_tenant(
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, RepositoryError>;
}

/// Aggregate store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Write one aggregate inside an open transaction. Returns outbox rows written.
    async fn write<A: Persistable>(
        conn: &mut PgConnection,
        aggregate: &A,
    ) -> Result<usize, RepositoryError> {
        let expected_version = aggregate.expected_prior_version();
        let affected = aggregate.upsert(conn, expected_version).await?;
        if affected == 0 {
            tracing::warn!(
                aggregate_type = A::AGGREGATE_TYPE,
                aggregate_id = %aggregate.id(),
                expected_version,
                "Concurrency conflict on save"
            );
            return Err(RepositoryError::ConcurrencyConflict {
                aggregate_type: A::AGGREGATE_TYPE,
                aggregate_id: aggregate.id(),
                expected_version,
            });
        }

        aggregate.replace_children(conn).await?;

        let records = records_for(aggregate.pending_events())?;
        for record in &records {
            insert_outbox(conn, record).await?;
        }

        tracing::debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %aggregate.id(),
            version = aggregate.version(),
            outbox_rows = records.len(),
            "Aggregate saved"
        );
        Ok(records.len())
    }
}

async fn insert_outbox(conn: &mut PgConnection, record: &OutboxRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO outbox
            (id, aggregate_id, aggregate_type, tenant_id, event_type, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id)
    .bind(record.aggregate_id)
    .bind(&record.aggregate_type)
    .bind(record.tenant_id)
    .bind(&record.event_type)
    .bind(&record.payload)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl AggregateStore for PgStore {
    async fn save<A: Persistable>(&self, aggregate: A) -> Result<A, RepositoryError> {
        if aggregate.pending_events().is_empty() {
            return Ok(aggregate);
        }

        let mut tx = self.pool.begin().await?;
        Self::write(&mut tx, &aggregate).await?;
        tx.commit().await?;

        Ok(aggregate.clear_events())
    }

    async fn save_pair<A: Persistable, B: Persistable>(
        &self,
        first: A,
        second: B,
    ) -> Result<(A, B), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        if !first.pending_events().is_empty() {
            Self::write(&mut tx, &first).await?;
        }
        if !second.pending_events().is_empty() {
            Self::write(&mut tx, &second).await?;
        }
        tx.commit().await?;

        Ok((first.clear_events(), second.clear_events()))
    }

    async fn find<A: Persistable>(&self, tenant_id: Uuid, id: Uuid) -> Result<A, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        A::fetch(&mut conn, tenant_id, id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(A::AGGREGATE_TYPE, id))
    }

    async fn list<A: Persistable>(&self, tenant_id: Uuid) -> Result<Vec<A>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        A::fetch_by_tenant(&mut conn, tenant_id).await
    }
}

#[async_trait]
impl OutboxSource for PgStore {
    async fn fetch_unpublished(
        &self,
        batch_size: i64,
    ) -> Result<Vec<OutboxRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, aggregate_id, aggregate_type, tenant_id, event_type, payload,
                   created_at, published_at
            FROM outbox
            WHERE published_at IS NULL
            ORDER BY created_at ASC, seq ASC
            LIMIT $1
            "#,
        )
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(OutboxRecord {
                    id: row.try_get("id")?,
                    aggregate_id: row.try_get("aggregate_id")?,
                    aggregate_type: row.try_get("aggregate_type")?,
                    tenant_id: row.try_get("tenant_id")?,
                    event_type: row.try_get("event_type")?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                    published_at: row.try_get("published_at")?,
                })
            })
            .collect()
    }

    async fn mark_published(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox SET published_at = NOW()
            WHERE id = ANY($1) AND published_at IS NULL
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// =========================================================================
// Row decoding helpers
// =========================================================================

/// Text column holding a closed enumeration
pub(crate) fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> Result<T, RepositoryError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| RepositoryError::corrupt(format!("unreadable {column}: {raw:?}")))
}

pub(crate) fn amount_column(row: &PgRow, column: &str) -> Result<Amount, RepositoryError> {
    let value: Decimal = row.try_get(column)?;
    Amount::new(value).map_err(|e| RepositoryError::corrupt(format!("{column}: {e}")))
}

/// BIGINT column holding an unsigned 32-bit count
pub(crate) fn u32_column(row: &PgRow, column: &str) -> Result<u32, RepositoryError> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value)
        .map_err(|_| RepositoryError::corrupt(format!("{column} out of range: {value}")))
}
