//! payment_orders table

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::aggregate::PaymentOrder;
use crate::domain::RoutingInfo;
use crate::outbox::RepositoryError;

use super::{amount_column, parse_column, Persistable};

fn payment_from_row(row: &PgRow) -> Result<PaymentOrder, RepositoryError> {
    let routing_number: String = row.try_get("routing_number")?;
    let external_account_number: String = row.try_get("external_account_number")?;
    let routing_info = RoutingInfo::new(&routing_number, &external_account_number)
        .map_err(|e| RepositoryError::corrupt(format!("routing info: {e}")))?;

    Ok(PaymentOrder {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        source_account_id: row.try_get("source_account_id")?,
        destination_account_id: row.try_get("destination_account_id")?,
        amount: amount_column(row, "amount")?,
        currency: parse_column(row, "currency")?,
        rail: parse_column(row, "rail")?,
        status: parse_column(row, "status")?,
        routing_info,
        reference: row.try_get("reference")?,
        description: row.try_get("description")?,
        failure_reason: row.try_get("failure_reason")?,
        initiated_at: row.try_get("initiated_at")?,
        settled_at: row.try_get("settled_at")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        events: Vec::new(),
    })
}

#[async_trait]
impl Persistable for PaymentOrder {
    const TABLE: &'static str = "payment_orders";

    async fn upsert(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_orders AS t (
                id, tenant_id, source_account_id, destination_account_id, amount, currency,
                rail, status, routing_number, external_account_number, reference, description,
                failure_reason, initiated_at, settled_at, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                rail = EXCLUDED.rail,
                status = EXCLUDED.status,
                failure_reason = EXCLUDED.failure_reason,
                settled_at = EXCLUDED.settled_at,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE t.version = $19 AND t.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(self.id)
        .bind(self.tenant_id)
        .bind(self.source_account_id)
        .bind(self.destination_account_id)
        .bind(self.amount.value())
        .bind(self.currency.code())
        .bind(self.rail.as_str())
        .bind(self.status.as_str())
        .bind(self.routing_info.routing_number())
        .bind(self.routing_info.external_account_number())
        .bind(&self.reference)
        .bind(&self.description)
        .bind(&self.failure_reason)
        .bind(self.initiated_at)
        .bind(self.settled_at)
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn fetch(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM payment_orders WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn fetch_by_tenant(
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM payment_orders WHERE tenant_id = $1 ORDER BY created_at, id",
        )
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(payment_from_row).collect()
    }
}
