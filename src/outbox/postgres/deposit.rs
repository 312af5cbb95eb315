//! deposit_products, interest_tiers, deposit_positions and campaigns tables

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::aggregate::{Campaign, DepositPosition, DepositProduct};
use crate::domain::{InterestTier, PromotionalRate, RateBps};
use crate::outbox::RepositoryError;

use super::{amount_column, parse_column, u32_column, Persistable};

fn rate_column(row: &PgRow, column: &str) -> Result<RateBps, RepositoryError> {
    let bps: i64 = row.try_get(column)?;
    u32::try_from(bps)
        .map(RateBps::new)
        .map_err(|_| RepositoryError::corrupt(format!("{column} out of range: {bps}")))
}

// =========================================================================
// Deposit products
// =========================================================================

async fn load_tiers(
    conn: &mut PgConnection,
    product_id: Uuid,
) -> Result<Vec<InterestTier>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT min_balance, max_balance, rate_bps
        FROM interest_tiers
        WHERE product_id = $1
        ORDER BY seq_num
        "#,
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            InterestTier::new(
                row.try_get("min_balance")?,
                row.try_get("max_balance")?,
                rate_column(row, "rate_bps")?,
            )
            .map_err(|e| RepositoryError::corrupt(format!("interest tier: {e}")))
        })
        .collect()
}

fn product_from_row(
    row: &PgRow,
    tiers: Vec<InterestTier>,
) -> Result<DepositProduct, RepositoryError> {
    Ok(DepositProduct {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        currency: parse_column(row, "currency")?,
        tiers,
        term_days: u32_column(row, "term_days")?,
        is_active: row.try_get("is_active")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        events: Vec::new(),
    })
}

#[async_trait]
impl Persistable for DepositProduct {
    const TABLE: &'static str = "deposit_products";

    async fn upsert(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO deposit_products AS t (
                id, tenant_id, name, currency, term_days, is_active, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                is_active = EXCLUDED.is_active,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE t.version = $10 AND t.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(self.id)
        .bind(self.tenant_id)
        .bind(&self.name)
        .bind(self.currency.code())
        .bind(i64::from(self.term_days))
        .bind(self.is_active)
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_children(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM interest_tiers WHERE product_id = $1")
            .bind(self.id)
            .execute(&mut *conn)
            .await?;

        for (seq_num, tier) in self.tiers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO interest_tiers (product_id, seq_num, min_balance, max_balance, rate_bps)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(self.id)
            .bind(seq_num as i32)
            .bind(tier.min_balance())
            .bind(tier.max_balance())
            .bind(i64::from(tier.rate().bps()))
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn fetch(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM deposit_products WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => {
                let tiers = load_tiers(conn, id).await?;
                Ok(Some(product_from_row(&row, tiers)?))
            }
            None => Ok(None),
        }
    }

    async fn fetch_by_tenant(
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM deposit_products WHERE tenant_id = $1 ORDER BY created_at, id",
        )
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut products = Vec::with_capacity(rows.len());
        for row in &rows {
            let tiers = load_tiers(conn, row.try_get("id")?).await?;
            products.push(product_from_row(row, tiers)?);
        }
        Ok(products)
    }
}

// =========================================================================
// Deposit positions
// =========================================================================

fn position_from_row(row: &PgRow) -> Result<DepositPosition, RepositoryError> {
    Ok(DepositPosition {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        account_id: row.try_get("account_id")?,
        product_id: row.try_get("product_id")?,
        principal: amount_column(row, "principal")?,
        currency: parse_column(row, "currency")?,
        accrued_interest: row.try_get::<Decimal, _>("accrued_interest")?,
        status: parse_column(row, "status")?,
        opened_at: row.try_get("opened_at")?,
        maturity_date: row.try_get("maturity_date")?,
        last_accrual_date: row.try_get("last_accrual_date")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        events: Vec::new(),
    })
}

#[async_trait]
impl Persistable for DepositPosition {
    const TABLE: &'static str = "deposit_positions";

    async fn upsert(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO deposit_positions AS t (
                id, tenant_id, account_id, product_id, principal, currency, accrued_interest,
                status, opened_at, maturity_date, last_accrual_date, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                accrued_interest = EXCLUDED.accrued_interest,
                status = EXCLUDED.status,
                last_accrual_date = EXCLUDED.last_accrual_date,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE t.version = $15 AND t.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(self.id)
        .bind(self.tenant_id)
        .bind(self.account_id)
        .bind(self.product_id)
        .bind(self.principal.value())
        .bind(self.currency.code())
        .bind(self.accrued_interest)
        .bind(self.status.as_str())
        .bind(self.opened_at)
        .bind(self.maturity_date)
        .bind(self.last_accrual_date)
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
        let row = sqlx::query("SELECT * FROM deposit_positions WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn fetch_by_tenant(
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM deposit_positions WHERE tenant_id = $1 ORDER BY created_at, id",
        )
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(position_from_row).collect()
    }
}

// =========================================================================
// Campaigns
// =========================================================================

fn campaign_from_row(row: &PgRow) -> Result<Campaign, RepositoryError> {
    let eligibility_criteria: String = row.try_get("eligibility_criteria")?;
    let promotional_rate = PromotionalRate::new(
        rate_column(row, "bonus_rate_bps")?,
        &eligibility_criteria,
        row.try_get("min_deposit")?,
        row.try_get("max_deposit")?,
    )
    .map_err(|e| RepositoryError::corrupt(format!("promotional rate: {e}")))?;

    Ok(Campaign {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        product_id: row.try_get("product_id")?,
        promotional_rate,
        target_audience: parse_column(row, "target_audience")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status: parse_column(row, "status")?,
        total_enrollments: row.try_get("total_enrollments")?,
        total_deposit_value: row.try_get("total_deposit_value")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        events: Vec::new(),
    })
}

#[async_trait]
impl Persistable for Campaign {
    const TABLE: &'static str = "campaigns";

    async fn upsert(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> Result<u64, sqlx::Error> {
        let promo = &self.promotional_rate;
        let result = sqlx::query(
            r#"
            INSERT INTO campaigns AS t (
                id, tenant_id, name, description, product_id, bonus_rate_bps, eligibility_criteria,
                min_deposit, max_deposit, target_audience, status, start_date, end_date,
                total_enrollments, total_deposit_value, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                total_enrollments = EXCLUDED.total_enrollments,
                total_deposit_value = EXCLUDED.total_deposit_value,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE t.version = $19 AND t.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(self.id)
        .bind(self.tenant_id)
        .bind(&self.name)
        .bind(&self.description)
        .bind(self.product_id)
        .bind(i64::from(promo.bonus_rate().bps()))
        .bind(promo.eligibility_criteria())
        .bind(promo.min_deposit())
        .bind(promo.max_deposit())
        .bind(self.target_audience.as_str())
        .bind(self.status.as_str())
        .bind(self.start_date)
        .bind(self.end_date)
        .bind(self.total_enrollments)
        .bind(self.total_deposit_value)
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
        let row = sqlx::query("SELECT * FROM campaigns WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(campaign_from_row).transpose()
    }

    async fn fetch_by_tenant(
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM campaigns WHERE tenant_id = $1 ORDER BY created_at, id",
        )
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(campaign_from_row).collect()
    }
}
