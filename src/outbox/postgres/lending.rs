//! loan_applications, loans and amortization_entries tables

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::aggregate::{Loan, LoanApplication};
use crate::domain::RateBps;
use crate::engine::AmortizationEntry;
use crate::outbox::RepositoryError;

use super::{amount_column, parse_column, u32_column, Persistable};

// =========================================================================
// Loan applications
// =========================================================================

fn application_from_row(row: &PgRow) -> Result<LoanApplication, RepositoryError> {
    let credit_score = row
        .try_get::<Option<i32>, _>("credit_score")?
        .map(|score| {
            u16::try_from(score).map_err(|_| {
                RepositoryError::corrupt(format!("credit score out of range: {score}"))
            })
        })
        .transpose()?;
    let suggested_rate = row
        .try_get::<Option<i64>, _>("suggested_rate_bps")?
        .map(|bps| {
            u32::try_from(bps)
                .map(RateBps::new)
                .map_err(|_| {
                    RepositoryError::corrupt(format!("suggested rate out of range: {bps}"))
                })
        })
        .transpose()?;

    Ok(LoanApplication {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        applicant_id: row.try_get("applicant_id")?,
        requested_amount: amount_column(row, "requested_amount")?,
        currency: parse_column(row, "currency")?,
        term_months: u32_column(row, "term_months")?,
        purpose: row.try_get("purpose")?,
        status: parse_column(row, "status")?,
        decision_reason: row.try_get("decision_reason")?,
        credit_score,
        suggested_rate,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        events: Vec::new(),
    })
}

#[async_trait]
impl Persistable for LoanApplication {
    const TABLE: &'static str = "loan_applications";

    async fn upsert(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO loan_applications AS t (
                id, tenant_id, applicant_id, requested_amount, currency, term_months, purpose,
                status, decision_reason, credit_score, suggested_rate_bps, version,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                decision_reason = EXCLUDED.decision_reason,
                credit_score = EXCLUDED.credit_score,
                suggested_rate_bps = EXCLUDED.suggested_rate_bps,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE t.version = $15 AND t.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(self.id)
        .bind(self.tenant_id)
        .bind(self.applicant_id)
        .bind(self.requested_amount.value())
        .bind(self.currency.code())
        .bind(i64::from(self.term_months))
        .bind(&self.purpose)
        .bind(self.status.as_str())
        .bind(&self.decision_reason)
        .bind(self.credit_score.map(i32::from))
        .bind(self.suggested_rate.map(|rate| i64::from(rate.bps())))
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
        let row = sqlx::query("SELECT * FROM loan_applications WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(application_from_row).transpose()
    }

    async fn fetch_by_tenant(
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM loan_applications WHERE tenant_id = $1 ORDER BY created_at, id",
        )
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(application_from_row).collect()
    }
}

// =========================================================================
// Loans
// =========================================================================

async fn load_schedule(
    conn: &mut PgConnection,
    loan_id: Uuid,
) -> Result<Vec<AmortizationEntry>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT period, due_date, principal, interest, total_payment, remaining_balance
        FROM amortization_entries
        WHERE loan_id = $1
        ORDER BY period
        "#,
    )
    .bind(loan_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(AmortizationEntry {
                period: u32_column(row, "period")?,
                due_date: row.try_get("due_date")?,
                principal: row.try_get("principal")?,
                interest: row.try_get("interest")?,
                total_payment: row.try_get("total_payment")?,
                remaining_balance: row.try_get("remaining_balance")?,
            })
        })
        .collect()
}

fn loan_from_row(row: &PgRow, schedule: Vec<AmortizationEntry>) -> Result<Loan, RepositoryError> {
    let bps = u32_column(row, "interest_rate_bps")?;
    Ok(Loan {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        application_id: row.try_get("application_id")?,
        borrower_account_id: row.try_get("borrower_account_id")?,
        principal: amount_column(row, "principal")?,
        currency: parse_column(row, "currency")?,
        interest_rate: RateBps::new(bps),
        term_months: u32_column(row, "term_months")?,
        status: parse_column(row, "status")?,
        schedule,
        outstanding_balance: row.try_get("outstanding_balance")?,
        next_payment_due: row.try_get("next_payment_due")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        events: Vec::new(),
    })
}

#[async_trait]
impl Persistable for Loan {
    const TABLE: &'static str = "loans";

    async fn upsert(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO loans AS t (
                id, tenant_id, application_id, borrower_account_id, principal, currency,
                interest_rate_bps, term_months, status, outstanding_balance, next_payment_due,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                outstanding_balance = EXCLUDED.outstanding_balance,
                next_payment_due = EXCLUDED.next_payment_due,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE t.version = $15 AND t.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(self.id)
        .bind(self.tenant_id)
        .bind(self.application_id)
        .bind(self.borrower_account_id)
        .bind(self.principal.value())
        .bind(self.currency.code())
        .bind(i64::from(self.interest_rate.bps()))
        .bind(i64::from(self.term_months))
        .bind(self.status.as_str())
        .bind(self.outstanding_balance)
        .bind(self.next_payment_due)
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_children(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM amortization_entries WHERE loan_id = $1")
            .bind(self.id)
            .execute(&mut *conn)
            .await?;

        for entry in &self.schedule {
            sqlx::query(
                r#"
                INSERT INTO amortization_entries (
                    loan_id, period, due_date, principal, interest, total_payment, remaining_balance
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(self.id)
            .bind(i64::from(entry.period))
            .bind(entry.due_date)
            .bind(entry.principal)
            .bind(entry.interest)
            .bind(entry.total_payment)
            .bind(entry.remaining_balance)
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
        let row = sqlx::query("SELECT * FROM loans WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => {
                let schedule = load_schedule(conn, id).await?;
                Ok(Some(loan_from_row(&row, schedule)?))
            }
            None => Ok(None),
        }
    }

    async fn fetch_by_tenant(
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM loans WHERE tenant_id = $1 ORDER BY created_at, id")
            .bind(tenant_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut loans = Vec::with_capacity(rows.len());
        for row in &rows {
            let schedule = load_schedule(conn, row.try_get("id")?).await?;
            loans.push(loan_from_row(row, schedule)?);
        }
        Ok(loans)
    }
}
