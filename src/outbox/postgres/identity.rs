//! identity_verifications and verification_checks tables

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::aggregate::{ApplicantDetails, IdentityVerification, VerificationCheck};
use crate::outbox::RepositoryError;

use super::{parse_column, Persistable};

async fn load_checks(
    conn: &mut PgConnection,
    verification_id: Uuid,
) -> Result<Vec<VerificationCheck>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT id, check_type, status, provider, provider_reference, failure_reason, completed_at
        FROM verification_checks
        WHERE verification_id = $1
        ORDER BY seq_num
        "#,
    )
    .bind(verification_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(VerificationCheck {
                id: row.try_get("id")?,
                check_type: parse_column(row, "check_type")?,
                status: parse_column(row, "status")?,
                provider: row.try_get("provider")?,
                provider_reference: row.try_get("provider_reference")?,
                failure_reason: row.try_get("failure_reason")?,
                completed_at: row.try_get("completed_at")?,
            })
        })
        .collect()
}

fn verification_from_row(
    row: &PgRow,
    checks: Vec<VerificationCheck>,
) -> Result<IdentityVerification, RepositoryError> {
    Ok(IdentityVerification {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        applicant: ApplicantDetails {
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            date_of_birth: row.try_get("date_of_birth")?,
            country: row.try_get("country")?,
        },
        status: parse_column(row, "status")?,
        checks,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        events: Vec::new(),
    })
}

#[async_trait]
impl Persistable for IdentityVerification {
    const TABLE: &'static str = "identity_verifications";

    async fn upsert(
        &self,
        conn: &mut PgConnection,
        expected_version: i64,
    ) -> Result<u64, sqlx::Error> {
        let applicant = &self.applicant;
        let result = sqlx::query(
            r#"
            INSERT INTO identity_verifications AS t (
                id, tenant_id, first_name, last_name, email, date_of_birth, country,
                status, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            WHERE t.version = $12 AND t.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(self.id)
        .bind(self.tenant_id)
        .bind(&applicant.first_name)
        .bind(&applicant.last_name)
        .bind(&applicant.email)
        .bind(&applicant.date_of_birth)
        .bind(&applicant.country)
        .bind(self.status.as_str())
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_children(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM verification_checks WHERE verification_id = $1")
            .bind(self.id)
            .execute(&mut *conn)
            .await?;

        for (seq_num, check) in self.checks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO verification_checks (
                    id, verification_id, seq_num, check_type, status, provider,
                    provider_reference, failure_reason, completed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(check.id)
            .bind(self.id)
            .bind(seq_num as i32)
            .bind(check.check_type.as_str())
            .bind(check.status.as_str())
            .bind(&check.provider)
            .bind(&check.provider_reference)
            .bind(&check.failure_reason)
            .bind(check.completed_at)
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
        let row = sqlx::query(
            "SELECT * FROM identity_verifications WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        match row {
            Some(row) => {
                let checks = load_checks(conn, id).await?;
                Ok(Some(verification_from_row(&row, checks)?))
            }
            None => Ok(None),
        }
    }

    async fn fetch_by_tenant(
        conn: &mut PgConnection,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM identity_verifications WHERE tenant_id = $1 ORDER BY created_at, id",
        )
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut verifications = Vec::with_capacity(rows.len());
        for row in &rows {
            let checks = load_checks(conn, row.try_get("id")?).await?;
            verifications.push(verification_from_row(row, checks)?);
        }
        Ok(verifications)
    }
}
