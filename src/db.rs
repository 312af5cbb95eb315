//! Database module
//!
//! Connectivity and schema checks run before serving.

use sqlx::PgPool;

use crate::aggregate::{
    Campaign, DepositPosition, DepositProduct, IdentityVerification, Loan, LoanApplication,
    PaymentOrder,
};
use crate::outbox::Persistable;

/// Child and outbox tables written by the store
const SUPPORT_TABLES: [&str; 4] = [
    "interest_tiers",
    "verification_checks",
    "amortization_entries",
    "outbox",
];

/// Tables the store reads and writes
pub fn required_tables() -> Vec<&'static str> {
    let mut tables = vec![
        PaymentOrder::TABLE,
        DepositProduct::TABLE,
        DepositPosition::TABLE,
        Campaign::TABLE,
        IdentityVerification::TABLE,
        LoanApplication::TABLE,
        Loan::TABLE,
    ];
    tables.extend(SUPPORT_TABLES);
    tables
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in required_tables() {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
