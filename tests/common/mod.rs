//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tower::util::ServiceExt;
use uuid::Uuid;

use bank_core::api::{self, AppState};
use bank_core::bureau::{BureauError, CreditBureauClient};
use bank_core::handlers::{AcceptingRail, RailAdapter};
use bank_core::InMemoryStore;

const SCHEMA: &str = include_str!("../../migrations/0001_core_schema.sql");

static SCHEMA_APPLIED: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

/// Connect to `DATABASE_URL` and make sure the schema exists.
///
/// Tables are not truncated; every test works under its own tenant.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    SCHEMA_APPLIED
        .get_or_init(|| async {
            pool.execute(SCHEMA).await.expect("Failed to apply schema");
        })
        .await;
    pool
}

/// Bureau that always answers with one score
pub struct FixedBureau(pub u16);

#[async_trait]
impl CreditBureauClient for FixedBureau {
    async fn get_credit_score(
        &self,
        _applicant_id: Uuid,
        _deadline: tokio::time::Instant,
    ) -> Result<u16, BureauError> {
        Ok(self.0)
    }
}

/// Router over an in-memory store
pub fn test_app(score: u16) -> (Router, InMemoryStore) {
    let store = InMemoryStore::new();
    let rail: Arc<dyn RailAdapter> = Arc::new(AcceptingRail);
    let bureau: Arc<dyn CreditBureauClient> = Arc::new(FixedBureau(score));
    let state = AppState::new(store.clone(), rail, bureau);
    (api::build_router(state), store)
}

/// Caller identity sent on every request
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub tenant_id: Uuid,
    pub role: &'static str,
}

impl Caller {
    pub fn operator() -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            role: "operator",
        }
    }

    pub fn with_role(self, role: &'static str) -> Self {
        Self { role, ..self }
    }
}

pub async fn send(
    app: &Router,
    caller: Option<Caller>,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder
            .header("x-tenant-id", caller.tenant_id.to_string())
            .header("x-caller-role", caller.role);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}
