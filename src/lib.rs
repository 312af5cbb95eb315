//! bank_core Library
//!
//! Versioned aggregates, calculation engines and the transactional outbox
//! shared by the payment, deposit, identity and lending services.

pub mod aggregate;
pub mod api;
pub mod bureau;
pub mod domain;
pub mod engine;
pub mod handlers;
pub mod jobs;
pub mod outbox;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Amount, AmountError, CallerContext, CallerRole, Currency, DomainError};
pub use outbox::{AggregateStore, InMemoryStore, PgStore, RepositoryError};
