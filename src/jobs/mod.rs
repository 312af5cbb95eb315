//! Scheduled Jobs
//!
//! Background outbox relay. Unpublished outbox rows are delivered to the
//! message broker and then stamped as published, giving at-least-once
//! delivery.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::interval;
use uuid::Uuid;

use crate::outbox::{OutboxRecord, OutboxSource, RepositoryError};

// =========================================================================
// Publisher
// =========================================================================

/// Message broker contract
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, records: &[OutboxRecord]) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
#[error("publish to {topic} failed: {message}")]
pub struct PublishError {
    pub topic: String,
    pub message: String,
}

/// Publisher that writes each record to the log
#[derive(Debug, Clone, Default)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, topic: &str, records: &[OutboxRecord]) -> Result<(), PublishError> {
        for record in records {
            tracing::info!(
                topic,
                event_id = %record.id,
                event_type = %record.event_type,
                aggregate_id = %record.aggregate_id,
                tenant_id = %record.tenant_id,
                "Event published"
            );
        }
        Ok(())
    }
}

// =========================================================================
// Outbox relay
// =========================================================================

/// Configuration for the outbox relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Poll interval (default: 1 second)
    pub interval: Duration,
    /// Rows fetched per poll (default: 100)
    pub batch_size: i64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            batch_size: 100,
        }
    }
}

impl From<&crate::Config> for RelayConfig {
    fn from(config: &crate::Config) -> Self {
        Self {
            interval: config.outbox_relay_interval,
            batch_size: config.outbox_relay_batch_size,
        }
    }
}

/// Outbox relay - drains unpublished rows to the broker
pub struct OutboxRelay<O, P> {
    source: O,
    publisher: P,
    config: RelayConfig,
}

impl<O, P> OutboxRelay<O, P>
where
    O: OutboxSource + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(source: O, publisher: P) -> Self {
        Self {
            source,
            publisher,
            config: RelayConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(source: O, publisher: P, config: RelayConfig) -> Self {
        Self {
            source,
            publisher,
            config,
        }
    }

    /// Start the relay in the background.
    ///
    /// The loop exits once `shutdown` changes or its sender is dropped.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox relay started"
        );

        let mut ticker = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.relay_once().await {
                        tracing::error!(error = %e, "Outbox relay pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Outbox relay stopped");
                    break;
                }
            }
        }
    }

    /// Deliver one batch.
    ///
    /// Records are grouped by topic in write order. A topic whose
    /// publish fails is left unpublished and retried on the next pass.
    pub async fn relay_once(&self) -> Result<RelayReport, JobError> {
        let mut report = RelayReport::default();

        let records = self.source.fetch_unpublished(self.config.batch_size).await?;
        report.fetched = records.len();
        if records.is_empty() {
            report.completed_at = Utc::now();
            return Ok(report);
        }

        let mut by_topic: BTreeMap<String, Vec<OutboxRecord>> = BTreeMap::new();
        for record in records {
            by_topic.entry(record.topic()).or_default().push(record);
        }

        let mut delivered: Vec<Uuid> = Vec::new();
        for (topic, batch) in &by_topic {
            match self.publisher.publish(topic, batch).await {
                Ok(()) => delivered.extend(batch.iter().map(|r| r.id)),
                Err(e) => {
                    tracing::warn!(
                        topic = %topic,
                        rows = batch.len(),
                        error = %e,
                        "Publish failed"
                    );
                    report.errors.push(e.to_string());
                }
            }
        }

        if !delivered.is_empty() {
            report.published = self.source.mark_published(&delivered).await?;
        }
        report.completed_at = Utc::now();

        tracing::debug!(
            fetched = report.fetched,
            published = report.published,
            failed_topics = report.errors.len(),
            "Outbox relay pass complete"
        );
        Ok(report)
    }
}

/// Result of one relay pass
#[derive(Debug, Clone, Default)]
pub struct RelayReport {
    pub fetched: usize,
    pub published: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

// =========================================================================
// Tests
// =========================================================================
