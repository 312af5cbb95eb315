//! Payment Handler
//!
//! Payment order use cases: initiate, process through a rail, reverse and read.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::aggregate::{NewPaymentOrder, PaymentOrder, Versioned};
use crate::domain::{CallerContext, RoutingInfo};
use crate::engine::select_rail;
use crate::error::{AppError, AppResult};
use crate::outbox::AggregateStore;

use super::{
    authorize_mutation, parse_amount, parse_currency, with_conflict_retry, InitiatePaymentCommand,
    ListPaymentsQuery, PaymentPage, ReversePaymentCommand, DEFAULT_SAVE_ATTEMPTS,
};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Rejection from a payment rail; the message becomes the failure reason
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct RailError(pub String);

/// Submits a PROCESSING order to its clearing rail
#[async_trait]
pub trait RailAdapter: Send + Sync {
    async fn submit(&self, order: &PaymentOrder) -> Result<(), RailError>;
}

#[async_trait]
impl<T: RailAdapter + ?Sized> RailAdapter for Arc<T> {
    async fn submit(&self, order: &PaymentOrder) -> Result<(), RailError> {
        (**self).submit(order).await
    }
}

/// Rail that accepts every submission
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptingRail;

#[async_trait]
impl RailAdapter for AcceptingRail {
    async fn submit(&self, order: &PaymentOrder) -> Result<(), RailError> {
        tracing::debug!(payment_id = %order.id(), rail = %order.rail(), "Submitted to rail");
        Ok(())
    }
}

/// Handler for payment orders
#[derive(Clone)]
pub struct PaymentHandler<S, R = AcceptingRail> {
    store: S,
    rail: R,
    save_attempts: u32,
}

impl<S: AggregateStore> PaymentHandler<S, AcceptingRail> {
    pub fn new(store: S) -> Self {
        Self::with_rail(store, AcceptingRail)
    }
}

impl<S: AggregateStore, R: RailAdapter> PaymentHandler<S, R> {
    pub fn with_rail(store: S, rail: R) -> Self {
        Self {
            store,
            rail,
            save_attempts: DEFAULT_SAVE_ATTEMPTS,
        }
    }

    pub fn with_save_attempts(mut self, attempts: u32) -> Self {
        self.save_attempts = attempts;
        self
    }

    /// Validate routing, pick the rail and create an INITIATED order
    pub async fn initiate(
        &self,
        command: InitiatePaymentCommand,
        context: &CallerContext,
    ) -> AppResult<PaymentOrder> {
        authorize_mutation(context)?;

        let amount = parse_amount(&command.amount)?;
        let currency = parse_currency(&command.currency)?;
        let routing_info =
            RoutingInfo::new(&command.routing_number, &command.external_account_number)?;
        let is_internal = command.destination_account_id.is_some();
        let rail = select_rail(amount.value(), currency, is_internal, &command.destination_country);

        let order = PaymentOrder::initiate(
            NewPaymentOrder {
                tenant_id: context.tenant_id,
                source_account_id: command.source_account_id,
                destination_account_id: command.destination_account_id,
                amount,
                currency,
                rail,
                routing_info,
                reference: command.reference,
                description: command.description,
            },
            Utc::now(),
        )?;
        let order = self.store.save(order).await?;

        tracing::info!(
            payment_id = %order.id(),
            tenant_id = %context.tenant_id,
            rail = %order.rail(),
            amount = %order.amount(),
            currency = %order.currency(),
            "Payment order initiated"
        );

        Ok(order)
    }

    /// Move the order to PROCESSING, submit it, then settle or fail it
    pub async fn process(
        &self,
        payment_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<PaymentOrder> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;

        let processing = with_conflict_retry(self.save_attempts, move || async move {
            let order: PaymentOrder = self.store.find(tenant_id, payment_id).await?;
            let processing = order.mark_processing(Utc::now())?;
            Ok::<_, AppError>(self.store.save(processing).await?)
        })
        .await?;

        let outcome = self.rail.submit(&processing).await;
        if let Err(e) = &outcome {
            tracing::warn!(payment_id = %payment_id, error = %e, "Rail rejected payment");
        }
        let outcome = &outcome;

        let order = with_conflict_retry(self.save_attempts, move || async move {
            let order: PaymentOrder = self.store.find(tenant_id, payment_id).await?;
            let next = match outcome {
                Ok(()) => order.settle(Utc::now())?,
                Err(e) => order.fail(&e.0, Utc::now())?,
            };
            Ok::<_, AppError>(self.store.save(next).await?)
        })
        .await?;

        tracing::info!(
            payment_id = %payment_id,
            status = %order.status(),
            "Payment order processed"
        );
        Ok(order)
    }

    /// SETTLED -> REVERSED
    pub async fn reverse(
        &self,
        payment_id: Uuid,
        command: ReversePaymentCommand,
        context: &CallerContext,
    ) -> AppResult<PaymentOrder> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;
        let reason = command.reason.as_str();

        let order = with_conflict_retry(self.save_attempts, move || async move {
            let order: PaymentOrder = self.store.find(tenant_id, payment_id).await?;
            let reversed = order.reverse(reason, Utc::now())?;
            Ok::<_, AppError>(self.store.save(reversed).await?)
        })
        .await?;

        tracing::info!(payment_id = %payment_id, "Payment order reversed");
        Ok(order)
    }

    pub async fn get(&self, payment_id: Uuid, context: &CallerContext) -> AppResult<PaymentOrder> {
        Ok(self.store.find(context.tenant_id, payment_id).await?)
    }

    /// Page through the tenant's orders, optionally only those debiting one account
    pub async fn list(
        &self,
        query: ListPaymentsQuery,
        context: &CallerContext,
    ) -> AppResult<PaymentPage> {
        let page_size = match query.page_size {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(n) => n.min(MAX_PAGE_SIZE),
        } as usize;
        let offset = query.offset.unwrap_or(0) as usize;

        let orders: Vec<PaymentOrder> = self.store.list(context.tenant_id).await?;
        let matching: Vec<PaymentOrder> = orders
            .into_iter()
            .filter(|o| query.account_id.map_or(true, |a| o.source_account_id() == a))
            .collect();
        let total_count = matching.len();
        let payments = matching.into_iter().skip(offset).take(page_size).collect();

        Ok(PaymentPage { payments, total_count })
    }
}
