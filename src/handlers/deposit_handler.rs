//! Deposit Handler
//!
//! Products, positions, interest accrual and promotional campaigns.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::aggregate::{
    days_between, Campaign, DepositPosition, DepositProduct, NewCampaign, PositionStatus,
    TargetAudience, Versioned,
};
use crate::domain::{CallerContext, DomainError, InterestTier, PromotionalRate, RateBps};
use crate::engine::{accrue, accrue_with_campaign};
use crate::error::{AppError, AppResult};
use crate::outbox::AggregateStore;

use super::{
    authorize_mutation, parse_amount, parse_currency, with_conflict_retry, AccrualBatchResult,
    AccrueInterestCommand, ApplyCampaignRateCommand, CampaignRateResult, CreateCampaignCommand,
    CreateDepositProductCommand, OpenDepositPositionCommand, DEFAULT_SAVE_ATTEMPTS,
};

/// Handler for deposit products, positions and campaigns
#[derive(Clone)]
pub struct DepositHandler<S> {
    store: S,
    save_attempts: u32,
}

impl<S: AggregateStore> DepositHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            save_attempts: DEFAULT_SAVE_ATTEMPTS,
        }
    }

    pub fn with_save_attempts(mut self, attempts: u32) -> Self {
        self.save_attempts = attempts;
        self
    }

    // =========================================================================
    // Products
    // =========================================================================

    pub async fn create_product(
        &self,
        command: CreateDepositProductCommand,
        context: &CallerContext,
    ) -> AppResult<DepositProduct> {
        authorize_mutation(context)?;

        let currency = parse_currency(&command.currency)?;
        let tiers = command
            .tiers
            .iter()
            .map(|t| InterestTier::new(t.min_balance, t.max_balance, RateBps::new(t.rate_bps)))
            .collect::<Result<Vec<_>, DomainError>>()?;

        let product = DepositProduct::create(
            context.tenant_id,
            &command.name,
            currency,
            tiers,
            command.term_days,
            Utc::now(),
        )?;
        let product = self.store.save(product).await?;

        tracing::info!(
            product_id = %product.id(),
            tenant_id = %context.tenant_id,
            tiers = product.tiers().len(),
            term_days = product.term_days(),
            "Deposit product created"
        );
        Ok(product)
    }

    pub async fn get_product(
        &self,
        product_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<DepositProduct> {
        Ok(self.store.find(context.tenant_id, product_id).await?)
    }

    // =========================================================================
    // Positions
    // =========================================================================

    /// Open a position on an active product of the same currency.
    /// Term products mature `term_days` after opening.
    pub async fn open_position(
        &self,
        command: OpenDepositPositionCommand,
        context: &CallerContext,
    ) -> AppResult<DepositPosition> {
        authorize_mutation(context)?;

        let principal = parse_amount(&command.principal)?;
        let currency = parse_currency(&command.currency)?;
        let product: DepositProduct = self.store.find(context.tenant_id, command.product_id).await?;

        if !product.is_active() {
            return Err(DomainError::business_rule(format!(
                "deposit product {} is not active",
                product.id()
            ))
            .into());
        }
        if product.currency() != currency {
            return Err(DomainError::validation(format!(
                "currency {} does not match product currency {}",
                currency,
                product.currency()
            ))
            .into());
        }

        let now = Utc::now();
        let maturity = product
            .is_term_deposit()
            .then(|| now + Duration::days(i64::from(product.term_days())));

        let position = DepositPosition::open(
            context.tenant_id,
            command.account_id,
            product.id(),
            principal,
            currency,
            maturity,
            now,
        )?;
        let position = self.store.save(position).await?;

        tracing::info!(
            position_id = %position.id(),
            product_id = %product.id(),
            principal = %principal,
            "Deposit position opened"
        );
        Ok(position)
    }

    pub async fn get_position(
        &self,
        position_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<DepositPosition> {
        Ok(self.store.find(context.tenant_id, position_id).await?)
    }

    /// Accrue every ACTIVE position of the tenant up to `as_of`.
    ///
    /// Positions with no elapsed days are skipped without a save, including
    /// ones a concurrent writer accrued after the listing. The first
    /// failing position aborts the batch; positions already saved stay saved.
    pub async fn accrue_interest(
        &self,
        command: AccrueInterestCommand,
        context: &CallerContext,
    ) -> AppResult<AccrualBatchResult> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;
        let as_of = command.as_of.unwrap_or_else(Utc::now);

        let positions: Vec<DepositPosition> = self.store.list(tenant_id).await?;
        let mut products: HashMap<Uuid, DepositProduct> = HashMap::new();
        let mut processed = 0;
        let mut total_accrued = Decimal::ZERO;

        for position in positions
            .into_iter()
            .filter(|p| p.status() == PositionStatus::Active)
        {
            if days_between(position.last_accrual_date(), as_of) <= 0 {
                continue;
            }

            if !products.contains_key(&position.product_id()) {
                let product: DepositProduct =
                    self.store.find(tenant_id, position.product_id()).await?;
                products.insert(product.id(), product);
            }
            let product = products
                .get(&position.product_id())
                .ok_or_else(|| AppError::Internal("product cache miss".into()))?;

            let position_id = position.id();
            let interest = with_conflict_retry(self.save_attempts, move || async move {
                let current: DepositPosition = self.store.find(tenant_id, position_id).await?;
                if current.status() != PositionStatus::Active
                    || days_between(current.last_accrual_date(), as_of) <= 0
                {
                    return Ok::<_, AppError>(None);
                }
                let accrual = accrue(&current, product, as_of)?;
                self.store.save(accrual.position).await?;
                Ok(Some(accrual.interest))
            })
            .await?;

            // Another writer got there first
            let Some(interest) = interest else {
                tracing::debug!(position_id = %position_id, "Position already accrued, skipped");
                continue;
            };

            tracing::debug!(position_id = %position_id, interest = %interest, "Interest accrued");
            processed += 1;
            total_accrued += interest;
        }

        tracing::info!(
            tenant_id = %tenant_id,
            positions_processed = processed,
            total_accrued = %total_accrued,
            as_of = %as_of,
            "Interest accrual batch completed"
        );

        Ok(AccrualBatchResult {
            positions_processed: processed,
            total_accrued,
        })
    }

    /// ACTIVE -> MATURED
    pub async fn mature_position(
        &self,
        position_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<DepositPosition> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;

        with_conflict_retry(self.save_attempts, move || async move {
            let position: DepositPosition = self.store.find(tenant_id, position_id).await?;
            let matured = position.mature(Utc::now())?;
            Ok::<_, AppError>(self.store.save(matured).await?)
        })
        .await
    }

    /// ACTIVE | MATURED -> CLOSED
    pub async fn close_position(
        &self,
        position_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<DepositPosition> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;

        with_conflict_retry(self.save_attempts, move || async move {
            let position: DepositPosition = self.store.find(tenant_id, position_id).await?;
            let closed = position.close(Utc::now())?;
            Ok::<_, AppError>(self.store.save(closed).await?)
        })
        .await
    }

    // =========================================================================
    // Campaigns
    // =========================================================================

    pub async fn create_campaign(
        &self,
        command: CreateCampaignCommand,
        context: &CallerContext,
    ) -> AppResult<Campaign> {
        authorize_mutation(context)?;

        let product: DepositProduct = self.store.find(context.tenant_id, command.product_id).await?;
        let promotional_rate = PromotionalRate::new(
            RateBps::new(command.bonus_rate_bps),
            command.eligibility_criteria,
            command.min_deposit,
            command.max_deposit,
        )?;
        let target_audience = match command.target_audience.as_deref() {
            Some(raw) => raw.trim().parse::<TargetAudience>()?,
            None => TargetAudience::default(),
        };

        let campaign = Campaign::create(
            NewCampaign {
                tenant_id: context.tenant_id,
                name: command.name,
                description: command.description,
                product_id: product.id(),
                promotional_rate,
                target_audience,
                start_date: command.start_date,
                end_date: command.end_date,
            },
            Utc::now(),
        )?;
        let campaign = self.store.save(campaign).await?;

        tracing::info!(
            campaign_id = %campaign.id(),
            product_id = %product.id(),
            "Campaign created"
        );
        Ok(campaign)
    }

    /// DRAFT -> ACTIVE
    pub async fn activate_campaign(
        &self,
        campaign_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<Campaign> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;

        with_conflict_retry(self.save_attempts, move || async move {
            let campaign: Campaign = self.store.find(tenant_id, campaign_id).await?;
            let active = campaign.activate(Utc::now())?;
            Ok::<_, AppError>(self.store.save(active).await?)
        })
        .await
    }

    /// Accrue a position at its tier rate plus the campaign bonus and record
    /// the enrollment. Position and campaign are saved in one transaction.
    pub async fn apply_campaign_rate(
        &self,
        command: ApplyCampaignRateCommand,
        context: &CallerContext,
    ) -> AppResult<CampaignRateResult> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;
        let as_of = command.as_of.unwrap_or_else(Utc::now);
        let command = &command;

        let result = with_conflict_retry(self.save_attempts, move || async move {
            let position: DepositPosition = self.store.find(tenant_id, command.position_id).await?;
            let campaign: Campaign = self.store.find(tenant_id, command.campaign_id).await?;
            let product: DepositProduct = self.store.find(tenant_id, position.product_id()).await?;

            let accrual = accrue_with_campaign(&position, &product, &campaign, as_of)?;
            let (position, campaign) = self
                .store
                .save_pair(accrual.position, accrual.campaign)
                .await?;

            Ok::<_, AppError>(CampaignRateResult {
                position,
                campaign,
                bonus_interest: accrual.bonus_interest,
                total_interest: accrual.total_interest,
                standard_rate_bps: accrual.rates.standard.bps(),
                bonus_rate_bps: accrual.rates.bonus.bps(),
                effective_rate_bps: accrual.rates.effective.bps(),
            })
        })
        .await?;

        tracing::info!(
            position_id = %command.position_id,
            campaign_id = %command.campaign_id,
            bonus_interest = %result.bonus_interest,
            effective_rate_bps = result.effective_rate_bps,
            "Campaign rate applied"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CampaignStatus;
    use crate::domain::CallerRole;
    use crate::handlers::TierInput;
    use crate::outbox::{InMemoryStore, Persistable, RepositoryError};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use rust_decimal_macros::dec;

    fn operator() -> CallerContext {
        CallerContext::new(Uuid::new_v4(), CallerRole::Operator)
    }

    fn savings_command(term_days: u32) -> CreateDepositProductCommand {
        CreateDepositProductCommand {
            name: "Savings".into(),
            currency: "USD".into(),
            tiers: vec![
                TierInput {
                    min_balance: dec!(0),
                    max_balance: dec!(9999.9999),
                    rate_bps: 100,
                },
                TierInput {
                    min_balance: dec!(10000),
                    max_balance: dec!(999999),
                    rate_bps: 250,
                },
            ],
            term_days,
        }
    }

    fn open_command(product_id: Uuid, principal: &str) -> OpenDepositPositionCommand {
        OpenDepositPositionCommand {
            account_id: Uuid::new_v4(),
            product_id,
            principal: principal.into(),
            currency: "USD".into(),
        }
    }

    fn far_future() -> DateTime<Utc> {
        Utc::now() + Duration::days(30)
    }

    #[tokio::test]
    async fn test_open_position_on_term_product_sets_maturity() {
        let handler = DepositHandler::new(InMemoryStore::new());
        let context = operator();
        let product = handler.create_product(savings_command(90), &context).await.unwrap();

        let position = handler
            .open_position(open_command(product.id(), "5000"), &context)
            .await
            .unwrap();

        let maturity = position.maturity_date().unwrap();
        assert_eq!(days_between(position.opened_at(), maturity), 90);
        assert_eq!(position.status(), PositionStatus::Active);
    }

    #[tokio::test]
    async fn test_open_position_rejects_currency_mismatch() {
        let handler = DepositHandler::new(InMemoryStore::new());
        let context = operator();
        let product = handler.create_product(savings_command(0), &context).await.unwrap();

        let mut command = open_command(product.id(), "5000");
        command.currency = "EUR".into();
        let err = handler.open_position(command, &context).await.unwrap_err();

        assert!(matches!(err, AppError::Domain(e) if e.is_validation()));
    }

    #[tokio::test]
    async fn test_accrual_batch_skips_zero_day_positions() {
        let handler = DepositHandler::new(InMemoryStore::new());
        let context = operator();
        let product = handler.create_product(savings_command(0), &context).await.unwrap();
        let position = handler
            .open_position(open_command(product.id(), "10000"), &context)
            .await
            .unwrap();

        let same_day = handler
            .accrue_interest(
                AccrueInterestCommand {
                    as_of: Some(position.last_accrual_date()),
                },
                &context,
            )
            .await
            .unwrap();
        assert_eq!(same_day.positions_processed, 0);
        assert_eq!(same_day.total_accrued, Decimal::ZERO);

        let later = handler
            .accrue_interest(
                AccrueInterestCommand {
                    as_of: Some(position.last_accrual_date() + Duration::days(30)),
                },
                &context,
            )
            .await
            .unwrap();
        assert_eq!(later.positions_processed, 1);
        assert_eq!(later.total_accrued, dec!(20.5479));

        let stored = handler.get_position(position.id(), &context).await.unwrap();
        assert_eq!(stored.accrued_interest(), dec!(20.5479));
        assert_eq!(stored.version(), 2);
    }

    /// Lists a stale snapshot of positions, then lets a rival batch accrue
    /// them before the caller reloads.
    struct RacingStore {
        inner: InMemoryStore,
        rival_as_of: DateTime<Utc>,
        raced: AtomicBool,
    }

    #[async_trait]
    impl AggregateStore for RacingStore {
        async fn save<A: Persistable>(&self, aggregate: A) -> Result<A, RepositoryError> {
            self.inner.save(aggregate).await
        }

        async fn save_pair<A: Persistable, B: Persistable>(
            &self,
            first: A,
            second: B,
        ) -> Result<(A, B), RepositoryError> {
            self.inner.save_pair(first, second).await
        }

        async fn find<A: Persistable>(
            &self,
            tenant_id: Uuid,
            id: Uuid,
        ) -> Result<A, RepositoryError> {
            self.inner.find(tenant_id, id).await
        }

        async fn list<A: Persistable>(&self, tenant_id: Uuid) -> Result<Vec<A>, RepositoryError> {
            let snapshot = self.inner.list::<A>(tenant_id).await?;
            let is_position = A::TABLE == DepositPosition::TABLE;
            if is_position && !self.raced.swap(true, AtomicOrdering::SeqCst) {
                let rival = DepositHandler::new(self.inner.clone());
                let context = CallerContext::new(tenant_id, CallerRole::Operator);
                let command = AccrueInterestCommand {
                    as_of: Some(self.rival_as_of),
                };
                let result = rival.accrue_interest(command, &context).await.unwrap();
                assert_eq!(result.positions_processed, 1);
            }
            Ok(snapshot)
        }
    }

    #[tokio::test]
    async fn test_accrual_batch_skips_position_accrued_concurrently() {
        let inner = InMemoryStore::new();
        let context = operator();
        let setup = DepositHandler::new(inner.clone());
        let product = setup.create_product(savings_command(0), &context).await.unwrap();
        let position = setup
            .open_position(open_command(product.id(), "10000"), &context)
            .await
            .unwrap();
        let as_of = position.last_accrual_date() + Duration::days(30);

        let handler = DepositHandler::new(RacingStore {
            inner,
            rival_as_of: as_of,
            raced: AtomicBool::new(false),
        });
        let result = handler
            .accrue_interest(AccrueInterestCommand { as_of: Some(as_of) }, &context)
            .await
            .unwrap();

        assert_eq!(result.positions_processed, 0);
        assert_eq!(result.total_accrued, Decimal::ZERO);

        let stored = setup.get_position(position.id(), &context).await.unwrap();
        assert_eq!(stored.accrued_interest(), dec!(20.5479));
        assert_eq!(stored.version(), 2);
    }

    #[tokio::test]
    async fn test_mature_then_close() {
        let handler = DepositHandler::new(InMemoryStore::new());
        let context = operator();
        let product = handler.create_product(savings_command(0), &context).await.unwrap();
        let position = handler
            .open_position(open_command(product.id(), "100"), &context)
            .await
            .unwrap();

        let matured = handler.mature_position(position.id(), &context).await.unwrap();
        assert_eq!(matured.status(), PositionStatus::Matured);

        let closed = handler.close_position(position.id(), &context).await.unwrap();
        assert_eq!(closed.status(), PositionStatus::Closed);

        let err = handler.close_position(position.id(), &context).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_campaign_rate_saves_position_and_campaign() {
        let store = InMemoryStore::new();
        let handler = DepositHandler::new(store.clone());
        let context = operator();
        let product = handler.create_product(savings_command(0), &context).await.unwrap();
        let position = handler
            .open_position(open_command(product.id(), "10000"), &context)
            .await
            .unwrap();
        let start = position.opened_at() - Duration::days(1);

        let campaign = handler
            .create_campaign(
                CreateCampaignCommand {
                    name: "Spring boost".into(),
                    description: String::new(),
                    product_id: product.id(),
                    bonus_rate_bps: 100,
                    eligibility_criteria: "new balances".into(),
                    min_deposit: dec!(1000),
                    max_deposit: dec!(50000),
                    target_audience: Some("NEW_CUSTOMER".into()),
                    start_date: start,
                    end_date: far_future() + Duration::days(60),
                },
                &context,
            )
            .await
            .unwrap();
        assert_eq!(campaign.status(), CampaignStatus::Draft);
        handler.activate_campaign(campaign.id(), &context).await.unwrap();

        let result = handler
            .apply_campaign_rate(
                ApplyCampaignRateCommand {
                    position_id: position.id(),
                    campaign_id: campaign.id(),
                    as_of: Some(position.last_accrual_date() + Duration::days(30)),
                },
                &context,
            )
            .await
            .unwrap();

        assert_eq!(result.bonus_interest, dec!(8.2192));
        assert_eq!(result.total_interest, dec!(28.7671));
        assert_eq!(result.standard_rate_bps, 250);
        assert_eq!(result.bonus_rate_bps, 100);
        assert_eq!(result.effective_rate_bps, 350);
        assert_eq!(result.campaign.total_enrollments(), 1);

        let types: Vec<String> = store
            .outbox_records()
            .await
            .into_iter()
            .map(|r| r.event_type)
            .collect();
        assert!(types.contains(&"deposit.interest.accrued".to_string()));
        assert!(types.contains(&"deposit.campaign.enrollment_recorded".to_string()));
    }

    #[tokio::test]
    async fn test_campaign_rate_requires_active_campaign() {
        let handler = DepositHandler::new(InMemoryStore::new());
        let context = operator();
        let product = handler.create_product(savings_command(0), &context).await.unwrap();
        let position = handler
            .open_position(open_command(product.id(), "10000"), &context)
            .await
            .unwrap();
        let campaign = handler
            .create_campaign(
                CreateCampaignCommand {
                    name: "Draft only".into(),
                    description: String::new(),
                    product_id: product.id(),
                    bonus_rate_bps: 50,
                    eligibility_criteria: "all".into(),
                    min_deposit: dec!(0),
                    max_deposit: dec!(50000),
                    target_audience: None,
                    start_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                    end_date: far_future(),
                },
                &context,
            )
            .await
            .unwrap();

        let err = handler
            .apply_campaign_rate(
                ApplyCampaignRateCommand {
                    position_id: position.id(),
                    campaign_id: campaign.id(),
                    as_of: Some(position.last_accrual_date() + Duration::days(1)),
                },
                &context,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Domain(DomainError::BusinessRuleViolation(_))));
    }
}
