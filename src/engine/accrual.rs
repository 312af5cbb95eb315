//! Accrual Engine
//!
//! Picks the product tier for a position and accrues interest through the
//! position's own transition. The campaign overlay adds a promotional bonus
//! on top of the tier rate, using the same day count and rounding.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::deposit_position::INTEREST_SCALE;
use crate::aggregate::{
    days_between, Campaign, DepositPosition, DepositProduct, PositionStatus, Versioned,
};
use crate::domain::{round_money, DomainError, RateBps};

/// A position after accrual together with what was added.
#[derive(Debug, Clone)]
pub struct Accrual {
    pub position: DepositPosition,
    pub interest: Decimal,
    pub days: i64,
    pub rate: RateBps,
}

/// Outcome of accruing with a campaign bonus.
#[derive(Debug, Clone)]
pub struct CampaignAccrual {
    pub position: DepositPosition,
    pub campaign: Campaign,
    pub days: i64,
    pub total_interest: Decimal,
    pub bonus_interest: Decimal,
    pub rates: EffectiveRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectiveRate {
    pub standard: RateBps,
    pub bonus: RateBps,
    pub effective: RateBps,
}

fn ensure_product(position: &DepositPosition, product: &DepositProduct) -> Result<(), DomainError> {
    if position.product_id() != product.id() {
        return Err(DomainError::validation(format!(
            "product {} does not match position product {}",
            product.id(),
            position.product_id()
        )));
    }
    if position.status() != PositionStatus::Active {
        return Err(DomainError::invalid_transition(format!(
            "position {} is not active",
            position.id()
        )));
    }
    Ok(())
}

/// Accrue interest on `position` up to `as_of` at its product tier rate.
///
/// The tier is chosen on total balance (principal plus accrued interest);
/// interest itself is earned on principal. Zero elapsed days leaves the
/// position untouched.
pub fn accrue(
    position: &DepositPosition,
    product: &DepositProduct,
    as_of: DateTime<Utc>,
) -> Result<Accrual, DomainError> {
    ensure_product(position, product)?;

    let rate = product.find_applicable_tier(position.total_balance())?.rate();
    let accrued = position.accrue_interest(rate.daily_rate(), as_of)?;
    let interest = accrued.accrued_interest() - position.accrued_interest();

    Ok(Accrual {
        days: days_between(position.last_accrual_date(), as_of),
        position: accrued,
        interest,
        rate,
    })
}

/// Accrue at the tier rate plus the campaign bonus and enrol the position.
pub fn accrue_with_campaign(
    position: &DepositPosition,
    product: &DepositProduct,
    campaign: &Campaign,
    as_of: DateTime<Utc>,
) -> Result<CampaignAccrual, DomainError> {
    ensure_product(position, product)?;

    if !campaign.is_active_at(as_of) {
        return Err(DomainError::business_rule(format!(
            "campaign is not active at {as_of}"
        )));
    }
    if campaign.product_id() != position.product_id() {
        return Err(DomainError::business_rule(format!(
            "campaign product {} does not match position product {}",
            campaign.product_id(),
            position.product_id()
        )));
    }
    let promo = campaign.promotional_rate();
    let principal = position.principal().value();
    if !promo.is_eligible(principal) {
        return Err(DomainError::business_rule(format!(
            "deposit amount {principal} not eligible for campaign"
        )));
    }

    let standard = product.find_applicable_tier(position.total_balance())?.rate();
    let bonus = promo.bonus_rate();

    let days = days_between(position.last_accrual_date(), as_of);
    if days <= 0 {
        return Err(DomainError::business_rule("no days to accrue since last accrual"));
    }

    let bonus_interest = round_money(
        principal * bonus.daily_rate() * Decimal::from(days),
        INTEREST_SCALE,
    );
    let combined_daily = standard.daily_rate() + bonus.daily_rate();
    let accrued = position.accrue_interest(combined_daily, as_of)?;
    let total_interest = accrued.accrued_interest() - position.accrued_interest();
    let enrolled = campaign.record_enrollment(principal, as_of)?;

    Ok(CampaignAccrual {
        position: accrued,
        campaign: enrolled,
        days,
        total_interest,
        bonus_interest,
        rates: EffectiveRate {
            standard,
            bonus,
            effective: standard.saturating_add(bonus),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{EventSource, NewCampaign, TargetAudience, Versioned};
    use crate::domain::{Amount, Currency, InterestTier, PromotionalRate};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn opened() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn product(tenant: Uuid) -> DepositProduct {
        DepositProduct::create(
            tenant,
            "Savings",
            Currency::USD,
            vec![
                InterestTier::new(dec!(0), dec!(9999.9999), RateBps::new(100)).unwrap(),
                InterestTier::new(dec!(10000), dec!(99999), RateBps::new(250)).unwrap(),
            ],
            0,
            opened(),
        )
        .unwrap()
    }

    fn position(product: &DepositProduct, principal: Decimal) -> DepositPosition {
        DepositPosition::open(
            product.tenant_id(),
            Uuid::new_v4(),
            product.id(),
            Amount::new(principal).unwrap(),
            Currency::USD,
            None,
            opened(),
        )
        .unwrap()
    }

    fn active_campaign(product: &DepositProduct) -> Campaign {
        Campaign::create(
            NewCampaign {
                tenant_id: product.tenant_id(),
                name: "Boost".into(),
                description: String::new(),
                product_id: product.id(),
                promotional_rate: PromotionalRate::new(
                    RateBps::new(100),
                    "balances up to 50k",
                    dec!(1000),
                    dec!(50000),
                )
                .unwrap(),
                target_audience: TargetAudience::All,
                start_date: opened(),
                end_date: opened() + Duration::days(365),
            },
            opened(),
        )
        .unwrap()
        .activate(opened())
        .unwrap()
    }

    #[test]
    fn test_accrue_thirty_days_at_tier_rate() {
        let product = product(Uuid::new_v4());
        let pos = position(&product, dec!(10000));

        let result = accrue(&pos, &product, opened() + Duration::days(30)).unwrap();

        assert_eq!(result.interest, dec!(20.5479));
        assert_eq!(result.days, 30);
        assert_eq!(result.rate, RateBps::new(250));
        assert_eq!(result.position.version(), 2);
    }

    #[test]
    fn test_two_accruals_accumulate() {
        let product = product(Uuid::new_v4());
        let pos = position(&product, dec!(10000));

        let first = accrue(&pos, &product, opened() + Duration::days(30)).unwrap();
        let second = accrue(&first.position, &product, opened() + Duration::days(60)).unwrap();

        // Each accrual is rounded on its own
        assert_eq!(second.interest, dec!(20.5479));
        assert_eq!(second.position.accrued_interest(), dec!(41.0958));
        assert!((second.position.accrued_interest() - dec!(41.0959)).abs() <= dec!(0.0001));
    }

    #[test]
    fn test_leap_year_accrues_366_days() {
        let product = product(Uuid::new_v4());
        let pos = position(&product, dec!(10000));
        let next_year = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let result = accrue(&pos, &product, next_year).unwrap();

        assert_eq!(result.days, 366);
        assert_eq!(result.interest, dec!(250.6849));
    }

    #[test]
    fn test_tier_selected_on_total_balance() {
        let product = product(Uuid::new_v4());
        // 9,990 principal is in the 100 bps tier until accrued interest lifts it past 10,000
        let mut pos = position(&product, dec!(9990));
        pos.accrued_interest = dec!(10);

        let result = accrue(&pos, &product, opened() + Duration::days(1)).unwrap();
        assert_eq!(result.rate, RateBps::new(250));
        // Interest is still earned on principal only
        assert_eq!(result.interest, round_money(dec!(9990) * RateBps::new(250).daily_rate(), 4));
    }

    #[test]
    fn test_zero_days_is_noop() {
        let product = product(Uuid::new_v4());
        let pos = position(&product, dec!(10000));

        let result = accrue(&pos, &product, opened() + Duration::hours(23)).unwrap();
        assert_eq!(result.interest, Decimal::ZERO);
        assert_eq!(result.position.version(), 1);
        assert_eq!(result.position.pending_events().len(), 1);
    }

    #[test]
    fn test_no_applicable_tier() {
        let product = product(Uuid::new_v4());
        let pos = position(&product, dec!(150000));

        let err = accrue(&pos, &product, opened() + Duration::days(1)).unwrap_err();
        assert!(matches!(err, DomainError::NoApplicableTier(_)));
    }

    #[test]
    fn test_wrong_product_rejected() {
        let product_a = product(Uuid::new_v4());
        let product_b = product(product_a.tenant_id());
        let pos = position(&product_a, dec!(10000));

        assert!(accrue(&pos, &product_b, opened() + Duration::days(1)).is_err());
    }

    #[test]
    fn test_campaign_overlay() {
        let product = product(Uuid::new_v4());
        let pos = position(&product, dec!(10000));
        let campaign = active_campaign(&product);

        let result =
            accrue_with_campaign(&pos, &product, &campaign, opened() + Duration::days(30)).unwrap();

        assert_eq!(result.bonus_interest, dec!(8.2192));
        // 10000 * (0.025 + 0.01) / 365 * 30
        assert_eq!(result.total_interest, dec!(28.7671));
        assert_eq!(result.rates.standard, RateBps::new(250));
        assert_eq!(result.rates.bonus, RateBps::new(100));
        assert_eq!(result.rates.effective, RateBps::new(350));
        assert_eq!(result.campaign.total_enrollments(), 1);
        assert_eq!(result.campaign.total_deposit_value(), dec!(10000));
    }

    #[test]
    fn test_campaign_overlay_rejections() {
        let product = product(Uuid::new_v4());
        let campaign = active_campaign(&product);
        let as_of = opened() + Duration::days(30);

        // Not eligible: principal above campaign maximum
        let big = position(&product, dec!(60000));
        assert!(accrue_with_campaign(&big, &product, &campaign, as_of).is_err());

        // Zero days
        let pos = position(&product, dec!(10000));
        assert!(accrue_with_campaign(&pos, &product, &campaign, opened()).is_err());

        // Outside the window
        let late = opened() + Duration::days(400);
        assert!(accrue_with_campaign(&pos, &product, &campaign, late).is_err());

        // Draft campaign
        let draft = Campaign::create(
            NewCampaign {
                tenant_id: product.tenant_id(),
                name: "Later".into(),
                description: String::new(),
                product_id: product.id(),
                promotional_rate: campaign.promotional_rate().clone(),
                target_audience: TargetAudience::All,
                start_date: opened(),
                end_date: opened() + Duration::days(365),
            },
            opened(),
        )
        .unwrap();
        assert!(accrue_with_campaign(&pos, &product, &draft, as_of).is_err());
    }
}
