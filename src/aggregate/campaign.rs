//! Campaign Aggregate
//!
//! Time-boxed promotional rate offered on one deposit product.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{DomainError, DomainEvent, EventPayload, PromotionalRate};

use super::{AggregateRoot, EventSource, Versioned};

string_enum! {
    pub enum CampaignStatus {
        Draft => "DRAFT",
        Active => "ACTIVE",
        Expired => "EXPIRED",
        Canceled => "CANCELED",
    }
}

string_enum! {
    pub enum TargetAudience {
        All => "ALL",
        NewCustomer => "NEW_CUSTOMER",
        Existing => "EXISTING",
        HighValue => "HIGH_VALUE",
    }
}

impl Default for TargetAudience {
    fn default() -> Self {
        Self::All
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CampaignEvent {
    Created {
        campaign_id: Uuid,
        product_id: Uuid,
        bonus_rate_bps: u32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    },
    Activated {
        campaign_id: Uuid,
    },
    Expired {
        campaign_id: Uuid,
    },
    Canceled {
        campaign_id: Uuid,
    },
    EnrollmentRecorded {
        campaign_id: Uuid,
        deposit_amount: Decimal,
        total_enrollments: i64,
    },
}

impl EventPayload for CampaignEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CampaignEvent::Created { .. } => "deposit.campaign.created",
            CampaignEvent::Activated { .. } => "deposit.campaign.activated",
            CampaignEvent::Expired { .. } => "deposit.campaign.expired",
            CampaignEvent::Canceled { .. } => "deposit.campaign.canceled",
            CampaignEvent::EnrollmentRecorded { .. } => "deposit.campaign.enrollment_recorded",
        }
    }
}

/// Input for [`Campaign::create`]
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub tenant_id: Uuid,
    pub name: String,
    pub description: String,
    pub product_id: Uuid,
    pub promotional_rate: PromotionalRate,
    pub target_audience: TargetAudience,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Campaign {
    pub(crate) id: Uuid,
    pub(crate) tenant_id: Uuid,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) product_id: Uuid,
    pub(crate) promotional_rate: PromotionalRate,
    pub(crate) target_audience: TargetAudience,
    pub(crate) start_date: DateTime<Utc>,
    pub(crate) end_date: DateTime<Utc>,
    pub(crate) status: CampaignStatus,
    pub(crate) total_enrollments: i64,
    pub(crate) total_deposit_value: Decimal,
    pub(crate) version: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) events: Vec<DomainEvent<CampaignEvent>>,
}

impl Campaign {
    /// Create a campaign in DRAFT status.
    pub fn create(input: NewCampaign, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if input.tenant_id.is_nil() {
            return Err(DomainError::validation("tenant ID is required"));
        }
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("campaign name is required"));
        }
        if input.product_id.is_nil() {
            return Err(DomainError::validation("product ID is required"));
        }
        if input.end_date <= input.start_date {
            return Err(DomainError::validation("end date must be after start date"));
        }

        let id = Uuid::new_v4();
        let event = DomainEvent::new(
            Self::AGGREGATE_TYPE,
            id,
            input.tenant_id,
            now,
            CampaignEvent::Created {
                campaign_id: id,
                product_id: input.product_id,
                bonus_rate_bps: input.promotional_rate.bonus_rate().bps(),
                start_date: input.start_date,
                end_date: input.end_date,
            },
        );

        Ok(Self {
            id,
            tenant_id: input.tenant_id,
            name: input.name.trim().to_string(),
            description: input.description,
            product_id: input.product_id,
            promotional_rate: input.promotional_rate,
            target_audience: input.target_audience,
            start_date: input.start_date,
            end_date: input.end_date,
            status: CampaignStatus::Draft,
            total_enrollments: 0,
            total_deposit_value: Decimal::ZERO,
            version: 1,
            created_at: now,
            updated_at: now,
            events: vec![event],
        })
    }

    /// DRAFT -> ACTIVE
    pub fn activate(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if self.status != CampaignStatus::Draft {
            return Err(self.rejected("activate DRAFT"));
        }
        let payload = CampaignEvent::Activated { campaign_id: self.id };
        Ok(self.advance(now, payload, |c| c.status = CampaignStatus::Active))
    }

    /// ACTIVE -> EXPIRED
    pub fn expire(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if self.status != CampaignStatus::Active {
            return Err(self.rejected("expire ACTIVE"));
        }
        let payload = CampaignEvent::Expired { campaign_id: self.id };
        Ok(self.advance(now, payload, |c| c.status = CampaignStatus::Expired))
    }

    /// DRAFT | ACTIVE -> CANCELED
    pub fn cancel(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if !matches!(self.status, CampaignStatus::Draft | CampaignStatus::Active) {
            return Err(self.rejected("cancel DRAFT or ACTIVE"));
        }
        let payload = CampaignEvent::Canceled { campaign_id: self.id };
        Ok(self.advance(now, payload, |c| c.status = CampaignStatus::Canceled))
    }

    /// Count one more enrolled deposit and add it to the running total.
    pub fn record_enrollment(
        &self,
        deposit_amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if self.status != CampaignStatus::Active {
            return Err(self.rejected("record enrollments on ACTIVE"));
        }
        if deposit_amount <= Decimal::ZERO {
            return Err(DomainError::validation("enrollment deposit amount must be positive"));
        }
        let payload = CampaignEvent::EnrollmentRecorded {
            campaign_id: self.id,
            deposit_amount,
            total_enrollments: self.total_enrollments + 1,
        };
        Ok(self.advance(now, payload, |c| {
            c.total_enrollments += 1;
            c.total_deposit_value += deposit_amount;
        }))
    }

    /// ACTIVE and `start_date <= t <= end_date`.
    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active && t >= self.start_date && t <= self.end_date
    }

    fn rejected(&self, what: &str) -> DomainError {
        DomainError::invalid_transition(format!(
            "can only {what} campaigns, current: {}",
            self.status
        ))
    }

    fn advance(
        &self,
        now: DateTime<Utc>,
        payload: CampaignEvent,
        apply: impl FnOnce(&mut Self),
    ) -> Self {
        let mut next = self.clone();
        apply(&mut next);
        next.version += 1;
        next.updated_at = now;
        next.events.push(DomainEvent::new(
            Self::AGGREGATE_TYPE,
            self.id,
            self.tenant_id,
            now,
            payload,
        ));
        next
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn product_id(&self) -> Uuid {
        self.product_id
    }

    pub fn promotional_rate(&self) -> &PromotionalRate {
        &self.promotional_rate
    }

    pub fn target_audience(&self) -> TargetAudience {
        self.target_audience
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn total_enrollments(&self) -> i64 {
        self.total_enrollments
    }

    pub fn total_deposit_value(&self) -> Decimal {
        self.total_deposit_value
    }
}

impl Versioned for Campaign {
    fn id(&self) -> Uuid {
        self.id
    }

    fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl EventSource for Campaign {
    type Event = CampaignEvent;

    fn pending_events(&self) -> &[DomainEvent<CampaignEvent>] {
        &self.events
    }

    fn clear_events(mut self) -> Self {
        self.events.clear();
        self
    }
}

impl AggregateRoot for Campaign {
    const AGGREGATE_TYPE: &'static str = "campaign";
}
