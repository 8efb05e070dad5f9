use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BoxError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// Status of a payment intent as reported by the external processor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorStatus {
    Pending,
    Paid,
    Failed,
}

/// One payment per fee-liable ride, keyed by the ride's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Processor-side reference (e.g. pi_123).
    pub intent_id: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        ride_id: Uuid,
        amount_cents: i64,
        currency: &str,
        intent_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id,
            amount_cents,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            intent_id,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Client for the external payment processor. Processing internals (retries,
/// 3DS, webhooks) live behind this boundary.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a payment intent and return the processor's reference for it.
    async fn create_intent(
        &self,
        ride_id: Uuid,
        amount_cents: i64,
        currency: &str,
    ) -> Result<String, BoxError>;

    /// Current status of a previously created intent.
    async fn status(&self, intent_id: &str) -> Result<ProcessorStatus, BoxError>;
}
