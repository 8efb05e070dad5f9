use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::payment::PaymentStatus;
use crate::ride::CancelledBy;
use crate::BoxError;

/// Domain events emitted by the dispatch core for notification and
/// observability collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideEvent {
    OfferSent {
        ride_id: Uuid,
        driver_id: Uuid,
        offer_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    OfferExpired {
        ride_id: Uuid,
        driver_id: Uuid,
        offer_id: Uuid,
    },
    RideAccepted {
        ride_id: Uuid,
        driver_id: Uuid,
        vehicle_id: Uuid,
    },
    RideRejected {
        ride_id: Uuid,
        reason: String,
    },
    /// An accepted driver backed out before pickup; the ride is back in the
    /// dispatch pool.
    RideRequeued {
        ride_id: Uuid,
    },
    TripStarted {
        ride_id: Uuid,
    },
    RideCompleted {
        ride_id: Uuid,
        final_price_cents: i64,
    },
    RideCancelled {
        ride_id: Uuid,
        cancelled_by: CancelledBy,
        fee_cents: i64,
    },
    PaymentSettled {
        ride_id: Uuid,
        payment_id: Uuid,
        status: PaymentStatus,
    },
    EtaUpdated {
        ride_id: Uuid,
        eta_secs: u64,
    },
    RouteDeviated {
        ride_id: Uuid,
        off_route_km: f64,
    },
}

/// Fire-and-forget delivery of ride events. Failures here must never block
/// or fail a ride transition.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: RideEvent) -> Result<(), BoxError>;
}

/// Deliver an event, logging and swallowing any sink failure.
pub async fn publish(sink: &dyn NotificationSink, event: RideEvent) {
    if let Err(err) = sink.deliver(event).await {
        warn!(error = %err, "notification delivery failed");
    }
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn deliver(&self, _event: RideEvent) -> Result<(), BoxError> {
        Ok(())
    }
}
