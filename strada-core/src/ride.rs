use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strada_shared::geo::Coordinates;
use uuid::Uuid;

use crate::payment::PaymentStatus;

/// Ride status in the lifecycle.
///
/// Legal transitions: REQUESTED -> {ACCEPTED, REJECTED, CANCELLED},
/// ACCEPTED -> {IN_PROGRESS, CANCELLED, REQUESTED (driver backed out)},
/// IN_PROGRESS -> {COMPLETED, CANCELLED}. REJECTED, CANCELLED and COMPLETED
/// are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Requested,
    Accepted,
    Rejected,
    Cancelled,
    InProgress,
    Completed,
}

impl RideStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Rejected | RideStatus::Cancelled | RideStatus::Completed
        )
    }

    /// True while location pings are accepted for the ride.
    pub fn is_active(&self) -> bool {
        matches!(self, RideStatus::Accepted | RideStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideType {
    Standard,
    Scheduled,
    Shared,
}

/// Who requested a cancellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelledBy {
    Passenger,
    Driver,
    Platform,
}

/// Driver/vehicle binding for a ride. Either both are set or neither is,
/// so a half-assigned ride is unrepresentable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assignment {
    Unassigned,
    Assigned { driver_id: Uuid, vehicle_id: Uuid },
}

impl Assignment {
    pub fn is_assigned(&self) -> bool {
        matches!(self, Assignment::Assigned { .. })
    }

    pub fn driver_id(&self) -> Option<Uuid> {
        match self {
            Assignment::Assigned { driver_id, .. } => Some(*driver_id),
            Assignment::Unassigned => None,
        }
    }

    pub fn vehicle_id(&self) -> Option<Uuid> {
        match self {
            Assignment::Assigned { vehicle_id, .. } => Some(*vehicle_id),
            Assignment::Unassigned => None,
        }
    }
}

/// Parameters of a new ride request, as received from the passenger-facing
/// entry point.
#[derive(Debug, Clone, Deserialize)]
pub struct RideRequest {
    pub passenger_id: Uuid,
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub origin_address: Option<String>,
    pub destination_address: Option<String>,
    pub ride_type: RideType,
    pub currency: String,
    pub female_driver_only: bool,
    pub special_requirements: Option<String>,
    pub baggage_count: u8,
}

/// A ride from request to terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub assignment: Assignment,
    pub status: RideStatus,
    pub ride_type: RideType,

    pub origin: Coordinates,
    pub destination: Coordinates,
    pub origin_address: Option<String>,
    pub destination_address: Option<String>,

    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub dropped_off_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    pub estimated_duration_secs: u64,
    pub actual_duration_secs: Option<u64>,
    pub estimated_distance_km: f64,
    pub actual_distance_km: Option<f64>,

    /// Estimate quoted at request time, in minor currency units.
    pub base_price_cents: i64,
    /// Set exactly when the ride completes or a non-zero cancellation fee
    /// applies.
    pub final_price_cents: Option<i64>,
    pub currency: String,
    pub payment_status: PaymentStatus,

    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub cancellation_fee_cents: Option<i64>,

    pub female_driver_only: bool,
    pub special_requirements: Option<String>,
    pub baggage_count: u8,

    /// Number of dispatch rounds this ride has been through. Bumped when an
    /// accepted driver backs out and the ride returns to REQUESTED.
    pub dispatch_attempts: u32,
}

impl Ride {
    pub fn new(
        request: RideRequest,
        base_price_cents: i64,
        estimated_duration_secs: u64,
        estimated_distance_km: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            passenger_id: request.passenger_id,
            assignment: Assignment::Unassigned,
            status: RideStatus::Requested,
            ride_type: request.ride_type,
            origin: request.origin,
            destination: request.destination,
            origin_address: request.origin_address,
            destination_address: request.destination_address,
            requested_at: now,
            accepted_at: None,
            picked_up_at: None,
            dropped_off_at: None,
            cancelled_at: None,
            estimated_duration_secs,
            actual_duration_secs: None,
            estimated_distance_km,
            actual_distance_km: None,
            base_price_cents,
            final_price_cents: None,
            currency: request.currency,
            payment_status: PaymentStatus::Pending,
            cancellation_reason: None,
            cancelled_by: None,
            cancellation_fee_cents: None,
            female_driver_only: request.female_driver_only,
            special_requirements: request.special_requirements,
            baggage_count: request.baggage_count,
            dispatch_attempts: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RideRequest {
        RideRequest {
            passenger_id: Uuid::new_v4(),
            origin: Coordinates::new(0.0, 0.0),
            destination: Coordinates::new(1.0, 1.0),
            origin_address: None,
            destination_address: None,
            ride_type: RideType::Standard,
            currency: "EUR".to_string(),
            female_driver_only: false,
            special_requirements: None,
            baggage_count: 0,
        }
    }

    #[test]
    fn new_ride_starts_requested_and_unassigned() {
        let ride = Ride::new(request(), 1200, 900, 5.0, Utc::now());
        assert_eq!(ride.status, RideStatus::Requested);
        assert_eq!(ride.assignment, Assignment::Unassigned);
        assert!(ride.final_price_cents.is_none());
        assert_eq!(ride.dispatch_attempts, 1);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RideStatus::Completed.is_terminal());
        assert!(RideStatus::Cancelled.is_terminal());
        assert!(RideStatus::Rejected.is_terminal());
        assert!(!RideStatus::Requested.is_terminal());
        assert!(!RideStatus::Accepted.is_terminal());
        assert!(!RideStatus::InProgress.is_terminal());
    }

    #[test]
    fn assignment_accessors() {
        let driver_id = Uuid::new_v4();
        let vehicle_id = Uuid::new_v4();
        let assigned = Assignment::Assigned {
            driver_id,
            vehicle_id,
        };

        assert_eq!(assigned.driver_id(), Some(driver_id));
        assert_eq!(assigned.vehicle_id(), Some(vehicle_id));
        assert_eq!(Assignment::Unassigned.driver_id(), None);
    }
}
