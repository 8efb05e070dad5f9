use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::info;
use uuid::Uuid;

use strada_core::payment::PaymentStatus;
use strada_core::ride::{Assignment, CancelledBy, Ride, RideStatus};
use strada_core::{DispatchError, DispatchResult};
use strada_shared::clock::Clock;

/// Owns every ride for its entire lifetime and enforces the legal state
/// graph. Each ride sits behind its own mutex, so exactly one transition is
/// in flight per ride and unrelated rides never contend.
pub struct RideEngine {
    clock: Arc<dyn Clock>,
    rides: RwLock<HashMap<Uuid, Arc<Mutex<Ride>>>>,
}

/// Is `from -> to` an edge of the state graph? `Accepted -> Requested` is
/// the re-dispatch edge taken when an accepted driver backs out before
/// pickup.
fn is_legal(from: RideStatus, to: RideStatus) -> bool {
    use RideStatus::*;
    matches!(
        (from, to),
        (Requested, Accepted)
            | (Requested, Rejected)
            | (Requested, Cancelled)
            | (Accepted, InProgress)
            | (Accepted, Cancelled)
            | (Accepted, Requested)
            | (InProgress, Completed)
            | (InProgress, Cancelled)
    )
}

fn guard(ride: &Ride, to: RideStatus) -> DispatchResult<()> {
    if ride.status.is_terminal() {
        return Err(DispatchError::RideAlreadyFinalized(ride.id));
    }
    if !is_legal(ride.status, to) {
        return Err(DispatchError::InvalidTransition {
            from: ride.status,
            to,
        });
    }
    Ok(())
}

impl RideEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rides: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, ride: Ride) {
        let id = ride.id;
        self.rides
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(ride)));
        info!(ride_id = %id, "ride requested");
    }

    async fn handle(&self, ride_id: Uuid) -> DispatchResult<Arc<Mutex<Ride>>> {
        self.rides
            .read()
            .await
            .get(&ride_id)
            .cloned()
            .ok_or(DispatchError::RideNotFound(ride_id))
    }

    /// Lock a ride for work that must be mutually exclusive with its
    /// transitions, such as a location ingestion racing a cancel. Transitions
    /// on other rides are unaffected.
    pub async fn lock(&self, ride_id: Uuid) -> DispatchResult<OwnedMutexGuard<Ride>> {
        let handle = self.handle(ride_id).await?;
        Ok(handle.lock_owned().await)
    }

    pub async fn snapshot(&self, ride_id: Uuid) -> DispatchResult<Ride> {
        let handle = self.handle(ride_id).await?;
        let ride = handle.lock().await;
        Ok(ride.clone())
    }

    pub async fn status(&self, ride_id: Uuid) -> DispatchResult<RideStatus> {
        let handle = self.handle(ride_id).await?;
        let ride = handle.lock().await;
        Ok(ride.status)
    }

    /// REQUESTED -> ACCEPTED: bind the driver/vehicle pair and stamp the
    /// acceptance time.
    pub async fn accept(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        vehicle_id: Uuid,
    ) -> DispatchResult<Ride> {
        let handle = self.handle(ride_id).await?;
        let mut ride = handle.lock().await;
        guard(&ride, RideStatus::Accepted)?;

        ride.assignment = Assignment::Assigned {
            driver_id,
            vehicle_id,
        };
        ride.accepted_at = Some(self.clock.now());
        ride.status = RideStatus::Accepted;
        info!(ride_id = %ride_id, driver_id = %driver_id, "ride accepted");
        Ok(ride.clone())
    }

    /// REQUESTED -> REJECTED, used when matching exhausts its candidates.
    pub async fn reject(&self, ride_id: Uuid, reason: &str) -> DispatchResult<Ride> {
        let handle = self.handle(ride_id).await?;
        let mut ride = handle.lock().await;
        guard(&ride, RideStatus::Rejected)?;

        ride.status = RideStatus::Rejected;
        ride.cancellation_reason = Some(reason.to_string());
        info!(ride_id = %ride_id, reason = reason, "ride rejected");
        Ok(ride.clone())
    }

    /// ACCEPTED -> IN_PROGRESS. `pickup_confirmed` must come from a driver
    /// ping within the configured proximity of the origin.
    pub async fn start_trip(&self, ride_id: Uuid, pickup_confirmed: bool) -> DispatchResult<Ride> {
        let handle = self.handle(ride_id).await?;
        let mut ride = handle.lock().await;
        guard(&ride, RideStatus::InProgress)?;

        if !pickup_confirmed {
            return Err(DispatchError::PickupNotConfirmed(ride_id));
        }
        ride.picked_up_at = Some(self.clock.now());
        ride.status = RideStatus::InProgress;
        info!(ride_id = %ride_id, "trip started");
        Ok(ride.clone())
    }

    /// IN_PROGRESS -> COMPLETED with the finalized price and actuals.
    pub async fn complete(
        &self,
        ride_id: Uuid,
        final_price_cents: i64,
        actual_duration_secs: u64,
        actual_distance_km: f64,
    ) -> DispatchResult<Ride> {
        let handle = self.handle(ride_id).await?;
        let mut ride = handle.lock().await;
        guard(&ride, RideStatus::Completed)?;

        ride.dropped_off_at = Some(self.clock.now());
        ride.final_price_cents = Some(final_price_cents);
        ride.actual_duration_secs = Some(actual_duration_secs);
        ride.actual_distance_km = Some(actual_distance_km);
        ride.status = RideStatus::Completed;
        info!(ride_id = %ride_id, final_price_cents, "ride completed");
        Ok(ride.clone())
    }

    /// Any non-terminal state -> CANCELLED, stamping reason, party and fee.
    /// A non-zero fee also sets the final price.
    pub async fn cancel(
        &self,
        ride_id: Uuid,
        reason: &str,
        cancelled_by: CancelledBy,
        fee_cents: i64,
    ) -> DispatchResult<Ride> {
        let handle = self.handle(ride_id).await?;
        let mut ride = handle.lock().await;
        guard(&ride, RideStatus::Cancelled)?;

        ride.cancelled_at = Some(self.clock.now());
        ride.cancellation_reason = Some(reason.to_string());
        ride.cancelled_by = Some(cancelled_by);
        ride.cancellation_fee_cents = Some(fee_cents);
        if fee_cents > 0 {
            ride.final_price_cents = Some(fee_cents);
        }
        ride.status = RideStatus::Cancelled;
        info!(ride_id = %ride_id, fee_cents, "ride cancelled");
        Ok(ride.clone())
    }

    /// ACCEPTED -> REQUESTED: the accepted driver backed out before pickup.
    /// Clears the assignment and bumps the dispatch counter so the ride can
    /// be matched again.
    pub async fn release_assignment(&self, ride_id: Uuid) -> DispatchResult<Ride> {
        let handle = self.handle(ride_id).await?;
        let mut ride = handle.lock().await;
        guard(&ride, RideStatus::Requested)?;

        ride.assignment = Assignment::Unassigned;
        ride.accepted_at = None;
        ride.dispatch_attempts += 1;
        ride.status = RideStatus::Requested;
        info!(ride_id = %ride_id, attempts = ride.dispatch_attempts, "ride requeued");
        Ok(ride.clone())
    }

    pub async fn set_payment_status(
        &self,
        ride_id: Uuid,
        status: PaymentStatus,
    ) -> DispatchResult<()> {
        let handle = self.handle(ride_id).await?;
        let mut ride = handle.lock().await;
        ride.payment_status = status;
        Ok(())
    }
}
