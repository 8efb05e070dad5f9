pub mod config;
pub mod geo_index;
pub mod lifecycle;
pub mod matcher;
pub mod pricing;
pub mod rating;
pub mod registry;
pub mod settlement;
pub mod tracker;

pub use config::{DispatchConfig, MatchConfig, PricingConfig, TrackerConfig};
pub use geo_index::GeoIndex;
pub use lifecycle::RideEngine;
pub use matcher::{DispatchOutcome, DriverMatcher};
pub use pricing::{FareEstimate, PricingEngine};
pub use rating::{RatingAggregator, RatingUpdate};
pub use registry::{DriverProfile, DriverRegistry, OfferAnswer};
pub use settlement::{MockProcessor, PaymentOrchestrator};
pub use tracker::{IngestOutcome, LocationTracker, PingRejection};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use strada_core::boundary::{GeospatialProvider, RideRepository};
use strada_core::driver::Driver;
use strada_core::events::{publish, NotificationSink, RideEvent};
use strada_core::location::RideLocation;
use strada_core::payment::{Payment, PaymentProcessor};
use strada_core::rating::{Rating, RollingScore, SubScores};
use strada_core::ride::{CancelledBy, Ride, RideRequest, RideStatus};
use strada_core::vehicle::Vehicle;
use strada_core::{DispatchError, DispatchResult};
use strada_shared::clock::Clock;

/// The dispatch core, wired together: matching, lifecycle, tracking,
/// pricing, settlement and ratings behind one service-level surface.
///
/// Per-ride mutation is serialized by the ride engine, per-driver offer
/// state by the registry; the facade only sequences cross-component flows
/// (pickup confirmation, cancellation fees, settlement on completion).
pub struct DispatchCore {
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    registry: Arc<DriverRegistry>,
    rides: Arc<RideEngine>,
    matcher: DriverMatcher,
    tracker: LocationTracker,
    pricing: PricingEngine,
    settlement: PaymentOrchestrator,
    ratings: RatingAggregator,
    ride_store: Option<Arc<dyn RideRepository>>,
    ride_versions: Mutex<HashMap<Uuid, u64>>,
}

impl DispatchCore {
    /// Build a core whose candidate queries go through the in-process
    /// geo index over the driver registry.
    pub fn new(
        config: DispatchConfig,
        clock: Arc<dyn Clock>,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let registry = Arc::new(DriverRegistry::new());
        let geo: Arc<dyn GeospatialProvider> =
            Arc::new(GeoIndex::new(registry.clone(), clock.clone()));
        Self::with_geo_provider(config, clock, processor, notifier, registry, geo)
    }

    /// Build a core against an external geospatial provider.
    pub fn with_geo_provider(
        config: DispatchConfig,
        clock: Arc<dyn Clock>,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn NotificationSink>,
        registry: Arc<DriverRegistry>,
        geo: Arc<dyn GeospatialProvider>,
    ) -> Self {
        let rides = Arc::new(RideEngine::new(clock.clone()));
        let matcher = DriverMatcher::new(
            geo,
            registry.clone(),
            rides.clone(),
            notifier.clone(),
            clock.clone(),
            config.matching.clone(),
        );
        let tracker = LocationTracker::new(rides.clone(), notifier.clone(), config.tracking.clone());
        let pricing = PricingEngine::new(config.pricing.clone());
        let settlement = PaymentOrchestrator::new(processor, notifier.clone(), clock.clone());
        let ratings = RatingAggregator::new(rides.clone(), clock.clone());

        Self {
            config,
            clock,
            notifier,
            registry,
            rides,
            matcher,
            tracker,
            pricing,
            settlement,
            ratings,
            ride_store: None,
            ride_versions: Mutex::new(HashMap::new()),
        }
    }

    /// Write ride snapshots through to a repository after each transition.
    pub fn with_ride_repository(mut self, repo: Arc<dyn RideRepository>) -> Self {
        self.ride_store = Some(repo);
        self
    }

    // --- driver presence ---

    pub async fn register_driver(&self, driver: Driver, vehicle: Vehicle) {
        let driver_id = driver.id;
        let seed = RollingScore::seeded(driver.rating, driver.rating_count);
        let total_rides = driver.total_rides;
        self.registry.register(driver, vehicle).await;
        self.ratings.seed(driver_id, seed, total_rides).await;
    }

    pub async fn driver_online(
        &self,
        driver_id: Uuid,
        position: strada_shared::geo::Coordinates,
    ) -> DispatchResult<()> {
        self.registry.set_online(driver_id, position).await
    }

    pub async fn driver_offline(&self, driver_id: Uuid) -> DispatchResult<()> {
        self.registry.set_offline(driver_id).await
    }

    pub async fn update_driver_position(
        &self,
        driver_id: Uuid,
        position: strada_shared::geo::Coordinates,
    ) -> DispatchResult<()> {
        self.registry.update_position(driver_id, position).await
    }

    pub async fn driver_profile(&self, driver_id: Uuid) -> DispatchResult<DriverProfile> {
        self.registry.profile(driver_id).await
    }

    // --- ride lifecycle ---

    /// Create a ride in REQUESTED with its fare estimate.
    pub async fn request_ride(&self, request: RideRequest) -> DispatchResult<Ride> {
        let estimate =
            self.pricing
                .estimate(request.origin, request.destination, request.ride_type);
        let ride = Ride::new(
            request,
            estimate.base_price_cents,
            estimate.estimated_duration_secs,
            estimate.estimated_distance_km,
            self.clock.now(),
        );
        self.rides.insert(ride.clone()).await;
        self.persist(&ride).await?;
        Ok(ride)
    }

    /// Run the offer/accept/timeout loop for a REQUESTED ride.
    pub async fn dispatch(&self, ride_id: Uuid) -> DispatchResult<DispatchOutcome> {
        let outcome = self.matcher.dispatch(ride_id).await?;
        let ride = self.rides.snapshot(ride_id).await?;
        self.persist(&ride).await?;
        Ok(outcome)
    }

    /// The offer a driver currently holds: (offer id, ride id).
    pub async fn pending_offer(&self, driver_id: Uuid) -> DispatchResult<Option<(Uuid, Uuid)>> {
        self.registry.pending_offer(driver_id).await
    }

    /// A driver's answer to an outstanding offer. Fails with `OfferExpired`
    /// when the offer already timed out or was revoked.
    pub async fn respond_to_offer(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        answer: OfferAnswer,
    ) -> DispatchResult<()> {
        self.registry.respond(driver_id, offer_id, answer).await
    }

    pub async fn ingest_location(&self, ping: RideLocation) -> DispatchResult<IngestOutcome> {
        self.tracker.ingest(ping).await
    }

    /// ACCEPTED -> IN_PROGRESS. Pickup is confirmed once any driver ping in
    /// the ride's history has landed within the configured proximity of the
    /// origin; later pings farther away (circling for parking) do not undo
    /// the confirmation.
    pub async fn start_trip(&self, ride_id: Uuid) -> DispatchResult<Ride> {
        let snapshot = self.rides.snapshot(ride_id).await?;
        let confirmed = self
            .tracker
            .driver_pinged_near(
                ride_id,
                snapshot.origin,
                self.config.matching.pickup_radius_km,
            )
            .await;

        let ride = self.rides.start_trip(ride_id, confirmed).await?;
        publish(self.notifier.as_ref(), RideEvent::TripStarted { ride_id }).await;
        self.persist(&ride).await?;
        Ok(ride)
    }

    /// IN_PROGRESS -> COMPLETED: finalize the price from actuals, release
    /// the driver and settle payment.
    pub async fn complete_trip(&self, ride_id: Uuid) -> DispatchResult<Ride> {
        let snapshot = self.rides.snapshot(ride_id).await?;
        let Some(picked_up_at) = snapshot.picked_up_at else {
            return Err(if snapshot.status.is_terminal() {
                DispatchError::RideAlreadyFinalized(ride_id)
            } else {
                DispatchError::InvalidTransition {
                    from: snapshot.status,
                    to: RideStatus::Completed,
                }
            });
        };

        let actual_duration_secs = (self.clock.now() - picked_up_at).num_seconds().max(0) as u64;
        let covered_km = self.tracker.covered_km(ride_id).await;
        let actual_distance_km = if covered_km > 0.0 {
            covered_km
        } else {
            snapshot.estimated_distance_km
        };
        let final_price =
            self.pricing
                .finalize(&snapshot, actual_duration_secs, actual_distance_km);

        let ride = self
            .rides
            .complete(ride_id, final_price, actual_duration_secs, actual_distance_km)
            .await?;
        if let Some(driver_id) = ride.assignment.driver_id() {
            self.registry.release_ride(driver_id, ride_id).await;
        }
        publish(
            self.notifier.as_ref(),
            RideEvent::RideCompleted {
                ride_id,
                final_price_cents: final_price,
            },
        )
        .await;

        let payment = self.settlement.settle(&ride, final_price).await?;
        self.rides.set_payment_status(ride_id, payment.status).await?;

        let ride = self.rides.snapshot(ride_id).await?;
        self.persist(&ride).await?;
        Ok(ride)
    }

    /// Cancel a ride from any non-terminal state, with the fee band decided
    /// by how far it got. A driver backing out of an ACCEPTED ride instead
    /// returns it to REQUESTED for re-dispatch.
    pub async fn cancel_ride(
        &self,
        ride_id: Uuid,
        cancelled_by: CancelledBy,
        reason: &str,
    ) -> DispatchResult<Ride> {
        let snapshot = self.rides.snapshot(ride_id).await?;
        if snapshot.status.is_terminal() {
            return Err(DispatchError::RideAlreadyFinalized(ride_id));
        }

        if cancelled_by == CancelledBy::Driver && snapshot.status == RideStatus::Accepted {
            let ride = self.rides.release_assignment(ride_id).await?;
            if let Some(driver_id) = snapshot.assignment.driver_id() {
                self.registry.release_ride(driver_id, ride_id).await;
            }
            publish(self.notifier.as_ref(), RideEvent::RideRequeued { ride_id }).await;
            self.persist(&ride).await?;
            return Ok(ride);
        }

        let covered_km = self.tracker.covered_km(ride_id).await;
        let fee = self.pricing.cancellation_fee(&snapshot, covered_km);

        let ride = self.rides.cancel(ride_id, reason, cancelled_by, fee).await?;
        if let Some(driver_id) = ride.assignment.driver_id() {
            self.registry.release_ride(driver_id, ride_id).await;
        }
        if fee > 0 {
            let payment = self.settlement.settle(&ride, fee).await?;
            self.rides.set_payment_status(ride_id, payment.status).await?;
        }
        publish(
            self.notifier.as_ref(),
            RideEvent::RideCancelled {
                ride_id,
                cancelled_by,
                fee_cents: fee,
            },
        )
        .await;

        let ride = self.rides.snapshot(ride_id).await?;
        self.persist(&ride).await?;
        Ok(ride)
    }

    // --- payment & rating ---

    /// Create (or return) the payment for a finalized ride. Completion and
    /// fee-bearing cancellation settle automatically; this runs the same
    /// idempotent path for callers holding a finalized ride, so a repeat
    /// call returns the existing record.
    pub async fn settle_payment(&self, ride_id: Uuid) -> DispatchResult<Payment> {
        let ride = self.rides.snapshot(ride_id).await?;
        if !ride.status.is_terminal() {
            return Err(DispatchError::RideNotEligible(ride_id));
        }
        let Some(amount) = ride.final_price_cents else {
            return Err(DispatchError::RideNotEligible(ride_id));
        };

        let payment = self.settlement.settle(&ride, amount).await?;
        self.rides.set_payment_status(ride_id, payment.status).await?;
        Ok(payment)
    }

    /// Poll the processor and apply PENDING -> PAID/FAILED to the ride's
    /// payment.
    pub async fn confirm_payment(&self, ride_id: Uuid) -> DispatchResult<Payment> {
        let payment = self.settlement.confirm(ride_id).await?;
        self.rides.set_payment_status(ride_id, payment.status).await?;
        let ride = self.rides.snapshot(ride_id).await?;
        self.persist(&ride).await?;
        Ok(payment)
    }

    pub async fn payment(&self, ride_id: Uuid) -> Option<Payment> {
        self.settlement.record(ride_id).await
    }

    /// Submit a rating for a completed ride and push the rated driver's
    /// refreshed standing back into the matching view.
    pub async fn submit_rating(
        &self,
        ride_id: Uuid,
        rater_id: Uuid,
        rated_id: Uuid,
        score: f64,
        sub_scores: SubScores,
    ) -> DispatchResult<Rating> {
        let update = self
            .ratings
            .submit(ride_id, rater_id, rated_id, score, sub_scores)
            .await?;

        if self.registry.contains(rated_id).await {
            self.registry
                .update_standing(
                    rated_id,
                    update.score.average,
                    update.score.count,
                    update.total_rides,
                )
                .await?;
        }
        Ok(update.rating)
    }

    pub async fn ride(&self, ride_id: Uuid) -> DispatchResult<Ride> {
        self.rides.snapshot(ride_id).await
    }

    async fn persist(&self, ride: &Ride) -> DispatchResult<()> {
        let Some(repo) = &self.ride_store else {
            return Ok(());
        };
        let mut versions = self.ride_versions.lock().await;
        let current = versions.get(&ride.id).copied().unwrap_or(0);
        let next = repo
            .save(ride, current)
            .await
            .map_err(|err| DispatchError::Repository(err.to_string()))?;
        versions.insert(ride.id, next);
        Ok(())
    }
}
