use std::sync::Arc;

use rand::Rng;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use strada_core::boundary::{CandidateFilter, GeospatialProvider};
use strada_core::events::{publish, NotificationSink, RideEvent};
use strada_core::ride::RideStatus;
use strada_core::{DispatchError, DispatchResult};
use strada_shared::clock::Clock;
use strada_shared::geo::Coordinates;

use crate::config::MatchConfig;
use crate::lifecycle::RideEngine;
use crate::registry::{DriverRegistry, OfferAnswer};

/// Result of a dispatch attempt. Candidate exhaustion is part of the
/// contract, not an error: the ride is moved to REJECTED and the caller
/// decides the user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Assigned { driver_id: Uuid, vehicle_id: Uuid },
    NoDriversAvailable,
}

/// Runs the offer/accept/timeout protocol against geo-index candidates.
pub struct DriverMatcher {
    geo: Arc<dyn GeospatialProvider>,
    registry: Arc<DriverRegistry>,
    rides: Arc<RideEngine>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: MatchConfig,
}

impl DriverMatcher {
    pub fn new(
        geo: Arc<dyn GeospatialProvider>,
        registry: Arc<DriverRegistry>,
        rides: Arc<RideEngine>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: MatchConfig,
    ) -> Self {
        Self {
            geo,
            registry,
            rides,
            notifier,
            clock,
            config,
        }
    }

    /// Try to assign a driver to a REQUESTED ride.
    ///
    /// Candidates are offered one at a time, each holding a time-boxed
    /// exclusive offer. Exhausting the candidates transitions the ride to
    /// REJECTED ("no_drivers"). An external cancellation observed between
    /// candidates aborts the loop with `RideAlreadyFinalized`.
    pub async fn dispatch(&self, ride_id: Uuid) -> DispatchResult<DispatchOutcome> {
        let ride = self.rides.snapshot(ride_id).await?;
        match ride.status {
            RideStatus::Requested => {}
            status if status.is_terminal() => {
                return Err(DispatchError::RideAlreadyFinalized(ride_id))
            }
            status => {
                return Err(DispatchError::InvalidTransition {
                    from: status,
                    to: RideStatus::Accepted,
                })
            }
        }

        let filter = CandidateFilter {
            female_only: ride.female_driver_only,
        };
        let candidates = self.candidates_with_retry(ride.origin, &filter).await?;
        debug!(ride_id = %ride_id, count = candidates.len(), "candidates ranked");

        for driver_id in candidates.into_iter().take(self.config.max_candidates) {
            // Cancellation takes priority over completing a match.
            if self.rides.status(ride_id).await?.is_terminal() {
                info!(ride_id = %ride_id, "dispatch aborted, ride finalized externally");
                return Err(DispatchError::RideAlreadyFinalized(ride_id));
            }

            let Some((offer_id, mut rx)) =
                self.registry.try_place_offer(driver_id, ride_id).await?
            else {
                continue;
            };

            let expires_at = self.clock.now()
                + chrono::Duration::milliseconds(self.config.offer_timeout_ms as i64);
            publish(
                self.notifier.as_ref(),
                RideEvent::OfferSent {
                    ride_id,
                    driver_id,
                    offer_id,
                    expires_at,
                },
            )
            .await;

            let answer = match timeout(self.config.offer_timeout(), &mut rx).await {
                Ok(Ok(answer)) => Some(answer),
                // Sender dropped without answering; treat as a decline.
                Ok(Err(_)) => None,
                Err(_elapsed) => {
                    if self.registry.revoke_offer(driver_id, offer_id).await {
                        publish(
                            self.notifier.as_ref(),
                            RideEvent::OfferExpired {
                                ride_id,
                                driver_id,
                                offer_id,
                            },
                        )
                        .await;
                        None
                    } else {
                        // The driver's answer won the slot between our
                        // timeout and the revoke; use it.
                        rx.try_recv().ok()
                    }
                }
            };

            match answer {
                Some(OfferAnswer::Accepted) => {
                    self.registry.bind_ride(driver_id, ride_id).await?;
                    let vehicle_id = self.registry.profile(driver_id).await?.vehicle.id;
                    match self.rides.accept(ride_id, driver_id, vehicle_id).await {
                        Ok(_) => {
                            publish(
                                self.notifier.as_ref(),
                                RideEvent::RideAccepted {
                                    ride_id,
                                    driver_id,
                                    vehicle_id,
                                },
                            )
                            .await;
                            return Ok(DispatchOutcome::Assigned {
                                driver_id,
                                vehicle_id,
                            });
                        }
                        Err(err) => {
                            // Ride was finalized while the driver answered.
                            self.registry.release_ride(driver_id, ride_id).await;
                            return Err(err);
                        }
                    }
                }
                Some(OfferAnswer::Declined) | None => continue,
            }
        }

        self.rides.reject(ride_id, "no_drivers").await?;
        publish(
            self.notifier.as_ref(),
            RideEvent::RideRejected {
                ride_id,
                reason: "no_drivers".to_string(),
            },
        )
        .await;
        Ok(DispatchOutcome::NoDriversAvailable)
    }

    /// One retry with jittered backoff on a failed candidate query; a second
    /// failure is fatal for this dispatch attempt.
    async fn candidates_with_retry(
        &self,
        origin: Coordinates,
        filter: &CandidateFilter,
    ) -> DispatchResult<Vec<Uuid>> {
        match self
            .geo
            .candidates(origin, self.config.search_radius_km, filter)
            .await
        {
            Ok(candidates) => Ok(candidates),
            Err(first) => {
                warn!(error = %first, "candidate query failed, retrying once");
                let jitter: u64 = rand::thread_rng().gen_range(0..50);
                sleep(Duration::from_millis(self.config.geo_retry_backoff_ms + jitter)).await;

                self.geo
                    .candidates(origin, self.config.search_radius_km, filter)
                    .await
                    .map_err(|err| {
                        DispatchError::DispatchFailed(format!(
                            "candidate query failed twice: {err}"
                        ))
                    })
            }
        }
    }
}
