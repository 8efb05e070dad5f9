use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use strada_core::events::{publish, NotificationSink, RideEvent};
use strada_core::location::{LocationEmitter, RideLocation};
use strada_core::DispatchResult;
use strada_shared::geo::{cross_track_km, haversine_km, Coordinates};

use crate::config::TrackerConfig;
use crate::lifecycle::RideEngine;

/// Why a ping was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingRejection {
    /// The ride is not in ACCEPTED or IN_PROGRESS.
    RideNotActive,
    /// Timestamp not strictly greater than the last accepted ping from the
    /// same emitter.
    NonMonotonicTimestamp,
}

/// Outcome of a ping ingestion. The ETA and off-route flag are advisory;
/// they never block acceptance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    Accepted {
        eta_secs: Option<u64>,
        off_route: bool,
    },
    Rejected(PingRejection),
}

/// Append-only location log for one ride, with the per-emitter monotonicity
/// watermarks. Entries are never updated or removed.
#[derive(Default)]
struct RideTrack {
    pings: Vec<RideLocation>,
    last_driver: Option<DateTime<Utc>>,
    last_passenger: Option<DateTime<Utc>>,
}

impl RideTrack {
    fn last_for(&self, emitter: LocationEmitter) -> Option<DateTime<Utc>> {
        match emitter {
            LocationEmitter::Driver => self.last_driver,
            LocationEmitter::Passenger => self.last_passenger,
        }
    }

    fn set_last(&mut self, emitter: LocationEmitter, at: DateTime<Utc>) {
        match emitter {
            LocationEmitter::Driver => self.last_driver = Some(at),
            LocationEmitter::Passenger => self.last_passenger = Some(at),
        }
    }

    /// Mean of the reported speeds over the most recent driver pings.
    fn smoothed_speed_mps(&self, window: usize) -> Option<f64> {
        let speeds: Vec<f64> = self
            .pings
            .iter()
            .rev()
            .filter(|p| p.emitter == LocationEmitter::Driver)
            .take(window)
            .filter_map(|p| p.speed_mps)
            .collect();
        if speeds.is_empty() {
            return None;
        }
        Some(speeds.iter().sum::<f64>() / speeds.len() as f64)
    }
}

/// Ingests and orders location pings per active ride, deriving ETA and
/// route-deviation signals.
pub struct LocationTracker {
    rides: Arc<RideEngine>,
    notifier: Arc<dyn NotificationSink>,
    config: TrackerConfig,
    tracks: RwLock<HashMap<Uuid, Arc<Mutex<RideTrack>>>>,
}

impl LocationTracker {
    pub fn new(
        rides: Arc<RideEngine>,
        notifier: Arc<dyn NotificationSink>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            rides,
            notifier,
            config,
            tracks: RwLock::new(HashMap::new()),
        }
    }

    async fn track(&self, ride_id: Uuid) -> Arc<Mutex<RideTrack>> {
        if let Some(track) = self.tracks.read().await.get(&ride_id) {
            return track.clone();
        }
        self.tracks
            .write()
            .await
            .entry(ride_id)
            .or_default()
            .clone()
    }

    /// Ingest one ping. Appends to the ride's history when the ride is
    /// active and the timestamp advances the emitter's watermark; otherwise
    /// the ping is rejected without touching history.
    ///
    /// The ride's own lock is held across the status check and the append,
    /// so a transition committing concurrently can never land a ping in a
    /// finalized ride's history.
    pub async fn ingest(&self, ping: RideLocation) -> DispatchResult<IngestOutcome> {
        let ride = self.rides.lock(ping.ride_id).await?;
        if !ride.status.is_active() {
            return Ok(IngestOutcome::Rejected(PingRejection::RideNotActive));
        }

        let track = self.track(ping.ride_id).await;
        let mut track = track.lock().await;

        if let Some(last) = track.last_for(ping.emitter) {
            if ping.recorded_at <= last {
                debug!(ride_id = %ping.ride_id, "stale ping rejected");
                return Ok(IngestOutcome::Rejected(
                    PingRejection::NonMonotonicTimestamp,
                ));
            }
        }

        track.set_last(ping.emitter, ping.recorded_at);
        track.pings.push(ping.clone());

        // Advisory signals, derived after the append.
        let mut eta_secs = None;
        let mut off_route = false;
        let mut deviation_km = 0.0;
        if ping.emitter == LocationEmitter::Driver {
            if let Some(speed) = track.smoothed_speed_mps(self.config.speed_window) {
                if speed >= self.config.min_speed_mps {
                    let remaining_km = haversine_km(ping.position, ride.destination);
                    eta_secs = Some((remaining_km * 1000.0 / speed).round() as u64);
                }
            }
            deviation_km = cross_track_km(ride.origin, ride.destination, ping.position);
            off_route = deviation_km > self.config.deviation_threshold_km;
        }
        drop(track);
        drop(ride);

        if let Some(eta) = eta_secs {
            publish(
                self.notifier.as_ref(),
                RideEvent::EtaUpdated {
                    ride_id: ping.ride_id,
                    eta_secs: eta,
                },
            )
            .await;
        }
        if off_route {
            publish(
                self.notifier.as_ref(),
                RideEvent::RouteDeviated {
                    ride_id: ping.ride_id,
                    off_route_km: deviation_km,
                },
            )
            .await;
        }

        Ok(IngestOutcome::Accepted { eta_secs, off_route })
    }

    /// Whether any driver ping in the ride's history landed within
    /// `radius_km` of `point`. History is append-only, so once true this
    /// stays true for the life of the ride.
    pub async fn driver_pinged_near(&self, ride_id: Uuid, point: Coordinates, radius_km: f64) -> bool {
        let track = self.track(ride_id).await;
        let track = track.lock().await;
        track
            .pings
            .iter()
            .filter(|p| p.emitter == LocationEmitter::Driver)
            .any(|p| haversine_km(p.position, point) <= radius_km)
    }

    /// Distance covered so far: the sum over consecutive driver pings.
    pub async fn covered_km(&self, ride_id: Uuid) -> f64 {
        let track = self.track(ride_id).await;
        let track = track.lock().await;
        let driver_pings: Vec<_> = track
            .pings
            .iter()
            .filter(|p| p.emitter == LocationEmitter::Driver)
            .collect();
        driver_pings
            .windows(2)
            .map(|w| haversine_km(w[0].position, w[1].position))
            .sum()
    }

    /// Full ordered history for a ride.
    pub async fn history(&self, ride_id: Uuid) -> Vec<RideLocation> {
        let track = self.track(ride_id).await;
        let track = track.lock().await;
        track.pings.clone()
    }
}
