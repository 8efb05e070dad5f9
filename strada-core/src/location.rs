use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strada_shared::geo::Coordinates;
use uuid::Uuid;

/// Which device emitted a ping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationEmitter {
    Driver,
    Passenger,
}

/// One timestamped location report during an active ride. Pings are
/// append-only: once accepted they are never updated or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideLocation {
    pub ride_id: Uuid,
    pub emitter: LocationEmitter,
    pub recorded_at: DateTime<Utc>,
    pub position: Coordinates,
    pub speed_mps: Option<f64>,
    pub bearing_deg: Option<f64>,
    pub accuracy_m: Option<f64>,
}

impl RideLocation {
    pub fn new(
        ride_id: Uuid,
        emitter: LocationEmitter,
        recorded_at: DateTime<Utc>,
        position: Coordinates,
    ) -> Self {
        Self {
            ride_id,
            emitter,
            recorded_at,
            position,
            speed_mps: None,
            bearing_deg: None,
            accuracy_m: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }
}
