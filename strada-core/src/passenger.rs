use serde::{Deserialize, Serialize};
use strada_shared::geo::Coordinates;
use uuid::Uuid;

/// A passenger account with matching preferences and rolling stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: Uuid,
    pub female_driver_only: bool,
    pub special_needs: bool,
    pub home: Option<Coordinates>,
    pub work: Option<Coordinates>,
    pub rating: f64,
    pub rating_count: u64,
    pub total_rides: u64,
}

impl Passenger {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            female_driver_only: false,
            special_needs: false,
            home: None,
            work: None,
            rating: 0.0,
            rating_count: 0,
            total_rides: 0,
        }
    }
}
