use async_trait::async_trait;
use strada_shared::geo::Coordinates;
use uuid::Uuid;

use crate::driver::Driver;
use crate::location::RideLocation;
use crate::passenger::Passenger;
use crate::payment::Payment;
use crate::rating::Rating;
use crate::ride::Ride;
use crate::vehicle::Vehicle;
use crate::BoxError;

/// A record paired with its optimistic-concurrency token.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub record: T,
    pub version: u64,
}

/// Repository trait for ride persistence. `save` must reject a stale
/// `expected_version` so concurrent writers cannot silently clobber each
/// other; the new version is returned on success.
#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Versioned<Ride>>, BoxError>;

    async fn save(&self, ride: &Ride, expected_version: u64) -> Result<u64, BoxError>;
}

/// Repository trait for driver accounts.
#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Driver>, BoxError>;

    async fn save(&self, driver: &Driver) -> Result<(), BoxError>;
}

/// Repository trait for passenger accounts.
#[async_trait]
pub trait PassengerRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Passenger>, BoxError>;

    async fn save(&self, passenger: &Passenger) -> Result<(), BoxError>;
}

/// Repository trait for vehicles.
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Vehicle>, BoxError>;

    async fn save(&self, vehicle: &Vehicle) -> Result<(), BoxError>;
}

/// Repository trait for payments, keyed by ride identity.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn load_by_ride(&self, ride_id: Uuid) -> Result<Option<Payment>, BoxError>;

    async fn save(&self, payment: &Payment) -> Result<(), BoxError>;
}

/// Repository trait for ratings.
#[async_trait]
pub trait RatingRepository: Send + Sync {
    async fn append(&self, rating: &Rating) -> Result<(), BoxError>;

    async fn exists(&self, ride_id: Uuid, rater_id: Uuid, rated_id: Uuid)
        -> Result<bool, BoxError>;
}

/// Repository trait for the append-only location stream.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn append(&self, ping: &RideLocation) -> Result<(), BoxError>;

    async fn history(&self, ride_id: Uuid) -> Result<Vec<RideLocation>, BoxError>;
}

/// Eligibility constraints a candidate query must honor beyond availability.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateFilter {
    /// Only drivers opted in to female-only service.
    pub female_only: bool,
}

/// Backs the geo index's candidate query. Implementations must return
/// driver ids ordered by ascending distance from `origin`, ties broken by
/// descending rating then ascending total-ride count.
#[async_trait]
pub trait GeospatialProvider: Send + Sync {
    async fn candidates(
        &self,
        origin: Coordinates,
        radius_km: f64,
        filter: &CandidateFilter,
    ) -> Result<Vec<Uuid>, BoxError>;
}
