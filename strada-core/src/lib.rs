pub mod account;
pub mod boundary;
pub mod driver;
pub mod events;
pub mod location;
pub mod passenger;
pub mod payment;
pub mod rating;
pub mod ride;
pub mod vehicle;

pub use driver::Driver;
pub use events::{NotificationSink, RideEvent};
pub use location::{LocationEmitter, RideLocation};
pub use passenger::Passenger;
pub use payment::{Payment, PaymentProcessor, PaymentStatus, ProcessorStatus};
pub use rating::{Rating, RollingScore, SubScores};
pub use ride::{Assignment, CancelledBy, Ride, RideRequest, RideStatus, RideType};
pub use vehicle::Vehicle;

use ride::RideStatus as Status;
use uuid::Uuid;

/// Boxed error type used at the boundary traits, matching the shape external
/// collaborators (repositories, processors, sinks) return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The dispatch core's error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid ride transition from {from:?} to {to:?}")]
    InvalidTransition { from: Status, to: Status },

    #[error("ride {0} is already in a terminal state")]
    RideAlreadyFinalized(Uuid),

    #[error("pickup not confirmed for ride {0}: no driver ping near origin")]
    PickupNotConfirmed(Uuid),

    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("offer is no longer outstanding")]
    OfferExpired,

    #[error("rating already submitted for this ride and direction")]
    DuplicateRating,

    #[error("ride {0} is not eligible for this operation")]
    RideNotEligible(Uuid),

    #[error("payment for intent {0} is still pending at the processor")]
    PaymentSettlementPending(String),

    #[error("ride not found: {0}")]
    RideNotFound(Uuid),

    #[error("driver not found: {0}")]
    DriverNotFound(Uuid),

    #[error("no payment recorded for ride {0}")]
    PaymentNotFound(Uuid),

    #[error("rating score {0} outside the 1.0..=5.0 range")]
    InvalidScore(f64),

    #[error("payment processor error: {0}")]
    Processor(String),

    #[error("repository error: {0}")]
    Repository(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
