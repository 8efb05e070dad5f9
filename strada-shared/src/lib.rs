pub mod clock;
pub mod geo;

pub use clock::{Clock, ManualClock, SystemClock};
pub use geo::Coordinates;
