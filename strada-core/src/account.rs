use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::Driver;
use crate::passenger::Passenger;

/// The roles one account identity can hold. A closed variant instead of two
/// independently nullable side records, so "neither role" is unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountRole {
    Driver(Driver),
    Passenger(Passenger),
    Both { driver: Driver, passenger: Passenger },
}

impl AccountRole {
    pub fn account_id(&self) -> Uuid {
        match self {
            AccountRole::Driver(d) => d.id,
            AccountRole::Passenger(p) => p.id,
            AccountRole::Both { driver, .. } => driver.id,
        }
    }

    pub fn as_driver(&self) -> Option<&Driver> {
        match self {
            AccountRole::Driver(d) => Some(d),
            AccountRole::Both { driver, .. } => Some(driver),
            AccountRole::Passenger(_) => None,
        }
    }

    pub fn as_passenger(&self) -> Option<&Passenger> {
        match self {
            AccountRole::Passenger(p) => Some(p),
            AccountRole::Both { passenger, .. } => Some(passenger),
            AccountRole::Driver(_) => None,
        }
    }
}
