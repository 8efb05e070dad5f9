use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strada_shared::geo::Coordinates;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    Deactivated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundCheckStatus {
    Pending,
    Approved,
    Rejected,
}

/// A driver account and its live presence state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub license_valid_from: NaiveDate,
    pub license_expires: NaiveDate,
    pub online: bool,
    pub available: bool,
    /// None while the driver is offline.
    pub position: Option<Coordinates>,
    /// Rolling average rating, maintained incrementally.
    pub rating: f64,
    pub rating_count: u64,
    pub total_rides: u64,
    pub account_status: AccountStatus,
    pub background_check: BackgroundCheckStatus,
    /// Opted in to serve female-only ride requests.
    pub female_only_service: bool,
}

impl Driver {
    /// A driver in good standing: active account, approved background check
    /// and a license valid on the given date.
    pub fn can_serve(&self, on: NaiveDate) -> bool {
        self.account_status == AccountStatus::Active
            && self.background_check == BackgroundCheckStatus::Approved
            && self.license_valid_from <= on
            && on <= self.license_expires
    }
}
