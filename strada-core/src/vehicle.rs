use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Sedan,
    Suv,
    Van,
    Motorbike,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionStatus {
    Pending,
    Approved,
    Rejected,
}

/// A vehicle owned by exactly one driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub capacity: u8,
    pub vehicle_type: VehicleType,
    pub inspection_status: InspectionStatus,
    pub registration_expires: NaiveDate,
    pub insurance_expires: NaiveDate,
}

impl Vehicle {
    /// Eligible for matching: inspection approved and registration/insurance
    /// valid on the given date.
    pub fn matchable(&self, on: NaiveDate) -> bool {
        self.inspection_status == InspectionStatus::Approved
            && on <= self.registration_expires
            && on <= self.insurance_expires
    }
}
