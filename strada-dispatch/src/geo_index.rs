use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use strada_core::boundary::{CandidateFilter, GeospatialProvider};
use strada_core::BoxError;
use strada_shared::clock::Clock;
use strada_shared::geo::{haversine_km, Coordinates};

use crate::registry::DriverRegistry;

/// Read-only, ordered view of matchable drivers near a point.
///
/// Excluded: drivers who are offline, unavailable, holding an offer or a
/// ride, out of standing (license, account, background check), whose vehicle
/// fails inspection/registration/insurance validity, or who have not opted in
/// when the ride requests female-only service.
///
/// Ordering: ascending distance, then descending rating, then ascending
/// total-ride count (prefer idle drivers).
pub struct GeoIndex {
    registry: Arc<DriverRegistry>,
    clock: Arc<dyn Clock>,
}

impl GeoIndex {
    pub fn new(registry: Arc<DriverRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    async fn ranked(&self, origin: Coordinates, radius_km: f64, filter: &CandidateFilter) -> Vec<Uuid> {
        let today = self.clock.now().date_naive();

        let mut ranked: Vec<(f64, f64, u64, Uuid)> = Vec::new();
        for view in self.registry.candidate_snapshot().await {
            let driver = &view.profile.driver;
            let vehicle = &view.profile.vehicle;

            if view.busy || !driver.online || !driver.available {
                continue;
            }
            if !driver.can_serve(today) || !vehicle.matchable(today) {
                continue;
            }
            if filter.female_only && !driver.female_only_service {
                continue;
            }
            let Some(position) = driver.position else {
                continue;
            };

            let distance = haversine_km(origin, position);
            if distance > radius_km {
                continue;
            }
            ranked.push((distance, driver.rating, driver.total_rides, driver.id));
        }

        ranked.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(b.1.total_cmp(&a.1))
                .then(a.2.cmp(&b.2))
        });
        ranked.into_iter().map(|(_, _, _, id)| id).collect()
    }
}

#[async_trait]
impl GeospatialProvider for GeoIndex {
    async fn candidates(
        &self,
        origin: Coordinates,
        radius_km: f64,
        filter: &CandidateFilter,
    ) -> Result<Vec<Uuid>, BoxError> {
        Ok(self.ranked(origin, radius_km, filter).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use strada_core::driver::{AccountStatus, BackgroundCheckStatus, Driver};
    use strada_core::vehicle::{InspectionStatus, Vehicle, VehicleType};
    use strada_shared::clock::ManualClock;

    fn test_driver(position: Coordinates) -> (Driver, Vehicle) {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let driver_id = Uuid::new_v4();
        let driver = Driver {
            id: driver_id,
            license_valid_from: today - chrono::Duration::days(365),
            license_expires: today + chrono::Duration::days(365),
            online: true,
            available: true,
            position: Some(position),
            rating: 4.0,
            rating_count: 10,
            total_rides: 10,
            account_status: AccountStatus::Active,
            background_check: BackgroundCheckStatus::Approved,
            female_only_service: false,
        };
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            driver_id,
            capacity: 4,
            vehicle_type: VehicleType::Sedan,
            inspection_status: InspectionStatus::Approved,
            registration_expires: today + chrono::Duration::days(90),
            insurance_expires: today + chrono::Duration::days(90),
        };
        (driver, vehicle)
    }

    fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn orders_by_distance_then_rating_then_idleness() {
        let registry = Arc::new(DriverRegistry::new());
        let clock = test_clock();
        let origin = Coordinates::new(0.0, 0.0);

        // ~1.1 km away.
        let (far, far_vehicle) = test_driver(Coordinates::new(0.01, 0.0));
        // Two drivers at the same spot ~0.55 km away, different ratings.
        let (mut near_low, v1) = test_driver(Coordinates::new(0.005, 0.0));
        near_low.rating = 3.0;
        let (mut near_high, v2) = test_driver(Coordinates::new(0.005, 0.0));
        near_high.rating = 4.9;

        let far_id = far.id;
        let near_low_id = near_low.id;
        let near_high_id = near_high.id;

        registry.register(far, far_vehicle).await;
        registry.register(near_low, v1).await;
        registry.register(near_high, v2).await;

        let index = GeoIndex::new(registry, clock);
        let candidates = index
            .candidates(origin, 5.0, &CandidateFilter::default())
            .await
            .unwrap();

        assert_eq!(candidates, vec![near_high_id, near_low_id, far_id]);
    }

    #[tokio::test]
    async fn rating_tie_prefers_idle_driver() {
        let registry = Arc::new(DriverRegistry::new());
        let clock = test_clock();
        let origin = Coordinates::new(0.0, 0.0);

        let (mut veteran, v1) = test_driver(Coordinates::new(0.003, 0.0));
        veteran.total_rides = 900;
        let (mut idle, v2) = test_driver(Coordinates::new(0.003, 0.0));
        idle.total_rides = 3;

        let veteran_id = veteran.id;
        let idle_id = idle.id;
        registry.register(veteran, v1).await;
        registry.register(idle, v2).await;

        let index = GeoIndex::new(registry, clock);
        let candidates = index
            .candidates(origin, 5.0, &CandidateFilter::default())
            .await
            .unwrap();

        assert_eq!(candidates, vec![idle_id, veteran_id]);
    }

    #[tokio::test]
    async fn filters_ineligible_drivers() {
        let registry = Arc::new(DriverRegistry::new());
        let clock = test_clock();
        let origin = Coordinates::new(0.0, 0.0);

        let (ok, ok_vehicle) = test_driver(Coordinates::new(0.001, 0.0));
        let ok_id = ok.id;
        registry.register(ok, ok_vehicle).await;

        let (offline, v) = test_driver(Coordinates::new(0.001, 0.0));
        let offline_id = offline.id;
        registry.register(offline, v).await;
        registry.set_offline(offline_id).await.unwrap();

        let (failed_inspection, mut v) = test_driver(Coordinates::new(0.001, 0.0));
        v.inspection_status = InspectionStatus::Rejected;
        registry.register(failed_inspection, v).await;

        let (outside_radius, v) = test_driver(Coordinates::new(1.0, 1.0));
        registry.register(outside_radius, v).await;

        let index = GeoIndex::new(registry, clock);
        let candidates = index
            .candidates(origin, 5.0, &CandidateFilter::default())
            .await
            .unwrap();

        assert_eq!(candidates, vec![ok_id]);
    }

    #[tokio::test]
    async fn female_only_requires_opt_in() {
        let registry = Arc::new(DriverRegistry::new());
        let clock = test_clock();
        let origin = Coordinates::new(0.0, 0.0);

        let (not_opted, v1) = test_driver(Coordinates::new(0.001, 0.0));
        registry.register(not_opted, v1).await;

        let (mut opted, v2) = test_driver(Coordinates::new(0.002, 0.0));
        opted.female_only_service = true;
        let opted_id = opted.id;
        registry.register(opted, v2).await;

        let index = GeoIndex::new(registry, clock);
        let filter = CandidateFilter { female_only: true };
        let candidates = index.candidates(origin, 5.0, &filter).await.unwrap();

        assert_eq!(candidates, vec![opted_id]);
    }
}
