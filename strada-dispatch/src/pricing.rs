use strada_core::ride::{Ride, RideType};
use strada_shared::geo::{haversine_km, Coordinates};

use crate::config::PricingConfig;

/// Quote produced at request time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FareEstimate {
    pub base_price_cents: i64,
    pub estimated_duration_secs: u64,
    pub estimated_distance_km: f64,
}

/// Computes estimated and final fares and cancellation fees.
///
/// Fare formula: base + per-km rate * distance + per-minute rate * duration,
/// then the ride-type adjustment (SHARED applies the per-passenger discount
/// factor, SCHEDULED adds a flat surcharge). All monetary outputs are
/// non-negative minor currency units; currency is inherited from the ride
/// and never converted here.
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn estimate(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        ride_type: RideType,
    ) -> FareEstimate {
        let distance_km = haversine_km(origin, destination);
        let duration_secs =
            (distance_km / self.config.assumed_speed_kmh * 3600.0).round() as u64;

        FareEstimate {
            base_price_cents: self.fare_cents(distance_km, duration_secs, ride_type),
            estimated_duration_secs: duration_secs,
            estimated_distance_km: distance_km,
        }
    }

    /// Final price at drop-off, from the actuals.
    pub fn finalize(
        &self,
        ride: &Ride,
        actual_duration_secs: u64,
        actual_distance_km: f64,
    ) -> i64 {
        self.fare_cents(actual_distance_km, actual_duration_secs, ride.ride_type)
    }

    /// Cancellation fee: zero before acceptance, flat between acceptance and
    /// pickup, flat plus a distance-prorated charge after pickup.
    pub fn cancellation_fee(&self, ride: &Ride, covered_km: f64) -> i64 {
        if ride.accepted_at.is_none() {
            return 0;
        }
        if ride.picked_up_at.is_none() {
            return self.config.cancellation_flat_fee_cents.max(0);
        }
        let prorated = (self.config.per_km_cents as f64 * covered_km.max(0.0)).round() as i64;
        (self.config.cancellation_flat_fee_cents + prorated).max(0)
    }

    fn fare_cents(&self, distance_km: f64, duration_secs: u64, ride_type: RideType) -> i64 {
        let mut fare = self.config.base_fare_cents as f64
            + self.config.per_km_cents as f64 * distance_km
            + self.config.per_minute_cents as f64 * (duration_secs as f64 / 60.0);

        match ride_type {
            RideType::Standard => {}
            RideType::Shared => fare *= self.config.shared_discount,
            RideType::Scheduled => fare += self.config.scheduled_surcharge_cents as f64,
        }
        fare.max(0.0).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strada_core::ride::RideRequest;
    use uuid::Uuid;

    fn engine() -> PricingEngine {
        PricingEngine::new(PricingConfig::default())
    }

    fn ride(ride_type: RideType) -> Ride {
        Ride::new(
            RideRequest {
                passenger_id: Uuid::new_v4(),
                origin: Coordinates::new(0.0, 0.0),
                destination: Coordinates::new(0.0, 0.1),
                origin_address: None,
                destination_address: None,
                ride_type,
                currency: "EUR".to_string(),
                female_driver_only: false,
                special_requirements: None,
                baggage_count: 0,
            },
            0,
            0,
            0.0,
            Utc::now(),
        )
    }

    #[test]
    fn estimate_includes_base_distance_and_time() {
        let pricing = engine();
        let origin = Coordinates::new(0.0, 0.0);
        let destination = Coordinates::new(0.0, 0.1); // ~11.1 km

        let estimate = pricing.estimate(origin, destination, RideType::Standard);
        assert!((estimate.estimated_distance_km - 11.1).abs() < 0.1);

        let cfg = PricingConfig::default();
        let expected = cfg.base_fare_cents as f64
            + cfg.per_km_cents as f64 * estimate.estimated_distance_km
            + cfg.per_minute_cents as f64 * (estimate.estimated_duration_secs as f64 / 60.0);
        assert_eq!(estimate.base_price_cents, expected.round() as i64);
        assert!(estimate.base_price_cents > cfg.base_fare_cents);
    }

    #[test]
    fn shared_is_discounted_and_scheduled_surcharged() {
        let pricing = engine();
        let origin = Coordinates::new(0.0, 0.0);
        let destination = Coordinates::new(0.0, 0.1);

        let standard = pricing.estimate(origin, destination, RideType::Standard);
        let shared = pricing.estimate(origin, destination, RideType::Shared);
        let scheduled = pricing.estimate(origin, destination, RideType::Scheduled);

        assert!(shared.base_price_cents < standard.base_price_cents);
        assert_eq!(
            scheduled.base_price_cents,
            standard.base_price_cents + PricingConfig::default().scheduled_surcharge_cents
        );
    }

    #[test]
    fn finalize_uses_actuals() {
        let pricing = engine();
        let r = ride(RideType::Standard);

        let final_price = pricing.finalize(&r, 1200, 8.0);
        let cfg = PricingConfig::default();
        let expected = cfg.base_fare_cents as f64
            + cfg.per_km_cents as f64 * 8.0
            + cfg.per_minute_cents as f64 * 20.0;
        assert_eq!(final_price, expected.round() as i64);
    }

    #[test]
    fn cancellation_free_before_acceptance() {
        let pricing = engine();
        let r = ride(RideType::Standard);
        assert_eq!(pricing.cancellation_fee(&r, 0.0), 0);
    }

    #[test]
    fn cancellation_flat_after_acceptance() {
        let pricing = engine();
        let mut r = ride(RideType::Standard);
        r.accepted_at = Some(Utc::now());

        assert_eq!(
            pricing.cancellation_fee(&r, 0.0),
            PricingConfig::default().cancellation_flat_fee_cents
        );
    }

    #[test]
    fn cancellation_prorated_after_pickup() {
        let pricing = engine();
        let mut r = ride(RideType::Standard);
        r.accepted_at = Some(Utc::now());
        r.picked_up_at = Some(Utc::now());

        let cfg = PricingConfig::default();
        let fee = pricing.cancellation_fee(&r, 3.0);
        assert_eq!(
            fee,
            cfg.cancellation_flat_fee_cents + (cfg.per_km_cents as f64 * 3.0).round() as i64
        );
        // Proportionality.
        assert!(pricing.cancellation_fee(&r, 6.0) > fee);
    }

    #[test]
    fn fees_never_negative() {
        let mut cfg = PricingConfig::default();
        cfg.base_fare_cents = -10_000;
        cfg.cancellation_flat_fee_cents = -500;
        let pricing = PricingEngine::new(cfg);

        let origin = Coordinates::new(0.0, 0.0);
        let destination = Coordinates::new(0.0, 0.001);
        assert!(pricing.estimate(origin, destination, RideType::Standard).base_price_cents >= 0);

        let mut r = ride(RideType::Standard);
        r.accepted_at = Some(Utc::now());
        assert!(pricing.cancellation_fee(&r, 0.0) >= 0);
        r.picked_up_at = Some(Utc::now());
        assert!(pricing.cancellation_fee(&r, 1.0) >= 0);
    }
}
