use serde::Deserialize;
use std::time::Duration;

/// Tunables of the dispatch core. Every timeout, radius and rate lives here;
/// nothing is hardcoded in the components.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub tracking: TrackerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchConfig {
    /// Candidate search radius around the ride origin.
    #[serde(default = "default_search_radius_km")]
    pub search_radius_km: f64,
    /// Upper bound on candidates tried per dispatch attempt.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// How long a driver holds an exclusive offer before it expires.
    #[serde(default = "default_offer_timeout_ms")]
    pub offer_timeout_ms: u64,
    /// Backoff before the single retry of a failed candidate query.
    #[serde(default = "default_geo_retry_backoff_ms")]
    pub geo_retry_backoff_ms: u64,
    /// A driver ping within this distance of the origin confirms pickup.
    #[serde(default = "default_pickup_radius_km")]
    pub pickup_radius_km: f64,
}

impl MatchConfig {
    pub fn offer_timeout(&self) -> Duration {
        Duration::from_millis(self.offer_timeout_ms)
    }
}

fn default_search_radius_km() -> f64 {
    5.0
}
fn default_max_candidates() -> usize {
    8
}
fn default_offer_timeout_ms() -> u64 {
    15_000
}
fn default_geo_retry_backoff_ms() -> u64 {
    250
}
fn default_pickup_radius_km() -> f64 {
    0.15
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            search_radius_km: default_search_radius_km(),
            max_candidates: default_max_candidates(),
            offer_timeout_ms: default_offer_timeout_ms(),
            geo_retry_backoff_ms: default_geo_retry_backoff_ms(),
            pickup_radius_km: default_pickup_radius_km(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_base_fare_cents")]
    pub base_fare_cents: i64,
    #[serde(default = "default_per_km_cents")]
    pub per_km_cents: i64,
    #[serde(default = "default_per_minute_cents")]
    pub per_minute_cents: i64,
    /// Per-passenger discount factor applied to SHARED rides.
    #[serde(default = "default_shared_discount")]
    pub shared_discount: f64,
    /// Flat surcharge added to SCHEDULED rides.
    #[serde(default = "default_scheduled_surcharge_cents")]
    pub scheduled_surcharge_cents: i64,
    /// Flat fee for cancelling after acceptance, before pickup.
    #[serde(default = "default_cancellation_flat_fee_cents")]
    pub cancellation_flat_fee_cents: i64,
    /// Speed assumed when estimating trip duration at request time.
    #[serde(default = "default_assumed_speed_kmh")]
    pub assumed_speed_kmh: f64,
}

fn default_base_fare_cents() -> i64 {
    250
}
fn default_per_km_cents() -> i64 {
    150
}
fn default_per_minute_cents() -> i64 {
    40
}
fn default_shared_discount() -> f64 {
    0.75
}
fn default_scheduled_surcharge_cents() -> i64 {
    300
}
fn default_cancellation_flat_fee_cents() -> i64 {
    500
}
fn default_assumed_speed_kmh() -> f64 {
    30.0
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fare_cents: default_base_fare_cents(),
            per_km_cents: default_per_km_cents(),
            per_minute_cents: default_per_minute_cents(),
            shared_discount: default_shared_discount(),
            scheduled_surcharge_cents: default_scheduled_surcharge_cents(),
            cancellation_flat_fee_cents: default_cancellation_flat_fee_cents(),
            assumed_speed_kmh: default_assumed_speed_kmh(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Number of recent driver pings averaged for the smoothed speed.
    #[serde(default = "default_speed_window")]
    pub speed_window: usize,
    /// Cross-track distance beyond which a ride is flagged off-route.
    #[serde(default = "default_deviation_threshold_km")]
    pub deviation_threshold_km: f64,
    /// Below this smoothed speed no ETA is derived.
    #[serde(default = "default_min_speed_mps")]
    pub min_speed_mps: f64,
}

fn default_speed_window() -> usize {
    5
}
fn default_deviation_threshold_km() -> f64 {
    1.0
}
fn default_min_speed_mps() -> f64 {
    0.5
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            speed_window: default_speed_window(),
            deviation_threshold_km: default_deviation_threshold_km(),
            min_speed_mps: default_min_speed_mps(),
        }
    }
}
