use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use strada_core::rating::{Rating, RollingScore, SubScores};
use strada_core::ride::RideStatus;
use strada_core::{DispatchError, DispatchResult};
use strada_shared::clock::Clock;

use crate::lifecycle::RideEngine;

/// A rating accepted by the aggregator, with the rated party's refreshed
/// rolling stats.
#[derive(Debug, Clone)]
pub struct RatingUpdate {
    pub rating: Rating,
    pub score: RollingScore,
    /// Completed rides counted for the rated party.
    pub total_rides: u64,
}

#[derive(Default)]
struct RatingState {
    ratings: HashMap<(Uuid, Uuid, Uuid), Rating>,
    scores: HashMap<Uuid, RollingScore>,
    /// (ride, rated) pairs already counted toward the ride counter, so two
    /// ratings in opposite directions bump each party once.
    counted: HashSet<(Uuid, Uuid)>,
    completed_rides: HashMap<Uuid, u64>,
}

/// Folds completed-ride ratings into per-account rolling averages.
pub struct RatingAggregator {
    rides: Arc<RideEngine>,
    clock: Arc<dyn Clock>,
    state: Mutex<RatingState>,
}

impl RatingAggregator {
    pub fn new(rides: Arc<RideEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rides,
            clock,
            state: Mutex::new(RatingState::default()),
        }
    }

    /// Seed an account's rolling score from prior history, e.g. a driver's
    /// stats at registration.
    pub async fn seed(&self, account_id: Uuid, score: RollingScore, total_rides: u64) {
        let mut state = self.state.lock().await;
        state.scores.entry(account_id).or_insert(score);
        state.completed_rides.entry(account_id).or_insert(total_rides);
    }

    /// Submit one rating. Only COMPLETED rides are eligible, the rater and
    /// rated must be the ride's two participants, and a (ride, rater, rated)
    /// triple is accepted at most once.
    pub async fn submit(
        &self,
        ride_id: Uuid,
        rater_id: Uuid,
        rated_id: Uuid,
        score: f64,
        sub_scores: SubScores,
    ) -> DispatchResult<RatingUpdate> {
        if !(1.0..=5.0).contains(&score) {
            return Err(DispatchError::InvalidScore(score));
        }

        let ride = self.rides.snapshot(ride_id).await?;
        if ride.status != RideStatus::Completed {
            return Err(DispatchError::RideNotEligible(ride_id));
        }
        let driver_id = ride
            .assignment
            .driver_id()
            .ok_or(DispatchError::RideNotEligible(ride_id))?;
        let participants = [ride.passenger_id, driver_id];
        if !participants.contains(&rater_id)
            || !participants.contains(&rated_id)
            || rater_id == rated_id
        {
            return Err(DispatchError::RideNotEligible(ride_id));
        }

        let mut state = self.state.lock().await;
        let key = (ride_id, rater_id, rated_id);
        if state.ratings.contains_key(&key) {
            return Err(DispatchError::DuplicateRating);
        }

        let rolling = state.scores.entry(rated_id).or_default();
        rolling.observe(score);
        let score_snapshot = *rolling;

        if state.counted.insert((ride_id, rated_id)) {
            *state.completed_rides.entry(rated_id).or_insert(0) += 1;
        }
        let total_rides = state.completed_rides.get(&rated_id).copied().unwrap_or(0);

        let rating = Rating::new(
            ride_id,
            rater_id,
            rated_id,
            score,
            sub_scores,
            self.clock.now(),
        );
        state.ratings.insert(key, rating.clone());
        info!(ride_id = %ride_id, rated_id = %rated_id, score, "rating accepted");

        Ok(RatingUpdate {
            rating,
            score: score_snapshot,
            total_rides,
        })
    }

    pub async fn score_of(&self, account_id: Uuid) -> Option<RollingScore> {
        self.state.lock().await.scores.get(&account_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use strada_core::ride::{Ride, RideRequest, RideType};
    use strada_shared::clock::ManualClock;
    use strada_shared::geo::Coordinates;

    struct Fixture {
        aggregator: RatingAggregator,
        ride_id: Uuid,
        passenger_id: Uuid,
        driver_id: Uuid,
    }

    async fn completed_ride() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let engine = Arc::new(RideEngine::new(clock.clone()));
        let passenger_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();

        let ride = Ride::new(
            RideRequest {
                passenger_id,
                origin: Coordinates::new(0.0, 0.0),
                destination: Coordinates::new(1.0, 1.0),
                origin_address: None,
                destination_address: None,
                ride_type: RideType::Standard,
                currency: "EUR".to_string(),
                female_driver_only: false,
                special_requirements: None,
                baggage_count: 0,
            },
            1000,
            900,
            5.0,
            Utc::now(),
        );
        let ride_id = ride.id;
        engine.insert(ride).await;
        engine.accept(ride_id, driver_id, Uuid::new_v4()).await.unwrap();
        engine.start_trip(ride_id, true).await.unwrap();
        engine.complete(ride_id, 1450, 900, 5.0).await.unwrap();

        let aggregator = RatingAggregator::new(engine, clock);
        Fixture {
            aggregator,
            ride_id,
            passenger_id,
            driver_id,
        }
    }

    #[tokio::test]
    async fn duplicate_triple_is_rejected() {
        let f = completed_ride().await;

        f.aggregator
            .submit(f.ride_id, f.passenger_id, f.driver_id, 5.0, SubScores::default())
            .await
            .unwrap();
        let err = f
            .aggregator
            .submit(f.ride_id, f.passenger_id, f.driver_id, 1.0, SubScores::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateRating));

        // The average reflects exactly one update.
        let score = f.aggregator.score_of(f.driver_id).await.unwrap();
        assert_eq!(score.count, 1);
        assert_eq!(score.average, 5.0);
    }

    #[tokio::test]
    async fn both_directions_count_the_ride_once_each() {
        let f = completed_ride().await;

        let driver_update = f
            .aggregator
            .submit(f.ride_id, f.passenger_id, f.driver_id, 4.0, SubScores::default())
            .await
            .unwrap();
        let passenger_update = f
            .aggregator
            .submit(f.ride_id, f.driver_id, f.passenger_id, 5.0, SubScores::default())
            .await
            .unwrap();

        assert_eq!(driver_update.total_rides, 1);
        assert_eq!(passenger_update.total_rides, 1);
    }

    #[tokio::test]
    async fn incomplete_ride_is_not_eligible() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let engine = Arc::new(RideEngine::new(clock.clone()));
        let passenger_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();
        let ride = Ride::new(
            RideRequest {
                passenger_id,
                origin: Coordinates::new(0.0, 0.0),
                destination: Coordinates::new(1.0, 1.0),
                origin_address: None,
                destination_address: None,
                ride_type: RideType::Standard,
                currency: "EUR".to_string(),
                female_driver_only: false,
                special_requirements: None,
                baggage_count: 0,
            },
            1000,
            900,
            5.0,
            Utc::now(),
        );
        let ride_id = ride.id;
        engine.insert(ride).await;
        engine.accept(ride_id, driver_id, Uuid::new_v4()).await.unwrap();

        let aggregator = RatingAggregator::new(engine, clock);
        let err = aggregator
            .submit(ride_id, passenger_id, driver_id, 5.0, SubScores::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::RideNotEligible(_)));
    }

    #[tokio::test]
    async fn non_participants_are_rejected() {
        let f = completed_ride().await;
        let stranger = Uuid::new_v4();

        let err = f
            .aggregator
            .submit(f.ride_id, stranger, f.driver_id, 5.0, SubScores::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::RideNotEligible(_)));
    }

    #[tokio::test]
    async fn out_of_range_score_is_invalid() {
        let f = completed_ride().await;

        let err = f
            .aggregator
            .submit(f.ride_id, f.passenger_id, f.driver_id, 5.5, SubScores::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidScore(_)));
    }

    #[tokio::test]
    async fn seeded_history_continues() {
        let f = completed_ride().await;
        f.aggregator
            .seed(f.driver_id, RollingScore::seeded(4.0, 3), 3)
            .await;

        let update = f
            .aggregator
            .submit(f.ride_id, f.passenger_id, f.driver_id, 5.0, SubScores::default())
            .await
            .unwrap();
        assert!((update.score.average - 4.25).abs() < 1e-12);
        assert_eq!(update.total_rides, 4);
    }
}
