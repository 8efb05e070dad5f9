use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Optional per-dimension scores accompanying a rating.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub cleanliness: Option<f64>,
    pub driving_skill: Option<f64>,
    pub courtesy: Option<f64>,
}

/// One rating for one ride in one direction. At most one per
/// (ride, rater, rated) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub rater_id: Uuid,
    pub rated_id: Uuid,
    pub score: f64,
    pub sub_scores: SubScores,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        ride_id: Uuid,
        rater_id: Uuid,
        rated_id: Uuid,
        score: f64,
        sub_scores: SubScores,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id,
            rater_id,
            rated_id,
            score,
            sub_scores,
            created_at: now,
        }
    }
}

/// Incrementally maintained mean. Updated per observation without
/// re-scanning history, using the single-pass mean recurrence.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RollingScore {
    pub average: f64,
    pub count: u64,
}

impl RollingScore {
    pub fn seeded(average: f64, count: u64) -> Self {
        Self { average, count }
    }

    pub fn observe(&mut self, score: f64) {
        self.count += 1;
        self.average += (score - self.average) / self.count as f64;
    }
}
