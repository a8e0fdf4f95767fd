//! Candidate scoring for dispatch.
//!
//! The composite score rewards nearby, highly-rated drivers who rarely
//! decline. Distance and decline rate are floored so a driver standing on
//! the pickup point cannot produce an unbounded score.

use serde::{Deserialize, Serialize};

use crate::models::ride::VehicleTier;

/// Floor applied to distance before taking its reciprocal.
pub const MIN_DISTANCE_KM: f64 = 0.01;

/// Floor applied to decline rate before taking its reciprocal.
pub const MIN_DECLINE_RATE: f64 = 0.01;

/// Weight triple for the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the inverse distance term.
    pub alpha: f64,
    /// Weight of the rating term.
    pub beta: f64,
    /// Weight of the inverse decline-rate term.
    pub gamma: f64,
}

impl ScoringWeights {
    /// The standard, distance-heavy weight triple.
    pub fn standard() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.3,
            gamma: 0.2,
        }
    }

    /// The A/B variant with rating rebalanced upward.
    pub fn variant() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.4,
            gamma: 0.2,
        }
    }

    /// Select weights based on the `new_scoring_algo` flag.
    pub fn for_flag(new_scoring_algo: bool) -> Self {
        if new_scoring_algo {
            Self::variant()
        } else {
            Self::standard()
        }
    }

    /// Composite score for a single candidate.
    pub fn score(&self, distance_km: f64, rating: f64, decline_rate: f64) -> f64 {
        self.alpha / distance_km.max(MIN_DISTANCE_KM)
            + self.beta * rating
            + self.gamma / decline_rate.max(MIN_DECLINE_RATE)
    }
}

/// A dispatch candidate surviving the availability/tier/tried filters.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub driver_id: String,
    pub distance_km: f64,
    pub tier: VehicleTier,
    pub rating: f64,
    pub decline_rate: f64,
}

/// A candidate with its computed score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

/// Score and rank candidates, best first.
///
/// Input order must be ascending by distance (the geo-index result order);
/// the sort is stable, so equal scores keep that order as the tie-break.
pub fn rank_candidates(candidates: Vec<Candidate>, weights: ScoringWeights) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let score = weights.score(
                candidate.distance_km,
                candidate.rating,
                candidate.decline_rate,
            );
            ScoredCandidate { candidate, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}
