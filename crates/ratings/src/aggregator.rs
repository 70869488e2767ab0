use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use ratingflow_core::{EntityId, PipelineError, PipelineResult};
use ratingflow_events::{AverageEntry, RatingEvent};

/// Running count and sum of all ratings seen for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateState {
    count: u64,
    sum: f64,
}

impl AggregateState {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// `sum / count`, or `None` for a state that has never seen a rating.
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    fn record(&mut self, score: f64) {
        self.count += 1;
        self.sum += score;
    }
}

/// Reject scores that would poison the running sum.
pub fn validate_score(score: f64) -> PipelineResult<f64> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(PipelineError::invalid_input(format!(
            "score must be a finite number (got {score})"
        )))
    }
}

/// Keyed running-average aggregator.
///
/// The aggregator is the sole owner and mutator of every [`AggregateState`].
/// Events for the same key are applied one at a time under the state lock;
/// callers that need per-key *emission* order on top of that (the pipeline
/// does) must hold their own per-key lock across `apply` and the downstream
/// writes.
///
/// Summation is plain `f64` addition, so re-ingesting the same ratings for a
/// key in a different order may differ in the last bits.
#[derive(Debug, Default)]
pub struct KeyedAggregator {
    states: Mutex<HashMap<EntityId, AggregateState>>,
}

impl KeyedAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one rating into its entity's state and return the new average.
    ///
    /// Non-finite scores are rejected with `InvalidInput` and leave all state
    /// untouched.
    pub fn apply(&self, event: &RatingEvent) -> PipelineResult<AverageEntry> {
        let score = validate_score(event.score)?;

        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(event.entity_id).or_default();
        state.record(score);

        // count >= 1 right after record()
        let average = state.sum / state.count as f64;

        Ok(AverageEntry {
            entity_id: event.entity_id,
            average,
        })
    }

    /// Snapshot of the current state for `key`.
    pub fn state(&self, key: EntityId) -> Option<AggregateState> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(&key).copied()
    }

    /// Number of entities that have received at least one rating.
    pub fn len(&self) -> usize {
        self.states.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
