//! Topology and pipeline configuration.
//!
//! Topic names are plain configuration passed to each component at
//! construction. Values come from the environment once at startup; anything
//! unparsable falls back to the default with a warning.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Names of the topics/stores the pipeline reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Inbound rating events.
    pub ratings: String,
    /// Outbound average updates.
    pub avg_ratings: String,
    /// Inbound catalog metadata (latest-value table).
    pub movies: String,
    /// Outbound enriched records (durable re-publish).
    pub rated_movies: String,
    /// Queryable view of the latest enriched record per entity.
    pub rated_movies_store: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            ratings: "ratings".to_string(),
            avg_ratings: "avg-ratings".to_string(),
            movies: "movies".to_string(),
            rated_movies: "rated-movies".to_string(),
            rated_movies_store: "rated-movies-store".to_string(),
        }
    }
}

impl TopologyConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ratings: env_string("TOPIC_RATINGS", defaults.ratings),
            avg_ratings: env_string("TOPIC_AVG_RATINGS", defaults.avg_ratings),
            movies: env_string("TOPIC_MOVIES", defaults.movies),
            rated_movies: env_string("TOPIC_RATED_MOVIES", defaults.rated_movies),
            rated_movies_store: env_string("STORE_RATED_MOVIES", defaults.rated_movies_store),
        }
    }
}

/// What to do when a live subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued record to make room for the new one.
    #[default]
    DropOldest,
    /// Discard the incoming record for that subscriber.
    DropNewest,
    /// Close the slow subscriber.
    Disconnect,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop-oldest" => Ok(Self::DropOldest),
            "drop-newest" => Ok(Self::DropNewest),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!(
                "unknown overflow policy '{other}' (expected drop-oldest, drop-newest or disconnect)"
            )),
        }
    }
}

/// Per-subscriber queue settings for the fan-out publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Everything needed to wire a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub topology: TopologyConfig,
    pub fanout: FanoutConfig,
    /// Capacity of the hand-off queue in front of the durable sink.
    pub sink_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: TopologyConfig::default(),
            fanout: FanoutConfig::default(),
            sink_queue_capacity: 1024,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            topology: TopologyConfig::from_env(),
            fanout: FanoutConfig {
                capacity: env_parse("FANOUT_CAPACITY", defaults.fanout.capacity).max(1),
                overflow: env_parse("FANOUT_OVERFLOW", defaults.fanout.overflow),
            },
            sink_queue_capacity: env_parse("SINK_QUEUE_CAPACITY", defaults.sink_queue_capacity).max(1),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default,
    }
}

/// Parse an env var, falling back to `default` (with a warning) on bad input.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(e) => {
                warn!(key, value = %raw, error = %e, "invalid config value; using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topology_names() {
        let t = TopologyConfig::default();
        assert_eq!(t.ratings, "ratings");
        assert_eq!(t.avg_ratings, "avg-ratings");
        assert_eq!(t.movies, "movies");
        assert_eq!(t.rated_movies, "rated-movies");
        assert_eq!(t.rated_movies_store, "rated-movies-store");
    }

    #[test]
    fn overflow_policy_parses_kebab_case() {
        assert_eq!("drop-oldest".parse::<OverflowPolicy>(), Ok(OverflowPolicy::DropOldest));
        assert_eq!("Drop-Newest".parse::<OverflowPolicy>(), Ok(OverflowPolicy::DropNewest));
        assert_eq!(" disconnect ".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Disconnect));
        assert!("block".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn missing_env_falls_back_to_default() {
        assert_eq!(env_parse("RATINGFLOW_TEST_UNSET_KEY", 7usize), 7);
    }
}
