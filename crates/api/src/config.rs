//! Process configuration read from the environment.

use std::net::SocketAddr;

use ratingflow_infra::PipelineConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Everything `main` needs to start the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Use Redis Streams topics instead of in-process ones.
    pub use_redis: bool,
    pub redis_url: String,
    /// Approximate per-stream retention for Redis topics; unbounded when unset.
    pub redis_stream_max_len: Option<usize>,
    pub pipeline: PipelineConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            use_redis: false,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            redis_stream_max_len: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Read `BIND_ADDR`, `USE_REDIS`, `REDIS_URL`, `REDIS_STREAM_MAX_LEN` and
    /// the pipeline variables.
    /// Invalid values fall back to defaults with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "invalid BIND_ADDR; using {DEFAULT_BIND_ADDR}");
                defaults.bind_addr
            }),
            Err(_) => defaults.bind_addr,
        };

        let use_redis = match std::env::var("USE_REDIS") {
            Ok(raw) => raw.parse::<bool>().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "invalid USE_REDIS; using false");
                false
            }),
            Err(_) => false,
        };

        let redis_url = std::env::var("REDIS_URL").unwrap_or(defaults.redis_url);

        let redis_stream_max_len = match std::env::var("REDIS_STREAM_MAX_LEN") {
            Ok(raw) => parse_max_len(&raw),
            Err(_) => None,
        };

        Self {
            bind_addr,
            use_redis,
            redis_url,
            redis_stream_max_len,
            pipeline: PipelineConfig::from_env(),
        }
    }
}

fn parse_max_len(raw: &str) -> Option<usize> {
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => {
            tracing::warn!(value = %raw, "invalid REDIS_STREAM_MAX_LEN; streams are not trimmed");
            None
        }
        Ok(n) => Some(n),
    }
}
