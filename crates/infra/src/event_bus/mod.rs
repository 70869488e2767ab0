//! Infrastructure-backed topics.
//!
//! The topic abstraction lives in `ratingflow-events` as pure mechanics.
//! This module provides substrate-backed implementations (e.g. Redis).

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsError, RedisStreamsTopic};
