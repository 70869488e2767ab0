use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context as _;

use ratingflow_core::{PipelineError, PipelineResult};
use ratingflow_events::{EventBus, MetadataRecord, RatingEvent};
use ratingflow_infra::fanout::FanoutPublisher;
use ratingflow_infra::pipeline::RatingPipeline;
use ratingflow_infra::runtime::{InMemoryTopics, PipelineRuntime, RatedMovies};
use ratingflow_infra::{PipelineConfig, TopologyConfig};

#[cfg(feature = "redis")]
use ratingflow_events::{AverageEntry, EnrichedRecord};
#[cfg(feature = "redis")]
use ratingflow_infra::event_bus::RedisStreamsTopic;

use crate::config::ApiConfig;

/// Inbound topics the HTTP layer publishes onto.
#[derive(Debug, Clone)]
pub enum IngestTopics {
    InMemory(InMemoryTopics),
    #[cfg(feature = "redis")]
    Redis {
        ratings: Arc<RedisStreamsTopic<RatingEvent>>,
        movies: Arc<RedisStreamsTopic<MetadataRecord>>,
    },
}

impl IngestTopics {
    pub fn publish_rating(&self, event: RatingEvent) -> PipelineResult<()> {
        match self {
            IngestTopics::InMemory(topics) => topics
                .ratings
                .publish(event)
                .map_err(|e| PipelineError::sink_unavailable(e.to_string())),
            #[cfg(feature = "redis")]
            IngestTopics::Redis { ratings, .. } => ratings
                .publish(event)
                .map_err(|e| PipelineError::sink_unavailable(e.to_string())),
        }
    }

    pub fn publish_movie(&self, record: MetadataRecord) -> PipelineResult<()> {
        match self {
            IngestTopics::InMemory(topics) => topics
                .movies
                .publish(record)
                .map_err(|e| PipelineError::sink_unavailable(e.to_string())),
            #[cfg(feature = "redis")]
            IngestTopics::Redis { movies, .. } => movies
                .publish(record)
                .map_err(|e| PipelineError::sink_unavailable(e.to_string())),
        }
    }
}

/// Everything the handlers need, shared behind an `Arc`.
#[derive(Debug)]
pub struct AppServices {
    topics: IngestTopics,
    topology: TopologyConfig,
    pipeline: Arc<RatingPipeline>,
    view: Arc<RatedMovies>,
    fanout: FanoutPublisher,
    runtime: Mutex<Option<PipelineRuntime>>,
}

pub fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    if config.use_redis {
        #[cfg(feature = "redis")]
        {
            return build_redis_services(config);
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!("USE_REDIS=true but redis feature not enabled, falling back to in-memory topics");
        }
    }

    build_in_memory_services(&config.pipeline)
}

fn build_in_memory_services(config: &PipelineConfig) -> anyhow::Result<AppServices> {
    let (runtime, topics) =
        PipelineRuntime::in_memory(config).context("failed to start in-memory pipeline")?;
    Ok(AppServices::new(IngestTopics::InMemory(topics), config, runtime))
}

#[cfg(feature = "redis")]
fn build_redis_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let topology = &config.pipeline.topology;
    let url = config.redis_url.as_str();

    let max_len = config.redis_stream_max_len;

    let ratings = Arc::new(open_topic::<RatingEvent>(url, &topology.ratings, max_len)?);
    let movies = Arc::new(open_topic::<MetadataRecord>(url, &topology.movies, max_len)?);
    ratings.ping().context("redis is not reachable")?;

    let runtime = PipelineRuntime::start(
        &config.pipeline,
        ratings.clone(),
        Arc::new(open_topic::<AverageEntry>(url, &topology.avg_ratings, max_len)?),
        movies.clone(),
        Arc::new(open_topic::<EnrichedRecord>(url, &topology.rated_movies, max_len)?),
    )
    .context("failed to start redis-backed pipeline")?;

    tracing::info!(redis_url = %config.redis_url, "using redis streams topics");
    Ok(AppServices::new(
        IngestTopics::Redis { ratings, movies },
        &config.pipeline,
        runtime,
    ))
}

#[cfg(feature = "redis")]
fn open_topic<M>(url: &str, key: &str, max_len: Option<usize>) -> anyhow::Result<RedisStreamsTopic<M>> {
    let topic = RedisStreamsTopic::new(url, key).with_context(|| format!("cannot open topic {key}"))?;
    Ok(match max_len {
        Some(n) => topic.with_max_len(n),
        None => topic,
    })
}

impl AppServices {
    fn new(topics: IngestTopics, config: &PipelineConfig, runtime: PipelineRuntime) -> Self {
        Self {
            topics,
            topology: config.topology.clone(),
            pipeline: runtime.pipeline().clone(),
            view: runtime.view().clone(),
            fanout: runtime.fanout().clone(),
            runtime: Mutex::new(Some(runtime)),
        }
    }

    pub fn topics(&self) -> &IngestTopics {
        &self.topics
    }

    pub fn topology(&self) -> &TopologyConfig {
        &self.topology
    }

    pub fn pipeline(&self) -> &Arc<RatingPipeline> {
        &self.pipeline
    }

    pub fn view(&self) -> &Arc<RatedMovies> {
        &self.view
    }

    pub fn fanout(&self) -> &FanoutPublisher {
        &self.fanout
    }

    /// Stop the pipeline runtime. Later calls are no-ops.
    pub fn shutdown(&self) {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(runtime) = runtime {
            runtime.shutdown();
        }
    }
}
