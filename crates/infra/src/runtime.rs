//! Process-level assembly of the pipeline.
//!
//! ```text
//! ratings topic ──► ratings-ingest ──┐
//!                                     ├─► RatingPipeline ──► avg-ratings topic (queued)
//! movies topic  ──► movies-ingest  ──┘         │
//!                                              ├─► rated-movies topic (queued)
//!                                              ├─► RatedMoviesView (rated-movies-store)
//!                                              └─► FanoutPublisher ──► live subscribers
//! ```
//!
//! The join runs once per update; every output above receives the same
//! record.

use std::io;
use std::sync::Arc;

use tracing::info;

use ratingflow_events::{AverageEntry, EnrichedRecord, EventBus, InMemoryEventBus, MetadataRecord, RatingEvent};

use crate::config::{PipelineConfig, TopologyConfig};
use crate::fanout::FanoutPublisher;
use crate::pipeline::RatingPipeline;
use crate::projections::RatedMoviesView;
use crate::read_model::EnrichedTable;
use crate::sinks::{QueuedSink, TopicSink};
use crate::workers::{WorkerHandle, spawn_metadata_worker, spawn_rating_worker};

/// Queryable view type used by the runtime.
pub type RatedMovies = RatedMoviesView<Arc<EnrichedTable>>;

/// In-process topics named after a [`TopologyConfig`].
#[derive(Debug, Clone)]
pub struct InMemoryTopics {
    pub ratings: Arc<InMemoryEventBus<RatingEvent>>,
    pub avg_ratings: Arc<InMemoryEventBus<AverageEntry>>,
    pub movies: Arc<InMemoryEventBus<MetadataRecord>>,
    pub rated_movies: Arc<InMemoryEventBus<EnrichedRecord>>,
}

impl InMemoryTopics {
    pub fn new(topology: &TopologyConfig) -> Self {
        Self {
            ratings: Arc::new(InMemoryEventBus::named(&topology.ratings)),
            avg_ratings: Arc::new(InMemoryEventBus::named(&topology.avg_ratings)),
            movies: Arc::new(InMemoryEventBus::named(&topology.movies)),
            rated_movies: Arc::new(InMemoryEventBus::named(&topology.rated_movies)),
        }
    }
}

/// A running pipeline: ingest workers, sinks, view and fan-out.
#[derive(Debug)]
pub struct PipelineRuntime {
    pipeline: Arc<RatingPipeline>,
    view: Arc<RatedMovies>,
    fanout: FanoutPublisher,
    average_out: Arc<QueuedSink<AverageEntry>>,
    enriched_out: Arc<QueuedSink<EnrichedRecord>>,
    workers: Vec<WorkerHandle>,
}

impl PipelineRuntime {
    /// Wire the pipeline over the given topics and start consuming.
    ///
    /// Both ingest workers are subscribed before this returns.
    pub fn start<R, A, M, E>(
        config: &PipelineConfig,
        ratings: R,
        avg_ratings: A,
        movies: M,
        rated_movies: E,
    ) -> io::Result<Self>
    where
        R: EventBus<RatingEvent> + 'static,
        A: EventBus<AverageEntry> + 'static,
        M: EventBus<MetadataRecord> + 'static,
        E: EventBus<EnrichedRecord> + 'static,
    {
        let topology = config.topology.clone();

        let average_out = Arc::new(QueuedSink::<AverageEntry>::spawn(
            config.sink_queue_capacity,
            Arc::new(TopicSink::new(topology.avg_ratings.clone(), avg_ratings)),
        )?);
        let enriched_out = Arc::new(QueuedSink::<EnrichedRecord>::spawn(
            config.sink_queue_capacity,
            Arc::new(TopicSink::new(topology.rated_movies.clone(), rated_movies)),
        )?);
        let view = Arc::new(RatedMoviesView::new(
            topology.rated_movies_store.clone(),
            Arc::new(EnrichedTable::new()),
        ));
        let fanout = FanoutPublisher::new(config.fanout);

        let pipeline = Arc::new(
            RatingPipeline::new(topology.clone())
                .with_average_sink(average_out.clone())
                .with_enriched_sink(enriched_out.clone())
                .with_enriched_sink(view.clone())
                .with_enriched_sink(Arc::new(fanout.clone())),
        );

        let workers = vec![
            spawn_rating_worker(ratings, pipeline.clone())?,
            spawn_metadata_worker(movies, pipeline.clone())?,
        ];

        info!(
            ratings = %topology.ratings,
            movies = %topology.movies,
            rated_movies = %topology.rated_movies,
            fanout_capacity = config.fanout.capacity,
            "pipeline started"
        );

        Ok(Self {
            pipeline,
            view,
            fanout,
            average_out,
            enriched_out,
            workers,
        })
    }

    /// Start over fresh in-process topics.
    pub fn in_memory(config: &PipelineConfig) -> io::Result<(Self, InMemoryTopics)> {
        let topics = InMemoryTopics::new(&config.topology);
        let runtime = Self::start(
            config,
            topics.ratings.clone(),
            topics.avg_ratings.clone(),
            topics.movies.clone(),
            topics.rated_movies.clone(),
        )?;
        Ok((runtime, topics))
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

    /// Stop the workers, flush the outbound queues, and close live
    /// subscriptions.
    pub fn shutdown(self) {
        for worker in self.workers {
            worker.shutdown();
        }
        self.average_out.shutdown();
        self.enriched_out.shutdown();
        self.fanout.shutdown();
        info!("pipeline stopped");
    }
}
