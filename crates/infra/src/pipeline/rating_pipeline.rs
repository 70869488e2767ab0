//! Rating aggregation + enrichment pipeline (application-level orchestration).
//!
//! ## Flow
//!
//! ```text
//! RatingEvent
//!   ↓ (per-key lock held from here ...)
//! 1. Aggregator: count += 1, sum += score → AverageEntry
//!   ↓
//! 2. Average table upsert, AverageEntry → average sinks (avg-ratings topic)
//!   ↓
//! 3. Joiner: metadata ⋈ average for the key
//!   ↓
//! 4. EnrichedRecord → enriched sinks (durable topic, view, fan-out)
//!   ↓ (... to here)
//!
//! MetadataRecord
//!   ↓ (per-key lock)
//! 1. Reference table upsert
//!   ↓
//! 2. Joiner → enriched sinks
//! ```
//!
//! Holding the key's stripe across all steps means that, for one key, sinks
//! observe averages in exactly the order the aggregator produced them. There
//! is no ordering between keys.
//!
//! ## Failure handling
//!
//! - a non-finite score is rejected with `InvalidInput` before any state changes
//! - a missing counterpart during the join is normal and emits nothing
//! - a failing sink is logged and skipped; the other sinks still run
//! - while paused, ingestion returns `Paused` and leaves state untouched
//! - a topic losing its substrate pauses the pipeline; once every lost topic
//!   is back, the pipeline resumes unless an operator paused it meanwhile

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use ratingflow_core::{EntityId, PipelineError, PipelineResult};
use ratingflow_events::{
    AverageEntry, ConnectivityListener, EnrichedRecord, MetadataRecord, RatingEvent, RecordSink,
};
use ratingflow_ratings::KeyedAggregator;

use crate::config::TopologyConfig;
use crate::projections::EnrichmentJoiner;
use crate::read_model::{AverageTable, ReferenceTable, TableStore, Upsert};

use super::gate::PipelineGate;
use super::key_locks::KeyLocks;

type SharedSink<M> = Arc<dyn RecordSink<M>>;

/// What one accepted rating produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingOutcome {
    pub average: AverageEntry,
    pub enriched: Option<EnrichedRecord>,
}

/// What one accepted metadata record produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataOutcome {
    pub upsert: Upsert,
    pub enriched: Option<EnrichedRecord>,
}

/// Counters exposed for status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub ratings_applied: u64,
    pub ratings_rejected: u64,
    pub metadata_applied: u64,
    pub enriched_emitted: u64,
    pub sink_failures: u64,
    pub tracked_entities: usize,
    pub catalog_entries: usize,
    pub paused: bool,
}

#[derive(Debug, Default)]
struct Counters {
    ratings_applied: AtomicU64,
    ratings_rejected: AtomicU64,
    metadata_applied: AtomicU64,
    enriched_emitted: AtomicU64,
    sink_failures: AtomicU64,
}

/// The streaming core: aggregator, both table caches, and the joiner, wired
/// together explicitly.
///
/// Construct with [`RatingPipeline::new`] and attach sinks with the
/// `with_*_sink` builders. All methods take `&self`; the pipeline is meant to
/// be shared behind an `Arc` by any number of ingest workers.
pub struct RatingPipeline {
    topology: TopologyConfig,
    locks: KeyLocks,
    gate: Arc<PipelineGate>,
    aggregator: KeyedAggregator,
    joiner: EnrichmentJoiner<Arc<ReferenceTable>, Arc<AverageTable>>,
    average_sinks: Vec<SharedSink<AverageEntry>>,
    enriched_sinks: Vec<SharedSink<EnrichedRecord>>,
    counters: Counters,
    outages: AtomicUsize,
    paused_by_upstream: AtomicBool,
}

impl core::fmt::Debug for RatingPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RatingPipeline")
            .field("topology", &self.topology)
            .field("stripes", &self.locks.stripes())
            .field("paused", &self.gate.is_paused())
            .field(
                "average_sinks",
                &self.average_sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field(
                "enriched_sinks",
                &self.enriched_sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RatingPipeline {
    pub fn new(topology: TopologyConfig) -> Self {
        Self {
            topology,
            locks: KeyLocks::default(),
            gate: Arc::new(PipelineGate::new()),
            aggregator: KeyedAggregator::new(),
            joiner: EnrichmentJoiner::new(Arc::new(ReferenceTable::new()), Arc::new(AverageTable::new())),
            average_sinks: Vec::new(),
            enriched_sinks: Vec::new(),
            counters: Counters::default(),
            outages: AtomicUsize::new(0),
            paused_by_upstream: AtomicBool::new(false),
        }
    }

    /// Use a specific number of per-key lock stripes.
    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.locks = KeyLocks::new(stripes);
        self
    }

    /// Receive every AverageEntry the aggregator produces.
    pub fn with_average_sink(mut self, sink: SharedSink<AverageEntry>) -> Self {
        self.average_sinks.push(sink);
        self
    }

    /// Receive every EnrichedRecord the joiner produces.
    pub fn with_enriched_sink(mut self, sink: SharedSink<EnrichedRecord>) -> Self {
        self.enriched_sinks.push(sink);
        self
    }

    pub fn topology(&self) -> &TopologyConfig {
        &self.topology
    }

    pub fn aggregator(&self) -> &KeyedAggregator {
        &self.aggregator
    }

    pub fn reference_table(&self) -> &Arc<ReferenceTable> {
        self.joiner.reference()
    }

    pub fn average_table(&self) -> &Arc<AverageTable> {
        self.joiner.averages()
    }

    pub fn gate(&self) -> &Arc<PipelineGate> {
        &self.gate
    }

    /// Apply one rating.
    #[instrument(skip(self, event), fields(entity_id = %event.entity_id))]
    pub fn ingest_rating(&self, event: RatingEvent) -> PipelineResult<RatingOutcome> {
        if self.gate.is_paused() {
            return Err(PipelineError::Paused);
        }

        let key = event.entity_id;
        let _guard = self.locks.lock(key);

        let average = match self.aggregator.apply(&event) {
            Ok(avg) => avg,
            Err(e) => {
                self.counters.ratings_rejected.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "rating rejected");
                return Err(e);
            }
        };
        self.counters.ratings_applied.fetch_add(1, Ordering::Relaxed);

        self.average_table().upsert(key, average);
        self.emit_average(&average);

        let enriched = self.join_and_emit(key);
        Ok(RatingOutcome { average, enriched })
    }

    /// Apply one catalog metadata update (last write wins).
    #[instrument(skip(self, record), fields(entity_id = %record.entity_id))]
    pub fn ingest_metadata(&self, record: MetadataRecord) -> PipelineResult<MetadataOutcome> {
        if self.gate.is_paused() {
            return Err(PipelineError::Paused);
        }

        let key = record.entity_id;
        let _guard = self.locks.lock(key);

        let upsert = self.reference_table().upsert(key, record);
        self.counters.metadata_applied.fetch_add(1, Ordering::Relaxed);
        debug!(first_insert = upsert.is_first_insert(), "metadata stored");

        let enriched = self.join_and_emit(key);
        Ok(MetadataOutcome { upsert, enriched })
    }

    /// Re-evaluate the join for `key` and emit the result, without any table
    /// change. Repeated calls emit equal records.
    pub fn refresh(&self, key: EntityId) -> Option<EnrichedRecord> {
        let _guard = self.locks.lock(key);
        self.join_and_emit(key)
    }

    /// Operator pause. Recovery of a lost topic will not undo it.
    pub fn pause(&self) -> bool {
        self.paused_by_upstream.store(false, Ordering::SeqCst);
        let changed = self.gate.pause();
        if changed {
            warn!("pipeline paused");
        }
        changed
    }

    pub fn resume(&self) -> bool {
        self.paused_by_upstream.store(false, Ordering::SeqCst);
        let changed = self.gate.resume();
        if changed {
            info!("pipeline resumed");
        }
        changed
    }

    /// Collaborator hook: the substrate is gone; stop ingesting cleanly.
    pub fn upstream_unavailable(&self, reason: impl Into<String>) {
        let err = PipelineError::upstream_unavailable(reason);
        let outages = self.outages.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(error = %err, outages, "pausing pipeline");
        if self.gate.pause() {
            self.paused_by_upstream.store(true, Ordering::SeqCst);
        }
    }

    /// Collaborator hook: a lost substrate is back. Resumes once no outage is
    /// outstanding, if the pause came from [`upstream_unavailable`](Self::upstream_unavailable).
    pub fn upstream_recovered(&self) {
        let Ok(previous) = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        else {
            return;
        };
        if previous > 1 {
            debug!(outages = previous - 1, "upstream partially recovered");
            return;
        }
        if self.paused_by_upstream.swap(false, Ordering::SeqCst) && self.gate.resume() {
            info!("upstream recovered, pipeline resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn wait_until_resumed(&self, timeout: Duration) -> bool {
        self.gate.wait_open(timeout)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            ratings_applied: self.counters.ratings_applied.load(Ordering::Relaxed),
            ratings_rejected: self.counters.ratings_rejected.load(Ordering::Relaxed),
            metadata_applied: self.counters.metadata_applied.load(Ordering::Relaxed),
            enriched_emitted: self.counters.enriched_emitted.load(Ordering::Relaxed),
            sink_failures: self.counters.sink_failures.load(Ordering::Relaxed),
            tracked_entities: self.aggregator.len(),
            catalog_entries: self.reference_table().len(),
            paused: self.gate.is_paused(),
        }
    }

    // Caller holds the key lock.
    fn join_and_emit(&self, key: EntityId) -> Option<EnrichedRecord> {
        let enriched = self.joiner.on_update(key)?;
        self.counters.enriched_emitted.fetch_add(1, Ordering::Relaxed);

        for sink in &self.enriched_sinks {
            if let Err(e) = sink.accept(&enriched) {
                self.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
                let err = PipelineError::sink_unavailable(e.to_string());
                warn!(sink = sink.name(), entity_id = %key, error = %err, "enriched sink failed");
            }
        }

        Some(enriched)
    }

    fn emit_average(&self, average: &AverageEntry) {
        for sink in &self.average_sinks {
            if let Err(e) = sink.accept(average) {
                self.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
                warn!(sink = sink.name(), entity_id = %average.entity_id, error = %e, "average sink failed");
            }
        }
    }
}

impl ConnectivityListener for RatingPipeline {
    fn unavailable(&self, topic: &str, reason: &str) {
        self.upstream_unavailable(format!("{topic}: {reason}"));
    }

    fn recovered(&self, topic: &str) {
        debug!(topic, "topic reachable again");
        self.upstream_recovered();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use ratingflow_events::SinkError;

    /// Sink that records everything it receives.
    #[derive(Debug)]
    struct CollectSink<M> {
        seen: Mutex<Vec<M>>,
    }

    impl<M> Default for CollectSink<M> {
        fn default() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl<M: Clone + Send + Sync> CollectSink<M> {
        fn seen(&self) -> Vec<M> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl<M: Clone + Send + Sync> RecordSink<M> for CollectSink<M> {
        fn name(&self) -> &str {
            "collect"
        }

        fn accept(&self, record: &M) -> Result<(), SinkError> {
            self.seen.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl RecordSink<EnrichedRecord> for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn accept(&self, _record: &EnrichedRecord) -> Result<(), SinkError> {
            Err(SinkError::Transport("down".to_string()))
        }
    }

    fn pipeline() -> (
        RatingPipeline,
        Arc<CollectSink<AverageEntry>>,
        Arc<CollectSink<EnrichedRecord>>,
    ) {
        let averages = Arc::new(CollectSink::default());
        let enriched = Arc::new(CollectSink::default());
        let p = RatingPipeline::new(TopologyConfig::default())
            .with_average_sink(averages.clone())
            .with_enriched_sink(enriched.clone());
        (p, averages, enriched)
    }

    fn expected(average: f64) -> EnrichedRecord {
        EnrichedRecord {
            entity_id: EntityId::new(1),
            release_year: 1999,
            title: "X".to_string(),
            average,
        }
    }

    #[test]
    fn metadata_first_then_ratings() {
        let (p, _, enriched) = pipeline();

        let meta = p.ingest_metadata(MetadataRecord::new(1, 1999, "X")).unwrap();
        assert_eq!(meta.upsert, Upsert::Inserted);
        assert!(meta.enriched.is_none());

        p.ingest_rating(RatingEvent::new(1, 3.0)).unwrap();
        let out = p.ingest_rating(RatingEvent::new(1, 5.0)).unwrap();

        assert_eq!(out.average.average, 4.0);
        assert_eq!(out.enriched, Some(expected(4.0)));
        assert_eq!(enriched.seen(), vec![expected(3.0), expected(4.0)]);
    }

    #[test]
    fn ratings_first_then_metadata() {
        let (p, averages, enriched) = pipeline();

        assert!(p.ingest_rating(RatingEvent::new(1, 3.0)).unwrap().enriched.is_none());
        assert!(p.ingest_rating(RatingEvent::new(1, 5.0)).unwrap().enriched.is_none());
        assert!(enriched.seen().is_empty());
        assert_eq!(averages.seen().len(), 2);

        let meta = p.ingest_metadata(MetadataRecord::new(1, 1999, "X")).unwrap();
        assert_eq!(meta.enriched, Some(expected(4.0)));
        assert_eq!(enriched.seen(), vec![expected(4.0)]);
    }

    #[test]
    fn invalid_score_changes_nothing_and_emits_nothing() {
        let (p, averages, enriched) = pipeline();
        p.ingest_metadata(MetadataRecord::new(1, 1999, "X")).unwrap();
        p.ingest_rating(RatingEvent::new(1, 2.0)).unwrap();

        let err = p.ingest_rating(RatingEvent::new(1, f64::NAN)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));

        assert_eq!(p.aggregator().state(EntityId::new(1)).unwrap().count(), 1);
        assert_eq!(averages.seen().len(), 1);
        assert_eq!(enriched.seen().len(), 1);
        assert_eq!(p.stats().ratings_rejected, 1);
    }

    #[test]
    fn metadata_replacement_re_emits_with_current_average() {
        let (p, _, enriched) = pipeline();
        p.ingest_rating(RatingEvent::new(1, 4.0)).unwrap();
        p.ingest_metadata(MetadataRecord::new(1, 1999, "X")).unwrap();

        let out = p.ingest_metadata(MetadataRecord::new(1, 2000, "X (remaster)")).unwrap();
        assert_eq!(out.upsert, Upsert::Replaced);

        let last = enriched.seen().pop().unwrap();
        assert_eq!(last.release_year, 2000);
        assert_eq!(last.title, "X (remaster)");
        assert_eq!(last.average, 4.0);
    }

    #[test]
    fn refresh_is_idempotent() {
        let (p, _, enriched) = pipeline();
        p.ingest_metadata(MetadataRecord::new(1, 1999, "X")).unwrap();
        p.ingest_rating(RatingEvent::new(1, 4.0)).unwrap();

        let a = p.refresh(EntityId::new(1)).unwrap();
        let b = p.refresh(EntityId::new(1)).unwrap();
        assert_eq!(a, b);
        assert_eq!(enriched.seen().len(), 3);
        assert!(p.refresh(EntityId::new(99)).is_none());
    }

    #[test]
    fn paused_pipeline_rejects_ingestion_without_side_effects() {
        let (p, averages, _) = pipeline();
        assert!(p.pause());

        assert_eq!(p.ingest_rating(RatingEvent::new(1, 1.0)), Err(PipelineError::Paused));
        assert_eq!(
            p.ingest_metadata(MetadataRecord::new(1, 1999, "X")).unwrap_err(),
            PipelineError::Paused
        );
        assert!(p.aggregator().is_empty());
        assert!(averages.seen().is_empty());

        assert!(p.resume());
        assert!(p.ingest_rating(RatingEvent::new(1, 1.0)).is_ok());
    }

    #[test]
    fn upstream_loss_pauses_the_pipeline() {
        let (p, _, _) = pipeline();
        p.upstream_unavailable("broker connection reset");
        assert!(p.is_paused());
        assert!(!p.wait_until_resumed(Duration::from_millis(5)));
    }

    #[test]
    fn recovery_resumes_only_after_every_outage_ends() {
        let (p, _, _) = pipeline();
        p.unavailable("ratings", "connection refused");
        p.unavailable("movies", "connection refused");

        p.recovered("ratings");
        assert!(p.is_paused());
        assert_eq!(p.ingest_rating(RatingEvent::new(1, 1.0)), Err(PipelineError::Paused));

        p.recovered("movies");
        assert!(!p.is_paused());
        assert!(p.ingest_rating(RatingEvent::new(1, 1.0)).is_ok());
    }

    #[test]
    fn recovery_keeps_an_operator_pause() {
        let (p, _, _) = pipeline();
        p.upstream_unavailable("broker connection reset");
        p.pause();

        p.upstream_recovered();
        assert!(p.is_paused());
    }

    #[test]
    fn recovery_without_outage_is_ignored() {
        let (p, _, _) = pipeline();
        p.pause();
        p.upstream_recovered();
        assert!(p.is_paused());
    }

    #[test]
    fn failing_sink_does_not_stop_other_sinks() {
        let enriched = Arc::new(CollectSink::default());
        let p = RatingPipeline::new(TopologyConfig::default())
            .with_enriched_sink(Arc::new(FailingSink))
            .with_enriched_sink(enriched.clone());

        p.ingest_metadata(MetadataRecord::new(1, 1999, "X")).unwrap();
        p.ingest_rating(RatingEvent::new(1, 3.0)).unwrap();

        assert_eq!(enriched.seen(), vec![expected(3.0)]);
        assert_eq!(p.stats().sink_failures, 1);
    }

    #[test]
    fn concurrent_producers_keep_per_key_order() {
        let averages = Arc::new(CollectSink::<AverageEntry>::default());
        let p = Arc::new(
            RatingPipeline::new(TopologyConfig::default())
                .with_lock_stripes(4)
                .with_average_sink(averages.clone()),
        );

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let p = p.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        p.ingest_rating(RatingEvent::new(t % 2, 1.0 + t as f64)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(p.stats().ratings_applied, 1000);

        // For each key, the sink saw one entry per applied rating, and the last
        // one matches the aggregator's final state.
        for key in [0i64, 1] {
            let id = EntityId::new(key);
            let seen: Vec<AverageEntry> =
                averages.seen().into_iter().filter(|a| a.entity_id == id).collect();
            let state = p.aggregator().state(id).unwrap();
            assert_eq!(seen.len() as u64, state.count());
            assert_eq!(seen.last().unwrap().average, state.average().unwrap());
            assert_eq!(p.average_table().get(&id).unwrap().average, state.average().unwrap());
        }
    }
}
