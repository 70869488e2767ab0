use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use ratingflow_core::{PipelineError, PipelineResult};
use ratingflow_events::{ConnectivityListener, EventBus, MetadataRecord, RatingEvent, Subscription};

use crate::pipeline::{PipelineGate, RatingPipeline};

const TICK: Duration = Duration::from_millis(250);

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic ingest loop.
///
/// - Subscribes to a topic
/// - Hands each message to the handler, one at a time, in topic order
/// - While the pipeline is paused, holds the current message and retries it
///   once the gate reopens, so nothing is skipped
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct IngestWorker;

impl IngestWorker {
    /// Spawn a worker thread consuming `bus`.
    ///
    /// The subscription is taken before this returns, so anything published
    /// afterwards is seen by the worker.
    pub fn spawn<M, B, H, T>(
        name: &'static str,
        bus: B,
        gate: Arc<PipelineGate>,
        handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: Clone + Send + 'static,
        B: EventBus<M> + 'static,
        H: FnMut(M) -> PipelineResult<T> + Send + 'static,
    {
        Self::spawn_with_listener(name, bus, gate, None, handler)
    }

    /// Like [`spawn`](Self::spawn), with the topic reporting connectivity
    /// changes to `listener`.
    pub fn spawn_with_listener<M, B, H, T>(
        name: &'static str,
        bus: B,
        gate: Arc<PipelineGate>,
        listener: Option<Arc<dyn ConnectivityListener>>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: Clone + Send + 'static,
        B: EventBus<M> + 'static,
        H: FnMut(M) -> PipelineResult<T> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = match listener {
            Some(listener) => bus.subscribe_with(listener),
            None => bus.subscribe(),
        };

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, &gate, &mut handler))?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

/// Consume the ratings topic into the pipeline. Connectivity loss on the
/// topic pauses the pipeline until it recovers.
pub fn spawn_rating_worker<B>(bus: B, pipeline: Arc<RatingPipeline>) -> io::Result<WorkerHandle>
where
    B: EventBus<RatingEvent> + 'static,
{
    let gate = pipeline.gate().clone();
    let listener: Arc<dyn ConnectivityListener> = pipeline.clone();
    IngestWorker::spawn_with_listener("ratings-ingest", bus, gate, Some(listener), move |event| {
        pipeline.ingest_rating(event)
    })
}

/// Consume the movies topic into the pipeline.
pub fn spawn_metadata_worker<B>(bus: B, pipeline: Arc<RatingPipeline>) -> io::Result<WorkerHandle>
where
    B: EventBus<MetadataRecord> + 'static,
{
    let gate = pipeline.gate().clone();
    let listener: Arc<dyn ConnectivityListener> = pipeline.clone();
    IngestWorker::spawn_with_listener("movies-ingest", bus, gate, Some(listener), move |record| {
        pipeline.ingest_metadata(record)
    })
}

/// A dropped handle counts as a shutdown request.
fn stop_requested(shutdown_rx: &mpsc::Receiver<()>) -> bool {
    !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty))
}

fn worker_loop<M, H, T>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    gate: &PipelineGate,
    handler: &mut H,
) where
    M: Clone,
    H: FnMut(M) -> PipelineResult<T>,
{
    'outer: loop {
        if stop_requested(&shutdown_rx) {
            break;
        }

        let msg = match sub.recv_timeout(TICK) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!(worker = name, "topic closed");
                break;
            }
        };

        loop {
            match handler(msg.clone()) {
                Ok(_) => break,
                Err(PipelineError::Paused) => {
                    while !gate.wait_open(TICK) {
                        if stop_requested(&shutdown_rx) {
                            break 'outer;
                        }
                    }
                }
                Err(err) => {
                    warn!(worker = name, error = %err, "ingest handler failed");
                    break;
                }
            }
        }
    }
    debug!(worker = name, "worker stopped");
}
