use std::io;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use ratingflow_events::{RecordSink, SinkError};

/// Bounded, blocking hand-off in front of another sink.
///
/// `accept` enqueues a copy of the record and returns; a dedicated thread
/// drains the queue into the inner sink in arrival order. When the queue is
/// full, `accept` blocks until there is room (backpressure onto the
/// producer). Records are never dropped while the sink is open.
pub struct QueuedSink<M> {
    name: String,
    sender: Mutex<Option<SyncSender<M>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<M> core::fmt::Debug for QueuedSink<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueuedSink").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<M> QueuedSink<M>
where
    M: Send + 'static,
{
    /// Start the drain thread. `capacity` is clamped to at least one.
    pub fn spawn(capacity: usize, inner: Arc<dyn RecordSink<M>>) -> io::Result<Self> {
        let name = format!("queued:{}", inner.name());
        let (tx, rx) = mpsc::sync_channel::<M>(capacity.max(1));

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || drain(rx, inner))?;

        Ok(Self {
            name,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting records, flush what is queued, and join the thread.
    pub fn shutdown(&self) {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!(sink = %self.name, "queued sink worker panicked");
            }
        }
    }
}

fn drain<M>(rx: Receiver<M>, inner: Arc<dyn RecordSink<M>>) {
    for record in rx {
        if let Err(e) = inner.accept(&record) {
            warn!(sink = inner.name(), error = %e, "downstream sink rejected record");
        }
    }
    debug!(sink = inner.name(), "queued sink drained");
}

impl<M> RecordSink<M> for QueuedSink<M>
where
    M: Clone + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, record: &M) -> Result<(), SinkError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SinkError::Closed(self.name.clone()))?;

        sender
            .send(record.clone())
            .map_err(|_| SinkError::Closed(self.name.clone()))
    }
}

impl<M> Drop for QueuedSink<M> {
    fn drop(&mut self) {
        self.sender.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = worker.join();
        }
    }
}
