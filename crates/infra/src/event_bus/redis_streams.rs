//! Redis Streams-backed topic (durable, broadcast delivery).
//!
//! Each topic is one Redis stream:
//!
//! - **Publish**: `XADD <topic> * entity_id <key> payload <json>`
//! - **Subscribe**: a background thread runs `XREAD BLOCK` from the stream's
//!   tail at subscription time and forwards decoded records into the
//!   [`Subscription`] channel
//! - **Retention**: optional approximate `MAXLEN` trimming on publish
//!
//! Every subscription sees every record appended after it was created, in
//! stream order. Records that fail to decode are logged and skipped.
//!
//! The reader thread stops within one `BLOCK` interval of its subscription
//! being dropped. Lost and regained connectivity is reported to the
//! subscriber's [`ConnectivityListener`], once per transition.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use redis::Commands;
use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

use ratingflow_events::{ConnectivityListener, EventBus, Keyed, Subscription};

const BLOCK_MS: usize = 1_000;
const READ_COUNT: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// One named topic stored as a Redis stream.
#[derive(Debug)]
pub struct RedisStreamsTopic<M> {
    client: Arc<redis::Client>,
    stream_key: String,
    max_len: Option<usize>,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for RedisStreamsTopic<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            stream_key: self.stream_key.clone(),
            max_len: self.max_len,
            _message: PhantomData,
        }
    }
}

impl<M> RedisStreamsTopic<M> {
    /// Open a topic.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `stream_key` - topic name, used as the stream key (e.g., "ratings")
    pub fn new(redis_url: impl AsRef<str>, stream_key: impl Into<String>) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;
        Ok(Self::with_client(Arc::new(client), stream_key))
    }

    /// Share one client across several topics.
    pub fn with_client(client: Arc<redis::Client>, stream_key: impl Into<String>) -> Self {
        Self {
            client,
            stream_key: stream_key.into(),
            max_len: None,
            _message: PhantomData,
        }
    }

    /// Trim the stream to roughly `max_len` entries on every publish.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    fn connection(&self) -> Result<redis::Connection, RedisStreamsError> {
        self.client
            .get_connection()
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    /// Check that the server is reachable.
    pub fn ping(&self) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection()?;
        redis::cmd("PING")
            .query::<String>(&mut conn)
            .map(|_| ())
            .map_err(|e| RedisStreamsError::Command(format!("PING failed: {e}")))
    }

    /// Id of the newest entry, or `0-0` for an empty stream.
    fn tail_id(&self) -> Result<String, RedisStreamsError> {
        let mut conn = self.connection()?;
        let reply: StreamRangeReply = redis::cmd("XREVRANGE")
            .arg(&self.stream_key)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XREVRANGE failed: {e}")))?;
        Ok(reply
            .ids
            .into_iter()
            .next()
            .map(|entry| entry.id)
            .unwrap_or_else(|| "0-0".to_string()))
    }
}

impl<M> RedisStreamsTopic<M>
where
    M: Serialize + Keyed,
{
    #[instrument(skip(self, message), fields(stream_key = %self.stream_key, entity_id = %message.key()), err)]
    fn publish_sync(&self, message: &M) -> Result<String, RedisStreamsError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;

        let mut conn = self.connection()?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_key);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*")
            .arg("entity_id")
            .arg(message.key().get())
            .arg("payload")
            .arg(&payload);

        cmd.query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))
    }
}

/// Decode the `payload` field of one stream entry.
fn decode_entry<M: DeserializeOwned>(entry: &redis::streams::StreamId) -> Result<M, RedisStreamsError> {
    let payload: String = entry
        .get("payload")
        .ok_or_else(|| RedisStreamsError::Deserialization(format!("entry {} has no payload", entry.id)))?;
    serde_json::from_str(&payload)
        .map_err(|e| RedisStreamsError::Deserialization(format!("entry {}: {e}", entry.id)))
}

/// Turns per-attempt read results into up/down transitions for a listener.
struct LinkState {
    stream_key: String,
    listener: Option<Arc<dyn ConnectivityListener>>,
    healthy: bool,
}

impl LinkState {
    fn new(stream_key: &str, listener: Option<Arc<dyn ConnectivityListener>>) -> Self {
        Self {
            stream_key: stream_key.to_string(),
            listener,
            healthy: true,
        }
    }

    fn failed(&mut self, reason: &str) {
        if !self.healthy {
            return;
        }
        self.healthy = false;
        error!(stream_key = %self.stream_key, error = %reason, "stream unreachable");
        if let Some(listener) = &self.listener {
            listener.unavailable(&self.stream_key, reason);
        }
    }

    fn succeeded(&mut self) {
        if self.healthy {
            return;
        }
        self.healthy = true;
        info!(stream_key = %self.stream_key, "stream reachable again");
        if let Some(listener) = &self.listener {
            listener.recovered(&self.stream_key);
        }
    }
}

/// Reader loop: forwards entries after `last_id` until the subscription is dropped.
fn read_loop<M>(
    topic: RedisStreamsTopic<M>,
    mut last_id: String,
    tx: mpsc::Sender<M>,
    cancelled: Arc<AtomicBool>,
    mut link: LinkState,
) where
    M: DeserializeOwned,
{
    let opts = StreamReadOptions::default().block(BLOCK_MS).count(READ_COUNT);
    let mut conn: Option<redis::Connection> = None;

    while !cancelled.load(Ordering::Acquire) {
        if conn.is_none() {
            match topic.connection() {
                Ok(c) => conn = Some(c),
                Err(e) => {
                    link.failed(&e.to_string());
                    std::thread::sleep(RECONNECT_DELAY);
                    continue;
                }
            }
        }
        let Some(c) = conn.as_mut() else {
            continue;
        };

        let reply: Option<StreamReadReply> =
            match c.xread_options(&[topic.stream_key.as_str()], &[last_id.as_str()], &opts) {
                Ok(reply) => reply,
                Err(e) => {
                    link.failed(&format!("XREAD failed: {e}"));
                    conn = None;
                    std::thread::sleep(RECONNECT_DELAY);
                    continue;
                }
            };
        link.succeeded();

        let Some(reply) = reply else {
            continue;
        };

        for entry in reply.keys.iter().flat_map(|k| k.ids.iter()) {
            last_id.clone_from(&entry.id);
            match decode_entry::<M>(entry) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        debug!(stream_key = %topic.stream_key, "subscription dropped");
                        return;
                    }
                }
                Err(e) => warn!(stream_key = %topic.stream_key, error = %e, "skipping entry"),
            }
        }
    }
    debug!(stream_key = %topic.stream_key, "stream reader stopped");
}

impl<M> RedisStreamsTopic<M>
where
    M: DeserializeOwned + Send + 'static,
{
    fn spawn_reader(&self, listener: Option<Arc<dyn ConnectivityListener>>) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        let (subscription, cancelled) = Subscription::cancellable(rx);
        let mut link = LinkState::new(&self.stream_key, listener);

        // Pin the starting point now so records published right after
        // `subscribe` returns are not missed.
        let start = match self.tail_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(stream_key = %self.stream_key, error = %e, "cannot read stream tail, following new entries only");
                link.failed(&e.to_string());
                "$".to_string()
            }
        };

        let topic = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("xread:{}", self.stream_key))
            .spawn(move || read_loop(topic, start, tx, cancelled, link));
        if let Err(e) = spawned {
            error!(stream_key = %self.stream_key, error = %e, "failed to spawn stream reader");
        }

        subscription
    }
}

impl<M> EventBus<M> for RedisStreamsTopic<M>
where
    M: Serialize + DeserializeOwned + Keyed + Send + 'static,
{
    type Error = RedisStreamsError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        self.publish_sync(&message).map(|_| ())
    }

    fn subscribe(&self) -> Subscription<M> {
        self.spawn_reader(None)
    }

    fn subscribe_with(&self, listener: Arc<dyn ConnectivityListener>) -> Subscription<M> {
        self.spawn_reader(Some(listener))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use ratingflow_events::RatingEvent;

    #[derive(Default)]
    struct Transitions(Mutex<Vec<String>>);

    impl ConnectivityListener for Transitions {
        fn unavailable(&self, topic: &str, _reason: &str) {
            self.0.lock().unwrap().push(format!("down:{topic}"));
        }

        fn recovered(&self, topic: &str) {
            self.0.lock().unwrap().push(format!("up:{topic}"));
        }
    }

    #[test]
    fn link_state_reports_each_transition_once() {
        let transitions = Arc::new(Transitions::default());
        let mut link = LinkState::new("ratings", Some(transitions.clone() as Arc<dyn ConnectivityListener>));

        link.succeeded();
        link.failed("connection refused");
        link.failed("connection refused");
        link.succeeded();
        link.succeeded();
        link.failed("XREAD failed");

        assert_eq!(
            *transitions.0.lock().unwrap(),
            vec!["down:ratings", "up:ratings", "down:ratings"]
        );
    }

    #[test]
    fn reader_stops_after_the_subscription_is_dropped() {
        // Nothing listens on port 1, so the reader stays in its reconnect branch.
        let topic = RedisStreamsTopic::<RatingEvent>::new("redis://127.0.0.1:1", "ratings").unwrap();
        let (tx, rx) = mpsc::channel();
        let (subscription, cancelled) = Subscription::cancellable(rx);
        let transitions = Arc::new(Transitions::default());
        let link = LinkState::new("ratings", Some(transitions.clone() as Arc<dyn ConnectivityListener>));

        let reader = std::thread::spawn(move || read_loop(topic, "0-0".to_string(), tx, cancelled, link));
        std::thread::sleep(Duration::from_millis(50));
        drop(subscription);

        reader.join().unwrap();
        assert_eq!(*transitions.0.lock().unwrap(), vec!["down:ratings"]);
    }

    #[test]
    fn invalid_url_is_a_connection_error() {
        let err = RedisStreamsTopic::<RatingEvent>::new("not a url", "ratings").unwrap_err();
        assert!(matches!(err, RedisStreamsError::Connection(_)));
    }

    #[test]
    fn decode_reads_the_payload_field() {
        let mut map = std::collections::HashMap::new();
        map.insert(
            "payload".to_string(),
            redis::Value::Data(br#"{"entityId":7,"score":4.5}"#.to_vec()),
        );
        let entry = redis::streams::StreamId {
            id: "1-0".to_string(),
            map,
        };

        let event: RatingEvent = decode_entry(&entry).unwrap();
        assert_eq!(event, RatingEvent::new(7, 4.5));
    }

    #[test]
    fn decode_rejects_entries_without_payload() {
        let entry = redis::streams::StreamId {
            id: "1-0".to_string(),
            map: Default::default(),
        };
        let err = decode_entry::<RatingEvent>(&entry).unwrap_err();
        assert!(matches!(err, RedisStreamsError::Deserialization(_)));
    }
}
