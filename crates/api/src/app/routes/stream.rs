//! Server-sent events bridge over the fan-out publisher.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::app::services::AppServices;

/// SSE event name for enriched records.
pub const RATED_MOVIE_EVENT: &str = "rated-movie";

/// GET /sse
///
/// Streams every enriched record emitted after the connection opened. A slow
/// client only affects its own subscription (see the fan-out overflow policy);
/// disconnecting closes the subscription.
pub async fn sse(
    Extension(services): Extension<Arc<AppServices>>,
) -> Sse<ReceiverStream<Result<SseEvent, Infallible>>> {
    let mut subscription = services.fanout().subscribe();
    let (tx, rx) = mpsc::channel::<Result<SseEvent, Infallible>>(16);

    tokio::spawn(async move {
        let id = subscription.id();
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = subscription.recv() => {
                    let Some(record) = next else { break };
                    let event = match SseEvent::default().event(RATED_MOVIE_EVENT).json_data(&record) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(subscription_id = %id, error = %e, "failed to encode record");
                            continue;
                        }
                    };
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(subscription_id = %id, "sse stream ended");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
