use std::marker::PhantomData;

use ratingflow_events::{EventBus, RecordSink, SinkError};

/// Publishes every accepted record to a topic.
#[derive(Debug)]
pub struct TopicSink<B, M> {
    name: String,
    topic: B,
    _message: PhantomData<fn(M)>,
}

impl<B, M> TopicSink<B, M>
where
    B: EventBus<M>,
{
    pub fn new(name: impl Into<String>, topic: B) -> Self {
        Self {
            name: name.into(),
            topic,
            _message: PhantomData,
        }
    }

    pub fn topic(&self) -> &B {
        &self.topic
    }
}

impl<B, M> RecordSink<M> for TopicSink<B, M>
where
    B: EventBus<M>,
    M: Clone,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, record: &M) -> Result<(), SinkError> {
        self.topic
            .publish(record.clone())
            .map_err(|e| SinkError::Transport(format!("{}: {e:?}", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use ratingflow_core::EntityId;
    use ratingflow_events::{AverageEntry, InMemoryEventBus};

    #[test]
    fn accepted_records_are_published() {
        let topic = Arc::new(InMemoryEventBus::<AverageEntry>::named("avg-ratings"));
        let sub = topic.subscribe();
        let sink = TopicSink::new("avg-ratings", topic.clone());

        let entry = AverageEntry {
            entity_id: EntityId::new(3),
            average: 2.5,
        };
        sink.accept(&entry).unwrap();

        assert_eq!(sub.recv_timeout(Duration::from_secs(1)).unwrap(), entry);
        assert_eq!(sink.name(), "avg-ratings");
    }
}
