use async_trait::async_trait;
use common::domain::{RawMessage, SubscriberError, SubscriberResult};
use tokio::sync::mpsc;

/// Trait for handing broker messages to the scoring stage
///
/// The subscriber only depends on this seam, so tests can observe what it
/// forwards without running a pipeline.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RawMessageProducer: Send + Sync {
    async fn publish(&self, message: RawMessage) -> SubscriberResult<()>;
}

/// Create the bounded queue between the subscriber and the pipeline worker
pub fn raw_message_queue(capacity: usize) -> (ChannelRawMessageProducer, mpsc::Receiver<RawMessage>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ChannelRawMessageProducer { sender }, receiver)
}

/// Producer side of the in-process queue
#[derive(Clone)]
pub struct ChannelRawMessageProducer {
    sender: mpsc::Sender<RawMessage>,
}

#[async_trait]
impl RawMessageProducer for ChannelRawMessageProducer {
    async fn publish(&self, message: RawMessage) -> SubscriberResult<()> {
        // waits when the worker is behind, which stalls the broker read loop
        self.sender
            .send(message)
            .await
            .map_err(|_| SubscriberError::QueueClosed)
    }
}
