use crate::domain::TelemetryPipelineService;
use common::domain::RawMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drains the raw message queue one message at a time
///
/// Messages are processed strictly in arrival order; a message is fully
/// persisted and broadcast before the next one is taken.
pub struct PipelineWorker {
    receiver: mpsc::Receiver<RawMessage>,
    service: Arc<TelemetryPipelineService>,
}

impl PipelineWorker {
    pub fn new(receiver: mpsc::Receiver<RawMessage>, service: Arc<TelemetryPipelineService>) -> Self {
        Self { receiver, service }
    }

    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!("pipeline worker started");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("pipeline worker received shutdown signal");
                    break;
                }
                message = self.receiver.recv() => match message {
                    Some(raw) => {
                        self.service.process(raw).await;
                    }
                    None => {
                        debug!("raw message queue closed");
                        break;
                    }
                }
            }
        }

        info!("pipeline worker stopped");
        Ok(())
    }
}
