use crate::domain::{validate, IeqScorer};
use common::domain::{
    BroadcastOutcome, RawMessage, ReadingBroadcaster, ReadingRepository, ScoredReading,
    StorageError, ValidationError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// What happened to one broker message
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Dropped before scoring
    Rejected(ValidationError),
    /// Scored; persistence and broadcast ran independently
    Scored {
        reading: ScoredReading,
        stored: bool,
        broadcast: BroadcastOutcome,
    },
}

/// Domain service that turns one raw broker message into a scored reading
///
/// Flow:
/// 1. Validate the payload into a `SensorReading` (invalid messages stop here)
/// 2. Score it
/// 3. Append to the repository and broadcast to live clients concurrently
///
/// Storage and delivery failures are logged and never returned; the caller
/// moves on to the next message either way.
pub struct TelemetryPipelineService {
    scorer: IeqScorer,
    repository: Arc<dyn ReadingRepository>,
    broadcaster: Arc<dyn ReadingBroadcaster>,
    storage_timeout: Duration,
}

impl TelemetryPipelineService {
    pub fn new(
        scorer: IeqScorer,
        repository: Arc<dyn ReadingRepository>,
        broadcaster: Arc<dyn ReadingBroadcaster>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            scorer,
            repository,
            broadcaster,
            storage_timeout,
        }
    }

    #[instrument(
        skip_all,
        fields(topic = %raw.topic, device_id = %raw.device_id, site_id = %raw.site_id)
    )]
    pub async fn process(&self, raw: RawMessage) -> PipelineOutcome {
        debug!(payload_size = raw.payload.len(), "processing telemetry message");

        let reading = match validate(&raw) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "dropping invalid telemetry message");
                return PipelineOutcome::Rejected(e);
            }
        };

        if reading.device_id != raw.device_id || reading.site_id != raw.site_id {
            warn!(
                payload_device_id = %reading.device_id,
                payload_site_id = %reading.site_id,
                "payload identifiers differ from topic, using payload"
            );
        }

        let scored = self.scorer.score(reading);

        let (stored, broadcast) = tokio::join!(
            self.persist(&scored),
            self.broadcaster.broadcast(&scored)
        );

        info!(
            ieq_score = scored.ieq_score,
            stored,
            delivered = broadcast.delivered,
            removed_clients = broadcast.removed.len(),
            "processed telemetry reading"
        );

        PipelineOutcome::Scored {
            reading: scored,
            stored,
            broadcast,
        }
    }

    async fn persist(&self, scored: &ScoredReading) -> bool {
        let result = match tokio::time::timeout(self.storage_timeout, self.repository.append(scored)).await
        {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.storage_timeout)),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to store scored reading, not retrying");
                false
            }
        }
    }
}
