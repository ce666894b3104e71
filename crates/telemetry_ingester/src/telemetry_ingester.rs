use crate::domain::{
    raw_message_queue, ChannelRawMessageProducer, IeqScorer, PipelineWorker,
    TelemetryPipelineService,
};
use crate::mqtt::{run_mqtt_subscriber, MqttSubscriberConfig};
use common::domain::{BrokerConnectionState, ReadingBroadcaster, ReadingRepository};
use envira_runner::AppProcess;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

pub struct TelemetryIngesterConfig {
    pub mqtt: MqttSubscriberConfig,
    pub queue_capacity: usize,
    pub storage_timeout: Duration,
}

/// Wires the broker subscriber to the scoring pipeline
///
/// Owns the queue between the two; both ends are handed to the runner as
/// separate processes so either failing stops the service.
pub struct TelemetryIngester {
    mqtt_config: MqttSubscriberConfig,
    producer: ChannelRawMessageProducer,
    worker: PipelineWorker,
    state: watch::Sender<BrokerConnectionState>,
}

impl TelemetryIngester {
    pub fn new(
        config: TelemetryIngesterConfig,
        repository: Arc<dyn ReadingRepository>,
        broadcaster: Arc<dyn ReadingBroadcaster>,
    ) -> Self {
        Self::with_scorer(config, IeqScorer::with_system_clock(), repository, broadcaster)
    }

    pub fn with_scorer(
        config: TelemetryIngesterConfig,
        scorer: IeqScorer,
        repository: Arc<dyn ReadingRepository>,
        broadcaster: Arc<dyn ReadingBroadcaster>,
    ) -> Self {
        info!(
            broker = %config.mqtt.broker_address(),
            topic = %config.mqtt.subscription_topic(),
            queue_capacity = config.queue_capacity,
            "initializing telemetry ingester"
        );

        let service = Arc::new(TelemetryPipelineService::new(
            scorer,
            repository,
            broadcaster,
            config.storage_timeout,
        ));
        let (producer, receiver) = raw_message_queue(config.queue_capacity);
        let (state, _) = watch::channel(BrokerConnectionState::Disconnected);

        Self {
            mqtt_config: config.mqtt,
            producer,
            worker: PipelineWorker::new(receiver, service),
            state,
        }
    }

    /// Live view of the broker connection, for health reporting
    pub fn connection_state(&self) -> watch::Receiver<BrokerConnectionState> {
        self.state.subscribe()
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        let subscriber: AppProcess = Box::new({
            let config = self.mqtt_config;
            let producer = Arc::new(self.producer);
            let state = self.state;
            move |ctx| {
                Box::pin(async move {
                    run_mqtt_subscriber(config, producer, state, ctx).await?;
                    Ok(())
                })
            }
        });

        let worker: AppProcess = Box::new({
            let worker = self.worker;
            move |ctx| Box::pin(async move { worker.run(ctx).await })
        });

        vec![("mqtt_subscriber", subscriber), ("pipeline_worker", worker)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{MockReadingBroadcaster, MockReadingRepository};

    #[test]
    fn test_ingester_exposes_two_processes_and_starts_disconnected() {
        let ingester = TelemetryIngester::new(
            TelemetryIngesterConfig {
                mqtt: MqttSubscriberConfig::default(),
                queue_capacity: 16,
                storage_timeout: Duration::from_secs(1),
            },
            Arc::new(MockReadingRepository::new()),
            Arc::new(MockReadingBroadcaster::new()),
        );

        let state = ingester.connection_state();
        assert_eq!(*state.borrow(), BrokerConnectionState::Disconnected);

        let names: Vec<&str> = ingester
            .into_runner_processes()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["mqtt_subscriber", "pipeline_worker"]);
    }
}
