use crate::domain::RawMessageProducer;
use crate::mqtt::{parse_topic, MqttSubscriberConfig};
use common::domain::{BrokerConnectionState, RawMessage, SubscriberError, SubscriberResult};
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS, SubscribeReasonCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounded exponential backoff between connection attempts
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
    max_attempts: Option<u32>,
    failures: u32,
}

impl ReconnectPolicy {
    pub fn new(initial: Duration, max: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial,
            max,
            max_attempts,
            failures: 0,
        }
    }

    pub fn from_config(config: &MqttSubscriberConfig) -> Self {
        Self::new(
            config.initial_backoff(),
            config.max_backoff(),
            config.max_reconnect_attempts,
        )
    }

    /// Record a failed attempt; `None` once the attempt budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);

        if let Some(max_attempts) = self.max_attempts {
            if self.failures > max_attempts {
                return None;
            }
        }

        let factor = 1u32.checked_shl(self.failures - 1).unwrap_or(u32::MAX);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Run the MQTT subscriber until cancelled
///
/// Subscribes to `{namespace}/+/+/telemetry` and hands every received message
/// to the producer. Connection loss is retried with backoff; the current
/// connection state is published on `state`.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(broker = %config.broker_address(), topic = %config.subscription_topic())
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    producer: Arc<dyn RawMessageProducer>,
    state: watch::Sender<BrokerConnectionState>,
    ctx: CancellationToken,
) -> SubscriberResult<()> {
    info!("starting MQTT subscriber");

    let mut policy = ReconnectPolicy::from_config(&config);

    let result = loop {
        if ctx.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            break Ok(());
        }

        state.send_replace(BrokerConnectionState::Connecting);

        match run_mqtt_connection(&config, producer.as_ref(), &state, &mut policy, &ctx).await {
            Ok(()) => {
                debug!("MQTT subscriber stopped cleanly");
                break Ok(());
            }
            Err(e @ (SubscriberError::QueueClosed | SubscriberError::InvalidBrokerConfig(_))) => {
                error!(error = %e, "stopping MQTT subscriber");
                break Err(e);
            }
            Err(e) => {
                state.send_replace(BrokerConnectionState::Disconnected);
                error!(error = %e, "MQTT connection error");

                let Some(delay) = policy.next_delay() else {
                    let attempts = policy.failures().saturating_sub(1);
                    error!(attempts, "max reconnect attempts reached, stopping MQTT subscriber");
                    break Err(SubscriberError::RetriesExhausted(attempts));
                };

                warn!(
                    attempt = policy.failures(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = ctx.cancelled() => break Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    };

    state.send_replace(BrokerConnectionState::Disconnected);
    info!("MQTT subscriber stopped");
    result
}

/// Run a single MQTT connection session
#[instrument(name = "mqtt_connection", skip_all)]
async fn run_mqtt_connection(
    config: &MqttSubscriberConfig,
    producer: &dyn RawMessageProducer,
    state: &watch::Sender<BrokerConnectionState>,
    policy: &mut ReconnectPolicy,
    ctx: &CancellationToken,
) -> SubscriberResult<()> {
    let options = config.mqtt_options()?;
    let (client, mut eventloop) = AsyncClient::new(options, 100);

    // Queued until the connection is up
    let subscribe_topic = config.subscription_topic();
    client
        .subscribe(&subscribe_topic, QoS::AtMostOnce)
        .await
        .map_err(|e| SubscriberError::SubscribeFailed(e.to_string()))?;

    let connect_deadline = tokio::time::sleep(config.connect_timeout());
    tokio::pin!(connect_deadline);
    let mut connected = false;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("shutdown signal received");
                disconnect(&client, &mut eventloop).await;
                return Ok(());
            }
            _ = &mut connect_deadline, if !connected => {
                return Err(SubscriberError::ConnectTimeout(config.connect_timeout()));
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let handled = handle_mqtt_message(
                            &config.topic_namespace,
                            &publish.topic,
                            &publish.payload,
                            producer,
                        )
                        .await;

                        if let Err(e) = handled {
                            disconnect(&client, &mut eventloop).await;
                            // The worker drops its queue first on shutdown
                            if ctx.is_cancelled() {
                                debug!("pipeline queue closed during shutdown");
                                return Ok(());
                            }
                            return Err(e);
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        connected = true;
                        info!("connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        if ack
                            .return_codes
                            .iter()
                            .any(|code| matches!(code, SubscribeReasonCode::Failure))
                        {
                            return Err(SubscriberError::SubscribeFailed(format!(
                                "broker rejected subscription to '{}'",
                                subscribe_topic
                            )));
                        }
                        state.send_replace(BrokerConnectionState::Subscribed);
                        policy.reset();
                        info!(topic = %subscribe_topic, "subscribed to MQTT topic");
                    }
                    Ok(Event::Incoming(Packet::PingResp)) => {}
                    Ok(_) => {}
                    Err(e) => {
                        return Err(SubscriberError::ConnectionLost(e.to_string()));
                    }
                }
            }
        }
    }
}

/// Send DISCONNECT and drive the event loop long enough to flush it
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if client.try_disconnect().is_err() {
        return;
    }

    let flushed = tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;

    if flushed.is_err() {
        debug!("timed out flushing MQTT disconnect");
    }
}

/// Handle an incoming MQTT message
///
/// Creates a new independent trace for each message. Only a closed pipeline
/// queue is reported back; everything else is logged and dropped here.
pub(crate) async fn handle_mqtt_message(
    namespace: &str,
    topic: &str,
    payload: &[u8],
    producer: &dyn RawMessageProducer,
) -> SubscriberResult<()> {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
        site_id = tracing::field::Empty,
        device_id = tracing::field::Empty,
    );

    async {
        let parsed = match parse_topic(namespace, topic) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse MQTT topic, skipping message");
                return Ok(());
            }
        };

        Span::current().record("site_id", parsed.site_id.as_str());
        Span::current().record("device_id", parsed.device_id.as_str());

        let message = RawMessage {
            topic: topic.to_string(),
            site_id: parsed.site_id,
            device_id: parsed.device_id,
            received_at: chrono::Utc::now(),
            payload: payload.to_vec(),
        };

        let result = producer.publish(message).await;
        if result.is_ok() {
            debug!("queued telemetry message");
        }
        result
    }
    .instrument(span)
    .await
}
