mod config;

use common::clickhouse::ClickHouseClient;
use common::domain::ReadingRepository;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::{ServiceConfig, StorageBackend};
use envira_runner::Runner;
use live_channel::{ClientRegistry, LiveChannelServer};
use std::sync::Arc;
use std::time::Duration;
use telemetry_ingester::domain::InMemoryReadingRepository;
use telemetry_ingester::{ClickHouseReadingRepository, TelemetryIngester, TelemetryIngesterConfig};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(provider) => provider,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting envira-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let repository = match create_repository(&config).await {
        Ok(repository) => repository,
        Err(e) => {
            error!("Failed to initialize storage: {:#}", e);
            std::process::exit(1);
        }
    };

    let registry = Arc::new(ClientRegistry::new(config.live_client_queue_capacity));

    let ingester = TelemetryIngester::new(
        TelemetryIngesterConfig {
            mqtt: config.mqtt_config(),
            queue_capacity: config.queue_capacity,
            storage_timeout: config.storage_timeout(),
        },
        repository.clone(),
        registry.clone(),
    );

    let live_channel = LiveChannelServer::new(
        config.live_channel_config(),
        registry.clone(),
        ingester.connection_state(),
        repository,
    );

    let mut runner = Runner::new()
        .with_named_process("live_channel", live_channel.into_runner_process());

    for (name, process) in ingester.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer({
            let registry = Arc::clone(&registry);
            move || {
                Box::pin(async move {
                    info!("Running cleanup tasks...");
                    registry.close_all().await;

                    // Shutdown telemetry and flush pending traces and logs
                    shutdown_telemetry(telemetry_providers);

                    info!("Cleanup complete");
                    Ok(())
                })
            }
        })
        .with_closer_timeout(Duration::from_secs(10))
        .with_shutdown_grace(config.shutdown_grace());

    runner.run().await;
}

async fn create_repository(config: &ServiceConfig) -> anyhow::Result<Arc<dyn ReadingRepository>> {
    match config.storage_backend()? {
        StorageBackend::Memory => {
            info!("Using in-memory reading storage");
            Ok(Arc::new(InMemoryReadingRepository::new()))
        }
        StorageBackend::ClickHouse => {
            info!("Initializing ClickHouse...");
            let client = ClickHouseClient::new(
                &config.clickhouse_url,
                &config.clickhouse_database,
                &config.clickhouse_username,
                &config.clickhouse_password,
            );
            client.ping().await?;

            let repository = ClickHouseReadingRepository::new(client, &config.clickhouse_table)?;
            repository.ensure_schema().await?;
            info!(table = repository.table(), "ClickHouse reading storage ready");
            Ok(Arc::new(repository))
        }
    }
}
