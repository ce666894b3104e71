#![cfg(feature = "integration-tests")]

use chrono::{Duration, TimeZone, Utc};
use common::clickhouse::ClickHouseClient;
use common::domain::{
    GetLatestReadingInput, GetReadingStatsInput, ListReadingsInput, ReadingRepository,
    SensorReading,
};
use std::sync::Arc;
use telemetry_ingester::domain::{Clock, IeqScorer};
use telemetry_ingester::ClickHouseReadingRepository;
use testcontainers_modules::{clickhouse::ClickHouse, testcontainers::runners::AsyncRunner};

struct FixedClock(chrono::DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> chrono::DateTime<Utc> {
        self.0
    }
}

fn reading(device_id: &str, mq135: f64) -> SensorReading {
    SensorReading {
        device_id: device_id.to_string(),
        site_id: "home".to_string(),
        timestamp: 1_767_225_600_000,
        air_quality_raw: mq135,
        temperature_c: 22.0,
        humidity_pct: 50.0,
        light_raw: 1800.0,
        sound_rms: 300.0,
    }
}

#[tokio::test]
async fn test_clickhouse_repository_round_trip() {
    let container = ClickHouse::default()
        .start()
        .await
        .expect("failed to start ClickHouse container");
    let port = container
        .get_host_port_ipv4(8123)
        .await
        .expect("failed to resolve ClickHouse port");

    let client = ClickHouseClient::new(
        &format!("http://127.0.0.1:{}", port),
        "default",
        "default",
        "",
    );
    client.ping().await.expect("ClickHouse not reachable");

    let repository = ClickHouseReadingRepository::new(client, "scored_readings").unwrap();
    repository.ensure_schema().await.unwrap();
    // Idempotent
    repository.ensure_schema().await.unwrap();
    repository.ping().await.unwrap();

    let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    for (offset, mq135) in [(0, 200.0), (10, 400.0), (20, 800.0)] {
        let scorer = IeqScorer::new(Arc::new(FixedClock(base + Duration::seconds(offset))));
        let scored = scorer.score(reading("esp32-001", mq135));
        repository.append(&scored).await.unwrap();
    }
    let other = IeqScorer::new(Arc::new(FixedClock(base))).score(reading("esp32-002", 0.0));
    repository.append(&other).await.unwrap();

    let latest = repository
        .latest(GetLatestReadingInput {
            device_id: "esp32-001".to_string(),
        })
        .await
        .unwrap()
        .expect("latest reading should exist");
    assert_eq!(latest.processed_at, base + Duration::seconds(20));
    assert_eq!(latest.reading.air_quality_raw, 800.0);
    assert!(latest.recorded_at.is_some());

    let window = repository
        .range(ListReadingsInput {
            device_id: "esp32-001".to_string(),
            from: base,
            to: base + Duration::seconds(10),
        })
        .await
        .unwrap();
    assert_eq!(window.len(), 2);
    assert!(window[0].processed_at < window[1].processed_at);

    let stats = repository
        .stats(GetReadingStatsInput {
            device_id: "esp32-001".to_string(),
            from: base,
            to: base + Duration::seconds(20),
        })
        .await
        .unwrap()
        .expect("stats should exist");
    assert_eq!(stats.count, 3);
    assert!(stats.min_ieq_score <= stats.avg_ieq_score);
    assert!(stats.avg_ieq_score <= stats.max_ieq_score);

    let empty = repository
        .stats(GetReadingStatsInput {
            device_id: "unknown".to_string(),
            from: base,
            to: base + Duration::seconds(20),
        })
        .await
        .unwrap();
    assert!(empty.is_none());
}
