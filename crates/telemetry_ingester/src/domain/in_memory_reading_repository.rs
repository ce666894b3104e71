use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{
    GetLatestReadingInput, GetReadingStatsInput, ListReadingsInput, ReadingRepository,
    ReadingStats, ScoredReading, StorageError, StorageResult, SubScores,
};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of ReadingRepository backed by an append-only Vec
///
/// Used when no ClickHouse is configured and in tests.
#[derive(Clone)]
pub struct InMemoryReadingRepository {
    readings: Arc<RwLock<Vec<ScoredReading>>>,
}

impl InMemoryReadingRepository {
    pub fn new() -> Self {
        Self {
            readings: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// All stored readings in append order
    pub async fn snapshot(&self) -> Vec<ScoredReading> {
        self.readings.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }

    async fn in_window(
        &self,
        device_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<ScoredReading>> {
        if from > to {
            return Err(StorageError::InvalidQuery(format!(
                "window start {} is after end {}",
                from, to
            )));
        }

        let readings = self.readings.read().await;
        let mut matching: Vec<ScoredReading> = readings
            .iter()
            .filter(|r| r.device_id() == device_id)
            .filter(|r| r.processed_at >= from && r.processed_at <= to)
            .cloned()
            .collect();
        // Stable sort keeps append order for equal timestamps
        matching.sort_by_key(|r| r.processed_at);
        Ok(matching)
    }
}

impl Default for InMemoryReadingRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingRepository for InMemoryReadingRepository {
    async fn append(&self, reading: &ScoredReading) -> StorageResult<()> {
        let mut readings = self.readings.write().await;
        readings.push(reading.clone());
        Ok(())
    }

    async fn latest(&self, input: GetLatestReadingInput) -> StorageResult<Option<ScoredReading>> {
        let readings = self.readings.read().await;
        // max_by_key keeps the last maximum, so the last appended wins ties
        let latest = readings
            .iter()
            .filter(|r| r.device_id() == input.device_id)
            .max_by_key(|r| r.processed_at)
            .cloned();
        Ok(latest)
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn range(&self, input: ListReadingsInput) -> StorageResult<Vec<ScoredReading>> {
        self.in_window(&input.device_id, input.from, input.to).await
    }

    async fn stats(&self, input: GetReadingStatsInput) -> StorageResult<Option<ReadingStats>> {
        let readings = self.in_window(&input.device_id, input.from, input.to).await?;
        Ok(aggregate(&input.device_id, &readings))
    }
}

fn aggregate(device_id: &str, readings: &[ScoredReading]) -> Option<ReadingStats> {
    if readings.is_empty() {
        return None;
    }

    let count = readings.len() as f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut score_sum = 0.0;
    let mut subs = SubScores {
        air: 0.0,
        thermal: 0.0,
        light: 0.0,
        acoustic: 0.0,
    };

    for r in readings {
        min = min.min(r.ieq_score);
        max = max.max(r.ieq_score);
        score_sum += r.ieq_score;
        subs.air += r.sub_scores.air;
        subs.thermal += r.sub_scores.thermal;
        subs.light += r.sub_scores.light;
        subs.acoustic += r.sub_scores.acoustic;
    }

    Some(ReadingStats {
        device_id: device_id.to_string(),
        count: readings.len() as u64,
        avg_ieq_score: score_sum / count,
        min_ieq_score: min,
        max_ieq_score: max,
        avg_sub_scores: SubScores {
            air: subs.air / count,
            thermal: subs.thermal / count,
            light: subs.light / count,
            acoustic: subs.acoustic / count,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::domain::{NormalizedSensors, SensorReading};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn scored(device_id: &str, offset_secs: i64, score: f64) -> ScoredReading {
        ScoredReading {
            reading: SensorReading {
                device_id: device_id.to_string(),
                site_id: "home".to_string(),
                timestamp: offset_secs * 1000,
                air_quality_raw: 400.0,
                temperature_c: 22.0,
                humidity_pct: 50.0,
                light_raw: 1800.0,
                sound_rms: 300.0,
            },
            ieq_score: score,
            sub_scores: SubScores {
                air: score,
                thermal: score,
                light: score,
                acoustic: score,
            },
            sensors: NormalizedSensors {
                temperature: 22.0,
                humidity: 50.0,
                air_quality: 80.0,
                light: 439.5,
                sound: 30.0,
            },
            processed_at: base_time() + Duration::seconds(offset_secs),
            recorded_at: None,
        }
    }

    #[tokio::test]
    async fn test_append_and_snapshot_preserve_order() {
        let repo = InMemoryReadingRepository::new();
        repo.append(&scored("dev-1", 0, 50.0)).await.unwrap();
        repo.append(&scored("dev-2", 1, 60.0)).await.unwrap();

        let snapshot = repo.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].device_id(), "dev-1");
        assert_eq!(snapshot[1].device_id(), "dev-2");
    }

    #[tokio::test]
    async fn test_latest_picks_most_recent_for_device() {
        let repo = InMemoryReadingRepository::new();
        repo.append(&scored("dev-1", 10, 50.0)).await.unwrap();
        repo.append(&scored("dev-1", 5, 40.0)).await.unwrap();
        repo.append(&scored("dev-2", 20, 90.0)).await.unwrap();

        let latest = repo
            .latest(GetLatestReadingInput {
                device_id: "dev-1".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.ieq_score, 50.0);

        let missing = repo
            .latest(GetLatestReadingInput {
                device_id: "unknown".to_string(),
            })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_latest_prefers_last_appended_on_equal_timestamps() {
        let repo = InMemoryReadingRepository::new();
        repo.append(&scored("dev-1", 10, 10.0)).await.unwrap();
        repo.append(&scored("dev-1", 10, 20.0)).await.unwrap();
        repo.append(&scored("dev-1", 3, 30.0)).await.unwrap();

        let latest = repo
            .latest(GetLatestReadingInput {
                device_id: "dev-1".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.ieq_score, 20.0);
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_sorted() {
        let repo = InMemoryReadingRepository::new();
        for (offset, score) in [(30, 3.0), (10, 1.0), (20, 2.0), (40, 4.0)] {
            repo.append(&scored("dev-1", offset, score)).await.unwrap();
        }
        repo.append(&scored("dev-2", 20, 99.0)).await.unwrap();

        let readings = repo
            .range(ListReadingsInput {
                device_id: "dev-1".to_string(),
                from: base_time() + Duration::seconds(10),
                to: base_time() + Duration::seconds(30),
            })
            .await
            .unwrap();

        let scores: Vec<f64> = readings.iter().map(|r| r.ieq_score).collect();
        assert_eq!(scores, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_range_rejects_inverted_window() {
        let repo = InMemoryReadingRepository::new();
        let result = repo
            .range(ListReadingsInput {
                device_id: "dev-1".to_string(),
                from: base_time() + Duration::seconds(1),
                to: base_time(),
            })
            .await;

        assert!(matches!(result, Err(StorageError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_stats_aggregates_window() {
        let repo = InMemoryReadingRepository::new();
        for (offset, score) in [(0, 40.0), (10, 60.0), (20, 80.0)] {
            repo.append(&scored("dev-1", offset, score)).await.unwrap();
        }

        let stats = repo
            .stats(GetReadingStatsInput {
                device_id: "dev-1".to_string(),
                from: base_time(),
                to: base_time() + Duration::seconds(20),
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_ieq_score, 40.0);
        assert_eq!(stats.max_ieq_score, 80.0);
        assert!((stats.avg_ieq_score - 60.0).abs() < 1e-9);
        assert!((stats.avg_sub_scores.air - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stats_empty_window_is_none() {
        let repo = InMemoryReadingRepository::new();
        repo.append(&scored("dev-1", 0, 40.0)).await.unwrap();

        let stats = repo
            .stats(GetReadingStatsInput {
                device_id: "dev-1".to_string(),
                from: base_time() + Duration::seconds(100),
                to: base_time() + Duration::seconds(200),
            })
            .await
            .unwrap();

        assert!(stats.is_none());
    }
}
