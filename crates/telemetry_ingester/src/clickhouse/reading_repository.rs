use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use common::clickhouse::ClickHouseClient;
use common::domain::{
    GetLatestReadingInput, GetReadingStatsInput, ListReadingsInput, NormalizedSensors,
    ReadingRepository, ReadingStats, ScoredReading, SensorReading, StorageError, StorageResult,
    SubScores,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct ScoredReadingRow {
    pub device_id: String,
    pub site_id: String,
    pub device_ts: i64,
    pub air_quality_raw: f64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub light_raw: f64,
    pub sound_rms: f64,
    pub ieq_score: f64,
    pub air_score: f64,
    pub thermal_score: f64,
    pub light_score: f64,
    pub acoustic_score: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub air_quality: f64,
    pub light: f64,
    pub sound: f64,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub processed_at: DateTime<Utc>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis::option")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl From<&ScoredReading> for ScoredReadingRow {
    fn from(scored: &ScoredReading) -> Self {
        let reading = &scored.reading;
        ScoredReadingRow {
            device_id: reading.device_id.clone(),
            site_id: reading.site_id.clone(),
            device_ts: reading.timestamp,
            air_quality_raw: reading.air_quality_raw,
            temperature_c: reading.temperature_c,
            humidity_pct: reading.humidity_pct,
            light_raw: reading.light_raw,
            sound_rms: reading.sound_rms,
            ieq_score: scored.ieq_score,
            air_score: scored.sub_scores.air,
            thermal_score: scored.sub_scores.thermal,
            light_score: scored.sub_scores.light,
            acoustic_score: scored.sub_scores.acoustic,
            temperature: scored.sensors.temperature,
            humidity: scored.sensors.humidity,
            air_quality: scored.sensors.air_quality,
            light: scored.sensors.light,
            sound: scored.sensors.sound,
            processed_at: scored.processed_at,
            recorded_at: scored.recorded_at,
        }
    }
}

impl From<ScoredReadingRow> for ScoredReading {
    fn from(row: ScoredReadingRow) -> Self {
        ScoredReading {
            reading: SensorReading {
                device_id: row.device_id,
                site_id: row.site_id,
                timestamp: row.device_ts,
                air_quality_raw: row.air_quality_raw,
                temperature_c: row.temperature_c,
                humidity_pct: row.humidity_pct,
                light_raw: row.light_raw,
                sound_rms: row.sound_rms,
            },
            ieq_score: row.ieq_score,
            sub_scores: SubScores {
                air: row.air_score,
                thermal: row.thermal_score,
                light: row.light_score,
                acoustic: row.acoustic_score,
            },
            sensors: NormalizedSensors {
                temperature: row.temperature,
                humidity: row.humidity,
                air_quality: row.air_quality,
                light: row.light,
                sound: row.sound,
            },
            processed_at: row.processed_at,
            recorded_at: row.recorded_at,
        }
    }
}

#[derive(Debug, Row, Deserialize)]
struct ReadingStatsRow {
    count: u64,
    avg_ieq_score: f64,
    min_ieq_score: f64,
    max_ieq_score: f64,
    avg_air_score: f64,
    avg_thermal_score: f64,
    avg_light_score: f64,
    avg_acoustic_score: f64,
}

/// ClickHouse implementation of ReadingRepository
#[derive(Clone)]
pub struct ClickHouseReadingRepository {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseReadingRepository {
    /// Table names are interpolated into SQL, so only `[A-Za-z0-9_.]` is accepted
    pub fn new(client: ClickHouseClient, table: impl Into<String>) -> StorageResult<Self> {
        let table = table.into();
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(StorageError::InvalidQuery(format!(
                "invalid table name '{}'",
                table
            )));
        }
        Ok(Self { client, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the readings table if it does not exist yet
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                device_id String,
                site_id String,
                device_ts Int64,
                air_quality_raw Float64,
                temperature_c Float64,
                humidity_pct Float64,
                light_raw Float64,
                sound_rms Float64,
                ieq_score Float64,
                air_score Float64,
                thermal_score Float64,
                light_score Float64,
                acoustic_score Float64,
                temperature Float64,
                humidity Float64,
                air_quality Float64,
                light Float64,
                sound Float64,
                processed_at DateTime64(3, 'UTC'),
                recorded_at Nullable(DateTime64(3, 'UTC'))
            )
            ENGINE = MergeTree
            ORDER BY (device_id, processed_at)",
            self.table
        );

        self.client.execute(&ddl).await.map_err(|e| {
            error!("failed to create ClickHouse table: {}", e);
            StorageError::RepositoryError(e)
        })?;

        info!(table = %self.table, "ClickHouse schema ready");
        Ok(())
    }

    async fn fetch_window(
        &self,
        device_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<ScoredReadingRow>> {
        let sql = format!(
            "SELECT ?fields FROM {} \
             WHERE device_id = ? \
               AND processed_at >= fromUnixTimestamp64Milli(?) \
               AND processed_at <= fromUnixTimestamp64Milli(?) \
             ORDER BY processed_at ASC",
            self.table
        );

        self.client
            .get_client()
            .query(&sql)
            .bind(device_id)
            .bind(from.timestamp_millis())
            .bind(to.timestamp_millis())
            .fetch_all::<ScoredReadingRow>()
            .await
            .map_err(|e| {
                error!("failed to query ClickHouse readings: {}", e);
                StorageError::RepositoryError(e.into())
            })
    }
}

fn check_window(from: DateTime<Utc>, to: DateTime<Utc>) -> StorageResult<()> {
    if from > to {
        return Err(StorageError::InvalidQuery(format!(
            "window start {} is after end {}",
            from, to
        )));
    }
    Ok(())
}

#[async_trait]
impl ReadingRepository for ClickHouseReadingRepository {
    async fn append(&self, reading: &ScoredReading) -> StorageResult<()> {
        let row = ScoredReadingRow::from(reading);

        let mut insert = self
            .client
            .get_client()
            .insert::<ScoredReadingRow>(&self.table)
            .await
            .map_err(|e| {
                error!("failed to create ClickHouse inserter: {}", e);
                StorageError::RepositoryError(e.into())
            })?;

        insert.write(&row).await.map_err(|e| {
            error!("failed to write row to ClickHouse: {}", e);
            StorageError::RepositoryError(e.into())
        })?;

        insert.end().await.map_err(|e| {
            error!("failed to finalize ClickHouse insert: {}", e);
            StorageError::RepositoryError(e.into())
        })?;

        debug!(device_id = %row.device_id, table = %self.table, "stored scored reading");
        Ok(())
    }

    async fn latest(&self, input: GetLatestReadingInput) -> StorageResult<Option<ScoredReading>> {
        let sql = format!(
            "SELECT ?fields FROM {} WHERE device_id = ? ORDER BY processed_at DESC LIMIT 1",
            self.table
        );

        let row = self
            .client
            .get_client()
            .query(&sql)
            .bind(&input.device_id)
            .fetch_optional::<ScoredReadingRow>()
            .await
            .map_err(|e| {
                error!("failed to query latest ClickHouse reading: {}", e);
                StorageError::RepositoryError(e.into())
            })?;

        Ok(row.map(ScoredReading::from))
    }

    async fn ping(&self) -> StorageResult<()> {
        self.client.ping().await.map_err(StorageError::RepositoryError)
    }

    async fn range(&self, input: ListReadingsInput) -> StorageResult<Vec<ScoredReading>> {
        check_window(input.from, input.to)?;
        let rows = self
            .fetch_window(&input.device_id, input.from, input.to)
            .await?;
        Ok(rows.into_iter().map(ScoredReading::from).collect())
    }

    async fn stats(&self, input: GetReadingStatsInput) -> StorageResult<Option<ReadingStats>> {
        check_window(input.from, input.to)?;

        let sql = format!(
            "SELECT \
                count() AS count, \
                avg(ieq_score) AS avg_ieq_score, \
                min(ieq_score) AS min_ieq_score, \
                max(ieq_score) AS max_ieq_score, \
                avg(air_score) AS avg_air_score, \
                avg(thermal_score) AS avg_thermal_score, \
                avg(light_score) AS avg_light_score, \
                avg(acoustic_score) AS avg_acoustic_score \
             FROM {} \
             WHERE device_id = ? \
               AND processed_at >= fromUnixTimestamp64Milli(?) \
               AND processed_at <= fromUnixTimestamp64Milli(?)",
            self.table
        );

        let stats = self
            .client
            .get_client()
            .query(&sql)
            .bind(&input.device_id)
            .bind(input.from.timestamp_millis())
            .bind(input.to.timestamp_millis())
            .fetch_one::<ReadingStatsRow>()
            .await
            .map_err(|e| {
                error!("failed to aggregate ClickHouse readings: {}", e);
                StorageError::RepositoryError(e.into())
            })?;

        if stats.count == 0 {
            return Ok(None);
        }

        Ok(Some(ReadingStats {
            device_id: input.device_id,
            count: stats.count,
            avg_ieq_score: stats.avg_ieq_score,
            min_ieq_score: stats.min_ieq_score,
            max_ieq_score: stats.max_ieq_score,
            avg_sub_scores: SubScores {
                air: stats.avg_air_score,
                thermal: stats.avg_thermal_score,
                light: stats.avg_light_score,
                acoustic: stats.avg_acoustic_score,
            },
        }))
    }
}
