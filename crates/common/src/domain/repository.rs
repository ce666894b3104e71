use crate::domain::result::StorageResult;
use crate::domain::{ReadingStats, ScoredReading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Input for fetching the most recent reading of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLatestReadingInput {
    pub device_id: String,
}

/// Input for listing a device's readings in a time window (inclusive bounds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListReadingsInput {
    pub device_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Input for aggregating a device's readings in a time window (inclusive bounds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetReadingStatsInput {
    pub device_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Repository trait for scored reading storage
/// Infrastructure layer (ClickHouse, in-memory) implements this trait
///
/// Writes are append-only. The pipeline only calls `append`; the query
/// methods serve read-side collaborators.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Append a single scored reading
    async fn append(&self, reading: &ScoredReading) -> StorageResult<()>;

    /// Most recent reading of a device by `processed_at`
    async fn latest(&self, input: GetLatestReadingInput) -> StorageResult<Option<ScoredReading>>;

    /// Readings of a device ordered by `processed_at` ascending
    async fn range(&self, input: ListReadingsInput) -> StorageResult<Vec<ScoredReading>>;

    /// Aggregate scores of a device, `None` when the window is empty
    async fn stats(&self, input: GetReadingStatsInput) -> StorageResult<Option<ReadingStats>>;

    /// Check that the backing store is reachable
    async fn ping(&self) -> StorageResult<()>;
}
