use crate::errors::StorageError;
use crate::log::{LogEntry, LogIndex, PersistedLogIterator};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotStatus {
    Invalidated,
    Completed,
    Failed,
}

impl Default for SnapshotStatus {
    fn default() -> Self {
        SnapshotStatus::Invalidated
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotInfo {
    pub status: SnapshotStatus,
}

/// Persistent state stored next to the log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageMetadata {
    pub snapshot: SnapshotInfo,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct WriteOptions {
    pub wait_for_sync: bool,
}

/// StorageEngineMethods is the durable backend of one replicated log. The core never depends
/// on the on-disk layout; it only appends at the back, removes at either end and reads.
///
/// Implementations must apply appends in call order.
#[async_trait::async_trait]
pub trait StorageEngineMethods: Send + Sync {
    fn read_metadata(&self) -> Result<StorageMetadata, StorageError>;

    fn update_metadata(&self, metadata: StorageMetadata) -> Result<(), StorageError>;

    /// Reads every persisted entry starting at `first`.
    fn read(&self, first: LogIndex) -> PersistedLogIterator;

    async fn insert(&self, entries: Vec<LogEntry>, options: WriteOptions) -> Result<(), StorageError>;

    /// Removes every entry with an index lower than `stop`.
    async fn remove_front(&self, stop: LogIndex) -> Result<(), StorageError>;

    /// Removes every entry starting at `start`.
    async fn remove_back(&self, start: LogIndex) -> Result<(), StorageError>;
}
