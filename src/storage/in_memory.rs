use crate::errors::StorageError;
use crate::log::{LogEntry, LogIndex, PersistedLogIterator};
use crate::storage::{StorageEngineMethods, StorageMetadata, WriteOptions};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// InMemoryStorageEngine models a durable log without touching disk. It keeps the same ordering
/// and contiguity rules a real engine has, which is what the leader depends on.
#[derive(Default)]
pub struct InMemoryStorageEngine {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<LogIndex, LogEntry>,
    metadata: StorageMetadata,
    num_synced_writes: u64,
}

impl InMemoryStorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts out with an existing log, e.g. one a previous leader left behind.
    pub fn with_entries(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let engine = Self::default();
        {
            let mut inner = engine.lock();
            for entry in entries {
                inner.entries.insert(entry.index, entry);
            }
        }
        engine
    }

    /// Copy of everything currently persisted.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.values().cloned().collect()
    }

    /// How many inserts asked to be synced.
    pub fn num_synced_writes(&self) -> u64 {
        self.lock().num_synced_writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("InMemoryStorageEngine mutex guard poison")
    }
}

#[async_trait::async_trait]
impl StorageEngineMethods for InMemoryStorageEngine {
    fn read_metadata(&self) -> Result<StorageMetadata, StorageError> {
        Ok(self.lock().metadata.clone())
    }

    fn update_metadata(&self, metadata: StorageMetadata) -> Result<(), StorageError> {
        self.lock().metadata = metadata;
        Ok(())
    }

    fn read(&self, first: LogIndex) -> PersistedLogIterator {
        let entries: Vec<LogEntry> = self.lock().entries.range(first..).map(|(_, e)| e.clone()).collect();
        Box::new(entries.into_iter())
    }

    async fn insert(&self, entries: Vec<LogEntry>, options: WriteOptions) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let mut expected = inner.entries.keys().next_back().map(|i| i.plus(1));
        for entry in &entries {
            if let Some(expected) = expected {
                if entry.index != expected {
                    return Err(StorageError::NonContiguousAppend {
                        expected,
                        actual: entry.index,
                    });
                }
            }
            expected = Some(entry.index.plus(1));
        }

        for entry in entries {
            inner.entries.insert(entry.index, entry);
        }
        if options.wait_for_sync {
            inner.num_synced_writes += 1;
        }

        Ok(())
    }

    async fn remove_front(&self, stop: LogIndex) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.entries = inner.entries.split_off(&stop);
        Ok(())
    }

    async fn remove_back(&self, start: LogIndex) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let _ = inner.entries.split_off(&start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogPayload, LogTerm};

    fn entry(index: u64) -> LogEntry {
        LogEntry::new(LogTerm::new(1), LogIndex::new(index), LogPayload::normal("x"))
    }

    #[tokio::test]
    async fn insert_read_and_remove() {
        // -- setup --
        let engine = InMemoryStorageEngine::new();

        // -- execute --
        engine
            .insert((1..=5).map(entry).collect(), WriteOptions { wait_for_sync: true })
            .await
            .unwrap();
        engine.remove_front(LogIndex::new(3)).await.unwrap();
        engine.remove_back(LogIndex::new(5)).await.unwrap();

        // -- verify --
        let indexes: Vec<u64> = engine.read(LogIndex::new(0)).map(|e| e.index.as_u64()).collect();
        assert_eq!(vec![3, 4], indexes);
        assert_eq!(1, engine.num_synced_writes());
    }

    #[tokio::test]
    async fn insert_rejects_gap() {
        let engine = InMemoryStorageEngine::with_entries(vec![entry(1)]);

        let result = engine.insert(vec![entry(3)], WriteOptions::default()).await;

        assert!(matches!(result, Err(StorageError::NonContiguousAppend { .. })));
        assert_eq!(1, engine.entries().len());
    }
}
