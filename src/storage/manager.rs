use crate::errors::StorageError;
use crate::log::{LogEntry, LogIndex, LogRange, LogRangeIterator, LogTerm, PersistedLogIterator, TermIndexPair};
use crate::storage::{StorageEngineMethods, StorageMetadata, TermIndexMapping, WriteOptions};
use std::sync::{Arc, Mutex, MutexGuard};

/// StorageManager sits between the leader and its storage engine. It caches the term of every
/// persisted index and keeps the engine methods until the leader resigns and hands them back.
pub struct StorageManager {
    logger: slog::Logger,
    guarded: Mutex<GuardedStorageData>,
}

struct GuardedStorageData {
    methods: Option<Arc<dyn StorageEngineMethods>>,
    mapping: TermIndexMapping,
}

impl StorageManager {
    pub fn new(logger: slog::Logger, methods: Arc<dyn StorageEngineMethods>) -> Self {
        let mut mapping = TermIndexMapping::new();
        for entry in methods.read(LogIndex::new(0)) {
            mapping.insert(entry.term_index_pair());
        }
        slog::debug!(logger, "Loaded persisted log {:?}", mapping.index_range());

        StorageManager {
            logger,
            guarded: Mutex::new(GuardedStorageData {
                methods: Some(methods),
                mapping,
            }),
        }
    }

    pub async fn append_entries(&self, entries: Vec<LogEntry>, options: WriteOptions) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }

        let methods = {
            let guard = self.lock();
            if let (Some(last), Some(first)) = (guard.mapping.last_index(), entries.first()) {
                if first.index != last.index.plus(1) {
                    return Err(StorageError::NonContiguousAppend {
                        expected: last.index.plus(1),
                        actual: first.index,
                    });
                }
            }
            Self::methods_of(&guard)?
        };

        let pairs: Vec<TermIndexPair> = entries.iter().map(|e| e.term_index_pair()).collect();
        methods.insert(entries, options).await?;

        let mut guard = self.lock();
        for pair in pairs {
            guard.mapping.insert(pair);
        }

        Ok(())
    }

    /// Removes every persisted entry with an index lower than `stop`.
    pub async fn remove_front(&self, stop: LogIndex) -> Result<(), StorageError> {
        let methods = Self::methods_of(&self.lock())?;
        methods.remove_front(stop).await?;
        self.lock().mapping.remove_front(stop);
        slog::debug!(self.logger, "Removed persisted entries before {:?}", stop);

        Ok(())
    }

    /// Removes every persisted entry starting at `start`.
    pub async fn remove_back(&self, start: LogIndex) -> Result<(), StorageError> {
        let methods = Self::methods_of(&self.lock())?;
        methods.remove_back(start).await?;
        self.lock().mapping.remove_back(start);

        Ok(())
    }

    pub fn first_term_index_pair(&self) -> Option<TermIndexPair> {
        self.lock().mapping.first_index()
    }

    pub fn last_term_index_pair(&self) -> Option<TermIndexPair> {
        self.lock().mapping.last_index()
    }

    pub fn term_of_index(&self, index: LogIndex) -> Option<LogTerm> {
        self.lock().mapping.term_of_index(index)
    }

    pub fn persisted_iterator(&self, first: LogIndex) -> Result<PersistedLogIterator, StorageError> {
        let methods = Self::methods_of(&self.lock())?;
        Ok(methods.read(first))
    }

    /// Iterator over the client payloads in `range`. The caller bounds `range` by the commit index.
    pub fn committed_iterator(&self, range: LogRange) -> Result<LogRangeIterator, StorageError> {
        let entries = self.persisted_iterator(range.from)?.take_while(move |e| e.index < range.to);
        Ok(LogRangeIterator::new(range, entries))
    }

    pub fn read_metadata(&self) -> Result<StorageMetadata, StorageError> {
        Self::methods_of(&self.lock())?.read_metadata()
    }

    pub fn update_metadata(&self, metadata: StorageMetadata) -> Result<(), StorageError> {
        Self::methods_of(&self.lock())?.update_metadata(metadata)
    }

    /// Hands the engine methods back. Every later call fails with `StorageError::Resigned`.
    pub fn resign(&self) -> Result<Arc<dyn StorageEngineMethods>, StorageError> {
        self.lock().methods.take().ok_or(StorageError::Resigned)
    }

    fn methods_of(guard: &GuardedStorageData) -> Result<Arc<dyn StorageEngineMethods>, StorageError> {
        guard.methods.clone().ok_or(StorageError::Resigned)
    }

    fn lock(&self) -> MutexGuard<'_, GuardedStorageData> {
        self.guarded.lock().expect("StorageManager mutex guard poison")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogPayload;
    use crate::storage::InMemoryStorageEngine;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn entry(term: u64, index: u64) -> LogEntry {
        LogEntry::new(LogTerm::new(term), LogIndex::new(index), LogPayload::normal("x"))
    }

    #[tokio::test]
    async fn mapping_follows_appends_and_compaction() {
        // -- setup --
        let engine = Arc::new(InMemoryStorageEngine::with_entries(vec![entry(1, 1), entry(1, 2)]));
        let manager = StorageManager::new(logger(), engine.clone());
        assert_eq!(
            Some(TermIndexPair::new(LogTerm::new(1), LogIndex::new(2))),
            manager.last_term_index_pair()
        );

        // -- execute --
        manager
            .append_entries(vec![entry(2, 3), entry(2, 4)], WriteOptions::default())
            .await
            .unwrap();
        manager.remove_front(LogIndex::new(2)).await.unwrap();

        // -- verify --
        assert_eq!(Some(LogTerm::new(2)), manager.term_of_index(LogIndex::new(4)));
        assert_eq!(None, manager.term_of_index(LogIndex::new(1)));
        assert_eq!(4, engine.entries().last().unwrap().index.as_u64());
        assert_eq!(
            vec![2, 3, 4],
            manager
                .persisted_iterator(LogIndex::new(1))
                .unwrap()
                .map(|e| e.index.as_u64())
                .collect::<Vec<_>>()
        );
        assert_eq!(
            vec![2, 3],
            manager
                .committed_iterator(LogRange::new(LogIndex::new(1), LogIndex::new(4)))
                .unwrap()
                .map(|v| v.index.as_u64())
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn resign_hands_back_methods_once() {
        let manager = StorageManager::new(logger(), Arc::new(InMemoryStorageEngine::new()));

        assert!(manager.resign().is_ok());
        assert!(matches!(manager.resign(), Err(StorageError::Resigned)));
        assert!(matches!(
            manager.append_entries(vec![entry(1, 1)], WriteOptions::default()).await,
            Err(StorageError::Resigned)
        ));
    }
}
