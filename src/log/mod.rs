mod entry;
mod in_memory;
mod iterator;
mod types;

pub use entry::InMemoryLogEntry;
pub use entry::LogEntry;
pub use entry::LogEntryView;
pub use entry::LogMetaPayload;
pub use entry::LogPayload;
pub use entry::ReplicatedLogEntry;
pub use in_memory::InMemoryLog;
pub use iterator::LogRangeIterator;
pub use iterator::PersistedLogIterator;
pub use types::LogIndex;
pub use types::LogRange;
pub use types::LogTerm;
pub use types::MessageId;
pub use types::ParticipantId;
pub use types::TermIndexPair;
