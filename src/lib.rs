mod compaction;
mod config;
mod errors;
mod log;
mod metrics;
mod options;
mod replication;
mod scheduler;
mod state_handle;
mod storage;

pub use compaction::CompactionRecord;
pub use compaction::CompactionStatus;
pub use compaction::CompactionStopReason;
pub use config::LogConfig;
pub use config::ParticipantFlags;
pub use config::ParticipantsConfig;
pub use errors::FollowerError;
pub use errors::LeaderError;
pub use errors::StorageError;
pub use log::InMemoryLog;
pub use log::InMemoryLogEntry;
pub use log::LogEntry;
pub use log::LogEntryView;
pub use log::LogIndex;
pub use log::LogMetaPayload;
pub use log::LogPayload;
pub use log::LogRange;
pub use log::LogRangeIterator;
pub use log::LogTerm;
pub use log::MessageId;
pub use log::ParticipantId;
pub use log::PersistedLogIterator;
pub use log::ReplicatedLogEntry;
pub use log::TermIndexPair;
pub use metrics::MetricsSnapshot;
pub use metrics::ReplicatedLogMetrics;
pub use options::LeaderOptions;
pub use options::LeaderOptionsValidated;
pub use replication::AppendEntriesErrorReason;
pub use replication::AppendEntriesErrorType;
pub use replication::AppendEntriesRequest;
pub use replication::AppendEntriesResult;
pub use replication::CommitFailReason;
pub use replication::CompactionResult;
pub use replication::FollowerFactory;
pub use replication::FollowerReplicationState;
pub use replication::FollowerStatistics;
pub use replication::LeaderStatus;
pub use replication::LogFollower;
pub use replication::LogLeader;
pub use replication::LogLeaderConfig;
pub use replication::LogStatistics;
pub use replication::NonEligibleReason;
pub use replication::ParticipantRole;
pub use replication::QuickLogStatus;
pub use replication::QuorumData;
pub use replication::ResignedLeader;
pub use replication::SnapshotAvailableReport;
pub use replication::WaitForFuture;
pub use replication::WaitForResignFuture;
pub use replication::WaitForResult;
pub use scheduler::DeferredAction;
pub use scheduler::DelayedWorkItem;
pub use scheduler::Scheduler;
pub use scheduler::TokioScheduler;
pub use scheduler::WorkItem;
pub use scheduler::WorkItemHandle;
pub use state_handle::LeaderMethods;
pub use state_handle::LocalStateMachineStatus;
pub use state_handle::ReplicatedStateHandle;
pub use storage::InMemoryStorageEngine;
pub use storage::SnapshotInfo;
pub use storage::SnapshotStatus;
pub use storage::StorageEngineMethods;
pub use storage::StorageManager;
pub use storage::StorageMetadata;
pub use storage::TermIndexMapping;
pub use storage::WriteOptions;

// The crate root only declares modules and re-exports. Modules stay private; public types are
// exported one by one.
