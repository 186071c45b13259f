use crate::errors::{fatal_error_exit, StorageError};
use crate::log::{LogEntry, LogTerm, ParticipantId};
use crate::metrics::ReplicatedLogMetrics;
use crate::replication::{AppendEntriesErrorReason, AppendEntriesErrorType, AppendEntriesRequest, AppendEntriesResult};
use crate::storage::{StorageManager, WriteOptions};
use std::sync::Arc;
use std::time::Instant;

/// LocalFollower is the leader acting as a follower of itself: it writes the replicated entries
/// to its own storage and reports success once they are durable.
pub(crate) struct LocalFollower {
    logger: slog::Logger,
    participant_id: ParticipantId,
    term: LogTerm,
    storage: Arc<StorageManager>,
    metrics: Arc<ReplicatedLogMetrics>,
}

impl LocalFollower {
    pub(crate) fn new(
        logger: &slog::Logger,
        participant_id: ParticipantId,
        term: LogTerm,
        storage: Arc<StorageManager>,
        metrics: Arc<ReplicatedLogMetrics>,
    ) -> Self {
        LocalFollower {
            logger: logger.new(slog::o!("follower" => "local")),
            participant_id,
            term,
            storage,
            metrics,
        }
    }

    pub(crate) fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    pub(crate) async fn append_entries(&self, request: AppendEntriesRequest) -> AppendEntriesResult {
        let message_id = request.message_id;
        if request.entries.is_empty() {
            return AppendEntriesResult::with_ok(self.term, message_id, true);
        }

        let options = WriteOptions {
            wait_for_sync: request.wait_for_sync,
        };
        let entries: Vec<LogEntry> = request.entries.into_iter().map(LogEntry::from).collect();
        let range = (entries[0].index, entries[entries.len() - 1].index);

        let start = Instant::now();
        match self.storage.append_entries(entries, options).await {
            Ok(()) => {}
            // Leader resigned while this write was queued. Nobody looks at the answer anymore.
            Err(StorageError::Resigned) => {
                slog::debug!(self.logger, "Storage gone, dropping local append of {:?}", range);
                return AppendEntriesResult::with_rejection(
                    self.term,
                    message_id,
                    AppendEntriesErrorReason::new(AppendEntriesErrorType::LostLogCore),
                    true,
                );
            }
            Err(e) => {
                fatal_error_exit(
                    &self.logger,
                    &format!("Local follower failed to persist entries {:?}: {}", range, e),
                );
            }
        }
        self.metrics
            .follower_append_entries_rt_us
            .observe(start.elapsed().as_micros() as u64);
        slog::trace!(self.logger, "Persisted entries {:?}", range);

        AppendEntriesResult::with_ok(self.term, message_id, true)
    }
}
