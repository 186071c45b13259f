use crate::errors::StorageError;
use crate::log::{LogIndex, LogRange};
use crate::metrics::ReplicatedLogMetrics;
use crate::storage::StorageManager;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum CompactionStopReason {
    NothingToCompact,
    CompactionInProgress,
    #[serde(rename_all = "kebab-case")]
    NotReleasedByStateMachine { released_index: LogIndex },
    #[serde(rename_all = "kebab-case")]
    ParticipantMissingEntries { lowest_index_to_keep: LogIndex },
    #[serde(rename_all = "kebab-case")]
    CompactionThresholdNotReached { next_compaction_at: LogIndex },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompactionRecord {
    pub time: SystemTime,
    pub range: LogRange,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompactionStatus {
    pub in_progress: bool,
    pub last_compaction: Option<CompactionRecord>,
    pub stop_reason: Option<CompactionStopReason>,
}

#[derive(Debug)]
pub struct CompactResult {
    pub compacted_range: LogRange,
    pub stop_reason: Option<CompactionStopReason>,
    pub error: Option<StorageError>,
}

/// CompactionManager decides how much of the persisted log may be dropped. Two bounds apply:
/// the release index (the state machine no longer needs entries up to it) and the lowest index
/// to keep (some participant may still need entries from it on).
pub struct CompactionManager {
    logger: slog::Logger,
    storage: Arc<StorageManager>,
    metrics: Arc<ReplicatedLogMetrics>,
    threshold: u64,
    guarded: Mutex<GuardedCompactionData>,
}

#[derive(Default)]
struct GuardedCompactionData {
    release_index: LogIndex,
    lowest_index_to_keep: LogIndex,
    status: CompactionStatus,
}

impl CompactionManager {
    pub fn new(
        logger: slog::Logger,
        storage: Arc<StorageManager>,
        metrics: Arc<ReplicatedLogMetrics>,
        threshold: u64,
    ) -> Self {
        CompactionManager {
            logger,
            storage,
            metrics,
            threshold,
            guarded: Mutex::new(GuardedCompactionData::default()),
        }
    }

    /// Lowering the release index is a no-op.
    pub fn update_release_index(self: &Arc<Self>, index: LogIndex) {
        {
            let mut guard = self.lock();
            if index <= guard.release_index {
                return;
            }
            guard.release_index = index;
        }
        self.trigger_async_compaction();
    }

    /// Lowering the lowest index to keep is a no-op.
    pub fn update_lowest_index_to_keep(self: &Arc<Self>, index: LogIndex) {
        {
            let mut guard = self.lock();
            if index <= guard.lowest_index_to_keep {
                return;
            }
            guard.lowest_index_to_keep = index;
        }
        self.trigger_async_compaction();
    }

    /// (release index, lowest index to keep)
    pub fn get_indexes(&self) -> (LogIndex, LogIndex) {
        let guard = self.lock();
        (guard.release_index, guard.lowest_index_to_keep)
    }

    pub fn get_compaction_status(&self) -> CompactionStatus {
        self.lock().status.clone()
    }

    /// Compacts everything that may be compacted, ignoring the threshold.
    pub async fn compact(&self) -> CompactResult {
        self.run_compaction(true).await
    }

    fn trigger_async_compaction(self: &Arc<Self>) {
        if let Err(reason) = self.plan_compaction(&self.lock(), false) {
            slog::trace!(self.logger, "Not compacting: {:?}", reason);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let manager = self.clone();
                runtime.spawn(async move {
                    manager.run_compaction(false).await;
                });
            }
            Err(_) => slog::debug!(self.logger, "No runtime available, skipping automatic compaction"),
        }
    }

    async fn run_compaction(&self, ignore_threshold: bool) -> CompactResult {
        let range = {
            let mut guard = self.lock();
            match self.plan_compaction(&guard, ignore_threshold) {
                Ok(range) => {
                    guard.status.in_progress = true;
                    range
                }
                Err(reason) => {
                    guard.status.stop_reason = Some(reason.clone());
                    return CompactResult {
                        compacted_range: LogRange::default(),
                        stop_reason: Some(reason),
                        error: None,
                    };
                }
            }
        };

        slog::info!(self.logger, "Compacting log range {:?}", range);
        let result = self.storage.remove_front(range.to).await;

        let mut guard = self.lock();
        guard.status.in_progress = false;
        let stop_reason = Self::limiting_bound(&guard);
        guard.status.stop_reason = Some(stop_reason.clone());
        guard.status.last_compaction = Some(CompactionRecord {
            time: SystemTime::now(),
            range,
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        match result {
            Ok(()) => {
                self.metrics.compaction_num_entries.add(range.count());
                CompactResult {
                    compacted_range: range,
                    stop_reason: Some(stop_reason),
                    error: None,
                }
            }
            Err(e) => {
                slog::warn!(self.logger, "Compaction of {:?} failed: {}", range, e);
                CompactResult {
                    compacted_range: LogRange::empty_at(range.from),
                    stop_reason: Some(stop_reason),
                    error: Some(e),
                }
            }
        }
    }

    fn plan_compaction(
        &self,
        guard: &GuardedCompactionData,
        ignore_threshold: bool,
    ) -> Result<LogRange, CompactionStopReason> {
        if guard.status.in_progress {
            return Err(CompactionStopReason::CompactionInProgress);
        }

        let (first, last) = match (self.storage.first_term_index_pair(), self.storage.last_term_index_pair()) {
            (Some(first), Some(last)) => (first.index, last.index),
            _ => return Err(CompactionStopReason::NothingToCompact),
        };

        // The last persisted entry always stays, so the spearhead remains known.
        let stop = guard
            .release_index
            .plus(1)
            .min(guard.lowest_index_to_keep)
            .min(last);
        if stop <= first {
            return Err(if first >= last {
                CompactionStopReason::NothingToCompact
            } else {
                Self::limiting_bound(guard)
            });
        }

        let range = LogRange::new(first, stop);
        if !ignore_threshold && range.count() < self.threshold {
            return Err(CompactionStopReason::CompactionThresholdNotReached {
                next_compaction_at: first.plus(self.threshold),
            });
        }

        Ok(range)
    }

    fn limiting_bound(guard: &GuardedCompactionData) -> CompactionStopReason {
        if guard.release_index.plus(1) <= guard.lowest_index_to_keep {
            CompactionStopReason::NotReleasedByStateMachine {
                released_index: guard.release_index,
            }
        } else {
            CompactionStopReason::ParticipantMissingEntries {
                lowest_index_to_keep: guard.lowest_index_to_keep,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardedCompactionData> {
        self.guarded.lock().expect("CompactionManager mutex guard poison")
    }
}
