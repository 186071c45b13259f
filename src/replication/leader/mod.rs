mod driver;
mod guarded;
mod methods;
mod promises;
mod status;
#[cfg(test)]
mod tests;

pub use promises::QuorumData;
pub use promises::WaitForFuture;
pub use promises::WaitForResignFuture;
pub use promises::WaitForResult;
pub use status::FollowerReplicationState;
pub use status::FollowerStatistics;
pub use status::LeaderStatus;
pub use status::LogStatistics;
pub use status::ParticipantRole;
pub use status::QuickLogStatus;

use crate::compaction::{CompactionManager, CompactionStopReason};
use crate::config::ParticipantsConfig;
use crate::errors::{fatal_error_exit, LeaderError};
use crate::log::{
    InMemoryLog, LogEntry, LogIndex, LogMetaPayload, LogPayload, LogRange, LogRangeIterator, LogTerm, MessageId,
    ParticipantId, PersistedLogIterator,
};
use crate::metrics::ReplicatedLogMetrics;
use crate::options::LeaderOptionsValidated;
use crate::replication::follower::{Follower, FollowerFactory};
use crate::replication::follower_info::FollowerInfo;
use crate::replication::local_follower::LocalFollower;
use crate::scheduler::{DeferredAction, Scheduler};
use crate::state_handle::{LeaderMethods, ReplicatedStateHandle};
use crate::storage::{SnapshotStatus, StorageEngineMethods, StorageManager};
use guarded::GuardedLeaderData;
use promises::ResolvedPromiseSet;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;

pub struct LogLeaderConfig {
    pub logger: slog::Logger,
    pub metrics: Arc<ReplicatedLogMetrics>,
    pub options: LeaderOptionsValidated,
    pub id: ParticipantId,
    pub term: LogTerm,
    pub storage: Arc<dyn StorageEngineMethods>,
    pub participants_config: Arc<ParticipantsConfig>,
    pub state_handle: Arc<dyn ReplicatedStateHandle>,
    pub follower_factory: Arc<dyn FollowerFactory>,
    /// Without a scheduler backoffs are plain timers and promises are resolved inline.
    pub scheduler: Option<Arc<dyn Scheduler>>,
}

/// A follower's report that it now holds a snapshot of the state machine.
#[derive(Copy, Clone, Debug)]
pub struct SnapshotAvailableReport {
    pub message_id: MessageId,
}

#[derive(Debug)]
pub struct CompactionResult {
    pub num_entries_compacted: u64,
    pub range: LogRange,
    pub stop_reason: Option<CompactionStopReason>,
}

/// What the leader hands back on resign, to be passed on to whatever replaces it.
pub struct ResignedLeader {
    pub storage: Arc<dyn StorageEngineMethods>,
    pub state_handle: Arc<dyn ReplicatedStateHandle>,
    /// Rejects pending waiters with `LeaderResigned`. Fire it after the leader is replaced.
    pub action: DeferredAction,
}

// Immutable after construction.
pub(crate) struct LeaderContext {
    pub(crate) logger: slog::Logger,
    pub(crate) id: ParticipantId,
    pub(crate) current_term: LogTerm,
    pub(crate) first_index_of_current_term: LogIndex,
    pub(crate) options: LeaderOptionsValidated,
    pub(crate) metrics: Arc<ReplicatedLogMetrics>,
    pub(crate) storage: Arc<StorageManager>,
    pub(crate) compaction: Arc<CompactionManager>,
    pub(crate) follower_factory: Arc<dyn FollowerFactory>,
    pub(crate) scheduler: Option<Arc<dyn Scheduler>>,
    pub(crate) runtime: Handle,
    pub(crate) weak_self: Weak<LogLeader>,
}

/// LogLeader replicates the log of one term to all participants, computes the commit index and
/// resolves waiters when their entries commit.
///
/// All mutable state lives behind one lock. Callbacks into followers, the state handle and
/// promise receivers only ever happen after the lock has been released.
pub struct LogLeader {
    ctx: LeaderContext,
    guarded: Mutex<GuardedLeaderData>,
    // Serializes handing leader methods to the state handle with taking them back on resign.
    // Never acquired while holding `guarded`.
    establishment: Mutex<()>,
}

impl LogLeader {
    /// Builds the leader for `config.term` on top of the given storage and appends the first
    /// entry of the term. Must be called within a tokio runtime.
    pub fn construct(config: LogLeaderConfig) -> Result<Arc<LogLeader>, LeaderError> {
        let LogLeaderConfig {
            logger,
            metrics,
            options,
            id,
            term,
            storage,
            participants_config,
            state_handle,
            follower_factory,
            scheduler,
        } = config;
        let logger = logger.new(slog::o!("leader" => id.to_string(), "term" => term.as_u64()));

        let runtime = Handle::try_current()
            .map_err(|_| LeaderError::BadParameter("Leader must be constructed within a tokio runtime".into()))?;
        participants_config
            .validate()
            .map_err(|e| LeaderError::BadParameter(e.to_string()))?;
        if participants_config.flags(&id).is_none() {
            return Err(LeaderError::BadParameter(format!(
                "Leader {} is not a participant of generation {}",
                id, participants_config.generation
            )));
        }

        let storage = Arc::new(StorageManager::new(logger.clone(), storage));
        let mut metadata = storage.read_metadata()?;
        metadata.snapshot.status = SnapshotStatus::Completed;
        storage.update_metadata(metadata)?;

        let last = storage.last_term_index_pair().unwrap_or_default();
        if last.term >= term {
            fatal_error_exit(
                &logger,
                &format!("Found entry {:?} in storage, which is not older than term {:?}", last, term),
            );
        }

        let compaction = Arc::new(CompactionManager::new(
            logger.clone(),
            storage.clone(),
            metrics.clone(),
            options.threshold_log_compaction,
        ));

        let leader = Arc::new_cyclic(|weak_self: &Weak<LogLeader>| {
            let mut follower = BTreeMap::new();
            for participant in participants_config.participants.keys() {
                let info = if *participant == id {
                    let local = LocalFollower::new(&logger, id.clone(), term, storage.clone(), metrics.clone());
                    FollowerInfo::new(Arc::new(Follower::Local(local)), &logger, last.index, true)
                } else {
                    let remote = follower_factory.construct_follower(participant);
                    FollowerInfo::new(Arc::new(Follower::Remote(remote)), &logger, last.index, false)
                };
                follower.insert(participant.clone(), info);
            }

            let guarded = GuardedLeaderData::new(
                InMemoryLog::new(last),
                follower,
                participants_config.clone(),
                state_handle,
            );
            let ctx = LeaderContext {
                logger,
                id,
                current_term: term,
                first_index_of_current_term: last.index.plus(1),
                options,
                metrics,
                storage,
                compaction,
                follower_factory,
                scheduler,
                runtime,
                weak_self: weak_self.clone(),
            };

            LogLeader {
                ctx,
                guarded: Mutex::new(guarded),
                establishment: Mutex::new(()),
            }
        });
        leader.ctx.metrics.leader_number.add(1);

        let prepared = {
            let mut guard = leader.acquire_mutex();
            let index = guard.insert_internal(
                &leader.ctx,
                LogPayload::Meta(LogMetaPayload::FirstEntryOfTerm {
                    leader: leader.ctx.id.clone(),
                    participants: (*participants_config).clone(),
                }),
                true,
            );
            assert_eq!(index, leader.ctx.first_index_of_current_term);
            guard.prepare_append_entries(&leader.ctx)
        };
        slog::info!(
            leader.ctx.logger,
            "Leader constructed, first entry of term at {:?}",
            leader.ctx.first_index_of_current_term
        );
        leader.execute_append_entries_requests(prepared);

        Ok(leader)
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.ctx.id
    }

    pub fn current_term(&self) -> LogTerm {
        self.ctx.current_term
    }

    /// Appends a client entry and starts replicating it.
    pub fn insert(&self, payload: LogPayload, wait_for_sync: bool) -> Result<LogIndex, LeaderError> {
        let (index, prepared) = {
            let mut guard = self.acquire_mutex();
            if guard.did_resign {
                return Err(LeaderError::LeaderResigned);
            }
            let index = guard.insert_internal(&self.ctx, payload, wait_for_sync);
            (index, guard.prepare_append_entries(&self.ctx))
        };
        self.execute_append_entries_requests(prepared);
        Ok(index)
    }

    /// Appends a client entry. Replication starts when the returned action fires, so several
    /// inserts can go out in one request.
    pub fn insert_deferred(
        &self,
        payload: LogPayload,
        wait_for_sync: bool,
    ) -> Result<(LogIndex, DeferredAction), LeaderError> {
        let index = {
            let mut guard = self.acquire_mutex();
            if guard.did_resign {
                return Err(LeaderError::LeaderResigned);
            }
            guard.insert_internal(&self.ctx, payload, wait_for_sync)
        };

        let leader = self.ctx.weak_self.clone();
        let action = DeferredAction::new(move || {
            if let Some(leader) = leader.upgrade() {
                // Resigned in the meantime; nothing left to replicate.
                let _ = leader.trigger_async_replication();
            }
        });
        Ok((index, action))
    }

    /// Appends a meta entry that forces a round of replication, e.g. to measure round trips.
    pub fn ping(&self, message: Option<String>) -> Result<LogIndex, LeaderError> {
        self.insert(LogPayload::Meta(LogMetaPayload::ping(message)), false)
    }

    pub fn trigger_async_replication(&self) -> Result<(), LeaderError> {
        let prepared = {
            let mut guard = self.acquire_mutex();
            if guard.did_resign {
                return Err(LeaderError::LeaderResigned);
            }
            guard.prepare_append_entries(&self.ctx)
        };
        self.execute_append_entries_requests(prepared);
        Ok(())
    }

    pub fn wait_for(&self, index: LogIndex) -> WaitForFuture {
        self.acquire_mutex().wait_for(index)
    }

    /// Waits until `index` is committed and returns the committed client entries from there on.
    /// Meta entries at the start of the range are skipped by waiting for the next index.
    pub async fn wait_for_iterator(&self, index: LogIndex) -> Result<LogRangeIterator, LeaderError> {
        if index == LogIndex::default() {
            return Err(LeaderError::BadParameter("Index 0 is never committed".into()));
        }

        let mut index = index;
        loop {
            self.wait_for(index).await?;

            index = {
                let guard = self.acquire_mutex();
                if guard.did_resign {
                    return Err(LeaderError::LeaderResigned);
                }
                let commit_index = guard.commit_index;
                let mut first = index;
                while first <= commit_index {
                    match guard.in_memory_log.get(first) {
                        Some(entry) if entry.entry.payload.is_meta() => first = first.plus(1),
                        _ => break,
                    }
                }

                if first <= commit_index {
                    let range = LogRange::new(first, commit_index.plus(1));
                    return guard.get_log_consumer_iterator(&self.ctx, Some(range));
                }
                first
            };
        }
    }

    /// Resolves once the first entry of the term is committed.
    pub async fn wait_for_leadership(&self) -> Result<(), LeaderError> {
        self.wait_for(self.ctx.first_index_of_current_term).await.map(|_| ())
    }

    pub fn wait_for_resign(&self) -> WaitForResignFuture {
        WaitForResignFuture::new(self.acquire_mutex().wait_for_resign())
    }

    /// The state machine no longer needs entries up to `index`.
    pub fn release(&self, index: LogIndex) -> Result<(), LeaderError> {
        {
            let guard = self.acquire_mutex();
            if guard.did_resign {
                return Err(LeaderError::LeaderResigned);
            }
            if index > guard.commit_index {
                return Err(LeaderError::BadParameter(format!(
                    "Cannot release {:?}, commit index is {:?}",
                    index, guard.commit_index
                )));
            }
        }
        slog::trace!(self.ctx.logger, "Released up to {:?}", index);
        self.ctx.compaction.update_release_index(index);
        Ok(())
    }

    /// Compacts as much as possible right away, regardless of the compaction threshold.
    pub async fn compact(&self) -> Result<CompactionResult, LeaderError> {
        let result = self.ctx.compaction.compact().await;
        if let Some(e) = result.error {
            return Err(e.into());
        }
        Ok(CompactionResult {
            num_entries_compacted: result.compacted_range.count(),
            range: result.compacted_range,
            stop_reason: result.stop_reason,
        })
    }

    /// Makes `config` the active participants config and writes it to the log. Returns the index
    /// of the entry carrying it.
    pub fn update_participants_config(&self, config: Arc<ParticipantsConfig>) -> Result<LogIndex, LeaderError> {
        let (index, prepared) = {
            let mut guard = self.acquire_mutex();
            let index = guard.update_participants_config(&self.ctx, config)?;
            (index, guard.prepare_append_entries(&self.ctx))
        };
        self.execute_append_entries_requests(prepared);
        Ok(index)
    }

    pub fn set_snapshot_available(
        &self,
        participant: &ParticipantId,
        report: SnapshotAvailableReport,
    ) -> Result<(), LeaderError> {
        let resolved = {
            let mut guard = self.acquire_mutex();
            if guard.did_resign {
                return Err(LeaderError::LeaderResigned);
            }
            let info = guard
                .follower
                .get_mut(participant)
                .ok_or_else(|| LeaderError::NotFollower(participant.clone()))?;
            if info.snapshot_available_message_id > report.message_id {
                slog::debug!(
                    info.logger,
                    "Ignoring outdated snapshot report {:?}, already have {:?}",
                    report.message_id,
                    info.snapshot_available_message_id
                );
                return Ok(());
            }
            slog::info!(info.logger, "Snapshot available, reported with {:?}", report.message_id);
            info.snapshot_available = true;
            info.snapshot_available_message_id = report.message_id;
            guard.check_commit_index(&self.ctx)
        };
        self.handle_resolved_promise_set(resolved);
        self.trigger_async_replication()
    }

    pub fn get_status(&self) -> Result<LeaderStatus, LeaderError> {
        let guard = self.acquire_mutex();
        if guard.did_resign {
            return Err(LeaderError::LeaderResigned);
        }
        Ok(guard.get_status(&self.ctx))
    }

    pub fn get_quick_status(&self) -> Result<QuickLogStatus, LeaderError> {
        let (mut status, state_handle) = {
            let guard = self.acquire_mutex();
            if guard.did_resign {
                return Err(LeaderError::LeaderResigned);
            }
            (guard.get_quick_status(&self.ctx), guard.state_handle.clone())
        };
        if let Some(state_handle) = state_handle {
            status.local_state = state_handle.internal_status();
        }
        Ok(status)
    }

    /// Stops the leader. Pending and future calls fail with `LeaderResigned`; pending waiters are
    /// rejected once the returned action fires.
    pub fn resign(&self) -> Result<ResignedLeader, LeaderError> {
        let _establishing = self.acquire_establishment_mutex();
        let (state_handle, methods_delivered, action) = self.acquire_mutex().resign()?;
        self.ctx.metrics.leader_number.add(-1);

        if methods_delivered && state_handle.resign_current_state().is_none() {
            fatal_error_exit(
                &self.ctx.logger,
                "State handle was handed leader methods, but had none to give back on resign",
            );
        }
        let storage = self.ctx.storage.resign()?;
        slog::info!(self.ctx.logger, "Leader resigned");

        Ok(ResignedLeader {
            storage,
            state_handle,
            action,
        })
    }

    pub fn get_commit_index(&self) -> LogIndex {
        self.acquire_mutex().commit_index
    }

    /// (active generation, committed generation)
    pub fn get_participant_config_generations(&self) -> (u64, Option<u64>) {
        let guard = self.acquire_mutex();
        (
            guard.active_participants_config.generation,
            guard.committed_participants_config.as_ref().map(|c| c.generation),
        )
    }

    pub fn copy_in_memory_log(&self) -> InMemoryLog {
        self.acquire_mutex().in_memory_log.clone()
    }

    /// All entries in `range`, meta entries and uncommitted entries included.
    pub fn get_internal_log_iterator(&self, range: Option<LogRange>) -> Result<PersistedLogIterator, LeaderError> {
        let guard = self.acquire_mutex();
        let available = LogRange::new(guard.committed_range(&self.ctx).from, guard.in_memory_log.next_index());
        let range = range.map(|r| r.intersect(available)).unwrap_or(available);
        let entries = guard.collect_entries(&self.ctx, range)?;
        Ok(Box::new(entries.into_iter()))
    }

    pub fn get_committed_log_iterator(&self, range: Option<LogRange>) -> Result<LogRangeIterator, LeaderError> {
        let guard = self.acquire_mutex();
        if guard.did_resign {
            return Err(LeaderError::LeaderResigned);
        }
        guard.get_log_consumer_iterator(&self.ctx, range)
    }

    /// Committed entries still held in memory, meta entries included.
    pub fn get_replicated_log_snapshot(&self) -> Vec<LogEntry> {
        let guard = self.acquire_mutex();
        guard
            .in_memory_log
            .slice(guard.in_memory_log.first_index(), guard.commit_index.plus(1))
            .map(|e| e.entry.clone())
            .collect()
    }

    fn handle_resolved_promise_set(&self, resolved: ResolvedPromiseSet) {
        if resolved.is_empty() {
            return;
        }
        let ResolvedPromiseSet {
            promises,
            result,
            commit_notification,
            establishment,
        } = resolved;

        if let Some((state_handle, methods)) = establishment {
            self.deliver_establishment(state_handle, methods);
        }
        if let Some((state_handle, index)) = commit_notification {
            // After resign the handle belongs to whoever took it back.
            let resigned = self.acquire_mutex().did_resign;
            if !resigned {
                state_handle.update_commit_index(index);
            }
        }

        let result = match result {
            Some(result) if !promises.is_empty() => result,
            _ => return,
        };
        let resolve = move || {
            for promise in promises {
                // Receiver gone means the waiter lost interest.
                let _ = promise.send(Ok(result.clone()));
            }
        };
        match &self.ctx.scheduler {
            Some(scheduler) => scheduler.queue(Box::new(resolve)),
            None => resolve(),
        }
    }

    fn deliver_establishment(&self, state_handle: Arc<dyn ReplicatedStateHandle>, methods: Box<dyn LeaderMethods>) {
        // Held across the callback, so resign cannot take the state back half way.
        let _establishing = self.acquire_establishment_mutex();
        {
            let mut guard = self.acquire_mutex();
            if guard.did_resign {
                slog::debug!(self.ctx.logger, "Resigned before leadership reached the state machine");
                return;
            }
            guard.establishment_delivered = true;
        }
        state_handle.leadership_established(methods);
    }

    fn acquire_establishment_mutex(&self) -> MutexGuard<'_, ()> {
        self.establishment
            .lock()
            .expect("LogLeader::acquire_establishment_mutex() mutex guard poison")
    }

    fn acquire_mutex(&self) -> MutexGuard<'_, GuardedLeaderData> {
        self.guarded.lock().expect("LogLeader::acquire_mutex() mutex guard poison")
    }
}

impl Drop for LogLeader {
    fn drop(&mut self) {
        let guarded = match self.guarded.get_mut() {
            Ok(guarded) => guarded,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guarded.did_resign {
            return;
        }

        slog::info!(self.ctx.logger, "Leader dropped without resigning");
        self.ctx.metrics.leader_number.add(-1);
        if let Ok((_, _, action)) = guarded.resign() {
            action.fire();
        }
    }
}
