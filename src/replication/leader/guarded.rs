use crate::config::{ParticipantFlags, ParticipantsConfig};
use crate::errors::{FollowerError, LeaderError};
use crate::log::{
    InMemoryLog, InMemoryLogEntry, LogEntry, LogIndex, LogMetaPayload, LogPayload, LogRange, LogRangeIterator,
    LogTerm, ParticipantId, ReplicatedLogEntry, TermIndexPair,
};
use crate::replication::commit::{calculate_commit_index, CommitFailReason, ParticipantState};
use crate::replication::follower::Follower;
use crate::replication::follower_info::{FollowerInfo, SentRequest};
use crate::replication::leader::driver::PreparedAppendEntryRequest;
use crate::replication::leader::methods::LeaderMethodsImpl;
use crate::replication::leader::promises::{
    QuorumData, ResolvedPromiseSet, WaitForFuture, WaitForPromise, WaitForResult,
};
use crate::replication::leader::LeaderContext;
use crate::replication::{AppendEntriesRequest, AppendEntriesResult};
use crate::scheduler::{delayed_future, DeferredAction};
use crate::state_handle::ReplicatedStateHandle;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Outcome of building the next request for a follower.
pub(crate) enum NextAppendEntries {
    Send(AppendEntriesRequest, SentRequest),
    /// Nothing can be sent because the follower's next entries are gone. Holds the retries that
    /// were prepared instead.
    MissingEntries(Vec<PreparedAppendEntryRequest>),
}

/// All mutable leader state. Only ever touched with the leader lock held.
pub(crate) struct GuardedLeaderData {
    pub(crate) in_memory_log: InMemoryLog,
    pub(crate) commit_index: LogIndex,
    pub(crate) last_quorum: Arc<QuorumData>,
    pub(crate) follower: BTreeMap<ParticipantId, FollowerInfo>,
    pub(crate) active_participants_config: Arc<ParticipantsConfig>,
    pub(crate) committed_participants_config: Option<Arc<ParticipantsConfig>>,
    pub(crate) wait_for_queue: BTreeMap<LogIndex, Vec<WaitForPromise>>,
    pub(crate) wait_for_resign_queue: Vec<oneshot::Sender<()>>,
    // Taken on resign.
    pub(crate) state_handle: Option<Arc<dyn ReplicatedStateHandle>>,
    pub(crate) did_resign: bool,
    pub(crate) leadership_established: bool,
    // The state handle received its leader methods. Lags `leadership_established` until the
    // establishment is delivered outside the lock.
    pub(crate) establishment_delivered: bool,
    pub(crate) last_commit_fail_reason: CommitFailReason,
    pub(crate) largest_common_index: LogIndex,
}

impl GuardedLeaderData {
    pub(crate) fn new(
        in_memory_log: InMemoryLog,
        follower: BTreeMap<ParticipantId, FollowerInfo>,
        active_participants_config: Arc<ParticipantsConfig>,
        state_handle: Arc<dyn ReplicatedStateHandle>,
    ) -> Self {
        GuardedLeaderData {
            in_memory_log,
            commit_index: LogIndex::default(),
            last_quorum: Arc::new(QuorumData::default()),
            follower,
            active_participants_config,
            committed_participants_config: None,
            wait_for_queue: BTreeMap::new(),
            wait_for_resign_queue: Vec::new(),
            state_handle: Some(state_handle),
            did_resign: false,
            leadership_established: false,
            establishment_delivered: false,
            last_commit_fail_reason: CommitFailReason::default(),
            largest_common_index: LogIndex::default(),
        }
    }

    pub(crate) fn insert_internal(&mut self, ctx: &LeaderContext, payload: LogPayload, wait_for_sync: bool) -> LogIndex {
        let index = self.in_memory_log.next_index();
        let entry = InMemoryLogEntry::new(LogEntry::new(ctx.current_term, index, payload), wait_for_sync);
        let size = entry.entry.approx_byte_size();

        if entry.entry.payload.is_meta() {
            ctx.metrics.num_meta_entries.incr();
        } else {
            ctx.metrics.inserts_bytes.observe(size as u64);
        }
        ctx.metrics.leader_num_in_memory_entries.add(1);
        ctx.metrics.leader_num_in_memory_bytes.add(size as i64);

        self.in_memory_log.append(entry);
        index
    }

    /// Moves every follower that has something new to learn into PREPARE (or ERROR_BACKOFF) and
    /// returns the requests to dispatch once the lock is released.
    pub(crate) fn prepare_append_entries(&mut self, ctx: &LeaderContext) -> Vec<PreparedAppendEntryRequest> {
        let last_index = self.in_memory_log.last_index();
        let commit_index = self.commit_index;
        let (_, lowest_index_to_keep) = ctx.compaction.get_indexes();

        let mut prepared = Vec::new();
        for (participant, info) in self.follower.iter_mut() {
            let delay = match info.prepare(last_index, commit_index, lowest_index_to_keep) {
                Some(delay) => delay,
                None => continue,
            };

            let scheduler = if delay.is_zero() { None } else { ctx.scheduler.as_ref() };
            let (handle, delay) = delayed_future(scheduler, "append-entries-backoff", delay);
            // Replacing the handle cancels a retry that may still be pending.
            info.last_request_handle = handle;

            prepared.push(PreparedAppendEntryRequest {
                parent_log: ctx.weak_self.clone(),
                follower: Arc::downgrade(&info.follower),
                participant: participant.clone(),
                delay,
            });
        }

        prepared
    }

    /// Builds the next request for `participant`. Returns `None` if the follower was replaced or
    /// removed since the request was prepared.
    pub(crate) fn create_append_entries_request(
        &mut self,
        ctx: &LeaderContext,
        participant: &ParticipantId,
        follower: &Arc<Follower>,
    ) -> Option<NextAppendEntries> {
        let info = self
            .follower
            .get_mut(participant)
            .filter(|info| Arc::ptr_eq(&info.follower, follower))?;

        let commit_index = self.commit_index;
        let (_, lowest_index_to_keep) = ctx.compaction.get_indexes();

        let prev_index = info.next_prev_log_index;
        let prev_log_entry = self
            .in_memory_log
            .term_of(prev_index)
            .or_else(|| ctx.storage.term_of_index(prev_index))
            .map(|term| TermIndexPair::new(term, prev_index))
            .unwrap_or_default();

        let threshold = ctx.options.threshold_network_batch_size;
        let mut wait_for_sync = self.active_participants_config.config.wait_for_sync;
        let mut entries: Vec<ReplicatedLogEntry> = Vec::new();
        let mut size = 0;

        let first_to_send = prev_index.plus(1);
        let first_in_memory = self.in_memory_log.first_index();
        if first_to_send < first_in_memory {
            match ctx.storage.persisted_iterator(first_to_send) {
                Ok(iter) => {
                    let mut expected = first_to_send;
                    for entry in iter.take_while(|e| e.index < first_in_memory) {
                        if entry.index != expected {
                            // Send up to the gap. The next request runs into it.
                            break;
                        }
                        expected = expected.plus(1);
                        size += entry.approx_byte_size();
                        entries.push(ReplicatedLogEntry {
                            term: entry.term,
                            index: entry.index,
                            payload: entry.payload,
                            wait_for_sync: false,
                        });
                        if size >= threshold {
                            break;
                        }
                    }
                }
                Err(e) => slog::warn!(info.logger, "Failed to read persisted log from {:?}: {}", first_to_send, e),
            }

            if entries.is_empty() {
                info.missing_log_entries(first_to_send, &ctx.metrics);
                return Some(NextAppendEntries::MissingEntries(self.prepare_append_entries(ctx)));
            }
        }

        let next = entries.last().map(|e| e.index.plus(1)).unwrap_or(first_to_send);
        if size < threshold && next >= first_in_memory {
            for entry in self.in_memory_log.iter_from(next) {
                wait_for_sync |= entry.wait_for_sync;
                size += entry.entry.approx_byte_size();
                entries.push(ReplicatedLogEntry::from(entry));
                if size >= threshold {
                    break;
                }
            }
        }

        let last_index = entries
            .last()
            .map(|e| TermIndexPair::new(e.term, e.index))
            .unwrap_or(prev_log_entry);

        ctx.metrics.append_entries_num_entries.observe(entries.len() as u64);
        ctx.metrics.append_entries_size.observe(size as u64);

        let message_id = info.start_request();
        slog::trace!(
            info.logger,
            "Sending {} entries after {:?}, message {:?}",
            entries.len(),
            prev_log_entry,
            message_id
        );

        let request = AppendEntriesRequest {
            leader_term: ctx.current_term,
            leader_id: ctx.id.clone(),
            prev_log_entry,
            leader_commit: commit_index,
            lowest_index_to_keep,
            wait_for_sync,
            message_id,
            entries,
        };
        let sent = SentRequest {
            message_id,
            last_index,
            commit_index,
            lowest_index_to_keep,
        };
        Some(NextAppendEntries::Send(request, sent))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn handle_append_entries_response(
        &mut self,
        ctx: &LeaderContext,
        participant: &ParticipantId,
        follower: &Arc<Follower>,
        sent: SentRequest,
        current_term: LogTerm,
        result: Result<AppendEntriesResult, FollowerError>,
        latency: Duration,
    ) -> (Vec<PreparedAppendEntryRequest>, ResolvedPromiseSet) {
        if current_term != ctx.current_term {
            slog::warn!(
                ctx.logger,
                "Dropping answer of {} to a request from term {:?}",
                participant,
                current_term
            );
            return (Vec::new(), ResolvedPromiseSet::default());
        }

        let info = match self
            .follower
            .get_mut(participant)
            .filter(|info| Arc::ptr_eq(&info.follower, follower))
        {
            Some(info) => info,
            None => {
                slog::debug!(ctx.logger, "Dropping answer of {}, no longer a follower", participant);
                return (Vec::new(), ResolvedPromiseSet::default());
            }
        };

        ctx.metrics.append_entries_rtt_us.observe(latency.as_micros() as u64);
        info.handle_append_entries_result(sent, result, latency, &ctx.metrics);

        let resolved = self.check_commit_index(ctx);
        let prepared = self.prepare_append_entries(ctx);
        (prepared, resolved)
    }

    fn participant_states(&self) -> Vec<ParticipantState> {
        self.follower
            .iter()
            .map(|(id, info)| ParticipantState {
                id: id.clone(),
                last_acked_entry: info.last_acked_entry,
                snapshot_available: info.snapshot_available,
                flags: self
                    .active_participants_config
                    .flags(id)
                    .copied()
                    .unwrap_or(ParticipantFlags {
                        allowed_in_quorum: false,
                        allowed_as_leader: false,
                        forced: false,
                    }),
            })
            .collect()
    }

    /// Recomputes the commit index and the lowest index any participant may still need.
    pub(crate) fn check_commit_index(&mut self, ctx: &LeaderContext) -> ResolvedPromiseSet {
        let participants = self.participant_states();

        let largest_common_index = participants
            .iter()
            .map(|p| p.last_acked_entry.index)
            .fold(self.commit_index, LogIndex::min);
        if largest_common_index > self.largest_common_index {
            slog::trace!(ctx.logger, "Largest common index is now {:?}", largest_common_index);
            self.largest_common_index = largest_common_index;
            ctx.compaction.update_lowest_index_to_keep(largest_common_index);
        }

        let calculation = calculate_commit_index(
            &participants,
            self.active_participants_config.config.effective_write_concern,
            self.commit_index,
            self.in_memory_log.last_term_index_pair(),
        );
        self.last_commit_fail_reason = calculation.reason;

        if calculation.commit_index > self.commit_index {
            let quorum = Arc::new(QuorumData {
                index: calculation.commit_index,
                term: ctx.current_term,
                quorum: calculation.quorum,
            });
            return self.update_commit_index_leader(ctx, calculation.commit_index, quorum);
        }

        ResolvedPromiseSet::default()
    }

    fn update_commit_index_leader(
        &mut self,
        ctx: &LeaderContext,
        new_index: LogIndex,
        quorum: Arc<QuorumData>,
    ) -> ResolvedPromiseSet {
        assert!(
            new_index > self.commit_index,
            "Commit index would go backwards from {:?} to {:?}",
            self.commit_index,
            new_index
        );
        let old_index = self.commit_index;
        slog::trace!(ctx.logger, "Commit index {:?} -> {:?}, quorum {:?}", old_index, new_index, quorum.quorum);

        self.commit_index = new_index;
        self.last_quorum = quorum.clone();
        ctx.metrics.num_committed_entries.add(old_index.distance_to(new_index));

        let now = Instant::now();
        for entry in self.in_memory_log.slice(old_index.plus(1), new_index.plus(1)) {
            ctx.metrics
                .inserts_rtt_us
                .observe(now.duration_since(entry.insert_time).as_micros() as u64);

            if let LogPayload::Meta(
                LogMetaPayload::FirstEntryOfTerm { participants, .. }
                | LogMetaPayload::UpdateParticipantsConfig { participants },
            ) = &entry.entry.payload
            {
                if participants.generation == self.active_participants_config.generation {
                    slog::debug!(ctx.logger, "Participants config generation {} committed", participants.generation);
                    self.committed_participants_config = Some(self.active_participants_config.clone());
                }
            }
        }

        self.evict_committed_entries(ctx);

        let mut resolved = ResolvedPromiseSet::default();
        if !self.leadership_established {
            slog::info!(ctx.logger, "Leadership established at {:?}", new_index);
            self.leadership_established = true;
            if let Some(handle) = &self.state_handle {
                resolved.establishment = Some((
                    handle.clone(),
                    Box::new(LeaderMethodsImpl::new(ctx.weak_self.clone())),
                ));
            }
        }
        if let Some(handle) = &self.state_handle {
            resolved.commit_notification = Some((handle.clone(), new_index));
        }

        let pending = self.wait_for_queue.split_off(&new_index.plus(1));
        let ready = mem::replace(&mut self.wait_for_queue, pending);
        resolved.promises = ready.into_values().flatten().collect();
        resolved.result = Some(WaitForResult {
            commit_index: new_index,
            quorum,
        });

        resolved
    }

    // Committed entries that are also on disk no longer need to be held in memory.
    fn evict_committed_entries(&mut self, ctx: &LeaderContext) {
        let persisted = ctx
            .storage
            .last_term_index_pair()
            .map(|p| p.index)
            .unwrap_or_default();
        let stop = self.commit_index.min(persisted);

        let bytes: usize = self
            .in_memory_log
            .slice(self.in_memory_log.first_index(), stop)
            .map(|e| e.entry.approx_byte_size())
            .sum();
        let removed = self.in_memory_log.remove_front(stop);
        if removed > 0 {
            slog::trace!(ctx.logger, "Evicted {} entries before {:?} from memory", removed, stop);
            ctx.metrics.leader_num_in_memory_entries.add(-(removed as i64));
            ctx.metrics.leader_num_in_memory_bytes.add(-(bytes as i64));
        }
    }

    pub(crate) fn wait_for(&mut self, index: LogIndex) -> WaitForFuture {
        if self.did_resign {
            return WaitForFuture::ready(Err(LeaderError::LeaderResigned));
        }
        if self.commit_index >= index {
            return WaitForFuture::ready(Ok(WaitForResult {
                commit_index: self.commit_index,
                quorum: self.last_quorum.clone(),
            }));
        }

        let (tx, rx) = oneshot::channel();
        self.wait_for_queue.entry(index).or_default().push(tx);
        WaitForFuture::pending(rx)
    }

    pub(crate) fn wait_for_resign(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if self.did_resign {
            let _ = tx.send(());
        } else {
            self.wait_for_resign_queue.push(tx);
        }
        rx
    }

    pub(crate) fn update_participants_config(
        &mut self,
        ctx: &LeaderContext,
        config: Arc<ParticipantsConfig>,
    ) -> Result<LogIndex, LeaderError> {
        if self.did_resign {
            return Err(LeaderError::LeaderResigned);
        }
        if config.generation <= self.active_participants_config.generation {
            return Err(LeaderError::BadParameter(format!(
                "Generation {} is not newer than the active generation {}",
                config.generation, self.active_participants_config.generation
            )));
        }
        config.validate().map_err(|e| LeaderError::BadParameter(e.to_string()))?;
        if config.flags(&ctx.id).is_none() {
            return Err(LeaderError::BadParameter(format!(
                "Leader {} is not a participant of generation {}",
                ctx.id, config.generation
            )));
        }

        // New followers start optimistically right behind the current end of the log.
        let next_prev = self.in_memory_log.last_index().saturating_decrement();
        let additions: Vec<FollowerInfo> = config
            .participants
            .keys()
            .filter(|id| !self.follower.contains_key(*id))
            .map(|id| {
                let follower = Arc::new(Follower::Remote(ctx.follower_factory.construct_follower(id)));
                FollowerInfo::new(follower, &ctx.logger, next_prev, false)
            })
            .collect();

        let mut follower = mem::take(&mut self.follower);
        follower.retain(|id, _| config.participants.contains_key(id));
        for info in additions {
            slog::info!(ctx.logger, "Adding follower {}", info.participant_id());
            follower.insert(info.participant_id().clone(), info);
        }
        self.follower = follower;
        self.active_participants_config = config.clone();

        let index = self.insert_internal(
            ctx,
            LogPayload::Meta(LogMetaPayload::UpdateParticipantsConfig {
                participants: (*config).clone(),
            }),
            true,
        );
        slog::info!(ctx.logger, "Participants config generation {} written at {:?}", config.generation, index);
        Ok(index)
    }

    /// Returns the state handle, whether it was handed leader methods, and the action rejecting
    /// all waiters.
    pub(crate) fn resign(&mut self) -> Result<(Arc<dyn ReplicatedStateHandle>, bool, DeferredAction), LeaderError> {
        if self.did_resign {
            return Err(LeaderError::LeaderResigned);
        }
        let state_handle = self.state_handle.take().ok_or(LeaderError::LeaderResigned)?;
        self.did_resign = true;

        // Dropping the follower infos cancels pending retries.
        self.follower.clear();

        let wait_for_queue = mem::take(&mut self.wait_for_queue);
        let wait_for_resign_queue = mem::take(&mut self.wait_for_resign_queue);
        let action = DeferredAction::new(move || {
            for promise in wait_for_queue.into_values().flatten() {
                let _ = promise.send(Err(LeaderError::LeaderResigned));
            }
            for promise in wait_for_resign_queue {
                let _ = promise.send(());
            }
        });

        Ok((state_handle, self.establishment_delivered, action))
    }

    /// Entries in `range`, meta entries included, read from storage where no longer in memory.
    pub(crate) fn collect_entries(&self, ctx: &LeaderContext, range: LogRange) -> Result<Vec<LogEntry>, LeaderError> {
        let mut entries = Vec::new();
        let first_in_memory = self.in_memory_log.first_index();
        if range.from < first_in_memory {
            let stop = range.to.min(first_in_memory);
            entries.extend(
                ctx.storage
                    .persisted_iterator(range.from)?
                    .take_while(|e| e.index < stop),
            );
        }
        entries.extend(
            self.in_memory_log
                .slice(range.from.max(first_in_memory), range.to)
                .map(|e| e.entry.clone()),
        );
        Ok(entries)
    }

    /// Committed range still available on the leader.
    pub(crate) fn committed_range(&self, ctx: &LeaderContext) -> LogRange {
        let first = ctx
            .storage
            .first_term_index_pair()
            .map(|p| p.index)
            .unwrap_or_else(|| self.in_memory_log.first_index())
            .min(self.in_memory_log.first_index());
        LogRange::new(first, self.commit_index.plus(1))
    }

    pub(crate) fn get_log_consumer_iterator(
        &self,
        ctx: &LeaderContext,
        range: Option<LogRange>,
    ) -> Result<LogRangeIterator, LeaderError> {
        let committed = self.committed_range(ctx);
        let range = range.map(|r| r.intersect(committed)).unwrap_or(committed);
        if range.to <= self.in_memory_log.first_index() {
            return Ok(ctx.storage.committed_iterator(range)?);
        }
        let entries = self.collect_entries(ctx, range)?;
        Ok(LogRangeIterator::new(range, entries))
    }

    /// Time the oldest uncommitted entry has been waiting.
    pub(crate) fn calculate_commit_lag(&self) -> Duration {
        match self.in_memory_log.get(self.commit_index.plus(1)) {
            Some(entry) => entry.insert_time.elapsed(),
            None => Duration::ZERO,
        }
    }
}
