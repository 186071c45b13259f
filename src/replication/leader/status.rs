use crate::compaction::CompactionStatus;
use crate::config::ParticipantsConfig;
use crate::log::{LogIndex, LogTerm, MessageId, ParticipantId, TermIndexPair};
use crate::replication::commit::CommitFailReason;
use crate::replication::follower_info::{FollowerInfo, FollowerState};
use crate::replication::leader::guarded::GuardedLeaderData;
use crate::replication::leader::promises::QuorumData;
use crate::replication::leader::LeaderContext;
use crate::replication::AppendEntriesErrorReason;
use crate::state_handle::LocalStateMachineStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipantRole {
    Leader,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogStatistics {
    pub spearhead: TermIndexPair,
    pub commit_index: LogIndex,
    pub first_index: LogIndex,
    pub release_index: LogIndex,
}

/// Where the replication to one follower stands.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum FollowerReplicationState {
    UpToDate,
    #[serde(rename_all = "kebab-case")]
    RequestInFlight { duration_ms: f64 },
    #[serde(rename_all = "kebab-case")]
    ErrorBackoff { duration_ms: f64, retry_count: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FollowerStatistics {
    pub spearhead: TermIndexPair,
    pub commit_index: LogIndex,
    pub next_prev_log_index: LogIndex,
    pub last_error_reason: AppendEntriesErrorReason,
    pub last_request_latency_ms: f64,
    pub internal_state: FollowerReplicationState,
    pub errors_since_last_answer: u32,
    pub snapshot_available: bool,
    pub last_message_id: MessageId,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LeaderStatus {
    pub role: ParticipantRole,
    pub term: LogTerm,
    pub leadership_established: bool,
    pub local: LogStatistics,
    pub lowest_index_to_keep: LogIndex,
    pub first_in_memory_index: LogIndex,
    pub commit_lag_ms: f64,
    pub last_commit_fail_reason: CommitFailReason,
    pub last_quorum: QuorumData,
    pub compaction_status: CompactionStatus,
    pub follower: BTreeMap<ParticipantId, FollowerStatistics>,
    pub active_participants_config: ParticipantsConfig,
    pub committed_participants_config: Option<ParticipantsConfig>,
}

impl LeaderStatus {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Cheap status summary, meant to be polled often.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuickLogStatus {
    pub role: ParticipantRole,
    pub local_state: LocalStateMachineStatus,
    pub term: LogTerm,
    pub local: LogStatistics,
    pub leadership_established: bool,
    // Only set while the commit index is lagging behind.
    pub commit_fail_reason: Option<CommitFailReason>,
    pub active_participants_config: ParticipantsConfig,
    pub committed_participants_config: Option<ParticipantsConfig>,
    pub followers_with_snapshot: Vec<ParticipantId>,
}

impl QuickLogStatus {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn follower_statistics(info: &FollowerInfo, now: Instant) -> FollowerStatistics {
    let internal_state = match info.state {
        FollowerState::Idle => FollowerReplicationState::UpToDate,
        FollowerState::Prepare => FollowerReplicationState::RequestInFlight { duration_ms: 0.0 },
        FollowerState::RequestInFlight => FollowerReplicationState::RequestInFlight {
            duration_ms: as_millis_f64(now.saturating_duration_since(info.last_request_start)),
        },
        FollowerState::ErrorBackoff => FollowerReplicationState::ErrorBackoff {
            duration_ms: info
                .error_backoff_end
                .map(|end| as_millis_f64(end.saturating_duration_since(now)))
                .unwrap_or_default(),
            retry_count: info.errors_since_last_answer,
        },
    };

    FollowerStatistics {
        spearhead: info.last_acked_entry,
        commit_index: info.last_acked_commit_index,
        next_prev_log_index: info.next_prev_log_index,
        last_error_reason: info.last_error_reason.clone(),
        last_request_latency_ms: as_millis_f64(info.last_request_latency),
        internal_state,
        errors_since_last_answer: info.errors_since_last_answer,
        snapshot_available: info.snapshot_available,
        last_message_id: info.last_sent_message_id,
    }
}

impl GuardedLeaderData {
    pub(crate) fn get_local_statistics(&self, ctx: &LeaderContext) -> LogStatistics {
        let (release_index, _) = ctx.compaction.get_indexes();
        LogStatistics {
            spearhead: self.in_memory_log.last_term_index_pair(),
            commit_index: self.commit_index,
            first_index: self.committed_range(ctx).from,
            release_index,
        }
    }

    pub(crate) fn get_status(&self, ctx: &LeaderContext) -> LeaderStatus {
        let now = Instant::now();
        let (_, lowest_index_to_keep) = ctx.compaction.get_indexes();

        LeaderStatus {
            role: ParticipantRole::Leader,
            term: ctx.current_term,
            leadership_established: self.leadership_established,
            local: self.get_local_statistics(ctx),
            lowest_index_to_keep,
            first_in_memory_index: self.in_memory_log.first_index(),
            commit_lag_ms: as_millis_f64(self.calculate_commit_lag()),
            last_commit_fail_reason: self.last_commit_fail_reason.clone(),
            last_quorum: (*self.last_quorum).clone(),
            compaction_status: ctx.compaction.get_compaction_status(),
            follower: self
                .follower
                .iter()
                .map(|(id, info)| (id.clone(), follower_statistics(info, now)))
                .collect(),
            active_participants_config: (*self.active_participants_config).clone(),
            committed_participants_config: self.committed_participants_config.as_deref().cloned(),
        }
    }

    /// The local state machine status is filled in by the caller, outside the lock.
    pub(crate) fn get_quick_status(&self, ctx: &LeaderContext) -> QuickLogStatus {
        let commit_fail_reason = if self.calculate_commit_lag() > ctx.options.commit_lag_alert_threshold {
            Some(self.last_commit_fail_reason.clone())
        } else {
            None
        };

        QuickLogStatus {
            role: ParticipantRole::Leader,
            local_state: LocalStateMachineStatus::Unconfigured,
            term: ctx.current_term,
            local: self.get_local_statistics(ctx),
            leadership_established: self.leadership_established,
            commit_fail_reason,
            active_participants_config: (*self.active_participants_config).clone(),
            committed_participants_config: self.committed_participants_config.as_deref().cloned(),
            followers_with_snapshot: self
                .follower
                .iter()
                .filter(|(_, info)| info.snapshot_available)
                .map(|(id, _)| id.clone())
                .collect(),
        }
    }
}
