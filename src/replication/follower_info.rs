use crate::errors::FollowerError;
use crate::log::{LogIndex, MessageId, ParticipantId, TermIndexPair};
use crate::metrics::ReplicatedLogMetrics;
use crate::replication::follower::Follower;
use crate::replication::{AppendEntriesErrorReason, AppendEntriesErrorType, AppendEntriesResult};
use crate::scheduler::WorkItemHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BACKOFF_BASE: Duration = Duration::from_micros(100);
const BACKOFF_MAX_EXPONENT: u32 = 17;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FollowerState {
    Idle,
    Prepare,
    RequestInFlight,
    ErrorBackoff,
}

/// What the leader sent with a request, needed to apply the answer.
#[derive(Copy, Clone, Debug)]
pub(crate) struct SentRequest {
    pub(crate) message_id: MessageId,
    pub(crate) last_index: TermIndexPair,
    pub(crate) commit_index: LogIndex,
    pub(crate) lowest_index_to_keep: LogIndex,
}

/// FollowerInfo is the leader's replication bookkeeping for one participant.
pub(crate) struct FollowerInfo {
    pub(crate) follower: Arc<Follower>,
    pub(crate) logger: slog::Logger,

    // Index of the entry right before the next one to send.
    pub(crate) next_prev_log_index: LogIndex,
    pub(crate) last_acked_entry: TermIndexPair,
    pub(crate) last_acked_commit_index: LogIndex,
    pub(crate) last_acked_lowest_index_to_keep: LogIndex,

    pub(crate) state: FollowerState,
    // Incremented for every request. Only the answer to the latest one is applied.
    pub(crate) last_sent_message_id: MessageId,
    pub(crate) last_request_latency: Duration,
    pub(crate) last_request_start: Instant,
    pub(crate) errors_since_last_answer: u32,
    pub(crate) error_backoff_end: Option<Instant>,
    pub(crate) last_error_reason: AppendEntriesErrorReason,

    pub(crate) snapshot_available: bool,
    pub(crate) snapshot_available_message_id: MessageId,

    // Dropping it cancels a pending delayed request.
    pub(crate) last_request_handle: Option<WorkItemHandle>,
}

impl FollowerInfo {
    pub(crate) fn new(
        follower: Arc<Follower>,
        parent_logger: &slog::Logger,
        next_prev_log_index: LogIndex,
        snapshot_available: bool,
    ) -> Self {
        let logger = parent_logger.new(slog::o!("follower" => follower.participant_id().to_string()));
        FollowerInfo {
            follower,
            logger,
            next_prev_log_index,
            last_acked_entry: TermIndexPair::default(),
            last_acked_commit_index: LogIndex::default(),
            last_acked_lowest_index_to_keep: LogIndex::default(),
            state: FollowerState::Idle,
            last_sent_message_id: MessageId::default(),
            last_request_latency: Duration::default(),
            last_request_start: Instant::now(),
            errors_since_last_answer: 0,
            error_backoff_end: None,
            last_error_reason: AppendEntriesErrorReason::none(),
            snapshot_available,
            snapshot_available_message_id: MessageId::default(),
            last_request_handle: None,
        }
    }

    pub(crate) fn participant_id(&self) -> &ParticipantId {
        self.follower.participant_id()
    }

    /// Whether a request to this follower would tell it anything it does not know yet.
    pub(crate) fn has_new_information(
        &self,
        last_index: LogIndex,
        commit_index: LogIndex,
        lowest_index_to_keep: LogIndex,
    ) -> bool {
        self.next_prev_log_index != last_index
            || self.last_acked_commit_index != commit_index
            || self.last_acked_lowest_index_to_keep != lowest_index_to_keep
    }

    /// Moves an idle follower with pending information into PREPARE, or into ERROR_BACKOFF if the
    /// last requests failed. Returns how long to wait before sending, `None` if nothing is to be
    /// sent.
    pub(crate) fn prepare(
        &mut self,
        last_index: LogIndex,
        commit_index: LogIndex,
        lowest_index_to_keep: LogIndex,
    ) -> Option<Duration> {
        if self.state != FollowerState::Idle {
            slog::trace!(self.logger, "Not preparing request, state is {:?}", self.state);
            return None;
        }
        if !self.has_new_information(last_index, commit_index, lowest_index_to_keep) {
            return None;
        }

        if self.errors_since_last_answer > 0 {
            let delay = backoff_duration(self.errors_since_last_answer);
            slog::debug!(
                self.logger,
                "Retrying in {:?} after {} failed requests",
                delay,
                self.errors_since_last_answer
            );
            self.state = FollowerState::ErrorBackoff;
            self.error_backoff_end = Some(Instant::now() + delay);
            Some(delay)
        } else {
            self.state = FollowerState::Prepare;
            self.error_backoff_end = None;
            Some(Duration::ZERO)
        }
    }

    /// Marks the start of a new request and returns its message id.
    pub(crate) fn start_request(&mut self) -> MessageId {
        self.state = FollowerState::RequestInFlight;
        self.last_request_start = Instant::now();
        self.last_sent_message_id.incr()
    }

    /// The entries from `first_missing` on can no longer be sent, the follower needs a snapshot.
    /// Counts as a failed request, so the next attempt backs off.
    pub(crate) fn missing_log_entries(&mut self, first_missing: LogIndex, metrics: &ReplicatedLogMetrics) {
        self.state = FollowerState::Idle;
        self.errors_since_last_answer += 1;
        self.last_error_reason = AppendEntriesErrorReason::with_details(
            AppendEntriesErrorType::MissingLogEntries,
            format!("Entry {:?} is no longer available", first_missing),
        );
        metrics.leader_append_entries_error_count.incr();
        slog::warn!(
            self.logger,
            "Entry {:?} is no longer available, follower needs a snapshot ({} attempts)",
            first_missing,
            self.errors_since_last_answer
        );
    }

    pub(crate) fn handle_append_entries_result(
        &mut self,
        sent: SentRequest,
        result: Result<AppendEntriesResult, FollowerError>,
        latency: Duration,
        metrics: &ReplicatedLogMetrics,
    ) {
        self.last_request_latency = latency;
        if self.last_sent_message_id == sent.message_id {
            self.state = FollowerState::Idle;
        } else {
            slog::debug!(
                self.logger,
                "Answer to message {:?} arrived, but the latest request is {:?}",
                sent.message_id,
                self.last_sent_message_id
            );
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.errors_since_last_answer += 1;
                self.last_error_reason =
                    AppendEntriesErrorReason::with_details(AppendEntriesErrorType::CommunicationError, e.to_string());
                metrics.leader_append_entries_error_count.incr();
                slog::info!(
                    self.logger,
                    "AppendEntries failed ({} since last answer): {}",
                    self.errors_since_last_answer,
                    e
                );
                return;
            }
        };

        if response.message_id != self.last_sent_message_id {
            slog::warn!(
                self.logger,
                "Ignoring outdated AppendEntries answer {:?}, latest request is {:?}",
                response.message_id,
                self.last_sent_message_id
            );
            return;
        }

        // An out of band snapshot report may have raced with this answer. Keep the newest.
        if self.snapshot_available_message_id < response.message_id {
            if self.snapshot_available != response.snapshot_available {
                slog::info!(self.logger, "Snapshot available changed to {}", response.snapshot_available);
            }
            self.snapshot_available = response.snapshot_available;
            self.snapshot_available_message_id = response.message_id;
        }

        self.last_error_reason = response.reason.clone();
        if response.is_success() {
            self.last_acked_entry = sent.last_index;
            self.next_prev_log_index = sent.last_index.index;
            self.last_acked_commit_index = sent.commit_index;
            self.last_acked_lowest_index_to_keep = sent.lowest_index_to_keep;
            self.errors_since_last_answer = 0;
            return;
        }

        match (response.reason.error, response.conflict) {
            (AppendEntriesErrorType::NoPrevLogMatch, Some(conflict)) => {
                // Not a failure: the follower told us where its log diverges.
                let next_prev = conflict.index.saturating_decrement().min(self.next_prev_log_index);
                slog::debug!(
                    self.logger,
                    "No prev log match, rewinding from {:?} to {:?}",
                    self.next_prev_log_index,
                    next_prev
                );
                self.next_prev_log_index = next_prev;
                self.errors_since_last_answer = 0;
            }
            (error, _) => {
                self.errors_since_last_answer += 1;
                metrics.leader_append_entries_error_count.incr();
                slog::info!(self.logger, "AppendEntries rejected: {:?} {:?}", error, response.reason.details);
            }
        }
    }
}

pub(crate) fn backoff_duration(errors_since_last_answer: u32) -> Duration {
    BACKOFF_BASE * 2u32.pow(errors_since_last_answer.min(BACKOFF_MAX_EXPONENT))
}
