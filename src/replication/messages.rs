use crate::log::{LogIndex, LogTerm, MessageId, ParticipantId, ReplicatedLogEntry, TermIndexPair};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppendEntriesRequest {
    pub leader_term: LogTerm,
    pub leader_id: ParticipantId,
    pub prev_log_entry: TermIndexPair,
    pub leader_commit: LogIndex,
    pub lowest_index_to_keep: LogIndex,
    pub wait_for_sync: bool,
    pub message_id: MessageId,
    pub entries: Vec<ReplicatedLogEntry>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppendEntriesErrorType {
    None,
    InvalidLeaderId,
    LostLogCore,
    MessageOutdated,
    WrongTerm,
    NoPrevLogMatch,
    PersistenceFailure,
    CommunicationError,
    PrevAppendEntriesInFlight,
    /// Set by the leader itself: the entries the follower needs next are compacted away.
    MissingLogEntries,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppendEntriesErrorReason {
    pub error: AppendEntriesErrorType,
    pub details: Option<String>,
}

impl AppendEntriesErrorReason {
    pub fn none() -> Self {
        Self::new(AppendEntriesErrorType::None)
    }

    pub fn new(error: AppendEntriesErrorType) -> Self {
        AppendEntriesErrorReason { error, details: None }
    }

    pub fn with_details(error: AppendEntriesErrorType, details: impl Into<String>) -> Self {
        AppendEntriesErrorReason {
            error,
            details: Some(details.into()),
        }
    }
}

impl Default for AppendEntriesErrorReason {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for AppendEntriesErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{:?}: {}", self.error, details),
            None => write!(f, "{:?}", self.error),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppendEntriesResult {
    pub term: LogTerm,
    pub message_id: MessageId,
    pub success: bool,
    pub reason: AppendEntriesErrorReason,
    /// Required when the reason is `NoPrevLogMatch`.
    pub conflict: Option<TermIndexPair>,
    pub snapshot_available: bool,
}

impl AppendEntriesResult {
    pub fn with_ok(term: LogTerm, message_id: MessageId, snapshot_available: bool) -> Self {
        AppendEntriesResult {
            term,
            message_id,
            success: true,
            reason: AppendEntriesErrorReason::none(),
            conflict: None,
            snapshot_available,
        }
    }

    pub fn with_rejection(
        term: LogTerm,
        message_id: MessageId,
        reason: AppendEntriesErrorReason,
        snapshot_available: bool,
    ) -> Self {
        AppendEntriesResult {
            term,
            message_id,
            success: false,
            reason,
            conflict: None,
            snapshot_available,
        }
    }

    pub fn with_conflict(
        term: LogTerm,
        message_id: MessageId,
        conflict: TermIndexPair,
        snapshot_available: bool,
    ) -> Self {
        AppendEntriesResult {
            term,
            message_id,
            success: false,
            reason: AppendEntriesErrorReason::new(AppendEntriesErrorType::NoPrevLogMatch),
            conflict: Some(conflict),
            snapshot_available,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}
