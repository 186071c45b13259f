use crate::errors::LeaderError;
use crate::log::{LogIndex, LogPayload, LogRange, LogRangeIterator};
use crate::replication::WaitForFuture;
use crate::scheduler::DeferredAction;
use serde::Serialize;

/// How far the local state machine is on its way to serving requests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalStateMachineStatus {
    Unconfigured,
    Recovery,
    Operational,
}

/// What a state machine may do with the log while its replica is leader. Every call goes back to
/// the leader and fails with `LeaderResigned` once the leader is gone.
#[async_trait::async_trait]
pub trait LeaderMethods: Send + Sync {
    fn release_index(&self, index: LogIndex) -> Result<(), LeaderError>;

    /// Committed client payloads in `range`, or everything committed that is still persisted.
    fn get_committed_log_iterator(&self, range: Option<LogRange>) -> Result<LogRangeIterator, LeaderError>;

    fn insert(&self, payload: LogPayload, wait_for_sync: bool) -> Result<LogIndex, LeaderError>;

    fn insert_deferred(&self, payload: LogPayload, wait_for_sync: bool)
        -> Result<(LogIndex, DeferredAction), LeaderError>;

    fn wait_for(&self, index: LogIndex) -> WaitForFuture;

    async fn wait_for_iterator(&self, index: LogIndex) -> Result<LogRangeIterator, LeaderError>;
}

/// ReplicatedStateHandle is the seam to the state machine on top of the log.
///
/// The leader calls into the handle without holding its own lock, so implementations are free
/// to call back into the `LeaderMethods` they were given, and must be thread-safe themselves.
pub trait ReplicatedStateHandle: Send + Sync {
    /// The first entry of the term is committed. The state machine may start its recovery.
    fn leadership_established(&self, methods: Box<dyn LeaderMethods>);

    /// The leader resigned. Returns the methods handed over on establishment, if any.
    fn resign_current_state(&self) -> Option<Box<dyn LeaderMethods>>;

    /// Called after the commit index advanced. Calls may arrive out of order; implementations
    /// should keep the maximum they have seen.
    fn update_commit_index(&self, index: LogIndex);

    fn internal_status(&self) -> LocalStateMachineStatus;
}
