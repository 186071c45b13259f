use crate::errors::LeaderError;
use crate::log::{LogIndex, LogPayload, LogRange, LogRangeIterator};
use crate::replication::leader::promises::WaitForFuture;
use crate::replication::leader::LogLeader;
use crate::scheduler::DeferredAction;
use crate::state_handle::LeaderMethods;
use std::sync::{Arc, Weak};

/// Handed to the state machine on leadership establishment. Only holds a weak reference so the
/// state machine cannot keep a resigned leader alive.
pub(crate) struct LeaderMethodsImpl {
    leader: Weak<LogLeader>,
}

impl LeaderMethodsImpl {
    pub(crate) fn new(leader: Weak<LogLeader>) -> Self {
        LeaderMethodsImpl { leader }
    }

    fn leader(&self) -> Result<Arc<LogLeader>, LeaderError> {
        self.leader.upgrade().ok_or(LeaderError::LeaderResigned)
    }
}

#[async_trait::async_trait]
impl LeaderMethods for LeaderMethodsImpl {
    fn release_index(&self, index: LogIndex) -> Result<(), LeaderError> {
        self.leader()?.release(index)
    }

    fn get_committed_log_iterator(&self, range: Option<LogRange>) -> Result<LogRangeIterator, LeaderError> {
        self.leader()?.get_committed_log_iterator(range)
    }

    fn insert(&self, payload: LogPayload, wait_for_sync: bool) -> Result<LogIndex, LeaderError> {
        self.leader()?.insert(payload, wait_for_sync)
    }

    fn insert_deferred(
        &self,
        payload: LogPayload,
        wait_for_sync: bool,
    ) -> Result<(LogIndex, DeferredAction), LeaderError> {
        self.leader()?.insert_deferred(payload, wait_for_sync)
    }

    fn wait_for(&self, index: LogIndex) -> WaitForFuture {
        match self.leader.upgrade() {
            Some(leader) => leader.wait_for(index),
            None => WaitForFuture::ready(Err(LeaderError::LeaderResigned)),
        }
    }

    async fn wait_for_iterator(&self, index: LogIndex) -> Result<LogRangeIterator, LeaderError> {
        self.leader()?.wait_for_iterator(index).await
    }
}
