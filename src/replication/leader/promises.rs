use crate::errors::LeaderError;
use crate::log::{LogIndex, LogTerm, ParticipantId};
use crate::state_handle::{LeaderMethods, ReplicatedStateHandle};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The participants whose acknowledgement committed `index`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuorumData {
    pub index: LogIndex,
    pub term: LogTerm,
    pub quorum: Vec<ParticipantId>,
}

#[derive(Clone, Debug)]
pub struct WaitForResult {
    /// Commit index at the time the wait was resolved, at least the index waited for.
    pub commit_index: LogIndex,
    pub quorum: Arc<QuorumData>,
}

pub(crate) type WaitForPromise = oneshot::Sender<Result<WaitForResult, LeaderError>>;

/// Resolves once the index waited for is committed, or with `LeaderResigned` if the leader
/// resigns first.
pub struct WaitForFuture {
    state: WaitForState,
}

enum WaitForState {
    Ready(Option<Result<WaitForResult, LeaderError>>),
    Pending(oneshot::Receiver<Result<WaitForResult, LeaderError>>),
}

impl WaitForFuture {
    pub(crate) fn ready(result: Result<WaitForResult, LeaderError>) -> Self {
        WaitForFuture {
            state: WaitForState::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<Result<WaitForResult, LeaderError>>) -> Self {
        WaitForFuture {
            state: WaitForState::Pending(rx),
        }
    }
}

impl Future for WaitForFuture {
    type Output = Result<WaitForResult, LeaderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            WaitForState::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => panic!("WaitForFuture polled after completion"),
            },
            WaitForState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                // Promise dropped together with the leader.
                Poll::Ready(Err(_)) => Poll::Ready(Err(LeaderError::LeaderResigned)),
            },
        }
    }
}

/// Resolves when the leader resigns or is dropped.
pub struct WaitForResignFuture {
    rx: oneshot::Receiver<()>,
}

impl WaitForResignFuture {
    pub(crate) fn new(rx: oneshot::Receiver<()>) -> Self {
        WaitForResignFuture { rx }
    }
}

impl Future for WaitForResignFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = Pin::new(&mut self.rx);

        match rx.poll(cx) {
            Poll::Pending => Poll::Pending,
            // Sent or dropped, either way the leader is gone.
            Poll::Ready(_) => Poll::Ready(()),
        }
    }
}

/// Everything a critical section decided to hand out. Applied after the leader lock is released.
#[derive(Default)]
pub(crate) struct ResolvedPromiseSet {
    pub(crate) promises: Vec<WaitForPromise>,
    pub(crate) result: Option<WaitForResult>,
    pub(crate) commit_notification: Option<(Arc<dyn ReplicatedStateHandle>, LogIndex)>,
    pub(crate) establishment: Option<(Arc<dyn ReplicatedStateHandle>, Box<dyn LeaderMethods>)>,
}

impl ResolvedPromiseSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.promises.is_empty() && self.commit_notification.is_none() && self.establishment.is_none()
    }
}
