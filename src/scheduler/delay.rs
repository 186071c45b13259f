use crate::errors::LeaderError;
use crate::scheduler::{Scheduler, WorkItemHandle};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Sleep;

/// Schedules a delay. Without a scheduler the delay is a plain tokio timer on the runtime that
/// polls the future, and cannot be cancelled.
pub(crate) fn delayed_future(
    scheduler: Option<&Arc<dyn Scheduler>>,
    name: &'static str,
    delay: Duration,
) -> (Option<WorkItemHandle>, DelayFuture) {
    let scheduler = match scheduler {
        Some(scheduler) => scheduler,
        None if delay.is_zero() => return (None, DelayFuture { state: DelayState::Ready }),
        None => return (None, DelayFuture { state: DelayState::Timer(delay, None) }),
    };

    let (tx, rx) = oneshot::channel();
    let handle = scheduler.queue_delayed(
        name,
        delay,
        Box::new(move |cancelled| {
            // Receiver gone means nobody waits for this delay anymore.
            let _ = tx.send(cancelled);
        }),
    );

    (Some(handle), DelayFuture { state: DelayState::Scheduled(rx) })
}

/// Resolves with `Err(RequestCanceled)` if the delay was cancelled.
pub(crate) struct DelayFuture {
    state: DelayState,
}

enum DelayState {
    Ready,
    // The timer is created on first poll, so the delay can be set up outside of the runtime.
    Timer(Duration, Option<Pin<Box<Sleep>>>),
    Scheduled(oneshot::Receiver<bool>),
}

impl Future for DelayFuture {
    type Output = Result<(), LeaderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = match &mut self.state {
            DelayState::Ready => return Poll::Ready(Ok(())),
            DelayState::Timer(delay, sleep) => {
                let delay = *delay;
                let sleep = sleep.get_or_insert_with(|| Box::pin(tokio::time::sleep(delay)));
                return sleep.as_mut().poll(cx).map(Ok);
            }
            DelayState::Scheduled(rx) => rx,
        };

        match Pin::new(rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(false)) => Poll::Ready(Ok(())),
            // Cancelled, or the scheduler dropped the work item without running it.
            Poll::Ready(Ok(true)) | Poll::Ready(Err(_)) => Poll::Ready(Err(LeaderError::RequestCanceled)),
        }
    }
}
