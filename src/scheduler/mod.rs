mod deferred;
mod delay;

pub use deferred::DeferredAction;
pub(crate) use delay::delayed_future;
pub(crate) use delay::DelayFuture;

use std::fmt;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::{CancellationToken, DropGuard};

pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// Callback of a delayed work item. Called with `true` if the item was cancelled before its
/// delay elapsed.
pub type DelayedWorkItem = Box<dyn FnOnce(bool) + Send + 'static>;

/// Scheduler runs continuations for the leader. The leader owns no threads itself.
pub trait Scheduler: Send + Sync {
    fn queue(&self, item: WorkItem);

    /// Runs `item` once `delay` has elapsed. Dropping the returned handle cancels the item, which
    /// then still runs, but with `cancelled == true`.
    fn queue_delayed(&self, name: &'static str, delay: Duration, item: DelayedWorkItem) -> WorkItemHandle;
}

/// Cancels its work item when dropped.
pub struct WorkItemHandle {
    name: &'static str,
    _guard: DropGuard,
}

impl WorkItemHandle {
    pub fn new(name: &'static str, token: CancellationToken) -> Self {
        WorkItemHandle {
            name,
            _guard: token.drop_guard(),
        }
    }
}

impl fmt::Debug for WorkItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkItemHandle({})", self.name)
    }
}

/// TokioScheduler runs work items as tasks on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        TokioScheduler { runtime }
    }

    /// Uses the runtime of the calling task. Panics outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn queue(&self, item: WorkItem) {
        self.runtime.spawn(async move { item() });
    }

    fn queue_delayed(&self, name: &'static str, delay: Duration, item: DelayedWorkItem) -> WorkItemHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => item(true),
                _ = tokio::time::sleep(delay) => item(false),
            }
        });

        WorkItemHandle::new(name, token)
    }
}
