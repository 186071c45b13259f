use crate::log::ParticipantId;
use crate::replication::follower::Follower;
use crate::replication::leader::guarded::NextAppendEntries;
use crate::replication::leader::LogLeader;
use crate::scheduler::DelayFuture;
use std::sync::Weak;
use std::time::Instant;

/// A request some follower is due for. Holds no strong reference to the leader or the follower,
/// either may be gone by the time it runs.
pub(crate) struct PreparedAppendEntryRequest {
    pub(crate) parent_log: Weak<LogLeader>,
    pub(crate) follower: Weak<Follower>,
    pub(crate) participant: ParticipantId,
    pub(crate) delay: DelayFuture,
}

impl LogLeader {
    /// Must be called without holding the leader lock.
    pub(crate) fn execute_append_entries_requests(&self, requests: Vec<PreparedAppendEntryRequest>) {
        for request in requests {
            self.ctx.runtime.spawn(run_append_entries(request));
        }
    }
}

async fn run_append_entries(request: PreparedAppendEntryRequest) {
    let PreparedAppendEntryRequest {
        parent_log,
        follower,
        participant,
        delay,
    } = request;

    // Cancelled when the follower was dropped, or superseded by a newer retry.
    if delay.await.is_err() {
        return;
    }

    let (leader, follower) = match (parent_log.upgrade(), follower.upgrade()) {
        (Some(leader), Some(follower)) => (leader, follower),
        _ => return,
    };

    let created = {
        let mut guard = leader.acquire_mutex();
        if guard.did_resign {
            None
        } else {
            guard.create_append_entries_request(&leader.ctx, &participant, &follower)
        }
    };
    let (request, sent) = match created {
        Some(NextAppendEntries::Send(request, sent)) => (request, sent),
        Some(NextAppendEntries::MissingEntries(prepared)) => {
            leader.execute_append_entries_requests(prepared);
            return;
        }
        None => {
            slog::debug!(leader.ctx.logger, "Follower {} gone before its request was created", participant);
            return;
        }
    };
    let current_term = leader.ctx.current_term;
    let logger = leader.ctx.logger.clone();
    // The follower may take a long time to answer. Don't keep the leader alive for it.
    drop(leader);

    let start = Instant::now();
    let result = follower.append_entries(request).await;
    let latency = start.elapsed();

    let leader = match parent_log.upgrade() {
        Some(leader) => leader,
        None => {
            slog::debug!(logger, "Leader dropped, ignoring answer of {}", participant);
            return;
        }
    };

    let (prepared, resolved) = {
        let mut guard = leader.acquire_mutex();
        if guard.did_resign {
            slog::debug!(logger, "Leader resigned, ignoring answer of {}", participant);
            return;
        }
        guard.handle_append_entries_response(
            &leader.ctx,
            &participant,
            &follower,
            sent,
            current_term,
            result,
            latency,
        )
    };
    drop(follower);

    leader.handle_resolved_promise_set(resolved);
    leader.execute_append_entries_requests(prepared);
}
