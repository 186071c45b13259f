use super::*;
use crate::config::{LogConfig, ParticipantFlags};
use crate::errors::FollowerError;
use crate::log::{LogEntry, TermIndexPair};
use crate::replication::commit::CommitFailReason;
use crate::replication::follower_info::{FollowerState, SentRequest};
use crate::replication::{AppendEntriesErrorType, AppendEntriesRequest, AppendEntriesResult, LogFollower};
use crate::scheduler::TokioScheduler;
use crate::state_handle::{LeaderMethods, LocalStateMachineStatus};
use crate::storage::InMemoryStorageEngine;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const TERM: u64 = 5;

struct TestUtilReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T: Debug> TestUtilReceiver<T> {
    fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        TestUtilReceiver { rx }
    }

    async fn recv(&mut self) -> T {
        self.recv_with_sanity_timeout().await.expect("Expected value")
    }

    async fn recv_with_sanity_timeout(&mut self) -> Option<T> {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("Unexpected timeout")
    }

    async fn recv_assert_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .expect_err("Expected timeout");
    }

    async fn try_recv_for(&mut self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }
}

#[derive(Debug)]
struct PendingAppendEntries {
    participant: ParticipantId,
    request: AppendEntriesRequest,
    reply: oneshot::Sender<Result<AppendEntriesResult, FollowerError>>,
}

impl PendingAppendEntries {
    fn ack(self) {
        let result = AppendEntriesResult::with_ok(self.request.leader_term, self.request.message_id, true);
        let _ = self.reply.send(Ok(result));
    }

    fn fail(self) {
        let _ = self
            .reply
            .send(Err(FollowerError::Communication("connection refused".into())));
    }

    fn conflict(self, conflict: TermIndexPair) {
        let result =
            AppendEntriesResult::with_conflict(self.request.leader_term, self.request.message_id, conflict, true);
        let _ = self.reply.send(Ok(result));
    }

    fn entry_indexes(&self) -> Vec<u64> {
        self.request.entries.iter().map(|e| e.index.as_u64()).collect()
    }
}

struct FakeFollower {
    participant_id: ParticipantId,
    tx: mpsc::UnboundedSender<PendingAppendEntries>,
}

#[async_trait::async_trait]
impl LogFollower for FakeFollower {
    fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    async fn append_entries(&self, request: AppendEntriesRequest) -> Result<AppendEntriesResult, FollowerError> {
        let (reply, rx) = oneshot::channel();
        let pending = PendingAppendEntries {
            participant: self.participant_id.clone(),
            request,
            reply,
        };
        if self.tx.send(pending).is_err() {
            return Err(FollowerError::Communication("test is over".into()));
        }
        rx.await.map_err(|_| FollowerError::Canceled)?
    }
}

struct FakeFollowerFactory {
    tx: mpsc::UnboundedSender<PendingAppendEntries>,
}

impl FollowerFactory for FakeFollowerFactory {
    fn construct_follower(&self, participant: &ParticipantId) -> Arc<dyn LogFollower> {
        Arc::new(FakeFollower {
            participant_id: participant.clone(),
            tx: self.tx.clone(),
        })
    }
}

#[derive(Default)]
struct FakeStateHandle {
    methods: Mutex<Option<Box<dyn LeaderMethods>>>,
    num_established: AtomicUsize,
    commit_index: AtomicU64,
}

impl FakeStateHandle {
    fn methods(&self) -> MutexGuard<'_, Option<Box<dyn LeaderMethods>>> {
        self.methods.lock().unwrap()
    }
}

impl ReplicatedStateHandle for FakeStateHandle {
    fn leadership_established(&self, methods: Box<dyn LeaderMethods>) {
        self.num_established.fetch_add(1, Ordering::SeqCst);
        *self.methods() = Some(methods);
    }

    fn resign_current_state(&self) -> Option<Box<dyn LeaderMethods>> {
        self.methods().take()
    }

    fn update_commit_index(&self, index: LogIndex) {
        self.commit_index.fetch_max(index.as_u64(), Ordering::SeqCst);
    }

    fn internal_status(&self) -> LocalStateMachineStatus {
        LocalStateMachineStatus::Operational
    }
}

struct TestLeader {
    leader: Arc<LogLeader>,
    engine: Arc<InMemoryStorageEngine>,
    state: Arc<FakeStateHandle>,
    metrics: Arc<ReplicatedLogMetrics>,
    followers: TestUtilReceiver<PendingAppendEntries>,
}

impl TestLeader {
    /// Answers follower requests with `respond` until `done` holds.
    async fn serve_until(&mut self, mut respond: impl FnMut(PendingAppendEntries), done: impl Fn(&LogLeader) -> bool) {
        let leader = self.leader.clone();
        let followers = &mut self.followers;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(leader.as_ref()) {
                if let Some(pending) = followers.try_recv_for(Duration::from_millis(5)).await {
                    respond(pending);
                }
            }
        })
        .await
        .expect("Leader did not reach the expected state in time");
    }

    fn follower_next_prev(&self, participant: &str) -> LogIndex {
        self.leader.acquire_mutex().follower[&ParticipantId::new(participant)].next_prev_log_index
    }
}

fn participants_config(generation: u64, write_concern: usize, participants: &[&str]) -> Arc<ParticipantsConfig> {
    let config = LogConfig {
        effective_write_concern: write_concern,
        wait_for_sync: false,
    };
    let config = participants
        .iter()
        .fold(ParticipantsConfig::new(generation, config), |config, id| {
            config.with_participant(*id, ParticipantFlags::default())
        });
    Arc::new(config)
}

fn entry(term: u64, index: u64) -> LogEntry {
    LogEntry::new(LogTerm::new(term), LogIndex::new(index), LogPayload::normal("old"))
}

fn setup(
    participants: &[&str],
    write_concern: usize,
    engine: InMemoryStorageEngine,
    scheduler: Option<Arc<dyn Scheduler>>,
) -> TestLeader {
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Arc::new(engine);
    let state = Arc::new(FakeStateHandle::default());
    let metrics = Arc::new(ReplicatedLogMetrics::new());

    let leader = LogLeader::construct(LogLeaderConfig {
        logger: slog::Logger::root(slog::Discard, slog::o!()),
        metrics: metrics.clone(),
        options: LeaderOptionsValidated::default(),
        id: ParticipantId::new("L"),
        term: LogTerm::new(TERM),
        storage: engine.clone(),
        participants_config: participants_config(1, write_concern, participants),
        state_handle: state.clone(),
        follower_factory: Arc::new(FakeFollowerFactory { tx }),
        scheduler,
    })
    .unwrap();

    TestLeader {
        leader,
        engine,
        state,
        metrics,
        followers: TestUtilReceiver::new(rx),
    }
}

fn idx(index: u64) -> LogIndex {
    LogIndex::new(index)
}

#[tokio::test]
async fn single_participant_commits_on_its_own() {
    // -- setup --
    let test = setup(&["L"], 1, InMemoryStorageEngine::new(), None);

    // -- execute --
    test.leader.wait_for_leadership().await.unwrap();
    let index = test.leader.insert(LogPayload::normal("a"), false).unwrap();
    let result = test.leader.wait_for(index).await.unwrap();

    // -- verify --
    assert_eq!(idx(2), index);
    assert!(result.commit_index >= idx(2));
    assert_eq!(vec![ParticipantId::new("L")], result.quorum.quorum);
    assert_eq!(LogTerm::new(TERM), result.quorum.term);
    assert_eq!(1, test.state.num_established.load(Ordering::SeqCst));
    assert_eq!(2, test.state.commit_index.load(Ordering::SeqCst));
    assert_eq!(2, test.engine.entries().len());
    assert_eq!((1, Some(1)), test.leader.get_participant_config_generations());

    let metrics = test.metrics.snapshot();
    assert_eq!(1, metrics.leader_number);
    assert_eq!(2, metrics.num_committed_entries);
    assert_eq!(1, metrics.num_meta_entries);
}

#[tokio::test]
async fn storage_entries_come_before_first_entry_of_term() {
    // -- setup --
    let engine = InMemoryStorageEngine::with_entries((1..=3).map(|i| entry(2, i)));

    // -- execute --
    let test = setup(&["L"], 1, engine, None);
    test.leader.wait_for_leadership().await.unwrap();

    // -- verify --
    let log = test.leader.copy_in_memory_log();
    assert_eq!(TermIndexPair::new(LogTerm::new(TERM), idx(4)), log.last_term_index_pair());
    let first_of_term = &test.engine.entries()[3];
    assert_eq!(idx(4), first_of_term.index);
    assert!(matches!(
        first_of_term.payload,
        LogPayload::Meta(LogMetaPayload::FirstEntryOfTerm { .. })
    ));
}

#[tokio::test]
async fn failing_follower_does_not_block_quorum() {
    // -- setup --
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current());
    let mut test = setup(&["L", "F1", "F2"], 2, InMemoryStorageEngine::new(), Some(scheduler));
    let respond = |pending: PendingAppendEntries| match pending.participant.as_str() {
        "F1" => pending.ack(),
        _ => pending.fail(),
    };

    // -- execute --
    for data in ["a", "b", "c"] {
        test.leader.insert(LogPayload::normal(data), false).unwrap();
    }
    test.serve_until(respond, |leader| leader.get_commit_index() >= idx(4))
        .await;

    // -- verify --
    let result = test.leader.wait_for(idx(4)).await.unwrap();
    assert_eq!(vec![ParticipantId::new("F1"), ParticipantId::new("L")], result.quorum.quorum);

    let status = test.leader.get_status().unwrap();
    assert_eq!(idx(4), status.local.commit_index);
    assert_eq!(CommitFailReason::NothingToCommit, status.last_commit_fail_reason);
    let f1 = &status.follower[&ParticipantId::new("F1")];
    assert_eq!(0, f1.errors_since_last_answer);
    assert_eq!(idx(4), f1.spearhead.index);
    let f2 = &status.follower[&ParticipantId::new("F2")];
    assert!(f2.errors_since_last_answer >= 1);
    assert_eq!(AppendEntriesErrorType::CommunicationError, f2.last_error_reason.error);
    assert_eq!(TermIndexPair::default(), f2.spearhead);
    assert!(test.metrics.snapshot().leader_append_entries_error_count >= 1);
}

#[tokio::test]
async fn conflict_rewinds_next_prev_index() {
    // -- setup --
    let engine = InMemoryStorageEngine::with_entries((1..=5).map(|i| entry(2, i)));
    let mut test = setup(&["L", "F1"], 2, engine, None);

    // -- execute --
    let first = test.followers.recv().await;
    assert_eq!(TermIndexPair::new(LogTerm::new(2), idx(5)), first.request.prev_log_entry);
    assert_eq!(vec![6], first.entry_indexes());
    first.conflict(TermIndexPair::new(LogTerm::new(2), idx(3)));

    // -- verify --
    let second = test.followers.recv().await;
    assert_eq!(TermIndexPair::new(LogTerm::new(2), idx(2)), second.request.prev_log_entry);
    assert_eq!(vec![3, 4, 5, 6], second.entry_indexes());
    assert!(second.request.wait_for_sync);
    assert_eq!(idx(2), test.follower_next_prev("F1"));
    let status = test.leader.get_status().unwrap();
    assert_eq!(0, status.follower[&ParticipantId::new("F1")].errors_since_last_answer);

    second.ack();
    test.leader.wait_for_leadership().await.unwrap();
    assert_eq!(idx(6), test.follower_next_prev("F1"));
}

#[tokio::test]
async fn conflict_never_moves_next_prev_forward() {
    // -- setup --
    let engine = InMemoryStorageEngine::with_entries((1..=5).map(|i| entry(2, i)));
    let mut test = setup(&["L", "F1"], 2, engine, None);

    // -- execute --
    let first = test.followers.recv().await;
    first.conflict(TermIndexPair::new(LogTerm::new(2), idx(9)));

    // -- verify --
    let second = test.followers.recv().await;
    assert_eq!(TermIndexPair::new(LogTerm::new(2), idx(5)), second.request.prev_log_entry);
}

#[tokio::test]
async fn answer_from_other_term_is_ignored() {
    // -- setup --
    let mut test = setup(&["L", "F1"], 2, InMemoryStorageEngine::new(), None);
    let pending = test.followers.recv().await;
    let participant = ParticipantId::new("F1");
    let sent = SentRequest {
        message_id: pending.request.message_id,
        last_index: TermIndexPair::new(LogTerm::new(TERM), idx(1)),
        commit_index: LogIndex::default(),
        lowest_index_to_keep: LogIndex::default(),
    };
    let answer = AppendEntriesResult::with_ok(LogTerm::new(TERM), pending.request.message_id, true);

    // -- execute --
    let (prepared, resolved) = {
        let mut guard = test.leader.acquire_mutex();
        let follower = guard.follower[&participant].follower.clone();
        guard.handle_append_entries_response(
            &test.leader.ctx,
            &participant,
            &follower,
            sent,
            LogTerm::new(TERM - 1),
            Ok(answer),
            Duration::from_millis(1),
        )
    };

    // -- verify --
    assert!(prepared.is_empty());
    assert!(resolved.is_empty());
    let guard = test.leader.acquire_mutex();
    let info = &guard.follower[&participant];
    assert_eq!(TermIndexPair::default(), info.last_acked_entry);
    assert_eq!(FollowerState::RequestInFlight, info.state);
    assert_eq!(LogIndex::default(), guard.commit_index);
}

#[tokio::test]
async fn resign_rejects_waiters() {
    // -- setup --
    let mut test = setup(&["L", "F1"], 2, InMemoryStorageEngine::new(), None);
    let pending = test.followers.recv().await;
    let waiters = vec![
        test.leader.wait_for(idx(1)),
        test.leader.wait_for(idx(2)),
        test.leader.wait_for(idx(5)),
    ];
    let resigned = test.leader.wait_for_resign();

    // -- execute --
    let ResignedLeader { action, .. } = test.leader.resign().unwrap();
    action.fire();

    // -- verify --
    for waiter in waiters {
        assert!(matches!(waiter.await, Err(LeaderError::LeaderResigned)));
    }
    resigned.await;
    pending.ack();

    assert!(matches!(
        test.leader.insert(LogPayload::normal("a"), false),
        Err(LeaderError::LeaderResigned)
    ));
    assert!(matches!(test.leader.ping(None), Err(LeaderError::LeaderResigned)));
    assert!(matches!(
        test.leader.set_snapshot_available(
            &ParticipantId::new("F1"),
            SnapshotAvailableReport {
                message_id: MessageId::new(1)
            }
        ),
        Err(LeaderError::LeaderResigned)
    ));
    assert!(matches!(test.leader.resign(), Err(LeaderError::LeaderResigned)));
    assert!(matches!(test.leader.get_status(), Err(LeaderError::LeaderResigned)));
    assert!(matches!(test.leader.wait_for(idx(1)).await, Err(LeaderError::LeaderResigned)));
    assert_eq!(LogIndex::default(), test.leader.get_commit_index());
    assert_eq!(0, test.metrics.snapshot().leader_number);
    test.followers.recv_assert_timeout(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn resign_hands_back_storage_and_resigns_state() {
    // -- setup --
    let test = setup(&["L"], 1, InMemoryStorageEngine::new(), None);
    test.leader.wait_for_leadership().await.unwrap();
    assert!(test.state.methods().is_some());

    // -- execute --
    let resigned = test.leader.resign().unwrap();

    // -- verify --
    assert!(test.state.methods().is_none());
    assert_eq!(1, resigned.storage.read(LogIndex::default()).count());
    assert_eq!(LocalStateMachineStatus::Operational, resigned.state_handle.internal_status());
    resigned.action.fire();
}

#[tokio::test]
async fn establishment_after_resign_is_not_delivered() {
    // -- setup --
    let test = setup(&["L", "F1"], 2, InMemoryStorageEngine::new(), None);
    let resolved = {
        let mut guard = test.leader.acquire_mutex();
        for info in guard.follower.values_mut() {
            info.last_acked_entry = TermIndexPair::new(LogTerm::new(TERM), idx(1));
            info.snapshot_available = true;
        }
        guard.check_commit_index(&test.leader.ctx)
    };
    assert!(resolved.establishment.is_some());

    // -- execute --
    let ResignedLeader { action, .. } = test.leader.resign().unwrap();
    action.fire();
    test.leader.handle_resolved_promise_set(resolved);

    // -- verify --
    assert_eq!(0, test.state.num_established.load(Ordering::SeqCst));
    assert!(test.state.methods().is_none());
    assert_eq!(0, test.state.commit_index.load(Ordering::SeqCst));
}

#[tokio::test]
async fn one_request_in_flight_with_increasing_message_ids() {
    // -- setup --
    let mut test = setup(&["L", "F1"], 2, InMemoryStorageEngine::new(), None);
    let mut message_ids = Vec::new();

    // -- execute --
    for i in 0..5 {
        let pending = test.followers.recv().await;
        test.leader.insert(LogPayload::normal(format!("entry-{}", i)), false).unwrap();
        // New entries wait until the request in flight is answered.
        test.followers.recv_assert_timeout(Duration::from_millis(20)).await;
        message_ids.push(pending.request.message_id);
        pending.ack();
    }

    // -- verify --
    assert!(message_ids.windows(2).all(|w| w[0] < w[1]), "{:?}", message_ids);
}

#[tokio::test]
async fn follower_behind_compacted_log_backs_off() {
    // -- setup --
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current());
    let engine = InMemoryStorageEngine::with_entries((4..=5).map(|i| entry(2, i)));
    let mut test = setup(&["L", "F1"], 2, engine, Some(scheduler));
    let first = test.followers.recv().await;
    assert_eq!(TermIndexPair::new(LogTerm::new(2), idx(5)), first.request.prev_log_entry);

    // -- execute --
    first.conflict(TermIndexPair::new(LogTerm::default(), idx(1)));

    // -- verify --
    // Entries 1 to 3 are gone, so nothing can be sent.
    test.followers.recv_assert_timeout(Duration::from_millis(50)).await;
    assert_eq!(LogIndex::default(), test.follower_next_prev("F1"));
    let status = test.leader.get_status().unwrap();
    let f1 = &status.follower[&ParticipantId::new("F1")];
    assert!(f1.errors_since_last_answer >= 1);
    assert_eq!(AppendEntriesErrorType::MissingLogEntries, f1.last_error_reason.error);
    assert!(test.metrics.snapshot().leader_append_entries_error_count < 20);
}

#[tokio::test]
async fn dropping_leader_rejects_waiters() {
    // -- setup --
    let test = setup(&["L", "F1"], 2, InMemoryStorageEngine::new(), None);
    let waiter = test.leader.wait_for(idx(1));

    // -- execute --
    drop(test.leader);

    // -- verify --
    assert!(matches!(waiter.await, Err(LeaderError::LeaderResigned)));
    assert_eq!(0, test.metrics.snapshot().leader_number);
}

#[tokio::test]
async fn reconfiguration_adds_follower_and_commits_generation() {
    // -- setup --
    let mut test = setup(&["L", "F1"], 1, InMemoryStorageEngine::new(), None);
    test.serve_until(|pending| pending.ack(), |leader| leader.get_commit_index() >= idx(1))
        .await;
    test.leader.insert(LogPayload::normal("a"), false).unwrap();
    test.leader.insert(LogPayload::normal("b"), false).unwrap();

    // -- execute --
    let index = test
        .leader
        .update_participants_config(participants_config(2, 1, &["L", "F1", "F2"]))
        .unwrap();

    // -- verify --
    assert_eq!(idx(4), index);
    assert_eq!(idx(2), test.follower_next_prev("F2"));
    assert_eq!(2, test.leader.get_participant_config_generations().0);

    test.serve_until(
        |pending| pending.ack(),
        |leader| leader.get_participant_config_generations() == (2, Some(2)),
    )
    .await;
    assert!(test.leader.get_commit_index() >= idx(4));

    let same_generation = test
        .leader
        .update_participants_config(participants_config(2, 1, &["L", "F1"]));
    assert!(matches!(same_generation, Err(LeaderError::BadParameter(_))));
    let without_leader = test
        .leader
        .update_participants_config(participants_config(3, 1, &["F1", "F2"]));
    assert!(matches!(without_leader, Err(LeaderError::BadParameter(_))));
    assert_eq!((2, Some(2)), test.leader.get_participant_config_generations());
}

#[tokio::test]
async fn reconfiguration_drops_removed_follower() {
    // -- setup --
    let mut test = setup(&["L", "F1", "F2"], 1, InMemoryStorageEngine::new(), None);
    test.serve_until(|pending| pending.ack(), |leader| leader.get_commit_index() >= idx(1))
        .await;

    // -- execute --
    test.leader
        .update_participants_config(participants_config(2, 1, &["L", "F1"]))
        .unwrap();

    // -- verify --
    let status = test.leader.get_status().unwrap();
    assert!(status.follower.contains_key(&ParticipantId::new("F1")));
    assert!(!status.follower.contains_key(&ParticipantId::new("F2")));
    assert_eq!(2, status.active_participants_config.generation);
}

#[tokio::test]
async fn wait_for_iterator_skips_meta_entries() {
    // -- setup --
    let test = setup(&["L"], 1, InMemoryStorageEngine::new(), None);
    test.leader.insert(LogPayload::normal("a"), false).unwrap();

    // -- execute --
    let iter = test.leader.wait_for_iterator(idx(1)).await.unwrap();

    // -- verify --
    assert_eq!(idx(2), iter.range().from);
    let data: Vec<_> = iter.map(|e| e.data).collect();
    assert_eq!(vec![bytes::Bytes::from("a")], data);

    assert!(matches!(
        test.leader.wait_for_iterator(LogIndex::default()).await,
        Err(LeaderError::BadParameter(_))
    ));
}

#[tokio::test]
async fn log_queries() {
    // -- setup --
    let test = setup(&["L"], 1, InMemoryStorageEngine::new(), None);
    let index = test.leader.insert(LogPayload::normal("a"), false).unwrap();
    test.leader.wait_for(index).await.unwrap();
    test.leader.ping(Some("hello".into())).unwrap();

    // -- execute --
    let internal: Vec<u64> = test
        .leader
        .get_internal_log_iterator(None)
        .unwrap()
        .map(|e| e.index.as_u64())
        .collect();
    let committed: Vec<u64> = test
        .leader
        .get_committed_log_iterator(None)
        .unwrap()
        .map(|e| e.index.as_u64())
        .collect();
    let snapshot = test.leader.get_replicated_log_snapshot();

    // -- verify --
    assert_eq!(vec![1, 2, 3], internal);
    assert_eq!(vec![2], committed);
    let commit_index = test.leader.get_commit_index();
    assert!(!snapshot.is_empty());
    assert!(snapshot.iter().all(|e| e.index <= commit_index));
}

#[tokio::test]
async fn evicted_entries_are_read_back_from_storage() {
    // -- setup --
    let test = setup(&["L"], 1, InMemoryStorageEngine::new(), None);
    test.leader.insert(LogPayload::normal("a"), false).unwrap();
    let index = test.leader.insert(LogPayload::normal("b"), false).unwrap();
    test.leader.wait_for(index).await.unwrap();
    assert!(test.leader.copy_in_memory_log().first_index() > idx(2));

    // -- execute --
    let iter = test
        .leader
        .get_committed_log_iterator(Some(LogRange::new(idx(1), idx(3))))
        .unwrap();

    // -- verify --
    assert_eq!(LogRange::new(idx(1), idx(3)), iter.range());
    let data: Vec<_> = iter.map(|e| e.data).collect();
    assert_eq!(vec![bytes::Bytes::from("a")], data);
}

#[tokio::test]
async fn snapshot_reports_are_monotonic() {
    // -- setup --
    let test = setup(&["L", "F1"], 2, InMemoryStorageEngine::new(), None);
    let f1 = ParticipantId::new("F1");
    let snapshot_of = |leader: &LogLeader| {
        leader.get_status().unwrap().follower[&ParticipantId::new("F1")].snapshot_available
    };
    assert!(!snapshot_of(test.leader.as_ref()));

    // -- execute --
    test.leader
        .set_snapshot_available(&f1, SnapshotAvailableReport { message_id: MessageId::new(5) })
        .unwrap();
    test.leader.acquire_mutex().follower.get_mut(&f1).unwrap().snapshot_available = false;
    test.leader
        .set_snapshot_available(&f1, SnapshotAvailableReport { message_id: MessageId::new(3) })
        .unwrap();

    // -- verify --
    assert!(!snapshot_of(test.leader.as_ref()));
    assert!(matches!(
        test.leader.set_snapshot_available(
            &ParticipantId::new("X"),
            SnapshotAvailableReport {
                message_id: MessageId::new(1)
            }
        ),
        Err(LeaderError::NotFollower(_))
    ));
    let quick = test.leader.get_quick_status().unwrap();
    assert_eq!(LocalStateMachineStatus::Operational, quick.local_state);
    assert!(quick.commit_fail_reason.is_none());
    assert_eq!(vec![ParticipantId::new("L")], quick.followers_with_snapshot);
}

#[tokio::test]
async fn release_and_compact() {
    // -- setup --
    let test = setup(&["L"], 1, InMemoryStorageEngine::new(), None);
    for data in ["a", "b", "c"] {
        test.leader.insert(LogPayload::normal(data), false).unwrap();
    }
    test.leader.wait_for(idx(4)).await.unwrap();
    // Lowest index to keep trails the commit index by one round.
    let index = test.leader.ping(None).unwrap();
    test.leader.wait_for(index).await.unwrap();

    // -- execute --
    assert!(matches!(test.leader.release(idx(10)), Err(LeaderError::BadParameter(_))));
    test.leader.release(idx(3)).unwrap();
    let result = test.leader.compact().await.unwrap();

    // -- verify --
    assert_eq!(3, result.num_entries_compacted);
    assert_eq!(
        Some(CompactionStopReason::NotReleasedByStateMachine { released_index: idx(3) }),
        result.stop_reason
    );
    assert_eq!(idx(4), test.engine.entries()[0].index);
    assert_eq!(3, test.metrics.snapshot().compaction_num_entries);
}

#[tokio::test]
async fn state_machine_inserts_through_leader_methods() {
    // -- setup --
    let test = setup(&["L"], 1, InMemoryStorageEngine::new(), None);
    test.leader.wait_for_leadership().await.unwrap();

    // -- execute --
    let (index, action) = test
        .state
        .methods()
        .as_ref()
        .unwrap()
        .insert_deferred(LogPayload::normal("a"), true)
        .unwrap();
    action.fire();
    let waiter = test.state.methods().as_ref().unwrap().wait_for(index);

    // -- verify --
    assert_eq!(idx(2), waiter.await.unwrap().quorum.index);
    // First entry of the term and the client entry.
    assert_eq!(2, test.engine.num_synced_writes());
}
