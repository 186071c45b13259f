mod commit;
mod follower;
mod follower_info;
mod leader;
mod local_follower;
mod messages;

pub use commit::CommitFailReason;
pub use commit::NonEligibleReason;
pub use follower::FollowerFactory;
pub use follower::LogFollower;
pub use leader::CompactionResult;
pub use leader::FollowerReplicationState;
pub use leader::FollowerStatistics;
pub use leader::LeaderStatus;
pub use leader::LogLeader;
pub use leader::LogLeaderConfig;
pub use leader::LogStatistics;
pub use leader::ParticipantRole;
pub use leader::QuickLogStatus;
pub use leader::QuorumData;
pub use leader::ResignedLeader;
pub use leader::SnapshotAvailableReport;
pub use leader::WaitForFuture;
pub use leader::WaitForResignFuture;
pub use leader::WaitForResult;
pub use messages::AppendEntriesErrorReason;
pub use messages::AppendEntriesErrorType;
pub use messages::AppendEntriesRequest;
pub use messages::AppendEntriesResult;
