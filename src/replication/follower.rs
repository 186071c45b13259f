use crate::errors::FollowerError;
use crate::log::ParticipantId;
use crate::replication::local_follower::LocalFollower;
use crate::replication::{AppendEntriesRequest, AppendEntriesResult};
use std::sync::Arc;

/// LogFollower is the leader's view of a remote participant. Implementations own the transport,
/// including its timeouts. They have to answer requests in message-id order.
#[async_trait::async_trait]
pub trait LogFollower: Send + Sync {
    fn participant_id(&self) -> &ParticipantId;

    async fn append_entries(&self, request: AppendEntriesRequest) -> Result<AppendEntriesResult, FollowerError>;
}

pub trait FollowerFactory: Send + Sync {
    fn construct_follower(&self, participant: &ParticipantId) -> Arc<dyn LogFollower>;
}

/// Follower is either the leader itself, writing to its own storage, or a remote participant.
pub(crate) enum Follower {
    Local(LocalFollower),
    Remote(Arc<dyn LogFollower>),
}

impl Follower {
    pub(crate) fn participant_id(&self) -> &ParticipantId {
        match self {
            Follower::Local(local) => local.participant_id(),
            Follower::Remote(remote) => remote.participant_id(),
        }
    }

    pub(crate) async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResult, FollowerError> {
        match self {
            Follower::Local(local) => Ok(local.append_entries(request).await),
            Follower::Remote(remote) => remote.append_entries(request).await,
        }
    }
}
