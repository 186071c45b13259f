use crate::config::ParticipantFlags;
use crate::log::{LogIndex, ParticipantId, TermIndexPair};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub(crate) struct ParticipantState {
    pub(crate) id: ParticipantId,
    pub(crate) last_acked_entry: TermIndexPair,
    pub(crate) snapshot_available: bool,
    pub(crate) flags: ParticipantFlags,
}

impl ParticipantState {
    fn is_quorum_eligible(&self) -> bool {
        self.flags.allowed_in_quorum && self.snapshot_available
    }

    // Highest index this participant acknowledged within the term of `spearhead`.
    fn acked_in_term(&self, spearhead: TermIndexPair) -> LogIndex {
        if self.last_acked_entry.term == spearhead.term {
            self.last_acked_entry.index.min(spearhead.index)
        } else {
            LogIndex::default()
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonEligibleReason {
    NotAllowedInQuorum,
    SnapshotMissing,
}

/// Why the commit index does not move past its current value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum CommitFailReason {
    NothingToCommit,
    #[serde(rename_all = "kebab-case")]
    QuorumSizeNotReached {
        who: Vec<ParticipantId>,
        spearhead: TermIndexPair,
    },
    #[serde(rename_all = "kebab-case")]
    ForcedParticipantNotInQuorum { who: ParticipantId },
    #[serde(rename_all = "kebab-case")]
    NonEligibleServerRequiredForQuorum {
        candidates: BTreeMap<ParticipantId, NonEligibleReason>,
    },
    #[serde(rename_all = "kebab-case")]
    FewerParticipantsThanWriteConcern {
        effective_write_concern: usize,
        num_participants: usize,
    },
}

impl Default for CommitFailReason {
    fn default() -> Self {
        CommitFailReason::NothingToCommit
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CommitCalculation {
    pub(crate) commit_index: LogIndex,
    pub(crate) reason: CommitFailReason,
    /// Empty unless the commit index advanced.
    pub(crate) quorum: Vec<ParticipantId>,
}

/// Computes the commit index for the leader's current term (the term of `spearhead`).
///
/// An index counts as acknowledged by a participant only if that participant's last acked entry
/// is from the current term. `write_concern` quorum-eligible participants have to acknowledge an
/// index, and so do all forced participants. Among the sets that qualify, the quorum reported is
/// the lexicographically smallest list of participants.
pub(crate) fn calculate_commit_index(
    participants: &[ParticipantState],
    write_concern: usize,
    current_commit: LogIndex,
    spearhead: TermIndexPair,
) -> CommitCalculation {
    let term = spearhead.term;
    for p in participants {
        assert!(
            p.last_acked_entry.term <= term,
            "Participant {} acked {:?}, which is ahead of the current term {:?}",
            p.id,
            p.last_acked_entry,
            term
        );
    }

    if participants.len() < write_concern {
        return CommitCalculation {
            commit_index: current_commit,
            reason: CommitFailReason::FewerParticipantsThanWriteConcern {
                effective_write_concern: write_concern,
                num_participants: participants.len(),
            },
            quorum: vec![],
        };
    }

    let mut eligible: Vec<&ParticipantState> = participants.iter().filter(|p| p.is_quorum_eligible()).collect();
    eligible.sort_by(|a, b| a.id.cmp(&b.id));

    let forced_bound = participants
        .iter()
        .filter(|p| p.flags.forced && p.flags.allowed_in_quorum)
        .map(|p| if p.is_quorum_eligible() { p.acked_in_term(spearhead) } else { LogIndex::default() })
        .min()
        .unwrap_or(spearhead.index);

    let mut acked: Vec<LogIndex> = eligible.iter().map(|p| p.acked_in_term(spearhead)).collect();
    acked.sort_by(|a, b| b.cmp(a));
    let quorum_bound = if write_concern > 0 && acked.len() >= write_concern {
        acked[write_concern - 1]
    } else {
        LogIndex::default()
    };

    let candidate = quorum_bound.min(forced_bound);
    if candidate > current_commit {
        let mut quorum: Vec<ParticipantId> = eligible
            .iter()
            .filter(|p| p.flags.forced)
            .map(|p| p.id.clone())
            .collect();
        for p in eligible.iter().filter(|p| p.acked_in_term(spearhead) >= candidate) {
            if quorum.len() >= write_concern {
                break;
            }
            if !quorum.contains(&p.id) {
                quorum.push(p.id.clone());
            }
        }
        quorum.sort();

        return CommitCalculation {
            commit_index: candidate,
            reason: why_not(participants, &eligible, write_concern, candidate, spearhead),
            quorum,
        };
    }

    CommitCalculation {
        commit_index: current_commit,
        reason: why_not(participants, &eligible, write_concern, current_commit, spearhead),
        quorum: vec![],
    }
}

// Explains why `commit_index + 1` is not committed.
fn why_not(
    participants: &[ParticipantState],
    eligible: &[&ParticipantState],
    write_concern: usize,
    commit_index: LogIndex,
    spearhead: TermIndexPair,
) -> CommitFailReason {
    if commit_index >= spearhead.index {
        return CommitFailReason::NothingToCommit;
    }
    let target = commit_index.plus(1);

    let blocking_forced = participants
        .iter()
        .filter(|p| p.flags.forced && p.flags.allowed_in_quorum)
        .find(|p| !p.is_quorum_eligible() || p.acked_in_term(spearhead) < target);
    if let Some(p) = blocking_forced {
        return CommitFailReason::ForcedParticipantNotInQuorum { who: p.id.clone() };
    }

    if eligible.len() < write_concern {
        let candidates = participants
            .iter()
            .filter(|p| !p.is_quorum_eligible())
            .map(|p| {
                let reason = if p.flags.allowed_in_quorum {
                    NonEligibleReason::SnapshotMissing
                } else {
                    NonEligibleReason::NotAllowedInQuorum
                };
                (p.id.clone(), reason)
            })
            .collect();
        return CommitFailReason::NonEligibleServerRequiredForQuorum { candidates };
    }

    let who = eligible
        .iter()
        .filter(|p| p.acked_in_term(spearhead) < target)
        .map(|p| p.id.clone())
        .collect();
    CommitFailReason::QuorumSizeNotReached { who, spearhead }
}
