use crate::log::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParticipantFlags {
    pub allowed_in_quorum: bool,
    pub allowed_as_leader: bool,
    /// A forced participant has to be part of every quorum, regardless of the write concern.
    pub forced: bool,
}

impl Default for ParticipantFlags {
    fn default() -> Self {
        ParticipantFlags {
            allowed_in_quorum: true,
            allowed_as_leader: true,
            forced: false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    pub effective_write_concern: usize,
    pub wait_for_sync: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            effective_write_concern: 1,
            wait_for_sync: false,
        }
    }
}

/// ParticipantsConfig is the set of participants of a replicated log plus the replication
/// settings that go with them. Every change bumps the generation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParticipantsConfig {
    pub generation: u64,
    pub participants: BTreeMap<ParticipantId, ParticipantFlags>,
    pub config: LogConfig,
}

impl ParticipantsConfig {
    pub fn new(generation: u64, config: LogConfig) -> Self {
        ParticipantsConfig {
            generation,
            participants: BTreeMap::new(),
            config,
        }
    }

    pub fn with_participant(mut self, id: impl Into<ParticipantId>, flags: ParticipantFlags) -> Self {
        self.participants.insert(id.into(), flags);
        self
    }

    pub fn flags(&self, id: &ParticipantId) -> Option<&ParticipantFlags> {
        self.participants.get(id)
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.config.effective_write_concern == 0 {
            return Err("Effective write concern must be at least 1");
        }

        Ok(())
    }
}
