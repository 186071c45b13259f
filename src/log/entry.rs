use crate::config::ParticipantsConfig;
use crate::log::{LogIndex, LogTerm, ParticipantId, TermIndexPair};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Fixed per-entry overhead (term + index + tag) added to the payload size when estimating how
/// many bytes an entry occupies on the wire.
const ENTRY_OVERHEAD_BYTES: usize = 8 + 8 + 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LogPayload {
    Normal { bytes: Bytes },
    Meta(LogMetaPayload),
}

impl LogPayload {
    pub fn normal(bytes: impl Into<Bytes>) -> Self {
        LogPayload::Normal { bytes: bytes.into() }
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, LogPayload::Meta(_))
    }

    pub fn byte_size(&self) -> usize {
        match self {
            LogPayload::Normal { bytes } => bytes.len(),
            // Meta entries are rare and small; their json size is a good enough estimate.
            LogPayload::Meta(meta) => serde_json::to_vec(meta).map(|v| v.len()).unwrap_or(0),
        }
    }
}

/// Entries the replication layer writes for its own bookkeeping. They are replicated and
/// committed like normal entries but never handed to log consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "data", rename_all = "kebab-case")]
pub enum LogMetaPayload {
    FirstEntryOfTerm {
        leader: ParticipantId,
        participants: ParticipantsConfig,
    },
    UpdateParticipantsConfig {
        participants: ParticipantsConfig,
    },
    Ping {
        message: Option<String>,
        /// Milliseconds since the unix epoch, taken on the leader.
        time_ms: u64,
    },
}

impl LogMetaPayload {
    pub fn ping(message: Option<String>) -> Self {
        let time_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        LogMetaPayload::Ping { message, time_ms }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogEntry {
    pub term: LogTerm,
    pub index: LogIndex,
    pub payload: LogPayload,
}

impl LogEntry {
    pub fn new(term: LogTerm, index: LogIndex, payload: LogPayload) -> Self {
        LogEntry { term, index, payload }
    }

    pub fn term_index_pair(&self) -> TermIndexPair {
        TermIndexPair::new(self.term, self.index)
    }

    pub fn approx_byte_size(&self) -> usize {
        ENTRY_OVERHEAD_BYTES + self.payload.byte_size()
    }
}

/// An entry as the leader holds it in memory: the log entry plus replication bookkeeping.
#[derive(Clone, Debug)]
pub struct InMemoryLogEntry {
    pub entry: LogEntry,
    pub wait_for_sync: bool,
    pub(crate) insert_time: Instant,
}

impl InMemoryLogEntry {
    pub fn new(entry: LogEntry, wait_for_sync: bool) -> Self {
        InMemoryLogEntry {
            entry,
            wait_for_sync,
            insert_time: Instant::now(),
        }
    }

    pub fn index(&self) -> LogIndex {
        self.entry.index
    }

    pub fn term(&self) -> LogTerm {
        self.entry.term
    }
}

/// Entry as it travels inside an AppendEntries request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReplicatedLogEntry {
    pub term: LogTerm,
    pub index: LogIndex,
    pub payload: LogPayload,
    pub wait_for_sync: bool,
}

impl From<&InMemoryLogEntry> for ReplicatedLogEntry {
    fn from(e: &InMemoryLogEntry) -> Self {
        ReplicatedLogEntry {
            term: e.entry.term,
            index: e.entry.index,
            payload: e.entry.payload.clone(),
            wait_for_sync: e.wait_for_sync,
        }
    }
}

impl From<ReplicatedLogEntry> for LogEntry {
    fn from(e: ReplicatedLogEntry) -> Self {
        LogEntry::new(e.term, e.index, e.payload)
    }
}

/// What a log consumer sees: the index and the client payload of a normal entry.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntryView {
    pub index: LogIndex,
    pub data: Bytes,
}

impl LogEntryView {
    pub(crate) fn from_entry(entry: &LogEntry) -> Option<Self> {
        match &entry.payload {
            LogPayload::Normal { bytes } => Some(LogEntryView {
                index: entry.index,
                data: bytes.clone(),
            }),
            LogPayload::Meta(_) => None,
        }
    }
}
