use serde::{Deserialize, Serialize};
use std::fmt;

/// LogIndex is the position of an entry in the log. Real entries start at 1; index 0 means
/// "before the first entry".
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogIndex(u64);

impl LogIndex {
    pub const fn new(index: u64) -> Self {
        LogIndex(index)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn plus(&self, delta: u64) -> LogIndex {
        LogIndex(self.0 + delta)
    }

    pub fn checked_minus(&self, delta: u64) -> Option<LogIndex> {
        self.0.checked_sub(delta).map(LogIndex)
    }

    /// Steps back by one, stopping at 0.
    pub fn saturating_decrement(&self) -> LogIndex {
        LogIndex(self.0.saturating_sub(1))
    }

    /// Number of indexes in `[self, other)`. Zero if `other <= self`.
    pub fn distance_to(&self, other: LogIndex) -> u64 {
        other.0.saturating_sub(self.0)
    }
}

impl fmt::Debug for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogTerm(u64);

impl LogTerm {
    pub const fn new(term: u64) -> Self {
        LogTerm(term)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LogTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LogTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TermIndexPair orders by term first, then by index.
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
pub struct TermIndexPair {
    pub term: LogTerm,
    pub index: LogIndex,
}

impl TermIndexPair {
    pub fn new(term: LogTerm, index: LogIndex) -> Self {
        TermIndexPair { term, index }
    }
}

impl fmt::Debug for TermIndexPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.term, self.index)
    }
}

/// Half-open range `[from, to)` of log indexes.
#[derive(Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRange {
    pub from: LogIndex,
    pub to: LogIndex,
}

impl LogRange {
    pub fn new(from: LogIndex, to: LogIndex) -> Self {
        LogRange { from, to }
    }

    pub fn empty_at(index: LogIndex) -> Self {
        LogRange { from: index, to: index }
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    pub fn count(&self) -> u64 {
        self.from.distance_to(self.to)
    }

    pub fn contains(&self, index: LogIndex) -> bool {
        self.from <= index && index < self.to
    }

    pub fn intersect(&self, other: LogRange) -> LogRange {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        if from >= to {
            LogRange::empty_at(from)
        } else {
            LogRange { from, to }
        }
    }
}

impl fmt::Debug for LogRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

#[derive(Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        ParticipantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        ParticipantId::new(id)
    }
}

/// MessageId is a per-follower logical clock. The leader increments it for every request it
/// sends to that follower, and only the reply to the latest request is applied.
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub const fn new(id: u64) -> Self {
        MessageId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn incr(&mut self) -> MessageId {
        self.0 += 1;
        *self
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
