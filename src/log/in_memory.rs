use crate::log::{InMemoryLogEntry, LogIndex, LogRange, LogTerm, TermIndexPair};
use std::collections::VecDeque;

/// InMemoryLog is the tail of the replicated log that the leader keeps in RAM. Entries are only
/// appended at the back and only evicted from the front, so the held range is always contiguous.
///
/// When every entry has been evicted (or none was ever appended), the log remembers the pair of
/// the entry just before its first index, so the spearhead stays well defined.
#[derive(Clone, Debug)]
pub struct InMemoryLog {
    entries: VecDeque<InMemoryLogEntry>,
    first_index: LogIndex,
    // Entry right before `first_index`. (0:0) for a fresh log.
    previous: TermIndexPair,
}

impl InMemoryLog {
    /// Creates an empty log whose next entry has to be `previous.index + 1`.
    pub fn new(previous: TermIndexPair) -> Self {
        InMemoryLog {
            entries: VecDeque::new(),
            first_index: previous.index.plus(1),
            previous,
        }
    }

    pub fn append(&mut self, entry: InMemoryLogEntry) {
        let last = self.last_term_index_pair();
        // Panic here, the leader is building its own log and is tracking state wrong.
        assert_eq!(
            entry.index(),
            last.index.plus(1),
            "In-memory log must stay contiguous. Last={:?}, New={:?}",
            last,
            entry.entry.term_index_pair()
        );
        assert!(
            entry.term() >= last.term,
            "Terms can only ratchet forward. Last={:?}, New={:?}",
            last,
            entry.entry.term_index_pair()
        );

        self.entries.push_back(entry);
    }

    pub fn get(&self, index: LogIndex) -> Option<&InMemoryLogEntry> {
        if index < self.first_index {
            return None;
        }
        self.entries.get(self.first_index.distance_to(index) as usize)
    }

    pub fn term_of(&self, index: LogIndex) -> Option<LogTerm> {
        if index == self.previous.index && index.as_u64() > 0 {
            return Some(self.previous.term);
        }
        self.get(index).map(|e| e.term())
    }

    /// Entries in `[from, to)` clipped to what is held in memory.
    pub fn slice(&self, from: LogIndex, to: LogIndex) -> impl Iterator<Item = &InMemoryLogEntry> {
        let range = self.index_range().intersect(LogRange::new(from, to));
        let skip = self.first_index.distance_to(range.from) as usize;
        self.entries.iter().skip(skip).take(range.count() as usize)
    }

    /// Lazy iterator over every entry from `index` to the end. If `index` lies before the first
    /// held entry, iteration starts at the first held entry and the caller has to fetch the gap
    /// from storage.
    pub fn iter_from(&self, index: LogIndex) -> impl Iterator<Item = &InMemoryLogEntry> {
        self.slice(index, self.next_index())
    }

    pub fn first_index(&self) -> LogIndex {
        self.first_index
    }

    pub fn last_index(&self) -> LogIndex {
        self.last_term_index_pair().index
    }

    pub fn next_index(&self) -> LogIndex {
        self.last_index().plus(1)
    }

    pub fn last_term_index_pair(&self) -> TermIndexPair {
        self.entries
            .back()
            .map(|e| e.entry.term_index_pair())
            .unwrap_or(self.previous)
    }

    pub fn index_range(&self) -> LogRange {
        LogRange::new(self.first_index, self.next_index())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts every entry with an index lower than `stop`. Returns how many were removed.
    pub fn remove_front(&mut self, stop: LogIndex) -> usize {
        let mut removed = 0;
        while let Some(front) = self.entries.front() {
            if front.index() >= stop {
                break;
            }
            self.previous = front.entry.term_index_pair();
            self.entries.pop_front();
            removed += 1;
        }
        self.first_index = self.previous.index.plus(1);

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogEntry, LogPayload};

    fn entry(term: u64, index: u64) -> InMemoryLogEntry {
        InMemoryLogEntry::new(
            LogEntry::new(
                LogTerm::new(term),
                LogIndex::new(index),
                LogPayload::normal(format!("{}", index)),
            ),
            false,
        )
    }

    fn log_with(previous: TermIndexPair, range: std::ops::RangeInclusive<u64>, term: u64) -> InMemoryLog {
        let mut log = InMemoryLog::new(previous);
        for i in range {
            log.append(entry(term, i));
        }
        log
    }

    #[test]
    fn empty_log_reports_previous_pair() {
        let previous = TermIndexPair::new(LogTerm::new(2), LogIndex::new(7));
        let log = InMemoryLog::new(previous);

        assert!(log.is_empty());
        assert_eq!(LogIndex::new(8), log.first_index());
        assert_eq!(LogIndex::new(7), log.last_index());
        assert_eq!(previous, log.last_term_index_pair());
        assert_eq!(Some(LogTerm::new(2)), log.term_of(LogIndex::new(7)));
        assert!(log.get(LogIndex::new(7)).is_none());
    }

    #[test]
    fn slice_and_iter_from_clip_to_held_range() {
        let log = log_with(TermIndexPair::default(), 1..=5, 1);

        let sliced: Vec<u64> = log
            .slice(LogIndex::new(2), LogIndex::new(4))
            .map(|e| e.index().as_u64())
            .collect();
        assert_eq!(vec![2, 3], sliced);

        let tail: Vec<u64> = log.iter_from(LogIndex::new(4)).map(|e| e.index().as_u64()).collect();
        assert_eq!(vec![4, 5], tail);

        assert_eq!(0, log.iter_from(LogIndex::new(6)).count());
    }

    #[test]
    fn remove_front_keeps_entries_from_stop() {
        // -- setup --
        let mut log = log_with(TermIndexPair::default(), 1..=5, 3);

        // -- execute --
        let removed = log.remove_front(LogIndex::new(4));

        // -- verify --
        assert_eq!(3, removed);
        assert_eq!(LogIndex::new(4), log.first_index());
        assert_eq!(LogIndex::new(5), log.last_index());
        assert!(log.get(LogIndex::new(3)).is_none());
        assert_eq!(Some(LogTerm::new(3)), log.term_of(LogIndex::new(3)));
        assert_eq!(
            vec![4, 5],
            log.iter_from(LogIndex::new(1))
                .map(|e| e.index().as_u64())
                .collect::<Vec<_>>()
        );

        // Evicting everything keeps the spearhead.
        log.remove_front(LogIndex::new(100));
        assert!(log.is_empty());
        assert_eq!(TermIndexPair::new(LogTerm::new(3), LogIndex::new(5)), log.last_term_index_pair());
        assert_eq!(LogIndex::new(6), log.next_index());
    }

    #[test]
    #[should_panic]
    fn append_rejects_gaps() {
        let mut log = log_with(TermIndexPair::default(), 1..=2, 1);
        log.append(entry(1, 4));
    }

    #[test]
    #[should_panic]
    fn append_rejects_older_terms() {
        let mut log = log_with(TermIndexPair::default(), 1..=2, 2);
        log.append(entry(1, 3));
    }
}
