use crate::log::{LogIndex, LogRange, LogTerm, TermIndexPair};

/// TermIndexMapping records which index range belongs to which term, as one run per term.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TermIndexMapping {
    runs: Vec<(LogTerm, LogRange)>,
}

impl TermIndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pair: TermIndexPair) {
        if let Some((term, range)) = self.runs.last_mut() {
            assert_eq!(
                range.to, pair.index,
                "Term index mapping must stay contiguous. Next={:?}, New={:?}",
                range.to, pair
            );
            assert!(*term <= pair.term, "Terms can only ratchet forward. Last={:?}, New={:?}", term, pair);
            if *term == pair.term {
                range.to = pair.index.plus(1);
                return;
            }
        }

        self.runs.push((pair.term, LogRange::new(pair.index, pair.index.plus(1))));
    }

    pub fn term_of_index(&self, index: LogIndex) -> Option<LogTerm> {
        self.runs
            .iter()
            .find(|(_, range)| range.contains(index))
            .map(|(term, _)| *term)
    }

    pub fn first_index(&self) -> Option<TermIndexPair> {
        self.runs.first().map(|(term, range)| TermIndexPair::new(*term, range.from))
    }

    pub fn last_index(&self) -> Option<TermIndexPair> {
        self.runs
            .last()
            .map(|(term, range)| TermIndexPair::new(*term, range.to.saturating_decrement()))
    }

    pub fn index_range(&self) -> LogRange {
        match (self.runs.first(), self.runs.last()) {
            (Some((_, first)), Some((_, last))) => LogRange::new(first.from, last.to),
            _ => LogRange::default(),
        }
    }

    /// Drops every index lower than `stop`.
    pub fn remove_front(&mut self, stop: LogIndex) {
        self.runs.retain(|(_, range)| range.to > stop);
        if let Some((_, range)) = self.runs.first_mut() {
            range.from = range.from.max(stop);
        }
    }

    /// Drops every index starting at `start`.
    pub fn remove_back(&mut self, start: LogIndex) {
        self.runs.retain(|(_, range)| range.from < start);
        if let Some((_, range)) = self.runs.last_mut() {
            range.to = range.to.min(start);
        }
    }
}
