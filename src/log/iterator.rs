use crate::log::{LogEntry, LogEntryView, LogRange};
use std::vec;

/// Iterator over persisted entries, meta entries included.
pub type PersistedLogIterator = Box<dyn Iterator<Item = LogEntry> + Send>;

/// LogRangeIterator hands out the client payloads of a range of committed entries. Meta entries
/// inside the range are skipped; `range()` still reports the full range that was covered.
#[derive(Debug)]
pub struct LogRangeIterator {
    range: LogRange,
    entries: vec::IntoIter<LogEntryView>,
}

impl LogRangeIterator {
    pub(crate) fn new(range: LogRange, entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let views: Vec<LogEntryView> = entries
            .into_iter()
            .filter(|e| range.contains(e.index))
            .filter_map(|e| LogEntryView::from_entry(&e))
            .collect();

        LogRangeIterator {
            range,
            entries: views.into_iter(),
        }
    }

    pub fn range(&self) -> LogRange {
        self.range
    }
}

impl Iterator for LogRangeIterator {
    type Item = LogEntryView;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}
