use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use logsift_types::StreamKind;

use crate::ingest::IngestResult;
use crate::record::LogRecord;

/// Errors moving the visible window
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("index {index} is outside the {len} loaded records")]
    OutOfRange { index: usize, len: usize },

    #[error("cannot set first visible record after last visible record")]
    FirstAfterLast,

    #[error("cannot set last visible record before first visible record")]
    LastBeforeFirst,
}

/// Records of the current load plus the window of them that is visible
///
/// The window hides records before `first` and after `last` (both
/// inclusive bounds). Each load resets it to cover everything.
#[derive(Debug, Default)]
pub struct LogStore {
    records: Vec<Arc<LogRecord>>,
    available_streams: BTreeSet<StreamKind>,
    loaded_sources: Vec<String>,
    skipped_sources: Vec<String>,
    potential_bug_reports: BTreeMap<String, String>,

    first_visible: usize,
    last_visible: Option<usize>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a new load
    pub fn load(&mut self, result: IngestResult) {
        self.records = result.records;
        self.available_streams = result.available_streams;
        self.loaded_sources = result.loaded_sources;
        self.skipped_sources = result.skipped;
        self.potential_bug_reports = result.potential_bug_reports;
        self.first_visible = 0;
        self.last_visible = None;
    }

    /// Every record of the load, ignoring the window
    pub fn all(&self) -> &[Arc<LogRecord>] {
        &self.records
    }

    /// Records inside the visible window
    pub fn visible(&self) -> &[Arc<LogRecord>] {
        let (first, last) = self.window();
        if self.records.is_empty() {
            return &[];
        }
        &self.records[first..=last]
    }

    /// Inclusive bounds of the visible window
    pub fn window(&self) -> (usize, usize) {
        let last = self
            .last_visible
            .unwrap_or(self.records.len().saturating_sub(1));
        (self.first_visible, last)
    }

    /// Hide records before `index`; `None` shows them again
    pub fn set_first_visible(&mut self, index: Option<usize>) -> Result<(), WindowError> {
        let Some(index) = index else {
            self.first_visible = 0;
            return Ok(());
        };
        self.check_index(index)?;
        if self.last_visible.is_some_and(|last| index > last) {
            return Err(WindowError::FirstAfterLast);
        }
        self.first_visible = index;
        Ok(())
    }

    /// Hide records after `index`; `None` shows them again
    pub fn set_last_visible(&mut self, index: Option<usize>) -> Result<(), WindowError> {
        let Some(index) = index else {
            self.last_visible = None;
            return Ok(());
        };
        self.check_index(index)?;
        if index < self.first_visible {
            return Err(WindowError::LastBeforeFirst);
        }
        self.last_visible = Some(index);
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), WindowError> {
        if index >= self.records.len() {
            return Err(WindowError::OutOfRange {
                index,
                len: self.records.len(),
            });
        }
        Ok(())
    }

    /// Visible record equal to `record`, typically one from an earlier load
    ///
    /// Binary search on the timestamp, then a scan of records sharing it.
    pub fn matching_record(&self, record: &LogRecord) -> Option<Arc<LogRecord>> {
        let visible = self.visible();
        let timestamp = record.timestamp();
        let start = visible.partition_point(|r| r.timestamp() < timestamp);
        visible[start..]
            .iter()
            .take_while(|r| r.timestamp() == timestamp)
            .find(|r| ***r == *record)
            .cloned()
    }

    pub fn available_streams(&self) -> &BTreeSet<StreamKind> {
        &self.available_streams
    }

    pub fn loaded_sources(&self) -> &[String] {
        &self.loaded_sources
    }

    pub fn skipped_sources(&self) -> &[String] {
        &self.skipped_sources
    }

    pub fn potential_bug_reports(&self) -> &BTreeMap<String, String> {
        &self.potential_bug_reports
    }

    /// Number of records in the load, ignoring the window
    pub fn all_len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw text of `records`, one per line
    pub fn export(records: &[Arc<LogRecord>]) -> String {
        let mut out = String::with_capacity(records.iter().map(|r| r.len() + 1).sum());
        for record in records {
            out.push_str(record.text());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{LogIngestionPipeline, SourceText};
    use crate::progress::NoProgress;
    use logsift_types::{Level, Timestamp};

    const TEXT: &str = "\
01-01 00:00:01.000 1-1/? I/T: one
01-01 00:00:02.000 1-1/? I/T: two
01-01 00:00:02.000 1-1/? I/T: two bis
01-01 00:00:03.000 1-1/? I/T: three
01-01 00:00:04.000 1-1/? I/T: four
";

    fn store() -> LogStore {
        let mut store = LogStore::new();
        store.load(LogIngestionPipeline::default().parse(&[SourceText::new("main", TEXT)], &NoProgress));
        store
    }

    fn texts(records: &[Arc<LogRecord>]) -> Vec<&str> {
        records.iter().map(|r| r.text()).collect()
    }

    #[test]
    fn test_full_window_after_load() {
        let store = store();
        assert_eq!(store.all_len(), 5);
        assert_eq!(store.visible().len(), 5);
        assert_eq!(store.window(), (0, 4));
        assert_eq!(store.loaded_sources(), ["main"]);
    }

    #[test]
    fn test_window_bounds() {
        let mut store = store();
        store.set_first_visible(Some(1)).unwrap();
        store.set_last_visible(Some(3)).unwrap();
        assert_eq!(
            texts(store.visible()),
            vec![
                "01-01 00:00:02.000 1-1/? I/T: two",
                "01-01 00:00:02.000 1-1/? I/T: two bis",
                "01-01 00:00:03.000 1-1/? I/T: three",
            ]
        );

        assert_eq!(store.set_first_visible(Some(4)), Err(WindowError::FirstAfterLast));
        assert_eq!(store.set_last_visible(Some(0)), Err(WindowError::LastBeforeFirst));
        assert_eq!(
            store.set_last_visible(Some(5)),
            Err(WindowError::OutOfRange { index: 5, len: 5 })
        );

        store.set_first_visible(None).unwrap();
        store.set_last_visible(None).unwrap();
        assert_eq!(store.visible().len(), 5);
    }

    #[test]
    fn test_reload_resets_window() {
        let mut store = store();
        store.set_first_visible(Some(2)).unwrap();
        store.load(LogIngestionPipeline::default().parse(&[SourceText::new("main", TEXT)], &NoProgress));
        assert_eq!(store.window(), (0, 4));
    }

    #[test]
    fn test_matching_record() {
        let mut store = store();
        let probe = LogRecord::new(
            "01-01 00:00:02.000 1-1/? I/T: two bis",
            Level::Info,
            Some(Timestamp::new(1, 1, 0, 0, 2, 0)),
        );
        let found = store.matching_record(&probe).unwrap();
        assert_eq!(found.sequence_index(), 2);

        store.set_last_visible(Some(1)).unwrap();
        assert!(store.matching_record(&probe).is_none());

        let absent = LogRecord::new("nope", Level::Info, Some(Timestamp::new(1, 1, 0, 0, 2, 0)));
        assert!(store.matching_record(&absent).is_none());
    }

    #[test]
    fn test_empty_store() {
        let store = LogStore::new();
        assert!(store.visible().is_empty());
        assert!(store.matching_record(&LogRecord::new("x", Level::Info, None)).is_none());
    }

    #[test]
    fn test_export() {
        let store = store();
        let exported = LogStore::export(&store.visible()[..2]);
        assert_eq!(
            exported,
            "01-01 00:00:01.000 1-1/? I/T: one\n01-01 00:00:02.000 1-1/? I/T: two\n"
        );
    }
}
