use std::sync::Arc;

use parking_lot::RwLock;

use crate::record::LogRecord;

/// Thread-safe, chronologically ordered set of pinned records ("my logs")
///
/// Records are kept sorted by timestamp. A record inserted next to others
/// with the same timestamp goes after them. Inserting a record equal to one
/// already present does nothing.
#[derive(Clone, Default)]
pub struct OrderedUniqueLogSet {
    /// Internal storage
    entries: Arc<RwLock<Vec<Arc<LogRecord>>>>,
}

impl OrderedUniqueLogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` at its chronological position
    ///
    /// Returns `false` if an equal record is already present.
    pub fn insert(&self, record: Arc<LogRecord>) -> bool {
        let mut entries = self.entries.write();
        let (lower, upper) = equal_time_run(&entries, &record);
        if entries[lower..upper].iter().any(|e| **e == *record) {
            return false;
        }
        entries.insert(upper, record);
        true
    }

    /// Insert every record, returning how many were new
    pub fn insert_all(&self, records: impl IntoIterator<Item = Arc<LogRecord>>) -> usize {
        records
            .into_iter()
            .filter(|record| self.insert(Arc::clone(record)))
            .count()
    }

    /// Remove the record equal to `record`, if present
    pub fn remove(&self, record: &LogRecord) -> bool {
        let mut entries = self.entries.write();
        let (lower, upper) = equal_time_run(&entries, record);
        match entries[lower..upper].iter().position(|e| **e == *record) {
            Some(offset) => {
                entries.remove(lower + offset);
                true
            }
            None => false,
        }
    }

    /// Remove every record, returning how many were present
    pub fn remove_all<'a>(&self, records: impl IntoIterator<Item = &'a LogRecord>) -> usize {
        records
            .into_iter()
            .filter(|record| self.remove(record))
            .count()
    }

    pub fn contains(&self, record: &LogRecord) -> bool {
        let entries = self.entries.read();
        let (lower, upper) = equal_time_run(&entries, record);
        entries[lower..upper].iter().any(|e| **e == *record)
    }

    /// Replace the contents
    ///
    /// `records` are stably sorted by timestamp and equal duplicates dropped,
    /// keeping the first.
    pub fn reset(&self, records: Vec<Arc<LogRecord>>) {
        let mut sorted: Vec<Arc<LogRecord>> = Vec::with_capacity(records.len());
        for record in records {
            let (lower, upper) = equal_time_run(&sorted, &record);
            if !sorted[lower..upper].iter().any(|e| **e == *record) {
                sorted.insert(upper, record);
            }
        }
        *self.entries.write() = sorted;
    }

    /// Point every pinned record at its counterpart in a new load
    ///
    /// `lookup` finds the counterpart of a record. Pinned records without one
    /// are dropped. Returns how many records were kept.
    pub fn relink<F>(&self, lookup: F) -> usize
    where
        F: Fn(&LogRecord) -> Option<Arc<LogRecord>>,
    {
        let mut entries = self.entries.write();
        let relinked: Vec<Arc<LogRecord>> = entries.iter().filter_map(|e| lookup(e)).collect();
        *entries = relinked;
        entries.len()
    }

    /// Get all entries (cloned handles for rendering)
    pub fn all(&self) -> Vec<Arc<LogRecord>> {
        self.entries.read().clone()
    }

    /// Total entry count
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Export all entries as raw lines
    pub fn export_raw(&self) -> String {
        self.entries
            .read()
            .iter()
            .map(|e| e.text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Range of `entries` whose timestamp equals that of `record`
fn equal_time_run(entries: &[Arc<LogRecord>], record: &LogRecord) -> (usize, usize) {
    let timestamp = record.timestamp();
    let lower = entries.partition_point(|e| e.timestamp() < timestamp);
    let upper = lower + entries[lower..].partition_point(|e| e.timestamp() <= timestamp);
    (lower, upper)
}
