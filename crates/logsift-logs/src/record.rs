use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

use logsift_types::{Level, StreamKind, Timestamp};

use crate::filter::FilterSpec;

/// Shared handle to a record, as held by the full and filtered sequences
pub type ArcLogRecord = Arc<LogRecord>;

/// Tag used for records that were not read from a named source
pub const UNKNOWN_STREAM_TAG: &str = "unknown";

/// A single log line
///
/// Identity is `(text, level, timestamp)`: the same line read by two
/// different loads compares equal, whatever its index. The sequence index and
/// the matched filter are bound after construction and are not part of it.
pub struct LogRecord {
    /// Original raw log line
    text: String,

    /// Severity from the line header (or inherited for continuation lines)
    level: Level,

    /// Parsed timestamp (if available)
    timestamp: Option<Timestamp>,

    /// Name of the source the line was read from
    stream_tag: String,

    /// Stream category inferred from `stream_tag`
    stream: StreamKind,

    /// Position in the sorted sequence of the load that produced this record
    sequence_index: usize,

    /// Last filter that matched this record, for highlighting
    matched_filter: RwLock<Option<Arc<FilterSpec>>>,
}

impl LogRecord {
    /// Create a record that does not belong to any named source
    pub fn new(text: impl Into<String>, level: Level, timestamp: Option<Timestamp>) -> Self {
        Self {
            text: text.into(),
            level,
            timestamp,
            stream_tag: UNKNOWN_STREAM_TAG.to_string(),
            stream: StreamKind::Unknown,
            sequence_index: 0,
            matched_filter: RwLock::new(None),
        }
    }

    /// Set the source the record was read from, inferring its stream
    pub fn with_stream_tag(mut self, tag: impl Into<String>) -> Self {
        self.stream_tag = tag.into();
        self.stream = StreamKind::classify(&self.stream_tag);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn stream_tag(&self) -> &str {
        &self.stream_tag
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// Bind the position in the sorted sequence, done once per load
    pub(crate) fn assign_index(&mut self, index: usize) {
        self.sequence_index = index;
    }

    pub fn matched_filter(&self) -> Option<Arc<FilterSpec>> {
        self.matched_filter.read().clone()
    }

    pub fn set_matched_filter(&self, filter: Option<Arc<FilterSpec>>) {
        *self.matched_filter.write() = filter;
    }

    /// Length of the raw line in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Chronological order; records without a timestamp come first
    ///
    /// Only timestamps are compared, so a stable sort keeps equal-time
    /// records in the order they were encountered.
    pub fn cmp_by_time(&self, other: &Self) -> Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

impl Clone for LogRecord {
    fn clone(&self) -> Self {
        Self {
            text: self.text.clone(),
            level: self.level,
            timestamp: self.timestamp,
            stream_tag: self.stream_tag.clone(),
            stream: self.stream,
            sequence_index: self.sequence_index,
            matched_filter: RwLock::new(self.matched_filter()),
        }
    }
}

impl PartialEq for LogRecord {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.timestamp == other.timestamp && self.text == other.text
    }
}

impl Eq for LogRecord {}

impl Hash for LogRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
        self.level.hash(state);
        self.timestamp.hash(state);
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("index", &self.sequence_index)
            .field("timestamp", &self.timestamp)
            .field("level", &self.level)
            .field("stream", &self.stream)
            .field("text", &self.text)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(record: &LogRecord) -> u64 {
        let mut hasher = DefaultHasher::new();
        record.hash(&mut hasher);
        hasher.finish()
    }

    fn record(text: &str, level: Level, ts: Timestamp) -> LogRecord {
        LogRecord::new(text, level, Some(ts))
    }

    #[test]
    fn test_equal_records() {
        let a = record("Text1", Level::Debug, Timestamp::new(9, 1, 8, 0, 0, 0));
        let mut b = record("Text1", Level::Debug, Timestamp::new(9, 1, 8, 0, 0, 0))
            .with_stream_tag("main.txt");
        b.assign_index(42);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_text_and_level_break_equality() {
        let ts = Timestamp::new(9, 1, 8, 0, 0, 0);
        let base = record("Text1", Level::Debug, ts);

        assert_ne!(base, record("Text2", Level::Debug, ts));
        assert_ne!(base, record("Text1", Level::Info, ts));
    }

    #[test]
    fn test_timestamp_fields_break_equality() {
        let base = record("Text1", Level::Debug, Timestamp::new(9, 1, 8, 0, 0, 0));
        let others = [
            Timestamp::new(8, 1, 8, 0, 0, 0),
            Timestamp::new(9, 2, 8, 0, 0, 0),
            Timestamp::new(9, 1, 3, 0, 0, 0),
            Timestamp::new(9, 1, 8, 10, 0, 0),
            Timestamp::new(9, 1, 8, 0, 30, 0),
            Timestamp::new(9, 1, 8, 0, 0, 90),
        ];

        for ts in others {
            let other = record("Text1", Level::Debug, ts);
            assert_ne!(base, other);
            assert_ne!(hash_of(&base), hash_of(&other));
        }
    }

    #[test]
    fn test_missing_timestamp_sorts_first() {
        let untimed = LogRecord::new("a", Level::Info, None);
        let timed = record("b", Level::Info, Timestamp::new(1, 1, 0, 0, 0, 0));

        assert_eq!(untimed.cmp_by_time(&timed), Ordering::Less);
        assert_eq!(timed.cmp_by_time(&untimed), Ordering::Greater);
    }

    #[test]
    fn test_ties_ignore_text() {
        let ts = Timestamp::new(1, 1, 0, 0, 0, 0);
        let a = record("zzz", Level::Info, ts);
        let b = record("aaa", Level::Info, ts);
        assert_eq!(a.cmp_by_time(&b), Ordering::Equal);
    }

    #[test]
    fn test_stream_tag_classifies() {
        let r = LogRecord::new("x", Level::Info, None);
        assert_eq!(r.stream_tag(), UNKNOWN_STREAM_TAG);
        assert_eq!(r.stream(), StreamKind::Unknown);

        let r = r.with_stream_tag("aplogd-r.txt");
        assert_eq!(r.stream(), StreamKind::Radio);
    }
}
