use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use logsift_types::{Level, Rgb, StreamKind};

use crate::record::LogRecord;

/// Bit of the flags column marking a case-insensitive filter
const CASE_INSENSITIVE_FLAG: u32 = 2;

/// Errors building or reading a filter
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("a filter needs a non-empty name")]
    EmptyName,

    #[error("a filter needs a non-empty pattern")]
    EmptyPattern,

    #[error("wrong filter format: expected 4 or 5 comma-separated fields, found {0}")]
    FieldCount(usize),

    #[error("pattern is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("pattern is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid flags: {0}")]
    Flags(String),

    #[error("wrong color format: {0}")]
    Color(String),

    #[error("unknown verbosity: {0}")]
    Verbosity(String),
}

// ============================================================================
// Per-load statistics
// ============================================================================

/// Match counters of a filter, kept per stream
///
/// Reset at the start of every match pass. The allowed-stream mask only
/// decides which counters [`TemporaryInfo::total_lines_found`] adds up; it
/// survives resets.
#[derive(Debug)]
pub struct TemporaryInfo {
    counts: [AtomicUsize; StreamKind::COUNT],
    allowed: AtomicU8,
}

impl TemporaryInfo {
    const ALL_STREAMS: u8 = (1u8 << StreamKind::COUNT) - 1;

    pub fn new() -> Self {
        Self {
            counts: Default::default(),
            allowed: AtomicU8::new(Self::ALL_STREAMS),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }

    pub fn increment_line_count(&self, stream: StreamKind) {
        self.counts[stream.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn line_count(&self, stream: StreamKind) -> usize {
        self.counts[stream.slot()].load(Ordering::Relaxed)
    }

    /// Restrict the total to `streams`
    pub fn set_allowed_streams(&self, streams: impl IntoIterator<Item = StreamKind>) {
        let mask = streams.into_iter().fold(0u8, |mask, s| mask | s.bit());
        self.allowed.store(mask, Ordering::Relaxed);
    }

    pub fn allowed_streams(&self) -> BTreeSet<StreamKind> {
        let mask = self.allowed.load(Ordering::Relaxed);
        StreamKind::ALL
            .into_iter()
            .filter(|s| mask & s.bit() != 0)
            .collect()
    }

    /// Matches over the allowed streams
    pub fn total_lines_found(&self) -> usize {
        let mask = self.allowed.load(Ordering::Relaxed);
        StreamKind::ALL
            .into_iter()
            .filter(|s| mask & s.bit() != 0)
            .map(|s| self.line_count(s))
            .sum()
    }
}

impl Default for TemporaryInfo {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Filter
// ============================================================================

/// Named regular-expression filter with a colour and a minimum verbosity
///
/// A pattern the regex engine rejects does not make the filter unusable: it
/// is kept as written, reported through [`FilterSpec::pattern_error`], and
/// simply matches nothing. This keeps saved filter files loadable and
/// round-trippable even when one pattern is broken.
pub struct FilterSpec {
    name: String,
    pattern: String,

    /// Flags column as read; only the case bit is interpreted
    flags: u32,
    min_verbosity: Level,
    color: Rgb,

    /// Compiled pattern; `None` when it failed to compile
    regex: Option<Regex>,
    pattern_error: Option<String>,

    /// Whether the filter takes part in match passes
    applied: AtomicBool,

    temporary_info: TemporaryInfo,
}

impl FilterSpec {
    /// Create a case-insensitive filter for every verbosity
    pub fn new(name: &str, pattern: &str, color: Rgb) -> Result<Self, FilterError> {
        Self::build(name, pattern, color, CASE_INSENSITIVE_FLAG, Level::Verbose)
    }

    /// Create a case-sensitive filter for every verbosity
    pub fn new_case_sensitive(name: &str, pattern: &str, color: Rgb) -> Result<Self, FilterError> {
        Self::build(name, pattern, color, 0, Level::Verbose)
    }

    /// Only match records at `level` or above
    pub fn with_min_verbosity(mut self, level: Level) -> Self {
        self.min_verbosity = level;
        self
    }

    fn build(
        name: &str,
        pattern: &str,
        color: Rgb,
        flags: u32,
        min_verbosity: Level,
    ) -> Result<Self, FilterError> {
        if name.trim().is_empty() {
            return Err(FilterError::EmptyName);
        }
        if pattern.is_empty() {
            return Err(FilterError::EmptyPattern);
        }

        let compiled = if flags & CASE_INSENSITIVE_FLAG == 0 {
            Regex::new(pattern)
        } else {
            // Prepend (?i) for case insensitive matching
            Regex::new(&format!("(?i){pattern}"))
        };
        let (regex, pattern_error) = match compiled {
            Ok(re) => (Some(re), None),
            Err(e) => {
                tracing::warn!(filter = name, pattern, error = %e, "Filter pattern does not compile");
                (None, Some(e.to_string()))
            }
        };

        Ok(Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            flags,
            min_verbosity,
            color,
            regex,
            pattern_error,
            applied: AtomicBool::new(true),
            temporary_info: TemporaryInfo::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.flags & CASE_INSENSITIVE_FLAG == 0
    }

    /// Flags column written back on save
    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn min_verbosity(&self) -> Level {
        self.min_verbosity
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    /// Why the pattern failed to compile, if it did
    pub fn pattern_error(&self) -> Option<&str> {
        self.pattern_error.as_deref()
    }

    pub fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn set_applied(&self, applied: bool) {
        self.applied.store(applied, Ordering::Relaxed);
    }

    pub fn temporary_info(&self) -> &TemporaryInfo {
        &self.temporary_info
    }

    /// Reset the per-load counters
    pub fn init_temporary_info(&self) {
        self.temporary_info.reset();
    }

    /// Whether `record` is at the minimum verbosity and its text matches
    pub fn applies_to(&self, record: &LogRecord) -> bool {
        record.level() >= self.min_verbosity && self.is_match(record.text())
    }

    /// Whether `text` matches the pattern, regardless of verbosity
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Find all match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            Some(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            None => Vec::new(),
        }
    }

    /// Serialize as one line of a filter file
    ///
    /// `name,base64(pattern),flags,R:G:B,VERBOSITY`. Commas in the name are
    /// written as spaces; flags are written back exactly as they were read.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.name.replace(',', " "),
            BASE64.encode(self.pattern.as_bytes()),
            self.flags,
            self.color,
            self.min_verbosity.name()
        )
    }

    /// Parse one line of a filter file
    ///
    /// The verbosity column is optional and defaults to `VERBOSE`.
    pub fn from_line(line: &str) -> Result<Self, FilterError> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if !(4..=5).contains(&fields.len()) {
            return Err(FilterError::FieldCount(fields.len()));
        }

        let name = fields[0];
        let pattern = String::from_utf8(BASE64.decode(fields[1].trim())?)?;
        let flags: u32 = fields[2]
            .trim()
            .parse()
            .map_err(|_| FilterError::Flags(fields[2].to_string()))?;
        let color = parse_color(fields[3])?;
        let min_verbosity = match fields.get(4) {
            Some(level) => {
                Level::from_name(level).ok_or_else(|| FilterError::Verbosity(level.to_string()))?
            }
            None => Level::Verbose,
        };

        Self::build(name, &pattern, color, flags, min_verbosity)
    }
}

fn parse_color(text: &str) -> Result<Rgb, FilterError> {
    let parts: Vec<u8> = text
        .trim()
        .split(':')
        .map(|c| c.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| FilterError::Color(text.to_string()))?;
    match parts.as_slice() {
        [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
        _ => Err(FilterError::Color(text.to_string())),
    }
}

impl Clone for FilterSpec {
    /// Copies the definition and the applied flag; counters start at zero
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            pattern: self.pattern.clone(),
            flags: self.flags,
            min_verbosity: self.min_verbosity,
            color: self.color,
            regex: self.regex.clone(),
            pattern_error: self.pattern_error.clone(),
            applied: AtomicBool::new(self.is_applied()),
            temporary_info: TemporaryInfo::new(),
        }
    }
}

/// Two filters are equal when they would be saved identically
impl PartialEq for FilterSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.pattern == other.pattern
            && self.flags == other.flags
            && self.min_verbosity == other.min_verbosity
            && self.color == other.color
    }
}

impl Eq for FilterSpec {}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSpec")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("flags", &self.flags)
            .field("min_verbosity", &self.min_verbosity)
            .field("color", &self.color)
            .field("applied", &self.is_applied())
            .finish()
    }
}
