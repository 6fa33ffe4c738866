use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

use logsift_types::{Level, Timestamp};

/// Lines longer than this are truncated before they are stored
pub const MAX_LINE_LEN: usize = 2 * 4068;

/// Text that marks a file as an Android bug report
pub const BUGREPORT_MARKER: &str = "Bugreport format version:";

/// Prefixes of logcat banner lines that carry no log content
const IGNORED_PREFIXES: [&str; 2] = ["--------- beginning of", "=aplogcat="];

// `MM-DD HH:MM:SS.mmm PID-TID/process L/tag: message`
static LEGACY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{1,2})-(\d{1,2})\s+(\d{1,2}):(\d{1,2}):(\d{1,2})\.(\d{3,})\s+(\d+)-(\d+)/\S+\s+([A-Z])/([^:]*):",
    )
    .expect("legacy header pattern is valid")
});

// `MM-DD HH:MM:SS.mmm  PID  TID L tag   : message`
static THREADTIME_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{1,2})-(\d{1,2})\s+(\d{1,2}):(\d{1,2}):(\d{1,2})\.(\d{3,})\s+(\d+)\s+(\d+)\s+([A-Z])\s+(.*?)\s*:",
    )
    .expect("threadtime header pattern is valid")
});

/// Structured prefix of a logcat line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHeader<'a> {
    /// `None` when the fields matched the grammar but are out of range
    pub timestamp: Option<Timestamp>,
    pub level: Level,
    pub pid: u32,
    pub tid: u32,
    pub tag: &'a str,
}

/// Log parser for extracting structure from raw logcat lines
pub struct LogParser;

impl LogParser {
    /// Parse the header of a line, if it starts with one
    ///
    /// Both the `pid-tid/process L/tag:` layout written by older tools and the
    /// `threadtime` layout of current logcat are recognised.
    pub fn parse_header(line: &str) -> Option<LogHeader<'_>> {
        let caps = LEGACY_HEADER
            .captures(line)
            .or_else(|| THREADTIME_HEADER.captures(line))?;
        Some(Self::header_from(&caps))
    }

    /// Whether `line` starts with a recognised header
    pub fn is_header(line: &str) -> bool {
        LEGACY_HEADER.is_match(line) || THREADTIME_HEADER.is_match(line)
    }

    /// Level of a header line; `Unknown` for anything else
    pub fn find_level(line: &str) -> Level {
        Self::parse_header(line)
            .map(|header| header.level)
            .unwrap_or(Level::Unknown)
    }

    /// Timestamp of a header line
    pub fn find_timestamp(line: &str) -> Option<Timestamp> {
        Self::parse_header(line).and_then(|header| header.timestamp)
    }

    /// Strip trailing NUL padding and a stray carriage return
    pub fn clean_line(line: &str) -> Cow<'_, str> {
        let trimmed = line.trim_end_matches('\0');
        let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
        if trimmed.len() > MAX_LINE_LEN {
            let mut end = MAX_LINE_LEN;
            while !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            tracing::warn!(
                len = trimmed.len(),
                max = MAX_LINE_LEN,
                "Truncating oversized log line"
            );
            return Cow::Owned(trimmed[..end].to_string());
        }
        Cow::Borrowed(trimmed)
    }

    /// Banner and blank lines that never become records
    pub fn should_ignore(line: &str) -> bool {
        line.trim().is_empty() || IGNORED_PREFIXES.iter().any(|p| line.starts_with(p))
    }

    /// Whether `line` carries the bug report marker
    pub fn is_bugreport_marker(line: &str) -> bool {
        line.contains(BUGREPORT_MARKER)
    }

    fn header_from<'a>(caps: &Captures<'a>) -> LogHeader<'a> {
        let level = field(caps, 9)
            .chars()
            .next()
            .map(Level::from_letter)
            .unwrap_or_default();

        LogHeader {
            timestamp: Self::timestamp_from(caps),
            level,
            pid: field(caps, 7).parse().unwrap_or_default(),
            tid: field(caps, 8).parse().unwrap_or_default(),
            tag: field(caps, 10).trim(),
        }
    }

    fn timestamp_from(caps: &Captures<'_>) -> Option<Timestamp> {
        let month: u8 = field(caps, 1).parse().ok()?;
        let day: u8 = field(caps, 2).parse().ok()?;
        let hour: u8 = field(caps, 3).parse().ok()?;
        let minute: u8 = field(caps, 4).parse().ok()?;
        let second: u8 = field(caps, 5).parse().ok()?;
        // Sub-millisecond digits are dropped
        let millis: u32 = field(caps, 6).get(..3)?.parse().ok()?;

        if !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 60
        {
            return None;
        }
        Some(Timestamp::new(month, day, hour, minute, second, millis))
    }
}

fn field<'a>(caps: &Captures<'a>, index: usize) -> &'a str {
    caps.get(index).map_or("", |m| m.as_str())
}
