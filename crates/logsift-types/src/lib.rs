//! Shared types for logsift
//!
//! This crate contains the small value types used across logsift crates:
//! log levels, logcat timestamps, stream categories, filter colours and the
//! zero-copy [`TextView`].

mod text_view;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use text_view::TextView;

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level
///
/// Ordered `Verbose < Debug < Info < Warning < Error < Unknown`. Letters that
/// logcat emits but that have no dedicated level (`F`, `A`, `S`) end up as
/// `Unknown`, which sorts above `Error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    #[default]
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    Unknown,
}

impl Level {
    /// Levels a filter can be configured with, most permissive first
    pub const FILTERABLE: [Level; 5] = [
        Level::Verbose,
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
    ];

    /// Parse the single-letter level used in logcat headers
    pub fn from_letter(letter: char) -> Self {
        match letter {
            'V' => Self::Verbose,
            'D' => Self::Debug,
            'I' => Self::Info,
            'W' => Self::Warning,
            'E' => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Parse a level name as written in filter files
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "VERBOSE" | "V" => Some(Self::Verbose),
            "DEBUG" | "D" => Some(Self::Debug),
            "INFO" | "I" => Some(Self::Info),
            "WARNING" | "WARN" | "W" => Some(Self::Warning),
            "ERROR" | "E" => Some(Self::Error),
            _ => None,
        }
    }

    /// Upper-case name used in filter files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Verbose => "VERBOSE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Short display string (1 char)
    pub fn letter(&self) -> char {
        match self {
            Self::Verbose => 'V',
            Self::Debug => 'D',
            Self::Info => 'I',
            Self::Warning => 'W',
            Self::Error => 'E',
            Self::Unknown => '?',
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timestamp of a logcat line (`MM-DD HH:MM:SS.mmm`)
///
/// Logcat does not print the year, so ordering is field-wise from month down
/// to milliseconds. The millisecond field is kept as written, which means a
/// dump printed with microsecond precision compares consistently with itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millis: u32,
}

impl Timestamp {
    pub fn new(month: u8, day: u8, hour: u8, minute: u8, second: u8, millis: u32) -> Self {
        Self {
            month,
            day,
            hour,
            minute,
            second,
            millis,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            self.month, self.day, self.hour, self.minute, self.second, self.millis
        )
    }
}

// ============================================================================
// Streams
// ============================================================================

/// Logical category of a log source
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Main,
    System,
    Radio,
    Events,
    Kernel,
    Unknown,
}

impl StreamKind {
    /// Number of stream kinds, for per-stream counter tables
    pub const COUNT: usize = 6;

    pub const ALL: [StreamKind; Self::COUNT] = [
        StreamKind::Main,
        StreamKind::System,
        StreamKind::Radio,
        StreamKind::Events,
        StreamKind::Kernel,
        StreamKind::Unknown,
    ];

    /// Streams that can be inferred from a source name
    const NAMED: [StreamKind; 5] = [
        StreamKind::Main,
        StreamKind::System,
        StreamKind::Radio,
        StreamKind::Events,
        StreamKind::Kernel,
    ];

    /// Infer the stream of a log source from its name
    ///
    /// Matching is case-insensitive and works on the file name without its
    /// extension. Rules are tried in order over all streams, first hit wins:
    /// the full word (`main`), the short-code suffix (`aplogd-m`, also
    /// `aplogd-kernel`) and the `log-<word>` prefix.
    pub fn classify(source_name: &str) -> Self {
        let file_name = source_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(source_name);
        let stem = match file_name.rfind('.') {
            Some(dot) if dot > 0 => &file_name[..dot],
            _ => file_name,
        };
        let stem = stem.to_ascii_lowercase();

        let by_word = Self::NAMED.into_iter().find(|s| stem == s.word());
        let by_code = || {
            Self::NAMED.into_iter().find(|s| {
                stem.strip_suffix(s.word())
                    .or_else(|| stem.strip_suffix(s.symbol()))
                    .is_some_and(|rest| rest.ends_with('-') && rest.len() > 1)
            })
        };
        let by_prefix = || {
            Self::NAMED
                .into_iter()
                .find(|s| stem.strip_prefix("log-") == Some(s.word()))
        };

        by_word
            .or_else(by_code)
            .or_else(by_prefix)
            .unwrap_or(Self::Unknown)
    }

    /// Full lower-case word naming this stream
    pub fn word(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::System => "system",
            Self::Radio => "radio",
            Self::Events => "events",
            Self::Kernel => "kernel",
            Self::Unknown => "unknown",
        }
    }

    /// Single-letter short code (`m`, `s`, ...)
    pub fn symbol(&self) -> &'static str {
        &self.word()[..1]
    }

    /// Position in per-stream counter tables
    pub fn slot(&self) -> usize {
        *self as usize
    }

    /// Bit used in stream masks
    pub fn bit(&self) -> u8 {
        1 << self.slot()
    }

    /// Parse a stream from its word or short code
    pub fn from_word(word: &str) -> Option<Self> {
        let word = word.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|s| s.word() == word || (*s != Self::Unknown && s.symbol() == word))
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = self.word();
        write!(f, "{}{}", word[..1].to_ascii_uppercase(), &word[1..])
    }
}

// ============================================================================
// Filter Colours
// ============================================================================

/// RGB colour used to highlight records matched by a filter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.r, self.g, self.b)
    }
}
