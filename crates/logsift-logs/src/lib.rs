//! Log processing for logsift
//!
//! This crate turns raw Android log text into an ordered record sequence and
//! runs named regex filters over it: line parsing, ingestion, filter matching,
//! pinned records, filter groups and bug report sections.

mod buffer;
mod bugreport;
mod engine;
mod filter;
mod groups;
mod ingest;
mod parser;
mod pass;
mod progress;
mod record;
mod store;

pub use buffer::OrderedUniqueLogSet;
pub use bugreport::BugReport;
pub use engine::{
    DEFAULT_CHUNK_SIZE, FilterMatchEngine, next_match_for_filter, prev_match_for_filter,
    restrict_to_streams,
};
pub use filter::{FilterError, FilterSpec, TemporaryInfo};
pub use groups::{FilterFileError, FilterGroup, FilterGroups, group_name_for};
pub use ingest::{IngestOptions, IngestResult, LogIngestionPipeline, SourceText};
pub use parser::{BUGREPORT_MARKER, LogHeader, LogParser, MAX_LINE_LEN};
pub use pass::{MatchPassManager, PassOutput};
pub use progress::{NoProgress, ProgressSink};
pub use record::{ArcLogRecord, LogRecord, UNKNOWN_STREAM_TAG};
pub use store::{LogStore, WindowError};

// Re-export types used in our public API
pub use logsift_types::{Level, Rgb, StreamKind, TextView, Timestamp};
