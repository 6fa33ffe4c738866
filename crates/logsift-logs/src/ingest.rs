use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, mpsc};
use std::thread;

use logsift_types::{Level, StreamKind, Timestamp};

use crate::parser::{LogParser, MAX_LINE_LEN};
use crate::progress::{ProgressSink, percent};
use crate::record::LogRecord;

/// One named chunk of raw log text, usually the content of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub name: String,
    pub text: String,
}

impl SourceText {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Tunables for source validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Longest run of text, in bytes, a single header may own through its
    /// continuation lines before it is reported as suspicious and the source
    /// is checked for the bug report marker
    pub max_entry_len: usize,

    /// How many leading lines of a suspicious source are searched for the bug
    /// report marker
    pub bugreport_scan_lines: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_entry_len: MAX_LINE_LEN,
            bugreport_scan_lines: 100,
        }
    }
}

/// Outcome of a load
#[derive(Debug, Default)]
pub struct IngestResult {
    /// All records in chronological order, indexed by position
    pub records: Vec<Arc<LogRecord>>,

    /// Streams inferred from every offered source name
    pub available_streams: BTreeSet<StreamKind>,

    /// Names of the sources that contributed records
    pub loaded_sources: Vec<String>,

    /// Names of the sources that were rejected
    pub skipped: Vec<String>,

    /// Sources that look like bug reports, by name: rejected ones and
    /// loaded ones with an unusually long entry
    pub potential_bug_reports: BTreeMap<String, String>,
}

impl IngestResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

enum SourceOutcome {
    Parsed {
        records: Vec<LogRecord>,
        /// Some header owned more than `max_entry_len` bytes of continuation text
        long_entry: bool,
    },
    NoHeaders,
}

/// Turns named sources into one ordered, indexed sequence of records
#[derive(Debug, Clone, Default)]
pub struct LogIngestionPipeline {
    options: IngestOptions,
}

impl LogIngestionPipeline {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Parse, validate, merge and sort `sources`
    ///
    /// Sources are parsed in parallel; records from accepted sources are
    /// concatenated in input order and then stably sorted by timestamp, so
    /// ties keep the order in which they were read. Every update is sent from
    /// the calling thread: one "Reading <name>..." per source as it finishes,
    /// then "Sorting...", "Setting index..." and "Completed" at 100.
    pub fn parse(&self, sources: &[SourceText], progress: &dyn ProgressSink) -> IngestResult {
        let steps = sources.len() + 2;
        let (tx, rx) = mpsc::channel();

        let outcomes = thread::scope(|scope| {
            scope.spawn(move || {
                sources
                    .par_iter()
                    .enumerate()
                    .for_each_with(tx, |tx, (index, source)| {
                        // The receiver lives until every source is in
                        let _ = tx.send((index, self.parse_source(source)));
                    });
            });

            let mut outcomes: Vec<Option<SourceOutcome>> =
                sources.iter().map(|_| None).collect();
            for (done, (index, outcome)) in rx.iter().enumerate() {
                progress.on_progress(
                    percent(done, steps),
                    &format!("Reading {}...", sources[index].name),
                );
                outcomes[index] = Some(outcome);
            }
            outcomes
        });

        let mut result = IngestResult {
            available_streams: sources
                .iter()
                .map(|source| StreamKind::classify(&source.name))
                .collect(),
            ..Default::default()
        };

        let mut records = Vec::new();
        for (source, outcome) in sources.iter().zip(outcomes.into_iter().flatten()) {
            match outcome {
                SourceOutcome::Parsed {
                    records: parsed,
                    long_entry,
                } => {
                    tracing::debug!(source = %source.name, records = parsed.len(), "Loaded source");
                    if long_entry {
                        self.check_bugreport(source, &mut result);
                    }
                    records.extend(parsed);
                    result.loaded_sources.push(source.name.clone());
                }
                SourceOutcome::NoHeaders => {
                    tracing::info!(source = %source.name, "Skipping source without log headers");
                    self.check_bugreport(source, &mut result);
                    result.skipped.push(source.name.clone());
                }
            }
        }

        progress.on_progress(percent(sources.len(), steps), "Sorting...");
        records.sort_by(LogRecord::cmp_by_time);

        progress.on_progress(percent(sources.len() + 1, steps), "Setting index...");
        result.records = records
            .into_iter()
            .enumerate()
            .map(|(index, mut record)| {
                record.assign_index(index);
                Arc::new(record)
            })
            .collect();

        progress.on_progress(100, "Completed");
        result
    }

    fn parse_source(&self, source: &SourceText) -> SourceOutcome {
        let mut records = Vec::new();
        let mut current: Option<(Option<Timestamp>, Level)> = None;
        let mut entry_len = 0usize;
        let mut long_entry = false;

        for raw in source.text.lines() {
            let line = LogParser::clean_line(raw);
            if LogParser::should_ignore(&line) {
                continue;
            }

            if let Some(header) = LogParser::parse_header(&line) {
                current = Some((header.timestamp, header.level));
                entry_len = line.len();
            } else if current.is_some() {
                let before = entry_len;
                entry_len += line.len() + 1;
                if before <= self.options.max_entry_len && entry_len > self.options.max_entry_len {
                    tracing::warn!(
                        source = %source.name,
                        record = records.len(),
                        limit = self.options.max_entry_len,
                        "Unusually long log entry"
                    );
                    long_entry = true;
                }
            } else {
                // Nothing to attach this line to yet
                continue;
            }

            if let Some((timestamp, level)) = current {
                records.push(
                    LogRecord::new(line.into_owned(), level, timestamp)
                        .with_stream_tag(source.name.as_str()),
                );
            }
        }

        if current.is_none() {
            return SourceOutcome::NoHeaders;
        }
        SourceOutcome::Parsed {
            records,
            long_entry,
        }
    }

    /// Remember `source` as a potential bug report if it carries the marker
    fn check_bugreport(&self, source: &SourceText, result: &mut IngestResult) {
        if self.looks_like_bugreport(&source.text) {
            tracing::info!(source = %source.name, "Found a potential bug report");
            result
                .potential_bug_reports
                .insert(source.name.clone(), source.text.replace('\r', ""));
        }
    }

    fn looks_like_bugreport(&self, text: &str) -> bool {
        text.lines()
            .take(self.options.bugreport_scan_lines)
            .any(LogParser::is_bugreport_marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use parking_lot::Mutex;

    const MAIN: &str = "\
--------- beginning of main
01-06 20:46:26.091 821-2168/? V/ThermalMonitor: Foreground Application Changed
01-06 20:46:42.000 821-2168/? E/AndroidRuntime: FATAL EXCEPTION: main
\tat android.os.Looper.loop(Looper.java:164)
\tat android.app.ActivityThread.main(ActivityThread.java:6494)
01-06 20:46:50.000 821-2168/? I/Other: done
";

    const SYSTEM: &str = "\
01-06 20:46:30.000  1000  1001 D system_server: tick
01-06 20:46:42.000  1000  1001 W system_server: tie
";

    fn parse(sources: &[SourceText]) -> IngestResult {
        LogIngestionPipeline::default().parse(sources, &NoProgress)
    }

    #[test]
    fn test_merge_and_sort() {
        let result = parse(&[
            SourceText::new("main.txt", MAIN),
            SourceText::new("system.txt", SYSTEM),
        ]);

        let texts: Vec<&str> = result.records.iter().map(|r| r.text()).collect();
        assert_eq!(
            texts,
            vec![
                "01-06 20:46:26.091 821-2168/? V/ThermalMonitor: Foreground Application Changed",
                "01-06 20:46:30.000  1000  1001 D system_server: tick",
                "01-06 20:46:42.000 821-2168/? E/AndroidRuntime: FATAL EXCEPTION: main",
                "\tat android.os.Looper.loop(Looper.java:164)",
                "\tat android.app.ActivityThread.main(ActivityThread.java:6494)",
                "01-06 20:46:42.000  1000  1001 W system_server: tie",
                "01-06 20:46:50.000 821-2168/? I/Other: done",
            ]
        );
        for (i, record) in result.records.iter().enumerate() {
            assert_eq!(record.sequence_index(), i);
        }
        assert_eq!(result.loaded_sources, vec!["main.txt", "system.txt"]);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_continuation_lines_inherit_header() {
        let result = parse(&[SourceText::new("main.txt", MAIN)]);
        let trace = &result.records[2];
        assert_eq!(trace.level(), Level::Error);
        assert_eq!(trace.timestamp(), Some(Timestamp::new(1, 6, 20, 46, 42, 0)));
        assert_eq!(trace.stream(), StreamKind::Main);
        assert_eq!(trace.stream_tag(), "main.txt");
    }

    #[test]
    fn test_banner_and_orphan_lines_dropped() {
        let text = "orphan line\n=aplogcat= header\n01-01 00:00:00.000 1-1/? I/T: a\n";
        let result = parse(&[SourceText::new("events", text)]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].stream(), StreamKind::Events);
    }

    #[test]
    fn test_nul_padding_stripped() {
        let text = "01-01 00:00:00.000 1-1/? I/T: padded\0\0\0\n";
        let result = parse(&[SourceText::new("main", text)]);
        assert_eq!(result.records[0].text(), "01-01 00:00:00.000 1-1/? I/T: padded");
    }

    #[test]
    fn test_source_without_headers_is_skipped() {
        let result = parse(&[
            SourceText::new("notes.txt", "just some text\nand more\n"),
            SourceText::new("main.txt", MAIN),
        ]);
        assert_eq!(result.skipped, vec!["notes.txt"]);
        assert_eq!(result.records.len(), 5);
        assert!(result.potential_bug_reports.is_empty());
    }

    #[test]
    fn test_long_trace_stays_loaded() {
        let mut text = String::from("01-06 20:46:39.481 25175-25175/? E/AndroidRuntime: FATAL EXCEPTION: main\n");
        for i in 0..120 {
            text.push_str(&format!(
                "\tat com.example.app.feature.SomeLongClassName$Inner.method{i}(SomeLongClassName.java:{i})\n"
            ));
        }
        text.push_str("01-06 20:46:40.000 821-1001/? I/ActivityManager: Process com.example.app has died\n");
        assert!(text.len() > MAX_LINE_LEN);

        let result = parse(&[SourceText::new("main.txt", text)]);
        assert_eq!(result.records.len(), 122);
        assert!(result.skipped.is_empty());
        assert_eq!(result.loaded_sources, vec!["main.txt"]);
        assert!(result.potential_bug_reports.is_empty());

        let last_frame = &result.records[120];
        assert_eq!(last_frame.level(), Level::Error);
        assert!(last_frame.text().ends_with("method119(SomeLongClassName.java:119)"));
        assert_eq!(result.records[121].level(), Level::Info);
    }

    #[test]
    fn test_long_entry_flags_bugreport() {
        let text = "Bugreport format version: 2.0\n\
                    01-01 00:00:00.000 1-1/? I/T: start\ncontinued\ncontinued\n";
        let options = IngestOptions {
            max_entry_len: 40,
            ..Default::default()
        };
        let result = LogIngestionPipeline::new(options)
            .parse(&[SourceText::new("main", text)], &NoProgress);
        assert_eq!(result.records.len(), 3);
        assert_eq!(result.loaded_sources, vec!["main"]);
        assert!(result.skipped.is_empty());
        assert!(result.potential_bug_reports.contains_key("main"));

        // Within the limit nothing is flagged
        let result = parse(&[SourceText::new("main", text)]);
        assert!(result.potential_bug_reports.is_empty());
    }

    #[test]
    fn test_bugreport_detected() {
        let mut text = String::from("========================================================\r\n");
        text.push_str("== dumpstate: 2019-01-06 20:46:42\r\n");
        text.push_str("Bugreport format version: 2.0\r\n");
        for _ in 0..50 {
            text.push_str(&"y".repeat(200));
            text.push_str("\r\n");
        }

        let result = parse(&[SourceText::new("bugreport.txt", text)]);
        assert_eq!(result.skipped, vec!["bugreport.txt"]);
        let stored = &result.potential_bug_reports["bugreport.txt"];
        assert!(stored.contains("Bugreport format version: 2.0\n"));
        assert!(!stored.contains('\r'));
    }

    #[test]
    fn test_bugreport_marker_outside_window_ignored() {
        let mut text = "filler\n".repeat(150);
        text.push_str("Bugreport format version: 2.0\n");
        let result = parse(&[SourceText::new("dump.txt", text)]);
        assert!(result.potential_bug_reports.is_empty());
    }

    #[test]
    fn test_available_streams_include_skipped_sources() {
        let result = parse(&[
            SourceText::new("main.txt", MAIN),
            SourceText::new("radio.txt", "garbage\n"),
        ]);
        assert_eq!(
            result.available_streams,
            BTreeSet::from([StreamKind::Main, StreamKind::Radio])
        );
    }

    #[test]
    fn test_empty_input() {
        let result = parse(&[]);
        assert!(result.is_empty());
        assert!(result.available_streams.is_empty());
    }

    #[test]
    fn test_progress_messages() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: u8, m: &str| seen.lock().push((p, m.to_string()));
        LogIngestionPipeline::default().parse(
            &[
                SourceText::new("main.txt", MAIN),
                SourceText::new("system.txt", SYSTEM),
            ],
            &sink,
        );

        let seen = seen.into_inner();
        let reading: Vec<u8> = seen
            .iter()
            .filter(|(_, m)| m.starts_with("Reading "))
            .map(|(p, _)| *p)
            .collect();
        assert_eq!(reading, vec![0, 25]);
        assert!(seen.windows(2).all(|pair| pair[0].0 <= pair[1].0));
        assert_eq!(
            &seen[2..],
            &[
                (50, "Sorting...".to_string()),
                (75, "Setting index...".to_string()),
                (100, "Completed".to_string()),
            ]
        );
    }
}
