use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use logsift_types::StreamKind;

use crate::filter::FilterSpec;
use crate::progress::{ProgressSink, percent};
use crate::record::LogRecord;

/// Records handed to one worker at a time
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Runs an ordered list of filters over a record sequence in parallel
///
/// The first filter in list order that applies to a record claims it. The
/// result keeps input order, whatever the chunk size or number of threads.
pub struct FilterMatchEngine {
    pool: rayon::ThreadPool,
    chunk_size: usize,

    /// Number of full passes over the records, for instrumentation
    scans: AtomicUsize,
}

impl FilterMatchEngine {
    /// Create an engine with its own worker pool
    ///
    /// `threads == 0` uses one worker per CPU.
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("logsift-match-{idx}"))
            .build()?;
        Ok(Self {
            pool,
            chunk_size: DEFAULT_CHUNK_SIZE,
            scans: AtomicUsize::new(0),
        })
    }

    /// Change how many records each worker takes at a time
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// How many passes have scanned the records so far
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    /// Match `records` against `filters`, first match wins
    ///
    /// Every record's matched filter is rewritten (cleared when nothing
    /// matches) and each filter's per-stream counters are reset and then
    /// incremented for the records it claims. Returns the matched records in
    /// input order.
    pub fn apply_multiple_filters(
        &self,
        records: &[Arc<LogRecord>],
        filters: &[Arc<FilterSpec>],
        progress: &dyn ProgressSink,
    ) -> Vec<Arc<LogRecord>> {
        self.run(records, filters, progress, None)
            .unwrap_or_default()
    }

    /// Like [`FilterMatchEngine::apply_multiple_filters`], but gives up
    /// between chunks once `cancel` fires and returns `None`
    ///
    /// A cancelled pass may leave some records' matched filter updated.
    pub fn apply_cancellable(
        &self,
        records: &[Arc<LogRecord>],
        filters: &[Arc<FilterSpec>],
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Option<Vec<Arc<LogRecord>>> {
        self.run(records, filters, progress, Some(cancel))
    }

    fn run(
        &self,
        records: &[Arc<LogRecord>],
        filters: &[Arc<FilterSpec>],
        progress: &dyn ProgressSink,
        cancel: Option<&CancellationToken>,
    ) -> Option<Vec<Arc<LogRecord>>> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        for filter in filters {
            filter.init_temporary_info();
        }

        let total_chunks = records.len().div_ceil(self.chunk_size);
        let finished = AtomicUsize::new(0);
        // Last percentage sent; updates go out under the lock so they never step back
        let reported = Mutex::new(0u8);
        let is_cancelled = || cancel.is_some_and(CancellationToken::is_cancelled);

        progress.on_progress(0, "Applying filters...");
        let partials: Vec<Option<Vec<Arc<LogRecord>>>> = self.pool.install(|| {
            records
                .par_chunks(self.chunk_size)
                .map(|chunk| {
                    if is_cancelled() {
                        return None;
                    }
                    let matched = match_chunk(chunk, filters);

                    let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    // Report on every tenth of the work
                    if done * 10 / total_chunks != (done - 1) * 10 / total_chunks {
                        let pct = percent(done, total_chunks);
                        let mut last = reported.lock();
                        if pct > *last {
                            *last = pct;
                            progress.on_progress(pct, "Applying filters...");
                        }
                    }
                    Some(matched)
                })
                .collect()
        });

        if is_cancelled() {
            tracing::debug!("Match pass cancelled");
            return None;
        }

        let capacity = partials.iter().flatten().map(Vec::len).sum();
        let mut matched = Vec::with_capacity(capacity);
        for part in partials {
            matched.extend(part?);
        }

        tracing::debug!(
            records = records.len(),
            filters = filters.len(),
            matched = matched.len(),
            "Match pass finished"
        );
        progress.on_progress(100, "Done!");
        Some(matched)
    }
}

fn match_chunk(chunk: &[Arc<LogRecord>], filters: &[Arc<FilterSpec>]) -> Vec<Arc<LogRecord>> {
    chunk
        .iter()
        .filter_map(|record| {
            let hit = filters.iter().find(|filter| filter.applies_to(record));
            record.set_matched_filter(hit.cloned());

            let filter = hit?;
            filter.temporary_info().increment_line_count(record.stream());
            Some(Arc::clone(record))
        })
        .collect()
}

// ============================================================================
// Navigation
// ============================================================================

/// Records whose stream is in `allowed`, in their original order
pub fn restrict_to_streams(
    records: &[Arc<LogRecord>],
    allowed: &BTreeSet<StreamKind>,
) -> Vec<Arc<LogRecord>> {
    records
        .iter()
        .filter(|record| allowed.contains(&record.stream()))
        .cloned()
        .collect()
}

/// Position of the next record `filter` applies to, after `from`
///
/// The search wraps around the end and may come back to `from` itself.
/// Starts at the first record when `from` is `None`.
pub fn next_match_for_filter(
    records: &[Arc<LogRecord>],
    filter: &FilterSpec,
    from: Option<usize>,
) -> Option<usize> {
    let len = records.len();
    if len == 0 {
        return None;
    }
    let start = from.map_or(0, |i| i.min(len - 1) + 1);
    (0..len)
        .map(|step| (start + step) % len)
        .find(|&i| filter.applies_to(&records[i]))
}

/// Position of the previous record `filter` applies to, before `from`
///
/// Mirrors [`next_match_for_filter`]; starts at the last record when `from` is `None`.
pub fn prev_match_for_filter(
    records: &[Arc<LogRecord>],
    filter: &FilterSpec,
    from: Option<usize>,
) -> Option<usize> {
    let len = records.len();
    if len == 0 {
        return None;
    }
    let start = from.map_or(len - 1, |i| i.min(len - 1) + len - 1);
    (0..len)
        .map(|step| (start + len - step) % len)
        .find(|&i| filter.applies_to(&records[i]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use logsift_types::{Level, Rgb, Timestamp};

    fn record(i: usize, text: &str, stream: &str) -> Arc<LogRecord> {
        let ts = Timestamp::new(1, 1, 0, (i / 60) as u8 % 60, (i % 60) as u8, 0);
        Arc::new(LogRecord::new(text, Level::Info, Some(ts)).with_stream_tag(stream))
    }

    fn filter(name: &str, pattern: &str) -> Arc<FilterSpec> {
        Arc::new(FilterSpec::new(name, pattern, Rgb::new(1, 2, 3)).unwrap())
    }

    fn corpus(n: usize) -> Vec<Arc<LogRecord>> {
        (0..n)
            .map(|i| {
                let stream = if i % 2 == 0 { "main" } else { "system" };
                let text = match i % 5 {
                    0 => format!("{i} ActivityManager: start"),
                    1 => format!("{i} WindowManager: focus"),
                    2 => format!("{i} ActivityManager WindowManager both"),
                    _ => format!("{i} nothing here"),
                };
                record(i, &text, stream)
            })
            .collect()
    }

    #[test]
    fn test_first_filter_wins() {
        let engine = FilterMatchEngine::new(2).unwrap();
        let records = corpus(10);
        let activity = filter("Activity", "ActivityManager");
        let window = filter("Window", "WindowManager");

        let matched =
            engine.apply_multiple_filters(&records, &[activity.clone(), window.clone()], &NoProgress);
        assert_eq!(matched.len(), 6);

        let both = &records[2];
        assert_eq!(both.matched_filter().as_deref(), Some(&*activity));
        assert_eq!(records[1].matched_filter().as_deref(), Some(&*window));
        assert!(records[3].matched_filter().is_none());

        // Reordering the filters changes who claims the overlap
        engine.apply_multiple_filters(&records, &[window.clone(), activity.clone()], &NoProgress);
        assert_eq!(both.matched_filter().as_deref(), Some(&*window));
    }

    #[test]
    fn test_order_independent_of_chunking() {
        let records = corpus(1_000);
        let filters = [filter("Activity", "ActivityManager"), filter("Window", "WindowManager")];

        let texts = |matched: Vec<Arc<LogRecord>>| -> Vec<String> {
            matched.iter().map(|r| r.text().to_string()).collect()
        };

        let reference = texts(
            FilterMatchEngine::new(1)
                .unwrap()
                .apply_multiple_filters(&records, &filters, &NoProgress),
        );
        let expected: Vec<String> = records
            .iter()
            .filter(|r| r.matched_filter().is_some())
            .map(|r| r.text().to_string())
            .collect();
        assert_eq!(reference, expected);
        assert_eq!(reference.len(), 600);

        for (threads, chunk) in [(4, 7), (3, 1), (8, 333), (2, 5_000)] {
            let engine = FilterMatchEngine::new(threads).unwrap().with_chunk_size(chunk);
            let matched = texts(engine.apply_multiple_filters(&records, &filters, &NoProgress));
            assert_eq!(matched, reference, "threads={threads} chunk={chunk}");
        }
    }

    #[test]
    fn test_counters_per_stream() {
        let engine = FilterMatchEngine::new(2).unwrap().with_chunk_size(3);
        let records = corpus(10);
        let activity = filter("Activity", "ActivityManager");
        let window = filter("Window", "WindowManager");
        let filters = [activity.clone(), window.clone()];

        engine.apply_multiple_filters(&records, &filters, &NoProgress);
        // ActivityManager at 0, 2, 5, 7; WindowManager alone at 1, 6
        assert_eq!(activity.temporary_info().line_count(StreamKind::Main), 2);
        assert_eq!(activity.temporary_info().line_count(StreamKind::System), 2);
        assert_eq!(activity.temporary_info().total_lines_found(), 4);
        assert_eq!(window.temporary_info().total_lines_found(), 2);

        // A new pass starts from zero
        engine.apply_multiple_filters(&records, &filters, &NoProgress);
        assert_eq!(activity.temporary_info().total_lines_found(), 4);
        assert_eq!(engine.scans(), 2);
    }

    #[test]
    fn test_allowed_streams_do_not_rescan() {
        let engine = FilterMatchEngine::new(4).unwrap().with_chunk_size(4);
        let records: Vec<Arc<LogRecord>> = [("main", 15), ("system", 10), ("events", 8)]
            .into_iter()
            .flat_map(|(stream, n)| (0..n).map(move |i| (stream, i)))
            .enumerate()
            .map(|(i, (stream, n))| record(i, &format!("{stream} {n} boot step"), stream))
            .collect();
        let boot = filter("Boot", "boot");

        let matched = engine.apply_multiple_filters(&records, &[boot.clone()], &NoProgress);
        assert_eq!(matched.len(), 33);
        assert_eq!(engine.scans(), 1);

        let info = boot.temporary_info();
        assert_eq!(info.line_count(StreamKind::Main), 15);
        assert_eq!(info.line_count(StreamKind::System), 10);
        assert_eq!(info.line_count(StreamKind::Events), 8);
        assert_eq!(info.total_lines_found(), 33);

        info.set_allowed_streams([StreamKind::Main]);
        assert_eq!(info.total_lines_found(), 15);
        let allowed = BTreeSet::from([StreamKind::Main]);
        assert_eq!(restrict_to_streams(&matched, &allowed).len(), 15);

        info.set_allowed_streams(StreamKind::ALL);
        assert_eq!(info.total_lines_found(), 33);
        assert_eq!(engine.scans(), 1);
    }

    #[test]
    fn test_min_verbosity_respected() {
        let engine = FilterMatchEngine::new(1).unwrap();
        let records = vec![
            Arc::new(LogRecord::new("crash", Level::Info, None)),
            Arc::new(LogRecord::new("crash", Level::Error, None)),
        ];
        let crash = Arc::new(
            FilterSpec::new("Crash", "crash", Rgb::new(0, 0, 0))
                .unwrap()
                .with_min_verbosity(Level::Warning),
        );
        let matched = engine.apply_multiple_filters(&records, &[crash], &NoProgress);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].level(), Level::Error);
    }

    #[test]
    fn test_empty_filters_clear_matches() {
        let engine = FilterMatchEngine::new(1).unwrap();
        let records = corpus(5);
        engine.apply_multiple_filters(&records, &[filter("Any", ".")], &NoProgress);
        assert!(records.iter().all(|r| r.matched_filter().is_some()));

        let matched = engine.apply_multiple_filters(&records, &[], &NoProgress);
        assert!(matched.is_empty());
        assert!(records.iter().all(|r| r.matched_filter().is_none()));
    }

    #[test]
    fn test_empty_records() {
        let engine = FilterMatchEngine::new(1).unwrap();
        let seen = Mutex::new(Vec::new());
        let sink = |p: u8, m: &str| seen.lock().push((p, m.to_string()));
        let matched = engine.apply_multiple_filters(&[], &[filter("Any", ".")], &sink);
        assert!(matched.is_empty());
        assert_eq!(seen.lock().last(), Some(&(100, "Done!".to_string())));
    }

    #[test]
    fn test_progress_reports() {
        let engine = FilterMatchEngine::new(2).unwrap().with_chunk_size(10);
        let records = corpus(100);
        let seen = Mutex::new(Vec::new());
        let sink = |p: u8, m: &str| seen.lock().push((p, m.to_string()));
        engine.apply_multiple_filters(&records, &[filter("Any", ".")], &sink);

        let seen = seen.into_inner();
        assert_eq!(seen.first(), Some(&(0, "Applying filters...".to_string())));
        assert_eq!(seen.last(), Some(&(100, "Done!".to_string())));
        assert!(seen.len() > 2);
        assert!(seen.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    }

    #[test]
    fn test_cancelled_pass_returns_none() {
        let engine = FilterMatchEngine::new(1).unwrap();
        let records = corpus(10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine.apply_cancellable(&records, &[filter("Any", ".")], &NoProgress, &cancel);
        assert!(result.is_none());
    }

    #[test]
    fn test_restrict_to_streams() {
        let records = corpus(10);
        let main_only = restrict_to_streams(&records, &BTreeSet::from([StreamKind::Main]));
        assert_eq!(main_only.len(), 5);
        assert!(main_only.iter().all(|r| r.stream() == StreamKind::Main));

        let none = restrict_to_streams(&records, &BTreeSet::new());
        assert!(none.is_empty());
    }

    #[test]
    fn test_next_and_prev_wrap_around() {
        let records = corpus(10);
        let window = filter("Window", "WindowManager");
        // WindowManager at 1, 2, 6, 7

        assert_eq!(next_match_for_filter(&records, &window, None), Some(1));
        assert_eq!(next_match_for_filter(&records, &window, Some(2)), Some(6));
        assert_eq!(next_match_for_filter(&records, &window, Some(7)), Some(1));
        assert_eq!(prev_match_for_filter(&records, &window, None), Some(7));
        assert_eq!(prev_match_for_filter(&records, &window, Some(6)), Some(2));
        assert_eq!(prev_match_for_filter(&records, &window, Some(1)), Some(7));

        let single = vec![records[1].clone()];
        assert_eq!(next_match_for_filter(&single, &window, Some(0)), Some(0));
        assert_eq!(prev_match_for_filter(&single, &window, Some(0)), Some(0));

        let absent = filter("Absent", "no such text");
        assert_eq!(next_match_for_filter(&records, &absent, Some(3)), None);
        assert_eq!(next_match_for_filter(&[], &window, None), None);
    }
}
