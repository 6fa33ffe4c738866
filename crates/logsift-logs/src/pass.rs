use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::FilterMatchEngine;
use crate::filter::FilterSpec;
use crate::progress::ProgressSink;
use crate::record::LogRecord;

/// Filtered records produced by one match pass
#[derive(Debug)]
pub struct PassOutput {
    /// Submission number of the pass, increasing
    pub generation: u64,
    pub records: Vec<Arc<LogRecord>>,
}

/// Runs match passes off the caller's thread, keeping only the newest
///
/// Passes run one at a time on the blocking pool. Submitting a pass cancels
/// the one in flight; a pass that is no longer the latest when it finishes
/// publishes nothing, so the output channel only ever moves forward.
pub struct MatchPassManager {
    engine: Arc<FilterMatchEngine>,

    /// Cancellation token for the current pass
    cancel: CancellationToken,

    /// Pass task handles
    tasks: Vec<tokio::task::JoinHandle<()>>,

    /// Generation of the latest submitted pass
    generation: Arc<AtomicU64>,

    /// Held for the whole run of a pass
    pass_lock: Arc<Mutex<()>>,
}

impl MatchPassManager {
    pub fn new(engine: Arc<FilterMatchEngine>) -> Self {
        Self {
            engine,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            generation: Arc::new(AtomicU64::new(0)),
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Start a pass of `filters` over `records`
    ///
    /// Must be called from within a tokio runtime. Returns the generation
    /// the output will carry.
    pub fn submit(
        &mut self,
        records: Arc<Vec<Arc<LogRecord>>>,
        filters: Vec<Arc<FilterSpec>>,
        progress: Arc<dyn ProgressSink>,
        output_tx: mpsc::UnboundedSender<PassOutput>,
    ) -> u64 {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.tasks.retain(|task| !task.is_finished());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.cancel.clone();
        let latest = Arc::clone(&self.generation);
        let pass_lock = Arc::clone(&self.pass_lock);
        let engine = Arc::clone(&self.engine);

        let task = tokio::task::spawn_blocking(move || {
            let _running = pass_lock.lock();
            let is_stale = || cancel.is_cancelled() || latest.load(Ordering::SeqCst) != generation;

            if is_stale() {
                tracing::debug!(generation, "Match pass superseded before start");
                return;
            }

            let Some(matched) = engine.apply_cancellable(&records, &filters, progress.as_ref(), &cancel)
            else {
                tracing::debug!(generation, "Match pass cancelled");
                return;
            };

            if is_stale() {
                tracing::debug!(generation, "Discarding stale match pass");
                return;
            }

            if output_tx
                .send(PassOutput {
                    generation,
                    records: matched,
                })
                .is_err()
            {
                tracing::debug!(generation, "Pass output receiver dropped");
            }
        });
        self.tasks.push(task);

        generation
    }

    /// Generation of the most recently submitted pass
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether `generation` is still the latest submission
    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    /// Number of passes not yet finished
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// Cancel every pass; no further output is published
    pub fn stop(&mut self) {
        self.cancel.cancel();
        // Invalidate passes already past their last cancellation check
        self.generation.fetch_add(1, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
        // Create a fresh cancellation token for future passes
        self.cancel = CancellationToken::new();
    }
}

impl Drop for MatchPassManager {
    fn drop(&mut self) {
        self.stop();
    }
}
