/// Receiver of `(percent, message)` updates from long-running work
///
/// Calls may come from any worker thread, so implementations must be
/// thread-safe. Percentages only ever grow within one operation.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percent: u8, message: &str);

    /// Terminal update for an operation that did not complete
    fn fail(&self) {
        self.on_progress(100, "Failed");
    }
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn on_progress(&self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Sink that drops every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _percent: u8, _message: &str) {}
}

/// `done` out of `total` as a whole percentage, clamped to 100
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}
