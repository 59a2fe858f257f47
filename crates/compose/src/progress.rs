//! Per-page liveness reporting for long builds.

/// Receives "page i of N" notifications during a rasterized build.
///
/// Called after each page completes, with `completed` running 1..=N in
/// order. Builds are strictly sequential, so the signal is monotonic.
pub trait BuildProgress {
    fn page_done(&mut self, completed: usize, total: usize);
}

/// Sink for callers that do not surface progress.
pub struct NoProgress;

impl BuildProgress for NoProgress {
    fn page_done(&mut self, _completed: usize, _total: usize) {}
}

impl<F: FnMut(usize, usize)> BuildProgress for F {
    fn page_done(&mut self, completed: usize, total: usize) {
        self(completed, total)
    }
}
