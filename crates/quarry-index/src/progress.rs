//! Progress reporting for long-running pipeline calls.

/// One progress event. `percentage` is in `[0, 100]` and never
/// decreases within a single pipeline call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Phase label, for display only.
    pub phase: &'static str,
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
}

/// Receives progress events from the pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F: Fn(ProgressUpdate) + Send + Sync> ProgressReporter for F {
    fn report(&self, update: ProgressUpdate) {
        self(update);
    }
}

/// Reporter that logs through `tracing`.
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, update: ProgressUpdate) {
        tracing::info!(
            phase = update.phase,
            current = update.current,
            total = update.total,
            percentage = update.percentage,
        );
    }
}

/// Clamps emitted percentages so they never go backwards, even across
/// phase transitions.
pub(crate) struct ProgressTracker<'a> {
    reporter: Option<&'a dyn ProgressReporter>,
    last_percentage: u8,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(reporter: Option<&'a dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            last_percentage: 0,
        }
    }

    /// Emit `current/total` work items as a percentage within `phase`.
    pub(crate) fn emit(&mut self, phase: &'static str, current: usize, total: usize) {
        let Some(reporter) = self.reporter else {
            return;
        };
        let raw = if total == 0 {
            100
        } else {
            (current.min(total) * 100 / total) as u8
        };
        let percentage = raw.max(self.last_percentage).min(100);
        self.last_percentage = percentage;
        reporter.report(ProgressUpdate {
            phase,
            current,
            total,
            percentage,
        });
    }
}
