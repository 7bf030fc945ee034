pub use background::BackgroundPlot;

mod background;

use std::time::Duration;

use tokio::time::Instant;

/// Minimum-interval policy deciding when a snapshot may be emitted
///
/// A check never updates scheduler state: the caller commits with
/// [`UpdateScheduler::mark_emitted`] only after a snapshot was actually
/// produced and dispatched, so a failed dispatch does not swallow the
/// next emission window.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl UpdateScheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
        }
    }

    /// True when more than `min_interval` passed since the last committed
    /// emission, or when nothing was emitted yet
    pub fn should_emit(&self, now: Instant) -> bool {
        match self.last_emit {
            Some(last_emit) => now.duration_since(last_emit) > self.min_interval,
            None => true,
        }
    }

    /// Commits an emission timestamp
    pub fn mark_emitted(&mut self, now: Instant) {
        self.last_emit = Some(now);
    }

    /// Final-flush override, ignores the elapsed interval
    ///
    /// Closing code paths call this so the last observation is never
    /// silently dropped from the displayed result.
    pub fn force_emit(&self) -> bool {
        true
    }
}
