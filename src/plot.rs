use tokio::time::Instant;
use tracing::{trace, warn};

use crate::aggregate::{PlotSettings, PlotSnapshot, SeriesAggregate, SnapshotSink};
use crate::error::{EmitError, PlotConfigError, SampleRecordError};
use crate::registry::PlotLifecycle;
use crate::schedule::UpdateScheduler;

/// Synchronous live plot, aggregation and emission driven from one thread
///
/// `update` folds samples in and emits a snapshot inline once the update
/// period elapsed since the last successful emission; `close` performs the
/// final forced flush. A slow sink blocks the caller, use
/// [`BackgroundPlot`](crate::schedule::BackgroundPlot) when that is not
/// acceptable.
#[derive(Debug)]
pub struct LivePlot<S> {
    aggregate: SeriesAggregate,
    scheduler: UpdateScheduler,
    sink: S,
}

impl<S> LivePlot<S>
where
    S: SnapshotSink,
{
    pub fn new(settings: PlotSettings, sink: S) -> Result<Self, PlotConfigError> {
        Ok(Self {
            aggregate: SeriesAggregate::new(&settings)?,
            scheduler: UpdateScheduler::new(settings.update_period()),
            sink,
        })
    }

    /// Folds a batch of named samples in at the next step, emitting inline
    /// when the update period elapsed
    pub fn update<'a, I>(&mut self, samples: I) -> Result<(), SampleRecordError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.aggregate.update(samples)?;
        self.emit_if_due();
        Ok(())
    }

    /// Folds a batch of named samples in at an explicit step
    pub fn update_at<'a, I>(&mut self, step: u64, samples: I) -> Result<(), SampleRecordError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.aggregate.update_at(step, samples)?;
        self.emit_if_due();
        Ok(())
    }

    pub fn snapshot(&self) -> PlotSnapshot {
        self.aggregate.snapshot()
    }

    /// Final forced emission, regardless of the elapsed interval
    pub fn close(&mut self) -> Result<(), EmitError> {
        if self.scheduler.force_emit() {
            self.sink.emit(self.aggregate.snapshot())?;
            self.scheduler.mark_emitted(Instant::now());
        }

        Ok(())
    }

    fn emit_if_due(&mut self) {
        let now = Instant::now();
        if !self.scheduler.should_emit(now) {
            return;
        }

        match self.sink.emit(self.aggregate.snapshot()) {
            Ok(()) => {
                trace!(max_step = self.aggregate.max_step(), "emitted snapshot");
                self.scheduler.mark_emitted(now);
            }
            // Timestamp stays uncommitted so the next update retries
            Err(error) => warn!(%error, "snapshot sink rejected emission"),
        }
    }
}

impl<S> PlotLifecycle for LivePlot<S>
where
    S: SnapshotSink,
{
    fn final_flush(&mut self) {
        if let Err(error) = self.close() {
            warn!(%error, "final flush failed");
        }
    }
}
