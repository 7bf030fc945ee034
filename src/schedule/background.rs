use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::warn;

use crate::aggregate::{PlotSettings, PlotSnapshot, SeriesAggregate, SnapshotSink};
use crate::error::{PlotConfigError, SampleRecordError};
use crate::schedule::UpdateScheduler;
use crate::sync::{Arc, AtomicBool, Ordering};

/// Shared marker telling the emitter new data arrived since the last emission
///
/// A benign race where the producer marks right after the emitter cleared
/// the flag causes at most one extra emission, never data loss.
#[derive(Debug)]
struct DirtyFlag(AtomicBool);

impl DirtyFlag {
    fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

#[derive(Debug)]
struct SharedState {
    aggregate: Mutex<SeriesAggregate>,
    dirty: DirtyFlag,
}

impl SharedState {
    fn lock(&self) -> std::sync::MutexGuard<'_, SeriesAggregate> {
        self.aggregate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live plot variant that emits from a dedicated tokio task
///
/// The caller only mutates the aggregate; a worker polls on
/// `poll_interval`, emitting whenever the update period elapsed and new
/// data arrived since the last emission. A long-running sink therefore
/// never blocks the training loop. Closing stops the worker after one
/// final forced emission.
///
/// Snapshots are taken under the same lock that guards coarsening, so the
/// sink can never observe a half-coarsened buffer.
#[derive(Debug)]
pub struct BackgroundPlot {
    shared: Arc<SharedState>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl BackgroundPlot {
    /// Validates the settings and starts the emitter task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(settings: PlotSettings, sink: S) -> Result<Self, PlotConfigError>
    where
        S: SnapshotSink + Send + 'static,
    {
        let aggregate = SeriesAggregate::new(&settings)?;
        let shared = Arc::new(SharedState {
            aggregate: Mutex::new(aggregate),
            dirty: DirtyFlag::new(),
        });

        let (stop, stop_receiver) = oneshot::channel();
        let handle = tokio::spawn(emit_loop(
            Arc::clone(&shared),
            sink,
            settings.update_period(),
            settings.poll_interval(),
            stop_receiver,
        ));

        Ok(Self {
            shared,
            stop,
            handle,
        })
    }

    /// Folds a batch of named samples in at the next step
    pub fn update<'a, I>(&self, samples: I) -> Result<(), SampleRecordError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.shared.lock().update(samples)?;
        self.shared.dirty.mark();
        Ok(())
    }

    /// Folds a batch of named samples in at an explicit step
    pub fn update_at<'a, I>(&self, step: u64, samples: I) -> Result<(), SampleRecordError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.shared.lock().update_at(step, samples)?;
        self.shared.dirty.mark();
        Ok(())
    }

    pub fn snapshot(&self) -> PlotSnapshot {
        self.shared.lock().snapshot()
    }

    /// Stops the emitter after one final forced emission
    pub async fn close(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}

async fn emit_loop<S>(
    shared: Arc<SharedState>,
    mut sink: S,
    min_interval: Duration,
    poll_interval: Duration,
    mut stop: oneshot::Receiver<()>,
) where
    S: SnapshotSink + Send + 'static,
{
    let mut scheduler = UpdateScheduler::new(min_interval);
    let mut ticker = interval(poll_interval);

    loop {
        tokio::select! {
            _ = &mut stop => {
                if scheduler.force_emit() {
                    shared.dirty.take();
                    dispatch(&shared, &mut sink, &mut scheduler);
                }
                break;
            }
            _ = ticker.tick() => {
                if scheduler.should_emit(Instant::now()) && shared.dirty.take() {
                    if !dispatch(&shared, &mut sink, &mut scheduler) {
                        // Retry on a later tick instead of dropping the data
                        shared.dirty.mark();
                    }
                }
            }
        }
    }
}

fn dispatch<S>(shared: &SharedState, sink: &mut S, scheduler: &mut UpdateScheduler) -> bool
where
    S: SnapshotSink,
{
    let snapshot = shared.lock().snapshot();

    match sink.emit(snapshot) {
        Ok(()) => {
            scheduler.mark_emitted(Instant::now());
            true
        }
        Err(error) => {
            warn!(%error, "snapshot sink rejected emission");
            false
        }
    }
}
