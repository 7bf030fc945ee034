//! Bounded-memory live plotting core for streaming training metrics.
//!
//! A training loop pushes named scalar samples step by step; the crate folds
//! them into a fixed number of buckets per series, halving the plot
//! resolution whenever the buffers fill up, and rate-limits how often an
//! aggregated [`PlotSnapshot`] is handed to a renderer. Memory and rendering
//! cost stay constant no matter how long the run is.
//!
//! ```
//! use stepplot::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut aggregate = SeriesAggregate::new(&PlotSettings::default().with_capacity(4))?;
//!
//! aggregate.update([("loss", 0.75)])?;
//! aggregate.update([("loss", 0.5), ("accuracy", 0.9)])?;
//!
//! let snapshot = aggregate.snapshot();
//! assert_eq!(snapshot.series("loss"), Some(&[0.75, 0.5][..]));
//! assert_eq!(snapshot.reduction_factor(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations, unreachable_pub)]

pub mod aggregate;
mod error;
pub mod plot;
pub mod registry;
pub mod schedule;
pub(crate) mod sync;

pub use aggregate::{
    PlotSettings, PlotSnapshot, SeriesAggregate, SeriesBuffer, SnapshotSink, STEP_KEY,
};
pub use error::{EmitError, PlotConfigError, SampleRecordError};
pub use plot::LivePlot;
pub use registry::{PlotLifecycle, PlotRegistry};
pub use schedule::{BackgroundPlot, UpdateScheduler};

pub mod prelude {
    pub use crate::aggregate::{PlotSettings, PlotSnapshot, SeriesAggregate, SnapshotSink};
    pub use crate::error::{EmitError, PlotConfigError, SampleRecordError};
    pub use crate::plot::LivePlot;
    pub use crate::registry::{PlotLifecycle, PlotRegistry};
    pub use crate::schedule::{BackgroundPlot, UpdateScheduler};
}
