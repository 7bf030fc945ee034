use rustc_hash::FxHashMap;

use crate::error::EmitError;

/// Immutable renderer-facing view of aggregated series data
///
/// Bucket `i` approximates original step `i * reduction_factor`. NaN
/// entries are gaps: a renderer must break the line there, never draw
/// zero or interpolate across. With the `serde` feature the snapshot
/// serializes directly, NaN becomes `null` in JSON which keeps the gap
/// semantics on the wire.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PlotSnapshot {
    series: FxHashMap<String, Vec<f64>>,
    reduction_factor: u64,
    max_step: u64,
}

impl PlotSnapshot {
    pub(crate) fn new(
        series: FxHashMap<String, Vec<f64>>,
        reduction_factor: u64,
        max_step: u64,
    ) -> Self {
        Self {
            series,
            reduction_factor,
            max_step,
        }
    }

    /// Bucket means of one series in x order, NaN marking gaps
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(Vec::as_slice)
    }

    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn reduction_factor(&self) -> u64 {
        self.reduction_factor
    }

    pub fn max_step(&self) -> u64 {
        self.max_step
    }

    /// Number of series in the snapshot
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Iterates `(approximate_step, value)` pairs of one series
    ///
    /// Skips gaps and scales the x axis back by the reduction factor, so
    /// a renderer can plot against original step numbers directly.
    pub fn points(&self, name: &str) -> Option<impl Iterator<Item = (u64, f64)> + '_> {
        let values = self.series.get(name)?;
        let factor = self.reduction_factor;

        Some(
            values
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_nan())
                .map(move |(index, value)| (index as u64 * factor, *value)),
        )
    }
}

/// Collaborator receiving snapshots, typically a chart renderer
///
/// A failed emission is reported back so the plot can retry on the next
/// opportunity, the core itself never depends on the sink succeeding.
pub trait SnapshotSink {
    fn emit(&mut self, snapshot: PlotSnapshot) -> Result<(), EmitError>;
}
