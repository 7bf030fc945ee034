pub use buffer::SeriesBuffer;
pub use settings::PlotSettings;
pub use snapshot::{PlotSnapshot, SnapshotSink};

mod buffer;
mod settings;
mod snapshot;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{PlotConfigError, SampleRecordError};

/// Reserved key supplying the x value of a batch instead of a plotted series
pub const STEP_KEY: &str = "step";

/// Keys callers know from framework logs that are deliberately not aggregated
const UNSUPPORTED_KEYS: &[&str] = &["epoch"];

type SampleBatch<'a> = SmallVec<[(&'a str, f64); 8]>;

/// Streaming aggregate of named scalar series with bounded memory
///
/// Each value is folded into its series buffer at bucket
/// `step / reduction_factor`. Whenever an incoming step would land past the
/// last bucket, every buffer is coarsened and the reduction factor doubles,
/// repeating until the bucket fits, so the invariant `bucket < capacity`
/// holds for arbitrary forward jumps in `step`.
///
/// All series share one reduction factor: a coarsening pass is global, even
/// when only a single series is being updated.
#[derive(Debug)]
pub struct SeriesAggregate {
    capacity: usize,
    series: FxHashMap<String, SeriesBuffer>,
    current_step: Option<u64>,
    max_step: u64,
    reduction_factor: u64,
}

impl SeriesAggregate {
    /// Validates the settings and creates an empty aggregate
    pub fn new(settings: &PlotSettings) -> Result<Self, PlotConfigError> {
        settings.validate()?;

        Ok(Self {
            capacity: settings.capacity(),
            series: FxHashMap::default(),
            current_step: None,
            max_step: 0,
            reduction_factor: 1,
        })
    }

    /// Folds a batch of named samples in at the next step
    ///
    /// The step counter auto-increments from 0 unless the batch carries a
    /// reserved `"step"` sample, whose value is used as the x position
    /// instead and is never plotted. Steps may arrive out of increasing
    /// order, an old step simply averages into the bucket it maps to at
    /// the current resolution.
    pub fn update<'a, I>(&mut self, samples: I) -> Result<(), SampleRecordError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.record(None, samples)
    }

    /// Folds a batch of named samples in at an explicit step
    ///
    /// The explicit step takes precedence over a reserved `"step"` sample
    /// in the batch.
    pub fn update_at<'a, I>(&mut self, step: u64, samples: I) -> Result<(), SampleRecordError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        self.record(Some(step), samples)
    }

    fn record<'a, I>(&mut self, step: Option<u64>, samples: I) -> Result<(), SampleRecordError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut batch = SampleBatch::new();
        let mut batch_step = step;

        // The whole batch is validated before any state changes, so a
        // rejected call leaves every series and the step counter untouched.
        for (name, value) in samples {
            if UNSUPPORTED_KEYS.contains(&name) {
                return Err(SampleRecordError::UnsupportedKey(name.to_owned()));
            }

            if name == STEP_KEY {
                if batch_step.is_none() {
                    batch_step = Some(resolve_step_value(value)?);
                }
                continue;
            }

            if !value.is_finite() {
                return Err(SampleRecordError::NonFiniteValue {
                    series: name.to_owned(),
                    value,
                });
            }

            batch.push((name, value));
        }

        let step = batch_step.unwrap_or_else(|| self.current_step.map_or(0, |step| step + 1));
        self.current_step = Some(step);
        self.max_step = self.max_step.max(step);

        // New series join at the current reduction factor, they start empty
        // so no retroactive coarsening is needed
        for (name, _) in &batch {
            if !self.series.contains_key(*name) {
                self.series
                    .insert((*name).to_owned(), SeriesBuffer::new(self.capacity));
            }
        }

        let bucket = self.fit_bucket(step);
        for (name, value) in batch {
            if let Some(buffer) = self.series.get_mut(name) {
                buffer.insert(bucket, value);
            }
        }

        Ok(())
    }

    /// Coarsens every series until `step` maps inside the buffers
    fn fit_bucket(&mut self, step: u64) -> usize {
        let mut bucket = (step / self.reduction_factor) as usize;

        while bucket >= self.capacity {
            for buffer in self.series.values_mut() {
                buffer.coarsen();
            }
            self.reduction_factor *= 2;
            bucket = (step / self.reduction_factor) as usize;

            debug!(
                reduction_factor = self.reduction_factor,
                "coarsened all series"
            );
        }

        bucket
    }

    /// Read-only view of the aggregated data for rendering
    ///
    /// Covers buckets 0 through `max_step / reduction_factor` inclusive,
    /// gaps preserved as NaN. Does not mutate the aggregate, calling it
    /// twice without an update in between yields identical snapshots.
    pub fn snapshot(&self) -> PlotSnapshot {
        let visible = (self.max_step / self.reduction_factor) as usize + 1;
        let series = self
            .series
            .iter()
            .map(|(name, buffer)| (name.clone(), buffer.window(visible).to_vec()))
            .collect();

        PlotSnapshot::new(series, self.reduction_factor, self.max_step)
    }

    pub fn reduction_factor(&self) -> u64 {
        self.reduction_factor
    }

    pub fn max_step(&self) -> u64 {
        self.max_step
    }

    /// Last step observed, `None` before the first update
    pub fn current_step(&self) -> Option<u64> {
        self.current_step
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of registered series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

fn resolve_step_value(value: f64) -> Result<u64, SampleRecordError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(SampleRecordError::InvalidStep(value));
    }

    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate_with_capacity(capacity: usize) -> SeriesAggregate {
        SeriesAggregate::new(&PlotSettings::default().with_capacity(capacity)).unwrap()
    }

    fn assert_series_eq(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "series length differs");
        for (bucket, (actual, expected)) in actual.iter().zip(expected).enumerate() {
            let matches = match expected.is_nan() {
                true => actual.is_nan(),
                false => (actual - expected).abs() < 1e-9,
            };
            assert!(matches, "bucket {bucket}: expected {expected}, got {actual}");
        }
    }

    #[test]
    fn fills_buckets_in_step_order_without_coarsening() {
        let mut aggregate = aggregate_with_capacity(4);

        for (step, value) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            aggregate.update_at(step as u64, [("loss", value)]).unwrap();
        }

        let snapshot = aggregate.snapshot();
        assert_series_eq(snapshot.series("loss").unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(snapshot.reduction_factor(), 1);
        assert_eq!(snapshot.max_step(), 3);
    }

    #[test]
    fn halves_resolution_when_next_bucket_would_overflow() {
        let mut aggregate = aggregate_with_capacity(4);
        for (step, value) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            aggregate.update_at(step as u64, [("loss", value)]).unwrap();
        }

        aggregate.update_at(4, [("loss", 5.0)]).unwrap();

        let snapshot = aggregate.snapshot();
        assert_eq!(snapshot.reduction_factor(), 2);
        assert_series_eq(
            snapshot.series("loss").unwrap(),
            &[1.5, 3.5, 5.0],
        );

        let buffer = &aggregate.series["loss"];
        assert_eq!(buffer.count(0), 2);
        assert_eq!(buffer.count(1), 2);
        assert_eq!(buffer.count(2), 1);
        assert!(buffer.mean(3).is_nan());
    }

    #[test]
    fn auto_increments_step_from_zero() {
        let mut aggregate = aggregate_with_capacity(4);

        aggregate.update([("loss", 3.0)]).unwrap();
        aggregate.update([("loss", 2.0)]).unwrap();
        aggregate.update([("loss", 1.0)]).unwrap();

        assert_eq!(aggregate.current_step(), Some(2));
        assert_series_eq(
            aggregate.snapshot().series("loss").unwrap(),
            &[3.0, 2.0, 1.0],
        );
    }

    #[test]
    fn reserved_step_key_overrides_step_counter() {
        let mut aggregate = aggregate_with_capacity(8);

        aggregate
            .update([("step", 5.0), ("loss", 0.5)])
            .unwrap();

        assert_eq!(aggregate.current_step(), Some(5));
        assert_eq!(aggregate.max_step(), 5);
        let snapshot = aggregate.snapshot();
        assert!(snapshot.series("step").is_none(), "step is never plotted");
        assert_series_eq(
            snapshot.series("loss").unwrap(),
            &[f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, 0.5],
        );
    }

    #[test]
    fn explicit_step_takes_precedence_over_reserved_key() {
        let mut aggregate = aggregate_with_capacity(8);

        aggregate
            .update_at(2, [("step", 7.0), ("loss", 0.5)])
            .unwrap();

        assert_eq!(aggregate.current_step(), Some(2));
    }

    #[test]
    fn rejects_unsupported_epoch_key_without_mutation() {
        let mut aggregate = aggregate_with_capacity(4);
        aggregate.update([("loss", 1.0)]).unwrap();

        let error = aggregate
            .update([("epoch", 1.0), ("loss", 0.5)])
            .unwrap_err();

        assert_eq!(
            error,
            SampleRecordError::UnsupportedKey("epoch".to_owned())
        );
        assert_eq!(aggregate.current_step(), Some(0));
        assert_series_eq(aggregate.snapshot().series("loss").unwrap(), &[1.0]);
    }

    #[test]
    fn rejects_non_finite_values_without_mutation() {
        let mut aggregate = aggregate_with_capacity(4);
        aggregate.update([("loss", 1.0)]).unwrap();

        let error = aggregate
            .update([("loss", 0.5), ("accuracy", f64::NAN)])
            .unwrap_err();

        assert!(matches!(
            error,
            SampleRecordError::NonFiniteValue { ref series, .. } if series == "accuracy"
        ));
        assert_eq!(aggregate.len(), 1, "no series registered by a failed call");
        assert_series_eq(aggregate.snapshot().series("loss").unwrap(), &[1.0]);
    }

    #[test]
    fn rejects_fractional_or_negative_step_values() {
        let mut aggregate = aggregate_with_capacity(4);

        assert_eq!(
            aggregate.update([("step", 1.5), ("loss", 1.0)]).unwrap_err(),
            SampleRecordError::InvalidStep(1.5)
        );
        assert_eq!(
            aggregate.update([("step", -1.0), ("loss", 1.0)]).unwrap_err(),
            SampleRecordError::InvalidStep(-1.0)
        );
        assert_eq!(aggregate.current_step(), None);
    }

    #[test]
    fn accepts_out_of_order_steps_into_coarsened_buckets() {
        let mut aggregate = aggregate_with_capacity(4);
        for (step, value) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            aggregate.update_at(step as u64, [("loss", value)]).unwrap();
        }
        aggregate.update_at(4, [("loss", 5.0)]).unwrap();

        // Step 1 now maps to bucket 0 (mean 1.5, count 2) and averages in
        aggregate.update_at(1, [("loss", 3.0)]).unwrap();

        let buffer = &aggregate.series["loss"];
        assert_eq!(buffer.count(0), 3);
        assert!((buffer.mean(0) - 2.0).abs() < 1e-9);
        assert_eq!(aggregate.max_step(), 4, "older step never lowers max_step");
    }

    #[test]
    fn doubles_reduction_factor_until_large_step_fits() {
        let mut aggregate = aggregate_with_capacity(4);
        aggregate.update_at(0, [("loss", 1.0)]).unwrap();

        aggregate.update_at(100, [("loss", 9.0)]).unwrap();

        assert_eq!(aggregate.reduction_factor(), 32);
        let snapshot = aggregate.snapshot();
        assert_series_eq(
            snapshot.series("loss").unwrap(),
            &[1.0, f64::NAN, f64::NAN, 9.0],
        );
    }

    #[test]
    fn registers_new_series_at_current_reduction_factor() {
        let mut aggregate = aggregate_with_capacity(4);
        for step in 0..5u64 {
            aggregate.update_at(step, [("loss", 1.0)]).unwrap();
        }
        assert_eq!(aggregate.reduction_factor(), 2);

        aggregate.update_at(4, [("accuracy", 0.9)]).unwrap();

        let snapshot = aggregate.snapshot();
        assert_series_eq(
            snapshot.series("accuracy").unwrap(),
            &[f64::NAN, f64::NAN, 0.9],
        );
    }

    #[test]
    fn snapshot_is_idempotent_between_updates() {
        let mut aggregate = aggregate_with_capacity(4);
        for step in 0..5u64 {
            aggregate
                .update_at(step, [("loss", step as f64), ("accuracy", 0.5)])
                .unwrap();
        }

        let (first, second) = (aggregate.snapshot(), aggregate.snapshot());

        assert_eq!(first.reduction_factor(), second.reduction_factor());
        assert_eq!(first.max_step(), second.max_step());
        for name in ["loss", "accuracy"] {
            assert_series_eq(first.series(name).unwrap(), second.series(name).unwrap());
        }
    }

    #[test]
    fn snapshot_before_first_update_has_no_series() {
        let aggregate = aggregate_with_capacity(4);

        let snapshot = aggregate.snapshot();

        assert!(snapshot.is_empty());
        assert_eq!(snapshot.reduction_factor(), 1);
        assert_eq!(snapshot.max_step(), 0);
    }

    #[test]
    fn keeps_bucket_under_capacity_for_monotonic_steps() {
        let mut aggregate = aggregate_with_capacity(6);
        let mut last_factor = 0;

        for step in 0..500u64 {
            aggregate.update_at(step, [("loss", 1.0)]).unwrap();

            let factor = aggregate.reduction_factor();
            assert!(factor >= last_factor, "reduction factor never shrinks");
            assert!(
                ((step / factor) as usize) < aggregate.capacity(),
                "bucket stays inside the buffer at step {step}"
            );
            last_factor = factor;
        }
    }

    #[test]
    fn rejects_invalid_settings_at_construction() {
        let result = SeriesAggregate::new(&PlotSettings::default().with_capacity(3));

        assert_eq!(result.unwrap_err(), PlotConfigError::OddCapacity(3));
    }
}
