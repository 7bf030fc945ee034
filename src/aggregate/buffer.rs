/// Fixed-capacity storage for one plotted series
///
/// Keeps a running mean and a sample count per bucket. A NaN mean with a
/// zero count marks an empty bucket, which renders as a gap.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    means: Box<[f64]>,
    counts: Box<[u64]>,
}

impl SeriesBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            means: vec![f64::NAN; capacity].into_boxed_slice(),
            counts: vec![0; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.means.len()
    }

    /// Folds a value into the running mean at `bucket`
    ///
    /// A bucket past capacity means the caller skipped a coarsening pass,
    /// which is a logic fault rather than a recoverable condition.
    pub(crate) fn insert(&mut self, bucket: usize, value: f64) {
        assert!(
            bucket < self.capacity(),
            "bucket {bucket} out of range for capacity {}",
            self.capacity()
        );

        let count = self.counts[bucket] + 1;
        self.counts[bucket] = count;
        self.means[bucket] = match count {
            1 => value,
            _ => {
                let count = count as f64;
                (count - 1.0) / count * self.means[bucket] + value / count
            }
        };
    }

    /// Halves the logical resolution by merging adjacent bucket pairs
    ///
    /// Merged means are the plain two-point average of the non-empty
    /// sources, not weighted by count. Counts are summed. The second half
    /// of the buffer resets to empty; it is unpopulated at the moment the
    /// caller triggers the pass.
    pub(crate) fn coarsen(&mut self) {
        let half = self.capacity() / 2;

        for target in 0..half {
            let (left, right) = (self.means[2 * target], self.means[2 * target + 1]);
            self.means[target] = match (left.is_nan(), right.is_nan()) {
                (true, true) => f64::NAN,
                (false, true) => left,
                (true, false) => right,
                (false, false) => (left + right) / 2.0,
            };
            self.counts[target] = self.counts[2 * target] + self.counts[2 * target + 1];
        }

        self.means[half..].fill(f64::NAN);
        self.counts[half..].fill(0);
    }

    /// Running mean at `bucket`, NaN when the bucket is empty
    pub fn mean(&self, bucket: usize) -> f64 {
        self.means[bucket]
    }

    /// Number of samples folded into `bucket`, across coarsening passes
    pub fn count(&self, bucket: usize) -> u64 {
        self.counts[bucket]
    }

    /// First `len` bucket means, in x order
    pub(crate) fn window(&self, len: usize) -> &[f64] {
        &self.means[..len]
    }
}
