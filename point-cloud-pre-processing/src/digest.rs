/// Mergeable rank digest for approximate percentiles, backed by `tdigest`.
use constants::processing::DIGEST_COMPRESSION;
use std::borrow::Cow;
use tdigest::TDigest;

/// Buffers observations and folds them into a t-digest once the buffer fills.
///
/// While nothing has been folded every observation is still at hand, so small
/// samples (a single point, a sparse cell) report exact percentiles using
/// linear interpolation between order statistics.
#[derive(Debug, Clone)]
pub struct RankDigest {
    digest: TDigest,
    max_size: usize,
    buffer: Vec<f64>,
    buffer_limit: usize,
    count: u64,
    min: f64,
    max: f64,
}

impl Default for RankDigest {
    fn default() -> Self {
        Self::new(DIGEST_COMPRESSION)
    }
}

impl RankDigest {
    /// Create an empty digest. Larger `compression` keeps more centroids.
    pub fn new(compression: f64) -> Self {
        let compression = if compression.is_finite() && compression >= 10.0 {
            compression
        } else {
            DIGEST_COMPRESSION
        };
        let max_size = compression.round() as usize;
        Self {
            digest: TDigest::new_with_size(max_size),
            max_size,
            buffer: Vec::new(),
            buffer_limit: max_size * 5,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Add a single observation. Non-finite values are ignored.
    pub fn update(&mut self, value: f64) {
        self.batch_update(&[value]);
    }

    /// Add a run of observations, folding whenever the buffer fills.
    pub fn batch_update(&mut self, values: &[f64]) {
        for &value in values.iter().filter(|v| v.is_finite()) {
            self.buffer.push(value);
            self.count += 1;
            self.min = self.min.min(value);
            self.max = self.max.max(value);
            if self.buffer.len() >= self.buffer_limit {
                self.flush();
            }
        }
    }

    /// Fold buffered values into the t-digest.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let pending = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.buffer_limit));
        self.digest = self.digest.merge_unsorted(pending);
    }

    /// Fold another digest into this one.
    pub fn merge(&mut self, other: &RankDigest) {
        if other.is_empty() {
            return;
        }
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        if !self.is_folded() && !other.is_folded() {
            self.buffer.extend_from_slice(&other.buffer);
            if self.buffer.len() >= self.buffer_limit {
                self.flush();
            }
            return;
        }

        self.flush();
        let theirs = other.settled();
        let ours = std::mem::replace(&mut self.digest, TDigest::new_with_size(self.max_size));
        let parts: Vec<TDigest> = [ours, theirs.into_owned()]
            .into_iter()
            .filter(|d| d.count() > 0.0)
            .collect();
        self.digest = TDigest::merge_digests(parts);
    }

    /// Number of observations recorded so far
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Smallest observed value, NaN when empty
    pub fn min(&self) -> f64 {
        if self.is_empty() { f64::NAN } else { self.min }
    }

    /// Largest observed value, NaN when empty
    pub fn max(&self) -> f64 {
        if self.is_empty() { f64::NAN } else { self.max }
    }

    /// Estimate the value at percentile `p` (0..=100).
    ///
    /// Empty digests and a NaN `p` return NaN; `p` is clamped to [0, 100].
    pub fn percentile(&self, p: f64) -> f64 {
        self.percentiles(&[p])[0]
    }

    /// Several percentiles at once, settling the pending buffer only once
    pub fn percentiles(&self, ps: &[f64]) -> Vec<f64> {
        if self.is_empty() {
            return vec![f64::NAN; ps.len()];
        }
        let quantiles = ps.iter().map(|p| (p / 100.0).clamp(0.0, 1.0));
        if !self.is_folded() {
            let mut sorted = self.buffer.clone();
            sorted.sort_unstable_by(f64::total_cmp);
            return quantiles.map(|q| interpolate(&sorted, q)).collect();
        }
        let digest = self.settled();
        quantiles
            .map(|q| {
                if q.is_nan() {
                    f64::NAN
                } else {
                    digest.estimate_quantile(q).clamp(self.min, self.max)
                }
            })
            .collect()
    }

    /// True once some observations live only in the t-digest
    fn is_folded(&self) -> bool {
        self.count != self.buffer.len() as u64
    }

    /// The t-digest with pending values merged in, without mutating self
    fn settled(&self) -> Cow<'_, TDigest> {
        if self.buffer.is_empty() {
            Cow::Borrowed(&self.digest)
        } else {
            Cow::Owned(self.digest.merge_unsorted(self.buffer.clone()))
        }
    }
}

/// Linear interpolation between the order statistics of a sorted, non-empty slice
fn interpolate(sorted: &[f64], q: f64) -> f64 {
    if q.is_nan() {
        return f64::NAN;
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
