/// Global vegetation height statistics gathered in a first pass.
use crate::bounds::{BoundingBox, union_mask};
use crate::digest::RankDigest;
use crate::error::GridResult;
use crate::source::PointSource;
use constants::is_noise;
use tracing::debug;

/// Streaming mean and variance, updated one chunk at a time.
#[derive(Debug, Clone, Default)]
pub struct WelfordAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl WelfordAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a chunk of values in with one mean shift and one M2 sum.
    ///
    /// `mean += Σ(v - old_mean) / n_total`, then `M2 += Σ(v - old_mean)(v - new_mean)`.
    /// Non-finite values are skipped.
    pub fn update_batch(&mut self, values: &[f64]) {
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let (added, delta_sum) = finite
            .clone()
            .fold((0u64, 0.0), |(n, sum), v| (n + 1, sum + (v - self.mean)));
        if added == 0 {
            return;
        }

        let old_mean = self.mean;
        self.count += added;
        self.mean += delta_sum / self.count as f64;
        let new_mean = self.mean;
        self.m2 += finite.map(|v| (v - old_mean) * (v - new_mean)).sum::<f64>();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    /// sqrt(M2 / n), zero when nothing was recorded
    pub fn population_std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0).sqrt()
        }
    }
}

/// Summary of the filtered vegetation height distribution.
///
/// Only points inside the bounding box union and not classified as noise count.
#[derive(Debug, Clone)]
pub struct GlobalStats {
    pub std: f64,
    pub median: f64,
    pub total_count: u64,
    digest: RankDigest,
}

impl GlobalStats {
    /// Assemble from a finished accumulator and digest
    pub fn from_parts(welford: &WelfordAccumulator, digest: RankDigest) -> Self {
        let total_count = welford.count();
        let median = if total_count > 0 {
            digest.percentile(50.0)
        } else {
            0.0
        };
        Self {
            std: welford.population_std(),
            median,
            total_count,
            digest,
        }
    }

    /// One full pass over `source`, keeping bbox-union points that are not noise
    pub fn compute(
        source: &dyn PointSource,
        bboxes: &[BoundingBox],
        chunk_size: usize,
    ) -> GridResult<Self> {
        let mut welford = WelfordAccumulator::new();
        let mut digest = RankDigest::default();
        let mut selected = Vec::with_capacity(chunk_size.min(1 << 20));

        source.for_each_chunk(chunk_size, &mut |chunk| {
            chunk.validate()?;
            let mask = union_mask(bboxes, &chunk.x, &chunk.y);

            selected.clear();
            selected.extend(
                mask.iter()
                    .zip(&chunk.classification)
                    .zip(&chunk.veg_height)
                    .filter(|((inside, class), _)| **inside && !is_noise(**class))
                    .map(|(_, &veg)| veg),
            );
            if selected.is_empty() {
                return Ok(());
            }

            welford.update_batch(&selected);
            digest.batch_update(&selected);
            Ok(())
        })?;

        let stats = Self::from_parts(&welford, digest);
        debug!(
            total_count = stats.total_count,
            median = stats.median,
            std = stats.std,
            "Global vegetation statistics computed"
        );
        Ok(stats)
    }

    /// Digest of every selected value, used for percentile thresholds
    pub fn digest(&self) -> &RankDigest {
        &self.digest
    }

    pub fn percentile(&self, p: f64) -> f64 {
        self.digest.percentile(p)
    }
}
