/// Descriptive statistics reported with a comparison, over finite inputs only.
use crate::rounding;
use constants::processing::{HISTOGRAM_BINS, HISTOGRAM_PERCENTILE_RANGE, REPORTED_PERCENTILES};
use serde::{Deserialize, Serialize};

/// Finite values, sorted ascending
fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Linear-interpolated percentile of pre-sorted data, NaN when empty
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let fraction = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    #[serde(with = "rounding")]
    pub p10: f64,
    #[serde(with = "rounding")]
    pub p25: f64,
    #[serde(with = "rounding")]
    pub p50: f64,
    #[serde(with = "rounding")]
    pub p75: f64,
    #[serde(with = "rounding")]
    pub p90: f64,
}

impl Percentiles {
    fn from_sorted(sorted: &[f64]) -> Self {
        let [p10, p25, p50, p75, p90] = REPORTED_PERCENTILES.map(|p| percentile_sorted(sorted, p));
        Self {
            p10,
            p25,
            p50,
            p75,
            p90,
        }
    }
}

/// Height distribution of one side of the comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatistics {
    #[serde(with = "rounding")]
    pub mean_veg_height: f64,
    #[serde(with = "rounding")]
    pub median_veg_height: f64,
    #[serde(with = "rounding")]
    pub std_veg_height: f64,
    #[serde(with = "rounding")]
    pub min_veg_height: f64,
    #[serde(with = "rounding")]
    pub max_veg_height: f64,
    pub percentiles: Percentiles,
    #[serde(with = "rounding")]
    pub mean_points_per_grid_cell: f64,
}

impl FileStatistics {
    /// Statistics of cell heights plus the mean point count per cell
    pub fn from_cells(heights: &[f64], counts: &[f64]) -> Self {
        let sorted = sorted_finite(heights);
        let counts = sorted_finite(counts);
        Self {
            mean_veg_height: mean(&sorted),
            median_veg_height: percentile_sorted(&sorted, 50.0),
            std_veg_height: population_std(&sorted),
            min_veg_height: sorted.first().copied().unwrap_or(f64::NAN),
            max_veg_height: sorted.last().copied().unwrap_or(f64::NAN),
            percentiles: Percentiles::from_sorted(&sorted),
            mean_points_per_grid_cell: mean(&counts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    #[serde(with = "rounding::vec")]
    pub bin_edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Equal-width bins spanning the 1st to 99th percentile of `values`.
    ///
    /// Values outside the span land in the first or last bin. A degenerate
    /// span is widened to ±0.5 around its value.
    pub fn from_values(values: &[f64]) -> Self {
        let sorted = sorted_finite(values);
        if sorted.is_empty() {
            return Self {
                bin_edges: Vec::new(),
                counts: Vec::new(),
            };
        }

        let (low_p, high_p) = HISTOGRAM_PERCENTILE_RANGE;
        let mut low = percentile_sorted(&sorted, low_p);
        let mut high = percentile_sorted(&sorted, high_p);
        if high <= low {
            low -= 0.5;
            high += 0.5;
        }

        let bins = HISTOGRAM_BINS;
        let width = (high - low) / bins as f64;
        let bin_edges: Vec<f64> = (0..=bins).map(|i| low + width * i as f64).collect();

        let mut counts = vec![0u64; bins];
        for value in &sorted {
            let position = ((value - low) / width).floor();
            let index = position.clamp(0.0, (bins - 1) as f64) as usize;
            counts[index] += 1;
        }

        Self { bin_edges, counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionLine {
    #[serde(with = "rounding::option")]
    pub slope: Option<f64>,
    #[serde(with = "rounding::option")]
    pub intercept: Option<f64>,
    #[serde(with = "rounding")]
    pub x_min: f64,
    #[serde(with = "rounding")]
    pub x_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    #[serde(with = "rounding::option")]
    pub pearson_correlation: Option<f64>,
    pub regression_line: RegressionLine,
}

/// Finite (a, b) pairs
fn finite_pairs(a: &[f64], b: &[f64]) -> Vec<(f64, f64)> {
    a.iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .collect()
}

/// Pearson correlation of finite pairs; None with fewer than two pairs or zero variance
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let pairs = finite_pairs(a, b);
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in &pairs {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Least-squares fit of b against a, as (slope, intercept).
///
/// None when the design matrix is degenerate: Σx² − (Σx)²/n is zero (within
/// rounding), i.e. every a value is the same or there are no pairs.
pub fn ols_regression(a: &[f64], b: &[f64]) -> Option<(f64, f64)> {
    let pairs = finite_pairs(a, b);
    if pairs.is_empty() {
        return None;
    }
    let n = pairs.len() as f64;
    let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
    for &(x, y) in &pairs {
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
    }

    let denom = sxx - sx * sx / n;
    if denom.abs() <= f64::EPSILON * sxx.abs().max(1.0) * 16.0 {
        return None;
    }
    let slope = (sxy - sx * sy / n) / denom;
    let intercept = sy / n - slope * sx / n;
    Some((slope, intercept))
}

/// Distribution of b − a across matched cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceStatistics {
    #[serde(with = "rounding")]
    pub mean: f64,
    #[serde(with = "rounding")]
    pub median: f64,
    #[serde(with = "rounding")]
    pub std: f64,
    #[serde(with = "rounding::option")]
    pub most_negative: Option<f64>,
    #[serde(with = "rounding::option")]
    pub least_negative: Option<f64>,
    #[serde(with = "rounding::option")]
    pub smallest_positive: Option<f64>,
    #[serde(with = "rounding::option")]
    pub largest_positive: Option<f64>,
    pub percentiles: Percentiles,
    pub histogram: Histogram,
    pub correlation: Correlation,
}

impl DifferenceStatistics {
    /// Statistics over paired values `a[i]`, `b[i]`
    pub fn from_pairs(a: &[f64], b: &[f64]) -> Self {
        let pairs = finite_pairs(a, b);
        let diffs: Vec<f64> = pairs.iter().map(|(x, y)| y - x).collect();
        let sorted = sorted_finite(&diffs);

        let negatives: Vec<f64> = sorted.iter().copied().filter(|d| *d < 0.0).collect();
        let positives: Vec<f64> = sorted.iter().copied().filter(|d| *d > 0.0).collect();

        let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        let regression = ols_regression(&xs, &ys);
        let x_min = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            mean: mean(&sorted),
            median: percentile_sorted(&sorted, 50.0),
            std: population_std(&sorted),
            most_negative: negatives.first().copied(),
            least_negative: negatives.last().copied(),
            smallest_positive: positives.first().copied(),
            largest_positive: positives.last().copied(),
            percentiles: Percentiles::from_sorted(&sorted),
            histogram: Histogram::from_values(&sorted),
            correlation: Correlation {
                pearson_correlation: pearson(&xs, &ys),
                regression_line: RegressionLine {
                    slope: regression.map(|r| r.0),
                    intercept: regression.map(|r| r.1),
                    x_min,
                    x_max,
                },
            },
        }
    }
}

/// Statistics for both sides and their difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonStatistics {
    pub file_a: FileStatistics,
    pub file_b: FileStatistics,
    pub difference: DifferenceStatistics,
}

impl ComparisonStatistics {
    pub fn compute(a: &[f64], b: &[f64], counts_a: &[f64], counts_b: &[f64]) -> Self {
        Self {
            file_a: FileStatistics::from_cells(a, counts_a),
            file_b: FileStatistics::from_cells(b, counts_b),
            difference: DifferenceStatistics::from_pairs(a, b),
        }
    }
}
