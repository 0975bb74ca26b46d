/// Point to cell binning.
use crate::bounds::{BoundingBox, Grid, union_mask, validate_bboxes};
use crate::cell_table::{CellRow, CellTable, GridSummary};
use crate::digest::RankDigest;
use crate::error::{GridError, GridResult};
use crate::global_stats::GlobalStats;
use crate::source::PointChunk;
use constants::is_noise;
use constants::processing::{
    CELL_PERCENTILES, DEFAULT_OUTLIER_DEVIATION_FACTOR, INDIVIDUAL_PERCENTILE_RANGE,
};
use rayon::prelude::*;
use tracing::debug;

/// Point filtering and outlier options for one job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub percentile_filter_enabled: bool,
    pub outlier_detection_enabled: bool,
    pub outlier_deviation_factor: f64,
    pub individual_percentile: Option<f64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            lower_percentile: 0.0,
            upper_percentile: 100.0,
            percentile_filter_enabled: true,
            outlier_detection_enabled: true,
            outlier_deviation_factor: DEFAULT_OUTLIER_DEVIATION_FACTOR,
            individual_percentile: None,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> GridResult<()> {
        let (lower, upper) = (self.lower_percentile, self.upper_percentile);
        if !(0.0..=100.0).contains(&lower) || !(0.0..=100.0).contains(&upper) {
            return Err(invalid_filter(format!(
                "percentile bounds must lie in [0, 100], got [{}, {}]",
                lower, upper
            )));
        }
        if lower > upper {
            return Err(invalid_filter(format!(
                "lower percentile {} exceeds upper percentile {}",
                lower, upper
            )));
        }
        if !self.outlier_deviation_factor.is_finite() || self.outlier_deviation_factor < 0.0 {
            return Err(invalid_filter(format!(
                "outlier deviation factor must be a non-negative number, got {}",
                self.outlier_deviation_factor
            )));
        }
        if let Some(p) = self.individual_percentile {
            let (min, max) = INDIVIDUAL_PERCENTILE_RANGE;
            if !(min..=max).contains(&p) {
                return Err(invalid_filter(format!(
                    "individual percentile must lie in [{}, {}], got {}",
                    min, max, p
                )));
            }
        }
        Ok(())
    }

    /// Bounds narrower than the full [0, 100] range
    pub fn narrows_percentiles(&self) -> bool {
        self.lower_percentile > 0.0 || self.upper_percentile < 100.0
    }

    /// Whether the global statistics pass has to run at all
    pub fn needs_global_stats(&self) -> bool {
        self.percentile_filter_enabled || self.outlier_detection_enabled
    }
}

fn invalid_filter(reason: String) -> GridError {
    GridError::InvalidFilter { reason }
}

/// Outlier thresholds resolved from global statistics
#[derive(Debug, Clone, Copy)]
struct OutlierRule {
    median: f64,
    max_deviation: f64,
}

/// Counters reported per processed chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub points_read: usize,
    pub points_binned: usize,
    pub cells_touched: usize,
}

/// Dense per-cell arrays sized rows × cols plus a lazily created digest per
/// touched cell. Each chunk is masked and scattered in one pass, and every
/// touched digest receives a single batch per chunk.
pub struct GridAccumulator {
    grid: Grid,
    rows: usize,
    cols: usize,
    bboxes: Vec<BoundingBox>,
    filter: FilterConfig,
    /// Inclusive vegetation height window from the global digest
    veg_window: Option<(f64, f64)>,
    outliers: Option<OutlierRule>,

    count: Vec<u32>,
    z_min: Vec<f32>,
    z_max: Vec<f32>,
    veg_min: Vec<f32>,
    veg_max: Vec<f32>,
    outlier_count: Vec<u32>,
    outlier_class7_count: Vec<u32>,
    class7_count: Vec<u32>,
    digests: Vec<Option<Box<RankDigest>>>,

    // Scratch buffers reused across chunks
    binned: Vec<(usize, f64)>,
}

impl GridAccumulator {
    /// Create new accumulator sized for `grid`.
    ///
    /// Percentile filtering and outlier detection only take effect when
    /// `global_stats` is provided; without it both are skipped.
    pub fn new(
        grid: Grid,
        bboxes: &[BoundingBox],
        filter: FilterConfig,
        global_stats: Option<&GlobalStats>,
    ) -> GridResult<Self> {
        grid.validate()?;
        validate_bboxes(bboxes)?;
        filter.validate()?;

        let veg_window = global_stats
            .filter(|_| filter.percentile_filter_enabled && filter.narrows_percentiles())
            .map(|stats| {
                let low = stats.percentile(filter.lower_percentile);
                let high = stats.percentile(filter.upper_percentile);
                debug!(
                    lower = filter.lower_percentile,
                    upper = filter.upper_percentile,
                    low,
                    high,
                    "Applying percentile filter"
                );
                (low, high)
            });
        let outliers = global_stats
            .filter(|_| filter.outlier_detection_enabled)
            .map(|stats| OutlierRule {
                median: stats.median,
                max_deviation: filter.outlier_deviation_factor * stats.std,
            });

        let (rows, cols) = (grid.rows(), grid.cols());
        let cells = rows * cols;
        Ok(Self {
            grid,
            rows,
            cols,
            bboxes: bboxes.to_vec(),
            filter,
            veg_window,
            outliers,
            count: vec![0; cells],
            z_min: vec![f32::INFINITY; cells],
            z_max: vec![f32::NEG_INFINITY; cells],
            veg_min: vec![f32::INFINITY; cells],
            veg_max: vec![f32::NEG_INFINITY; cells],
            outlier_count: vec![0; cells],
            outlier_class7_count: vec![0; cells],
            class7_count: vec![0; cells],
            digests: vec![None; cells],
            binned: Vec::new(),
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Bin one chunk of points into the grid
    pub fn process_chunk(&mut self, chunk: &PointChunk) -> GridResult<ChunkOutcome> {
        chunk.validate()?;
        let mut outcome = ChunkOutcome {
            points_read: chunk.len(),
            ..ChunkOutcome::default()
        };

        let bbox_mask = union_mask(&self.bboxes, &chunk.x, &chunk.y);
        if !bbox_mask.iter().any(|&inside| inside) {
            return Ok(outcome);
        }

        self.binned.clear();
        for (i, inside) in bbox_mask.into_iter().enumerate() {
            let class = chunk.classification[i];
            let veg = chunk.veg_height[i];
            if !inside || is_noise(class) {
                continue;
            }
            if let Some((low, high)) = self.veg_window {
                if !(veg >= low && veg <= high) {
                    continue;
                }
            }
            let Some((row, col)) = self.grid.cell_index(chunk.x[i], chunk.y[i]) else {
                continue;
            };

            let cell = row * self.cols + col;
            let z = chunk.z[i] as f32;
            let veg32 = veg as f32;
            self.count[cell] += 1;
            self.z_min[cell] = self.z_min[cell].min(z);
            self.z_max[cell] = self.z_max[cell].max(z);
            self.veg_min[cell] = self.veg_min[cell].min(veg32);
            self.veg_max[cell] = self.veg_max[cell].max(veg32);

            let is_outlier = self
                .outliers
                .is_some_and(|rule| (veg - rule.median).abs() > rule.max_deviation);
            if is_outlier {
                self.outlier_count[cell] += 1;
                if is_noise(class) {
                    self.outlier_class7_count[cell] += 1;
                }
            }
            if is_noise(class) {
                self.class7_count[cell] += 1;
            }

            self.binned.push((cell, veg));
        }

        outcome.points_binned = self.binned.len();
        if self.binned.is_empty() {
            return Ok(outcome);
        }

        // Group by flat cell index so each touched digest sees one batch
        self.binned.sort_unstable_by_key(|&(cell, _)| cell);
        let mut values = Vec::new();
        for run in self.binned.chunk_by(|a, b| a.0 == b.0) {
            let cell = run[0].0;
            values.clear();
            values.extend(run.iter().map(|&(_, veg)| veg));
            self.digests[cell]
                .get_or_insert_with(|| Box::new(RankDigest::default()))
                .batch_update(&values);
            outcome.cells_touched += 1;
        }

        Ok(outcome)
    }

    /// Emit non-empty cells in row-major order with their digest percentiles
    pub fn finalize(mut self) -> CellTable {
        let individual = self.filter.individual_percentile;
        let cols = self.cols;
        let grid = self.grid;

        let occupied: Vec<usize> = (0..self.count.len())
            .filter(|&cell| self.count[cell] > 0)
            .collect();
        let digests = std::mem::take(&mut self.digests);

        let percentiles: Vec<(f64, f64, Option<f64>)> = occupied
            .par_iter()
            .map(|&cell| match &digests[cell] {
                Some(digest) => {
                    let requested = [
                        CELL_PERCENTILES[0],
                        CELL_PERCENTILES[1],
                        individual.unwrap_or(f64::NAN),
                    ];
                    let values = digest.percentiles(&requested);
                    (values[0], values[1], individual.map(|_| values[2]))
                }
                None => (f64::NAN, f64::NAN, individual.map(|_| f64::NAN)),
            })
            .collect();

        let rows: Vec<CellRow> = occupied
            .iter()
            .zip(percentiles)
            .map(|(&cell, (p90, p95, p_individual))| {
                let (x0, x1, y0, y1) = grid.cell_bounds(cell / cols, cell % cols);
                CellRow {
                    x0,
                    x1,
                    y0,
                    y1,
                    count: self.count[cell],
                    z_max: self.z_max[cell],
                    z_min: self.z_min[cell],
                    veg_height_max: self.veg_max[cell],
                    veg_height_min: self.veg_min[cell],
                    veg_p90: p90,
                    veg_p95: p95,
                    veg_height_outlier_count: self.outlier_count[cell],
                    veg_height_outlier_class7_count: self.outlier_class7_count[cell],
                    class7_count: self.class7_count[cell],
                    veg_height_individual: p_individual,
                }
            })
            .collect();

        let n_cells = (self.rows * self.cols) as u64;
        let summary = GridSummary::from_rows(n_cells, &rows);
        debug!(
            cells = rows.len(),
            n_cells,
            "Grid accumulation finalized"
        );

        CellTable {
            rows,
            summary,
            individual_percentile: individual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PointSource, VecPointSource};

    fn ten_by_ten() -> Grid {
        Grid::new(0.0, 10.0, 0.0, 10.0, 1.0, 1.0).unwrap()
    }

    fn whole_area() -> Vec<BoundingBox> {
        vec![BoundingBox::new(0.0, 10.0, 0.0, 10.0).unwrap()]
    }

    fn accumulate(
        points: &[(f64, f64, f64, f64, u8)],
        bboxes: &[BoundingBox],
        filter: FilterConfig,
        stats: Option<&GlobalStats>,
    ) -> CellTable {
        let mut acc = GridAccumulator::new(ten_by_ten(), bboxes, filter, stats).unwrap();
        VecPointSource::from_points(points)
            .for_each_chunk(3, &mut |chunk| acc.process_chunk(chunk).map(|_| ()))
            .unwrap();
        acc.finalize()
    }

    fn no_filters() -> FilterConfig {
        FilterConfig {
            percentile_filter_enabled: false,
            outlier_detection_enabled: false,
            ..FilterConfig::default()
        }
    }

    #[test]
    fn four_points_land_in_three_cells() {
        let points = [
            (0.5, 0.5, 10.0, 1.0, 2),
            (0.9, 0.8, 5.0, 2.0, 2),
            (2.0, 2.5, 20.0, 3.0, 2),
            (9.5, 9.2, 15.0, 4.0, 2),
        ];
        let table = accumulate(&points, &whole_area(), no_filters(), None);

        let counts: Vec<_> = table
            .rows
            .iter()
            .map(|r| ((r.y0 as usize, r.x0 as usize), r.count))
            .collect();
        assert_eq!(counts, vec![((0, 0), 2), ((2, 2), 1), ((9, 9), 1)]);
        assert_eq!(table.summary.n_cells, 100);
        assert_eq!(table.summary.max_z, 20.0);
        assert_eq!(table.summary.min_z, 5.0);
        assert_eq!(table.rows[0].veg_height_min, 1.0);
        assert_eq!(table.rows[0].veg_height_max, 2.0);
    }

    #[test]
    fn noise_points_never_reach_cells() {
        let points = [(0.5, 0.5, 10.0, 1.0, 7), (0.6, 0.5, 10.0, 1.0, 2)];
        let table = accumulate(&points, &whole_area(), no_filters(), None);
        assert_eq!(table.total_count(), 1);
        assert_eq!(table.rows[0].class7_count, 0);
    }

    #[test]
    fn outliers_are_counted_against_global_median() {
        let points = [
            (0.5, 0.5, 1.0, 1.0, 2),
            (0.5, 0.5, 1.0, 1.1, 2),
            (0.5, 0.5, 1.0, 0.9, 2),
            (0.5, 0.5, 1.0, 9.0, 2),
        ];
        let filter = FilterConfig {
            percentile_filter_enabled: false,
            ..FilterConfig::default()
        };
        let source = VecPointSource::from_points(&points);
        let stats = GlobalStats::compute(&source, &whole_area(), 10).unwrap();
        let table = accumulate(&points, &whole_area(), filter, Some(&stats));
        assert_eq!(table.rows[0].count, 4);
        assert_eq!(table.rows[0].veg_height_outlier_count, 1);
    }

    #[test]
    fn outliers_need_global_stats() {
        let points = [(0.5, 0.5, 1.0, 1.0, 2), (0.5, 0.5, 1.0, 100.0, 2)];
        let table = accumulate(&points, &whole_area(), FilterConfig::default(), None);
        assert_eq!(table.rows[0].veg_height_outlier_count, 0);
    }

    #[test]
    fn percentiles_come_from_cell_digest() {
        let points: Vec<_> = (1..=10).map(|i| (3.5, 4.5, 0.0, i as f64, 2)).collect();
        let filter = FilterConfig {
            individual_percentile: Some(50.0),
            ..no_filters()
        };
        let table = accumulate(&points, &whole_area(), filter, None);
        let row = &table.rows[0];
        assert_eq!((row.x0, row.y0), (3.0, 4.0));
        assert!(row.veg_p95 >= row.veg_p90);
        assert!(row.veg_p90 >= 8.0 && row.veg_p90 <= 10.0);
        let median = row.veg_height_individual.unwrap();
        assert!((5.0..=6.0).contains(&median));
    }

    #[test]
    fn invalid_filter_is_rejected_up_front() {
        let filter = FilterConfig {
            lower_percentile: 60.0,
            upper_percentile: 40.0,
            ..FilterConfig::default()
        };
        assert!(matches!(
            GridAccumulator::new(ten_by_ten(), &whole_area(), filter, None),
            Err(GridError::InvalidFilter { .. })
        ));
        let filter = FilterConfig {
            individual_percentile: Some(100.0),
            ..FilterConfig::default()
        };
        assert!(filter.validate().is_err());
    }

    #[test]
    fn global_stats_are_skipped_when_nothing_needs_them() {
        assert!(!no_filters().needs_global_stats());
        assert!(FilterConfig::default().needs_global_stats());
        assert!(!FilterConfig::default().narrows_percentiles());
    }
}
