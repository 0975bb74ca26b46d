/// Two-pass preprocessing pipeline turning a point stream into a cell table.
use crate::accumulator::{FilterConfig, GridAccumulator};
use crate::bounds::{BoundingBox, Grid, validate_bboxes};
use crate::cell_table::CellTable;
use crate::error::GridResult;
use crate::global_stats::GlobalStats;
use crate::source::{PointChunk, PointSource};
use constants::processing::POINT_CHUNK_SIZE;
use constants::{NOISE_CLASSIFICATION, get_class_name};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Orchestrates the optional global statistics pass and the binning pass.
#[derive(Debug, Clone)]
pub struct PreprocessingPipeline {
    chunk_size: usize,
    show_progress: bool,
}

impl Default for PreprocessingPipeline {
    fn default() -> Self {
        Self::new(POINT_CHUNK_SIZE)
    }
}

impl PreprocessingPipeline {
    /// Create new pipeline streaming `chunk_size` points at a time.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            show_progress: true,
        }
    }

    /// Disable progress bars, e.g. for tests or non-interactive runs.
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run both passes over `source`.
    /// Validation happens before any point is read; global statistics are only
    /// gathered when percentile filtering or outlier detection is enabled.
    pub fn run(
        &self,
        source: &dyn PointSource,
        grid: Grid,
        bboxes: &[BoundingBox],
        filter: FilterConfig,
    ) -> GridResult<CellTable> {
        grid.validate()?;
        validate_bboxes(bboxes)?;
        filter.validate()?;

        info!(
            rows = grid.rows(),
            cols = grid.cols(),
            bboxes = bboxes.len(),
            excluded_class = %get_class_name(NOISE_CLASSIFICATION),
            "Starting grid preprocessing"
        );

        let global_stats = if filter.needs_global_stats() {
            info!("Calculating global vegetation statistics");
            let pb = self.progress_bar(source, "Global statistics");
            let stats = GlobalStats::compute(
                &ProgressSource {
                    inner: source,
                    pb: &pb,
                },
                bboxes,
                self.chunk_size,
            )?;
            pb.finish_with_message("Global statistics calculated");
            info!(
                points = stats.total_count,
                median = stats.median,
                std = stats.std,
                "Global statistics ready"
            );
            Some(stats)
        } else {
            info!("Filtering and outlier detection disabled, skipping global statistics");
            None
        };

        let mut accumulator = GridAccumulator::new(grid, bboxes, filter, global_stats.as_ref())?;
        let pb = self.progress_bar(source, "Binning points");
        let mut binned = 0usize;
        source.for_each_chunk(self.chunk_size, &mut |chunk| {
            let outcome = accumulator.process_chunk(chunk)?;
            binned += outcome.points_binned;
            pb.inc(outcome.points_read as u64);
            Ok(())
        })?;
        pb.finish_with_message("Points binned");

        let table = accumulator.finalize();
        info!(
            points = binned,
            cells = table.len(),
            "Grid preprocessing complete"
        );
        Ok(table)
    }

    fn progress_bar(&self, source: &dyn PointSource, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(source.point_count_hint().unwrap_or(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{bar:40.green/blue}] {pos}/{len} points ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("▉▊▋▌▍▎▏ "));
        }
        pb.set_message(message);
        pb
    }
}

/// Wraps a source so that every chunk advances a progress bar.
struct ProgressSource<'a> {
    inner: &'a dyn PointSource,
    pb: &'a ProgressBar,
}

impl PointSource for ProgressSource<'_> {
    fn for_each_chunk(
        &self,
        chunk_size: usize,
        visit: &mut dyn FnMut(&PointChunk) -> GridResult<()>,
    ) -> GridResult<()> {
        self.inner.for_each_chunk(chunk_size, &mut |chunk| {
            visit(chunk)?;
            self.pb.inc(chunk.len() as u64);
            Ok(())
        })
    }

    fn point_count_hint(&self) -> Option<u64> {
        self.inner.point_count_hint()
    }
}
