//! Cell-by-cell comparison of two groups of cell tables, and block
//! downsampling of the comparison for rendering.

pub mod chunking;
pub mod columns;
pub mod engine;
pub mod error;
pub mod result;
pub mod rounding;
pub mod statistics;

pub use chunking::{CellMatrix, ChunkAggregator, ChunkedCell, ChunkedCells};
pub use columns::{ChannelColumn, FileCells, PercentileChannel, normalize_units};
pub use engine::{ComparisonEngine, GroupedCells};
pub use error::{CompareResult, ComparisonError};
pub use result::{ChannelValues, ComparisonCell, ComparisonResult, GroupMapping};
pub use statistics::{
    ComparisonStatistics, DifferenceStatistics, FileStatistics, Histogram, ols_regression, pearson,
};
