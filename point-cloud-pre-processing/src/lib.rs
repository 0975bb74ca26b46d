//! Streaming LiDAR grid preprocessing.
//!
//! Points are read in bounded chunks, optionally summarised in a first pass
//! (global vegetation height median, deviation and digest), then binned into a
//! uniform grid whose non-empty cells form the output cell table.

pub mod accumulator;
pub mod bounds;
pub mod cell_table;
pub mod digest;
pub mod error;
pub mod global_stats;
pub mod laz;
pub mod pipeline;
pub mod source;

pub use accumulator::{ChunkOutcome, FilterConfig, GridAccumulator};
pub use bounds::{BoundingBox, Grid, union_mask};
pub use cell_table::{CellRow, CellTable, GridSummary, parse_percentile_column, percentile_column_name};
pub use digest::RankDigest;
pub use error::{GridError, GridResult};
pub use global_stats::{GlobalStats, WelfordAccumulator};
pub use laz::{LasPointSource, VegetationDimension};
pub use pipeline::PreprocessingPipeline;
pub use source::{PointChunk, PointSource, VecPointSource};
