/// Shared configuration for grid preprocessing, comparison and chunking

/// Points read from a cloud per streaming chunk
pub const POINT_CHUNK_SIZE: usize = 500_000;

/// Default multiple of the global standard deviation that flags an outlier
pub const DEFAULT_OUTLIER_DEVIATION_FACTOR: f64 = 2.0;

/// Compression parameter for per-cell and global rank digests
pub const DIGEST_COMPRESSION: f64 = 100.0;

/// Fixed per-cell percentiles written to every cell table row
pub const CELL_PERCENTILES: [f64; 2] = [90.0, 95.0];

/// Accepted range for a configured individual percentile
pub const INDIVIDUAL_PERCENTILE_RANGE: (f64, f64) = (0.01, 99.99);

/// Extra dimension holding normalised vegetation height, when present
pub const NDSM_DIMENSION: &str = "ndsm";

/// Fallback dimension carrying vegetation height in older deliveries
pub const GPS_TIME_DIMENSION: &str = "gps_time";

/// Column prefix of configured individual percentile columns
pub const PERCENTILE_COLUMN_PREFIX: &str = "veg_height_p";

/// Replacement for summary extremes that no cell ever reached
pub const MISSING_EXTREME_SENTINEL: f64 = -1.0;

/// Column magnitudes above this are assumed to be millimetres
pub const UNIT_NORMALIZATION_THRESHOLD: f64 = 100.0;

/// Divisor applied to columns judged to be in millimetres
pub const MILLIMETRES_PER_METRE: f64 = 1000.0;

/// Histogram bin count for difference statistics
pub const HISTOGRAM_BINS: usize = 10;

/// Percentile range spanned by the difference histogram edges
pub const HISTOGRAM_PERCENTILE_RANGE: (f64, f64) = (1.0, 99.0);

/// Percentiles reported in per-file and difference statistics
pub const REPORTED_PERCENTILES: [f64; 5] = [10.0, 25.0, 50.0, 75.0, 90.0];

/// Decimal places kept in serialised comparison output
pub const OUTPUT_DECIMALS: i32 = 2;

/// Upper bound on rows × cols accepted for a single grid
pub const MAX_GRID_CELLS: usize = 50_000_000;
