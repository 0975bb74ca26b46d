/// Naming of stored results and cache entries
use std::fmt::Display;

/// Key prefix for cached chunking results
pub const CHUNK_CACHE_KEY_PREFIX: &str = "chunking:result:";

/// Default lifetime of a cached chunking result
pub const DEFAULT_CHUNK_CACHE_TTL_MINUTES: u64 = 2;

/// Upper bound on cached chunking results held in memory
pub const DEFAULT_CHUNK_CACHE_MAX_ENTRIES: u64 = 1024;

/// Default bucket receiving worker results
pub const DEFAULT_RESULT_BUCKET: &str = "basebucket";

/// Default directory backing the local object store
pub const DEFAULT_STORAGE_ROOT: &str = "./storage";

pub const CSV_CONTENT_TYPE: &str = "application/csv";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Object key of a preprocessing job's cell table
pub fn preprocessing_output_key(job_id: impl Display) -> String {
    format!("pre-process-job-{}-output.csv", job_id)
}

/// Object key of a stored comparison result
pub fn comparison_output_key(comparison_id: impl Display) -> String {
    format!("comparison-{}-result.json", comparison_id)
}

/// Cache key for one (comparison, chunk size) pair
pub fn chunk_cache_key(comparison_id: impl Display, chunk_size: usize) -> String {
    format!("{}{}:{}", CHUNK_CACHE_KEY_PREFIX, comparison_id, chunk_size)
}

/// Cache key prefix covering every chunk size of a comparison
pub fn chunk_cache_comparison_prefix(comparison_id: impl Display) -> String {
    format!("{}{}:", CHUNK_CACHE_KEY_PREFIX, comparison_id)
}
