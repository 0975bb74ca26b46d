use super::scratch_dir;
use crate::cache::ChunkCache;
use crate::envelope::{CachedChunkNotice, ChunkedComparison, ChunkingOutcome, ChunkingPayload};
use crate::error::{JobError, JobResult};
use crate::storage::ObjectStore;
use point_cloud_comparison::{ChunkAggregator, ComparisonResult};
use std::fs;
use tracing::{info, warn};

/// Downsample a stored comparison and hand it over through the cache.
///
/// When the cache refuses the entry the chunked comparison is returned inline.
pub fn run(
    store: &dyn ObjectStore,
    cache: &dyn ChunkCache,
    payload: &ChunkingPayload,
) -> JobResult<ChunkingOutcome> {
    payload.validate()?;
    info!(
        comparison_id = payload.comparison_id,
        chunk_size = payload.chunking_size,
        "Chunking job accepted"
    );

    let scratch = scratch_dir("chunking-")?;
    let local = store.fetch(&payload.file, scratch.path())?;
    let comparison = ComparisonResult::from_json(&fs::read(&local)?)
        .map_err(|e| JobError::invalid(format!("stored comparison result is malformed: {}", e)))?;

    let aggregator = ChunkAggregator::new(payload.chunking_size)?;
    let chunked_cells = aggregator.chunk(&comparison)?;
    let chunked = ChunkedComparison {
        comparison_id: payload.comparison_id,
        chunking_size: payload.chunking_size,
        chunked_cells,
        statistics: comparison.statistics,
        group_mapping: comparison.group_mapping,
        statistics_p: comparison.statistics_p,
    };

    let bytes = serde_json::to_vec(&chunked)
        .map_err(|e| JobError::Unexpected(format!("chunked result could not be encoded: {}", e)))?;
    match cache.save(payload.comparison_id, payload.chunking_size, bytes) {
        Ok(()) => Ok(ChunkingOutcome::Cached(CachedChunkNotice {
            comparison_id: payload.comparison_id,
            chunk_size: payload.chunking_size,
            cached: true,
        })),
        Err(e) => {
            warn!(
                comparison_id = payload.comparison_id,
                chunk_size = payload.chunking_size,
                error = %e,
                "Cache unavailable, sending chunked result inline"
            );
            Ok(ChunkingOutcome::Inline(Box::new(chunked)))
        }
    }
}
