use super::scratch_dir;
use crate::envelope::{ComparisonPayload, ComparisonResultPayload};
use crate::error::{JobError, JobResult};
use crate::storage::ObjectStore;
use constants::storage::{JSON_CONTENT_TYPE, comparison_output_key};
use point_cloud_comparison::{ComparisonEngine, FileCells, GroupedCells};
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info};

/// Load every referenced cell table, compare the two groups and store the result.
pub fn run(
    store: &dyn ObjectStore,
    engine: &ComparisonEngine,
    payload: &ComparisonPayload,
) -> JobResult<ComparisonResultPayload> {
    payload.validate()?;
    info!(
        comparison_id = payload.comparison_id,
        files = payload.files.len(),
        "Comparison job accepted"
    );

    let scratch = scratch_dir("compare-")?;
    let mut grouped = Vec::with_capacity(payload.files.len());
    for file in &payload.files {
        let local = store.fetch(&file.storage_ref(), scratch.path())?;
        let cells = FileCells::load(BufReader::new(File::open(&local)?))?;
        debug!(key = %file.object_key, group = %file.group_name, rows = cells.len(), "Loaded cell table");
        grouped.push(GroupedCells::new(file.group_name.clone(), cells));
    }

    let result = engine.compare(grouped)?;
    let json = result
        .to_json()
        .map_err(|e| JobError::Unexpected(format!("comparison result could not be encoded: {}", e)))?;
    let reference = store.put(
        &comparison_output_key(payload.comparison_id),
        &json,
        JSON_CONTENT_TYPE,
    )?;

    info!(
        comparison_id = payload.comparison_id,
        cells = result.cells.len(),
        key = %reference.object_key,
        "Comparison job finished"
    );
    Ok(ComparisonResultPayload {
        comparison_id: payload.comparison_id,
        result: reference,
    })
}
