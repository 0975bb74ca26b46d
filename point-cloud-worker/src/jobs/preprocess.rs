use super::scratch_dir;
use crate::envelope::{PreprocessingPayload, PreprocessingResultPayload};
use crate::error::JobResult;
use crate::storage::ObjectStore;
use constants::storage::{CSV_CONTENT_TYPE, preprocessing_output_key};
use point_cloud_pre_processing::{LasPointSource, PreprocessingPipeline};
use std::time::Instant;
use tracing::info;

/// Fetch a point cloud, bin it into the requested grid and store the cell table.
pub fn run(
    store: &dyn ObjectStore,
    pipeline: &PreprocessingPipeline,
    payload: &PreprocessingPayload,
) -> JobResult<PreprocessingResultPayload> {
    let start = Instant::now();
    payload.validate()?;
    let filter = payload.filter();
    info!(
        job_id = %payload.job_id,
        lower = filter.lower_percentile,
        upper = filter.upper_percentile,
        point_filter = filter.percentile_filter_enabled,
        outlier_detection = filter.outlier_detection_enabled,
        outlier_factor = filter.outlier_deviation_factor,
        bboxes = payload.bboxes.len(),
        "Preprocessing job accepted"
    );

    let scratch = scratch_dir("preprocess-")?;
    let local = store.fetch(&payload.file, scratch.path())?;
    let source = LasPointSource::open(&local)?;
    let table = pipeline.run(&source, payload.grid, &payload.bboxes, filter)?;

    let mut csv = Vec::new();
    table.write_csv(&mut csv)?;
    let result = store.put(
        &preprocessing_output_key(&payload.job_id),
        &csv,
        CSV_CONTENT_TYPE,
    )?;

    info!(
        job_id = %payload.job_id,
        cells = table.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Preprocessing job finished"
    );
    Ok(PreprocessingResultPayload {
        result,
        summary: table.summary,
        comparison_id: payload.comparison_id,
        file_id: payload.file_id,
    })
}
