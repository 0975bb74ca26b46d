use point_cloud_comparison::{
    ChunkAggregator, ChunkedCells, ComparisonEngine, ComparisonError, ComparisonResult, FileCells,
    GroupedCells,
};
use point_cloud_pre_processing::{
    BoundingBox, CellTable, FilterConfig, Grid, PreprocessingPipeline, VecPointSource,
};

/// One point per cell of a 4×4 grid, vegetation height from `height(col, row)`
fn survey(height: impl Fn(usize, usize) -> f64) -> CellTable {
    let mut points = Vec::new();
    for row in 0..4 {
        for col in 0..4 {
            points.push((
                col as f64 + 0.5,
                row as f64 + 0.5,
                100.0,
                height(col, row),
                2u8,
            ));
        }
    }
    let source = VecPointSource::from_points(&points);
    let filter = FilterConfig {
        percentile_filter_enabled: false,
        outlier_detection_enabled: false,
        individual_percentile: Some(95.0),
        ..FilterConfig::default()
    };
    PreprocessingPipeline::new(7)
        .without_progress()
        .run(
            &source,
            Grid::new(0.0, 4.0, 0.0, 4.0, 1.0, 1.0).unwrap(),
            &[BoundingBox::new(0.0, 4.0, 0.0, 4.0).unwrap()],
            filter,
        )
        .unwrap()
}

fn compare(a: &CellTable, b: &CellTable) -> ComparisonResult {
    ComparisonEngine::new()
        .compare(vec![
            GroupedCells::new("before", FileCells::from_table(a)),
            GroupedCells::new("after", FileCells::from_table(b)),
        ])
        .unwrap()
}

#[test]
fn csv_tables_flow_through_comparison_and_chunking() {
    let before = survey(|c, r| (c + r) as f64);
    let after = survey(|c, r| (c + r) as f64 + 1.0);

    let mut buffers = Vec::new();
    for table in [&before, &after] {
        let mut csv = Vec::new();
        table.write_csv(&mut csv).unwrap();
        buffers.push(csv);
    }
    let files = vec![
        GroupedCells::new("before", FileCells::load(buffers[0].as_slice()).unwrap()),
        GroupedCells::new("after", FileCells::load(buffers[1].as_slice()).unwrap()),
    ];
    let result = ComparisonEngine::new().compare(files).unwrap();

    assert_eq!(result.cells.len(), 16);
    assert!(result.cells.iter().all(|c| (c.delta_z - 1.0).abs() < 1e-6));
    assert_eq!(result.statistics.difference.mean, 1.0);
    let stats_p = result.statistics_p.as_ref().unwrap();
    assert!((stats_p.difference.median - 1.0).abs() < 1e-6);

    let chunked = ChunkAggregator::new(2).unwrap().chunk(&result).unwrap();
    assert_eq!((chunked.rows(), chunked.cols()), (2, 2));
    let blocks = chunked.blocks().unwrap();
    assert!(blocks.iter().flatten().all(|b| b.count == 4 && b.coverage == 1.0));
    assert!((blocks[0][0].veg_height_max_a - 1.0).abs() < 1e-6);
    assert!((blocks[1][1].veg_height_max_b - 6.0).abs() < 1e-6);
    assert_eq!(blocks[1][1].channels[0].name, "veg_height_p95");
}

#[test]
fn millimetre_tables_are_compared_in_metres() {
    let metres = survey(|_, _| 2.0);
    let millimetres = survey(|_, _| 2500.0);
    let result = compare(&metres, &millimetres);
    assert!(result.cells.iter().all(|c| (c.veg_height_max_b - 2.5).abs() < 1e-6));
    assert!((result.statistics.difference.mean - 0.5).abs() < 1e-9);
}

#[test]
fn swapping_groups_negates_the_difference() {
    let a = survey(|c, _| c as f64);
    let b = survey(|_, r| r as f64 * 2.0);
    let forward = compare(&a, &b);
    let backward = compare(&b, &a);

    for (f, r) in forward.cells.iter().zip(&backward.cells) {
        assert_eq!(f.delta_z, -r.delta_z);
        assert_eq!(f.veg_height_max_a, r.veg_height_max_b);
    }
    assert_eq!(forward.statistics.file_a, backward.statistics.file_b);
    assert_eq!(forward.statistics.file_b, backward.statistics.file_a);
}

#[test]
fn result_json_round_trips_with_wire_names() {
    let result = compare(&survey(|c, _| c as f64), &survey(|c, _| c as f64 + 0.25));
    let bytes = result.to_json().unwrap();

    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["group_mapping"]["a"], "before");
    assert!(value["cells"][0].get("veg_height_p95_diff").is_some());
    assert!(value["statistics"]["file_a"].get("mean_points_per_grid_cell").is_some());
    assert!(value["statistics"]["difference"]["histogram"]["bin_edges"].is_array());
    assert!(value.get("statistics_p").is_some());

    let back = ComparisonResult::from_json(&bytes).unwrap();
    assert_eq!(back.cells.len(), result.cells.len());
    assert_eq!(back.cells[3].channels.len(), 1);
    assert_eq!(back.group_mapping, result.group_mapping);
}

#[test]
fn chunk_size_larger_than_the_result_is_refused() {
    let result = compare(&survey(|_, _| 1.0), &survey(|_, _| 2.0));
    let err = ChunkAggregator::new(17).unwrap().chunk(&result).unwrap_err();
    assert!(matches!(
        err,
        ComparisonError::ChunkSizeExceedsCells { chunk_size: 17, cells: 16 }
    ));
    assert!(err.is_constraint_violation());

    let identity = ChunkAggregator::new(1).unwrap().chunk(&result).unwrap();
    assert!(matches!(identity, ChunkedCells::Cells(ref m) if m.len() == 4));
}
