use point_cloud_comparison::{
    CellMatrix, ChunkAggregator, ChunkedCells, ComparisonCell, ComparisonEngine, FileCells,
    GroupedCells,
};
use proptest::prelude::*;

/// Cells on a unit grid: (col, row, height, count)
fn arb_file() -> impl Strategy<Value = Vec<(u8, u8, f64, u8)>> {
    prop::collection::vec((0u8..6, 0u8..6, 0.1..60.0f64, 1u8..20), 1..30)
}

fn file_cells(rows: &[(u8, u8, f64, u8)]) -> FileCells {
    FileCells {
        x0: rows.iter().map(|r| r.0 as f64).collect(),
        x1: rows.iter().map(|r| r.0 as f64 + 1.0).collect(),
        y0: rows.iter().map(|r| r.1 as f64).collect(),
        y1: rows.iter().map(|r| r.1 as f64 + 1.0).collect(),
        veg_height_max: rows.iter().map(|r| r.2).collect(),
        count: rows.iter().map(|r| r.3 as f64).collect(),
        outlier_count: vec![0.0; rows.len()],
        outlier_class7_count: vec![0.0; rows.len()],
        channels: Vec::new(),
    }
}

/// Ragged matrix with holes, one valid cell guaranteed at the origin
fn arb_matrix() -> impl Strategy<Value = CellMatrix> {
    prop::collection::vec(prop::collection::vec(prop::bool::weighted(0.7), 1..9), 1..9).prop_map(
        |shape| {
            shape
                .iter()
                .enumerate()
                .map(|(r, row)| {
                    row.iter()
                        .enumerate()
                        .map(|(c, present)| {
                            (*present || (r == 0 && c == 0)).then(|| {
                                let (x, y) = (c as f64 * 2.0, r as f64 * 2.0);
                                ComparisonCell::new(x, x + 2.0, y, y + 2.0, c as f64, r as f64)
                            })
                        })
                        .collect()
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn swapping_groups_mirrors_the_result(
        a in arb_file(),
        b in arb_file(),
        shared in (0.1..60.0f64, 0.1..60.0f64),
    ) {
        // One rectangle both files cover, outside the generated range
        let (mut a, mut b) = (a, b);
        a.push((6, 6, shared.0, 1));
        b.push((6, 6, shared.1, 1));

        let forward = ComparisonEngine::new()
            .compare(vec![GroupedCells::new("a", file_cells(&a)), GroupedCells::new("b", file_cells(&b))])
            .unwrap();
        let backward = ComparisonEngine::new()
            .compare(vec![GroupedCells::new("b", file_cells(&b)), GroupedCells::new("a", file_cells(&a))])
            .unwrap();

        prop_assert!(!forward.cells.is_empty());
        prop_assert_eq!(&forward.group_mapping, &backward.group_mapping.swapped());
        prop_assert_eq!(forward.cells.len(), backward.cells.len());
        for (f, r) in forward.cells.iter().zip(&backward.cells) {
            prop_assert_eq!((f.x0, f.y0), (r.x0, r.y0));
            prop_assert_eq!(f.delta_z, -r.delta_z);
            prop_assert_eq!(f.count_a, r.count_b);
        }
        // Compared as written, so statistics without a value compare as null
        prop_assert_eq!(
            serde_json::to_value(&forward.statistics.file_a).unwrap(),
            serde_json::to_value(&backward.statistics.file_b).unwrap()
        );
        prop_assert_eq!(
            serde_json::to_value(&forward.statistics.file_b).unwrap(),
            serde_json::to_value(&backward.statistics.file_a).unwrap()
        );
    }

    #[test]
    fn chunk_size_one_is_the_identity(matrix in arb_matrix()) {
        let chunked = ChunkAggregator::new(1).unwrap().aggregate(&matrix);
        prop_assert_eq!(chunked, ChunkedCells::Cells(matrix));
    }

    #[test]
    fn block_grid_has_ceiling_dimensions(matrix in arb_matrix(), n in 2usize..5) {
        let rows = matrix.len();
        let cols = matrix.iter().map(Vec::len).max().unwrap_or(0);
        let chunked = ChunkAggregator::new(n).unwrap().aggregate(&matrix);
        let blocks = chunked.blocks().unwrap();

        prop_assert_eq!(blocks.len(), rows.div_ceil(n));
        for (br, row) in blocks.iter().enumerate() {
            prop_assert_eq!(row.len(), cols.div_ceil(n));
            for (bc, block) in row.iter().enumerate() {
                prop_assert_eq!(block.x0, (bc * n) as f64 * 2.0);
                prop_assert_eq!(block.y0, (br * n) as f64 * 2.0);
                prop_assert_eq!(block.x1 - block.x0, n as f64 * 2.0);
                prop_assert!(block.coverage <= 1.0);
            }
        }
        let total: u64 = blocks.iter().flatten().map(|b| b.count).sum();
        let present = matrix.iter().flatten().flatten().count() as u64;
        prop_assert_eq!(total, present);
    }
}
