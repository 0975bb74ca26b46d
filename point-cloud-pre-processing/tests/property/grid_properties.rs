use point_cloud_pre_processing::{
    BoundingBox, FilterConfig, Grid, PreprocessingPipeline, VecPointSource,
};
use proptest::prelude::*;

fn arb_point() -> impl Strategy<Value = (f64, f64, f64, f64, u8)> {
    (
        0.0..10.0f64,
        0.0..10.0f64,
        -5.0..50.0f64,
        0.0..30.0f64,
        prop_oneof![Just(1u8), Just(2u8), Just(5u8), Just(7u8)],
    )
}

fn arb_bbox() -> impl Strategy<Value = BoundingBox> {
    (0.0..9.0f64, 0.0..9.0f64, 0.5..6.0f64, 0.5..6.0f64).prop_map(|(x, y, w, h)| BoundingBox {
        x_min: x,
        x_max: x + w,
        y_min: y,
        y_max: y + h,
    })
}

fn grid() -> Grid {
    Grid::new(0.0, 10.0, 0.0, 10.0, 1.0, 1.0).unwrap()
}

fn unfiltered() -> FilterConfig {
    FilterConfig {
        percentile_filter_enabled: false,
        outlier_detection_enabled: false,
        ..FilterConfig::default()
    }
}

proptest! {
    #[test]
    fn every_selected_point_is_counted_once(
        points in prop::collection::vec(arb_point(), 1..300),
        bboxes in prop::collection::vec(arb_bbox(), 1..4),
        chunk_size in 1usize..64,
    ) {
        let source = VecPointSource::from_points(&points);
        let table = PreprocessingPipeline::new(chunk_size)
            .without_progress()
            .run(&source, grid(), &bboxes, unfiltered())
            .unwrap();

        let expected = points
            .iter()
            .filter(|(x, y, _, _, class)| *class != 7 && bboxes.iter().any(|b| b.contains(*x, *y)))
            .count() as u64;
        prop_assert_eq!(table.total_count(), expected);
        prop_assert!(table.total_count() <= points.len() as u64);

        for row in &table.rows {
            let inside = points
                .iter()
                .filter(|(x, y, _, _, class)| {
                    *class != 7
                        && bboxes.iter().any(|b| b.contains(*x, *y))
                        && *x >= row.x0 && *x < row.x1
                        && *y >= row.y0 && *y < row.y1
                })
                .count() as u32;
            prop_assert_eq!(row.count, inside);
        }
    }

    #[test]
    fn p95_never_below_p90(
        points in prop::collection::vec(arb_point(), 2..400),
    ) {
        let source = VecPointSource::from_points(&points);
        let bboxes = [BoundingBox::new(0.0, 10.0, 0.0, 10.0).unwrap()];
        let table = PreprocessingPipeline::new(50)
            .without_progress()
            .run(&source, Grid::new(0.0, 10.0, 0.0, 10.0, 5.0, 5.0).unwrap(), &bboxes, FilterConfig::default())
            .unwrap();

        for row in table.rows.iter().filter(|row| row.count >= 2) {
            prop_assert!(row.veg_p95 >= row.veg_p90, "p95 {} < p90 {}", row.veg_p95, row.veg_p90);
            prop_assert!(row.veg_p90 <= row.veg_height_max as f64 + 1e-4);
        }
    }

    #[test]
    fn repeated_runs_are_identical(
        points in prop::collection::vec(arb_point(), 1..200),
        chunk_size in 1usize..32,
    ) {
        let source = VecPointSource::from_points(&points);
        let bboxes = [BoundingBox::new(0.0, 10.0, 0.0, 10.0).unwrap()];
        let pipeline = PreprocessingPipeline::new(chunk_size).without_progress();
        let first = pipeline.run(&source, grid(), &bboxes, FilterConfig::default()).unwrap();
        let second = pipeline.run(&source, grid(), &bboxes, FilterConfig::default()).unwrap();
        prop_assert_eq!(first.rows.len(), second.rows.len());
        for (a, b) in first.rows.iter().zip(&second.rows) {
            prop_assert_eq!(a.count, b.count);
            prop_assert_eq!((a.x0, a.y0), (b.x0, b.y0));
            prop_assert_eq!(a.veg_p90.to_bits(), b.veg_p90.to_bits());
            prop_assert_eq!(a.veg_height_outlier_count, b.veg_height_outlier_count);
        }
    }
}
