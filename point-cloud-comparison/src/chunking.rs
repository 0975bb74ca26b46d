/// Block downsampling of comparison cells for rendering.
use crate::error::{CompareResult, ComparisonError};
use crate::result::{ChannelValues, ComparisonCell, ComparisonResult};
use crate::rounding;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

/// Ragged row-major matrix; `None` marks a hole
pub type CellMatrix = Vec<Vec<Option<ComparisonCell>>>;

/// One aggregated block
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedCell {
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    pub veg_height_max_a: f64,
    pub veg_height_max_b: f64,
    pub delta_z: f64,
    pub veg_height_outlier_count_a: u64,
    pub veg_height_outlier_count_b: u64,
    pub veg_height_outlier_class7_count_a: u64,
    pub veg_height_outlier_class7_count_b: u64,
    /// Number of input cells inside the block
    pub count: u64,
    /// `count / n²`
    pub coverage: f64,
    pub channels: Vec<ChannelValues>,
}

impl Serialize for ChunkedCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(13 + 3 * self.channels.len()))?;
        for (key, value) in [
            ("x0", self.x0),
            ("x1", self.x1),
            ("y0", self.y0),
            ("y1", self.y1),
            ("veg_height_max_a", self.veg_height_max_a),
            ("veg_height_max_b", self.veg_height_max_b),
            ("delta_z", self.delta_z),
        ] {
            map.serialize_entry(key, &rounding::encode(value))?;
        }
        map.serialize_entry("veg_height_outlier_count_a", &self.veg_height_outlier_count_a)?;
        map.serialize_entry("veg_height_outlier_count_b", &self.veg_height_outlier_count_b)?;
        map.serialize_entry(
            "veg_height_outlier_class7_count_a",
            &self.veg_height_outlier_class7_count_a,
        )?;
        map.serialize_entry(
            "veg_height_outlier_class7_count_b",
            &self.veg_height_outlier_class7_count_b,
        )?;
        map.serialize_entry("count", &self.count)?;
        map.serialize_entry("coverage", &rounding::encode(self.coverage))?;
        for channel in &self.channels {
            channel.serialize_into(&mut map)?;
        }
        map.end()
    }
}

/// Output of a chunking run: the untouched matrix for size 1, blocks otherwise
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChunkedCells {
    Cells(CellMatrix),
    Blocks(Vec<Vec<ChunkedCell>>),
}

impl ChunkedCells {
    pub fn rows(&self) -> usize {
        match self {
            ChunkedCells::Cells(m) => m.len(),
            ChunkedCells::Blocks(b) => b.len(),
        }
    }

    /// Length of the longest row
    pub fn cols(&self) -> usize {
        match self {
            ChunkedCells::Cells(m) => m.iter().map(Vec::len).max().unwrap_or(0),
            ChunkedCells::Blocks(b) => b.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    pub fn blocks(&self) -> Option<&[Vec<ChunkedCell>]> {
        match self {
            ChunkedCells::Blocks(b) => Some(b),
            ChunkedCells::Cells(_) => None,
        }
    }
}

/// Running sums over one block window
#[derive(Debug)]
struct BlockSums {
    a: f64,
    b: f64,
    channels_a: Vec<f64>,
    channels_b: Vec<f64>,
    outlier_a: u64,
    outlier_b: u64,
    outlier_class7_a: u64,
    outlier_class7_b: u64,
    count: u64,
}

impl BlockSums {
    fn new(channels: usize) -> Self {
        Self {
            a: 0.0,
            b: 0.0,
            channels_a: vec![0.0; channels],
            channels_b: vec![0.0; channels],
            outlier_a: 0,
            outlier_b: 0,
            outlier_class7_a: 0,
            outlier_class7_b: 0,
            count: 0,
        }
    }

    fn add(&mut self, cell: &ComparisonCell, channel_names: &[String]) {
        self.a += cell.veg_height_max_a;
        self.b += cell.veg_height_max_b;
        for (i, name) in channel_names.iter().enumerate() {
            let (a, b) = cell.channel(name).map_or((f64::NAN, f64::NAN), |c| (c.a, c.b));
            self.channels_a[i] += a;
            self.channels_b[i] += b;
        }
        self.outlier_a += cell.veg_height_outlier_count_a;
        self.outlier_b += cell.veg_height_outlier_count_b;
        self.outlier_class7_a += cell.veg_height_outlier_class7_count_a;
        self.outlier_class7_b += cell.veg_height_outlier_class7_count_b;
        self.count += 1;
    }
}

/// Inferred placement of the input grid
#[derive(Debug, Clone, Copy)]
struct GridFrame {
    origin_x: f64,
    origin_y: f64,
    dx: f64,
    dy: f64,
}

impl GridFrame {
    /// Origin is the minimum corner over all cells; pitch comes from the first cell
    fn infer(matrix: &CellMatrix) -> Option<Self> {
        let mut valid = matrix.iter().flatten().flatten();
        let first = valid.next()?;
        let (origin_x, origin_y) = valid.fold((first.x0, first.y0), |(x, y), cell| {
            (x.min(cell.x0), y.min(cell.y0))
        });
        Some(Self {
            origin_x,
            origin_y,
            dx: first.x1 - first.x0,
            dy: first.y1 - first.y0,
        })
    }
}

/// Averages `n × n` windows of comparison cells into blocks.
///
/// Block rectangles come from the grid origin and pitch alone, so the output
/// is a dense rectangle even where the input has holes.
#[derive(Debug, Clone, Copy)]
pub struct ChunkAggregator {
    chunk_size: usize,
}

impl ChunkAggregator {
    pub fn new(chunk_size: usize) -> CompareResult<Self> {
        if chunk_size < 1 {
            return Err(ComparisonError::InvalidChunkSize { size: chunk_size });
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Lay cells out row by row, sorting by (y0, x0) first. A new row starts
    /// wherever y0 changes.
    pub fn to_matrix(cells: &[ComparisonCell]) -> CellMatrix {
        let mut sorted: Vec<&ComparisonCell> = cells.iter().collect();
        sorted.sort_by(|l, r| l.y0.total_cmp(&r.y0).then(l.x0.total_cmp(&r.x0)));

        let mut matrix: CellMatrix = Vec::new();
        let mut current_y: Option<f64> = None;
        for cell in sorted {
            if current_y != Some(cell.y0) {
                matrix.push(Vec::new());
                current_y = Some(cell.y0);
            }
            if let Some(row) = matrix.last_mut() {
                row.push(Some(cell.clone()));
            }
        }
        matrix
    }

    /// Downsample a matrix. Size 1 returns it unchanged.
    pub fn aggregate(&self, matrix: &CellMatrix) -> ChunkedCells {
        let n = self.chunk_size;
        if n == 1 {
            return ChunkedCells::Cells(matrix.clone());
        }
        let Some(frame) = GridFrame::infer(matrix) else {
            debug!("No valid cells to chunk");
            return ChunkedCells::Blocks(Vec::new());
        };

        let channel_names: Vec<String> = matrix
            .iter()
            .flatten()
            .flatten()
            .next()
            .map(|cell| cell.channels.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default();

        let rows = matrix.len();
        let cols = matrix.iter().map(Vec::len).max().unwrap_or(0);
        let out_rows = rows.div_ceil(n);
        let out_cols = cols.div_ceil(n);

        let blocks = (0..out_rows)
            .map(|br| {
                (0..out_cols)
                    .map(|bc| self.block(matrix, frame, &channel_names, br, bc))
                    .collect()
            })
            .collect();

        info!(
            rows,
            cols,
            chunk_size = n,
            out_rows,
            out_cols,
            "Chunked comparison cells"
        );
        ChunkedCells::Blocks(blocks)
    }

    fn block(
        &self,
        matrix: &CellMatrix,
        frame: GridFrame,
        channel_names: &[String],
        br: usize,
        bc: usize,
    ) -> ChunkedCell {
        let n = self.chunk_size;
        let mut sums = BlockSums::new(channel_names.len());
        for row in matrix.iter().skip(br * n).take(n) {
            for cell in row.iter().skip(bc * n).take(n).flatten() {
                sums.add(cell, channel_names);
            }
        }

        let x0 = frame.origin_x + (bc * n) as f64 * frame.dx;
        let y0 = frame.origin_y + (br * n) as f64 * frame.dy;
        let mut block = ChunkedCell {
            x0,
            x1: x0 + n as f64 * frame.dx,
            y0,
            y1: y0 + n as f64 * frame.dy,
            veg_height_max_a: 0.0,
            veg_height_max_b: 0.0,
            delta_z: 0.0,
            veg_height_outlier_count_a: sums.outlier_a,
            veg_height_outlier_count_b: sums.outlier_b,
            veg_height_outlier_class7_count_a: sums.outlier_class7_a,
            veg_height_outlier_class7_count_b: sums.outlier_class7_b,
            count: sums.count,
            coverage: 0.0,
            channels: channel_names
                .iter()
                .map(|name| ChannelValues::new(name.clone(), 0.0, 0.0))
                .collect(),
        };
        if sums.count == 0 {
            return block;
        }

        let count = sums.count as f64;
        block.veg_height_max_a = sums.a / count;
        block.veg_height_max_b = sums.b / count;
        block.delta_z = (sums.b - sums.a) / count;
        block.coverage = count / (n * n) as f64;
        for (i, channel) in block.channels.iter_mut().enumerate() {
            *channel = ChannelValues::new(
                channel.name.clone(),
                sums.channels_a[i] / count,
                sums.channels_b[i] / count,
            );
        }
        block
    }

    /// Chunk a stored comparison result
    pub fn chunk(&self, result: &ComparisonResult) -> CompareResult<ChunkedCells> {
        if self.chunk_size > result.cells.len() {
            return Err(ComparisonError::ChunkSizeExceedsCells {
                chunk_size: self.chunk_size,
                cells: result.cells.len(),
            });
        }
        let matrix = Self::to_matrix(&result.cells);
        Ok(self.aggregate(&matrix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(x0: f64, y0: f64, a: f64, b: f64) -> Option<ComparisonCell> {
        Some(ComparisonCell::new(x0, x0 + 1.0, y0, y0 + 1.0, a, b))
    }

    fn blocks(chunked: ChunkedCells) -> Vec<Vec<ChunkedCell>> {
        match chunked {
            ChunkedCells::Blocks(b) => b,
            ChunkedCells::Cells(_) => panic!("expected blocks"),
        }
    }

    fn assert_rect(block: &ChunkedCell, x0: f64, y0: f64, x1: f64, y1: f64) {
        assert_eq!((block.x0, block.y0, block.x1, block.y1), (x0, y0, x1, y1));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            ChunkAggregator::new(0),
            Err(ComparisonError::InvalidChunkSize { size: 0 })
        ));
    }

    #[test]
    fn two_by_two_collapses_to_one_block() {
        let matrix = vec![
            vec![cell(0.0, 0.0, 1.0, 10.0), cell(1.0, 0.0, 2.0, 20.0)],
            vec![cell(0.0, 1.0, 3.0, 30.0), cell(1.0, 1.0, 4.0, 40.0)],
        ];
        let out = blocks(ChunkAggregator::new(2).unwrap().aggregate(&matrix));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 1);

        let block = &out[0][0];
        assert_rect(block, 0.0, 0.0, 2.0, 2.0);
        assert_eq!(block.veg_height_max_a, 2.5);
        assert_eq!(block.veg_height_max_b, 25.0);
        assert_eq!(block.delta_z, 22.5);
        assert_eq!(block.count, 4);
        assert_eq!(block.coverage, 1.0);
    }

    #[test]
    fn ragged_rows_count_only_present_cells() {
        let matrix = vec![
            vec![cell(0.0, 0.0, 1.0, 10.0), cell(1.0, 0.0, 2.0, 20.0)],
            vec![cell(0.0, 1.0, 3.0, 30.0)],
        ];
        let out = blocks(ChunkAggregator::new(2).unwrap().aggregate(&matrix));
        let block = &out[0][0];
        assert_eq!(block.count, 3);
        assert_eq!(block.coverage, 0.75);
        assert_eq!(block.veg_height_max_a, 2.0);
        assert_eq!(block.veg_height_max_b, 20.0);
    }

    #[test]
    fn holes_are_skipped() {
        let matrix = vec![
            vec![cell(0.0, 0.0, 1.0, 10.0), None],
            vec![cell(0.0, 1.0, 3.0, 30.0), cell(1.0, 1.0, 4.0, 40.0)],
        ];
        let out = blocks(ChunkAggregator::new(2).unwrap().aggregate(&matrix));
        assert_eq!(out[0][0].count, 3);
        assert!((out[0][0].veg_height_max_a - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_blocks_keep_their_rectangle() {
        let matrix = vec![
            vec![cell(0.0, 0.0, 5.0, 7.0), None, None],
            vec![None, None, None],
            vec![None, None, None],
        ];
        let out = blocks(ChunkAggregator::new(2).unwrap().aggregate(&matrix));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|row| row.len() == 2));

        assert_eq!(out[0][0].count, 1);
        assert_eq!(out[0][0].veg_height_max_a, 5.0);
        assert_rect(&out[0][0], 0.0, 0.0, 2.0, 2.0);

        let empty = &out[0][1];
        assert_eq!(empty.count, 0);
        assert_eq!(empty.veg_height_max_a, 0.0);
        assert_eq!(empty.coverage, 0.0);
        assert_rect(empty, 2.0, 0.0, 4.0, 2.0);
        assert_rect(&out[1][0], 0.0, 2.0, 2.0, 4.0);
        assert_rect(&out[1][1], 2.0, 2.0, 4.0, 4.0);
    }

    #[test]
    fn output_dimensions_round_up() {
        let matrix: CellMatrix = (0..5)
            .map(|r| (0..5).map(|c| cell(c as f64, r as f64, 1.0, 2.0)).collect())
            .collect();
        let chunked = ChunkAggregator::new(2).unwrap().aggregate(&matrix);
        assert_eq!((chunked.rows(), chunked.cols()), (3, 3));
    }

    #[test]
    fn origin_is_the_minimum_corner() {
        let matrix = vec![
            vec![None, cell(-5.0, -10.0, 1.0, 1.0)],
            vec![cell(0.0, 0.0, 2.0, 2.0)],
        ];
        let out = blocks(ChunkAggregator::new(2).unwrap().aggregate(&matrix));
        assert_rect(&out[0][0], -5.0, -10.0, -3.0, -8.0);
    }

    #[test]
    fn matrix_without_cells_is_empty() {
        let matrix: CellMatrix = vec![vec![], vec![None]];
        let chunked = ChunkAggregator::new(2).unwrap().aggregate(&matrix);
        assert_eq!(chunked, ChunkedCells::Blocks(Vec::new()));
    }

    #[test]
    fn rows_are_rebuilt_from_unsorted_cells() {
        let cells: Vec<ComparisonCell> = [(1.0, 1.0), (0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (2.0, 0.0)]
            .into_iter()
            .filter_map(|(x, y)| cell(x, y, 0.0, 0.0))
            .collect();
        let matrix = ChunkAggregator::to_matrix(&cells);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0].len(), 3);
        assert_eq!(matrix[1].len(), 2);
        let first_row: Vec<f64> = matrix[0].iter().flatten().map(|c| c.x0).collect();
        assert_eq!(first_row, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn channels_and_outliers_are_aggregated() {
        let with_extras = |x0: f64, p_a: f64, p_b: f64| {
            let mut c = ComparisonCell::new(x0, x0 + 1.0, 0.0, 1.0, 1.0, 1.0);
            c.veg_height_outlier_count_a = 2;
            c.veg_height_outlier_count_b = 1;
            c.channels.push(ChannelValues::new("veg_height_p95", p_a, p_b));
            Some(c)
        };
        let matrix = vec![vec![with_extras(0.0, 1.0, 2.0), with_extras(1.0, 3.0, 6.0)]];
        let out = blocks(ChunkAggregator::new(2).unwrap().aggregate(&matrix));
        let block = &out[0][0];
        assert_eq!(block.veg_height_outlier_count_a, 4);
        assert_eq!(block.veg_height_outlier_count_b, 2);
        assert_eq!(block.channels.len(), 1);
        assert_eq!(block.channels[0].a, 2.0);
        assert_eq!(block.channels[0].b, 4.0);
        assert_eq!(block.channels[0].diff, 2.0);
        assert_eq!(block.coverage, 0.5);

        let json = serde_json::to_value(block).unwrap();
        assert_eq!(json["veg_height_p95_diff"], 2.0);
        assert_eq!(json["count"], 2);
    }
}
