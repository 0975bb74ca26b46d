/// Finalized per-cell statistics and their CSV representation.
use crate::error::{GridError, GridResult};
use constants::processing::{MISSING_EXTREME_SENTINEL, PERCENTILE_COLUMN_PREFIX};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Fixed leading columns of every cell table
pub const CELL_TABLE_COLUMNS: [&str; 14] = [
    "x0",
    "x1",
    "y0",
    "y1",
    "count",
    "z_max",
    "z_min",
    "veg_height_max",
    "veg_height_min",
    "veg_p90",
    "veg_p95",
    "veg_height_outlier_count",
    "veg_height_outlier_class7_count",
    "class7_count",
];

/// Column name for a configured percentile, e.g. 95 -> `veg_height_p95`, 99.5 -> `veg_height_p99_5`
pub fn percentile_column_name(percentile: f64) -> String {
    let mut formatted = format!("{:.2}", percentile);
    while formatted.ends_with('0') {
        formatted.pop();
    }
    if formatted.ends_with('.') {
        formatted.pop();
    }
    format!("{}{}", PERCENTILE_COLUMN_PREFIX, formatted.replace('.', "_"))
}

/// Inverse of [`percentile_column_name`]; None for columns that are not percentile channels
pub fn parse_percentile_column(name: &str) -> Option<f64> {
    let suffix = name.strip_prefix(PERCENTILE_COLUMN_PREFIX)?;
    if suffix.is_empty() || !suffix.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    suffix.replace('_', ".").parse().ok()
}

/// One non-empty grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRow {
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    pub count: u32,
    pub z_max: f32,
    pub z_min: f32,
    pub veg_height_max: f32,
    pub veg_height_min: f32,
    pub veg_p90: f64,
    pub veg_p95: f64,
    pub veg_height_outlier_count: u32,
    pub veg_height_outlier_class7_count: u32,
    pub class7_count: u32,
    /// Value of the configured individual percentile, when one was requested
    pub veg_height_individual: Option<f64>,
}

/// Job-level summary reported alongside the cell table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSummary {
    pub n_cells: u64,
    pub max_z: f32,
    pub min_z: f32,
    pub max_veg_height: f32,
    pub min_veg_height: f32,
}

impl GridSummary {
    /// Summarise `rows`, replacing extremes no cell reached with the sentinel
    pub fn from_rows(n_cells: u64, rows: &[CellRow]) -> Self {
        let fold = |init: f32, pick: fn(f32, f32) -> f32, value: fn(&CellRow) -> f32| {
            clean_extreme(rows.iter().map(value).fold(init, pick))
        };
        Self {
            n_cells,
            max_z: fold(f32::NEG_INFINITY, f32::max, |r| r.z_max),
            min_z: fold(f32::INFINITY, f32::min, |r| r.z_min),
            max_veg_height: fold(f32::NEG_INFINITY, f32::max, |r| r.veg_height_max),
            min_veg_height: fold(f32::INFINITY, f32::min, |r| r.veg_height_min),
        }
    }
}

fn clean_extreme(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        MISSING_EXTREME_SENTINEL as f32
    }
}

/// Output of one preprocessing job: non-empty cells in row-major order plus a summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CellTable {
    pub rows: Vec<CellRow>,
    pub summary: GridSummary,
    pub individual_percentile: Option<f64>,
}

impl CellTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of point counts over all cells
    pub fn total_count(&self) -> u64 {
        self.rows.iter().map(|row| row.count as u64).sum()
    }

    /// Header row, including the individual percentile column when configured
    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = CELL_TABLE_COLUMNS.iter().map(|c| c.to_string()).collect();
        if let Some(p) = self.individual_percentile {
            header.push(percentile_column_name(p));
        }
        header
    }

    /// Write the table as CSV
    pub fn write_csv<W: Write>(&self, writer: W) -> GridResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.header())?;

        for row in &self.rows {
            let mut record = vec![
                row.x0.to_string(),
                row.x1.to_string(),
                row.y0.to_string(),
                row.y1.to_string(),
                row.count.to_string(),
                row.z_max.to_string(),
                row.z_min.to_string(),
                row.veg_height_max.to_string(),
                row.veg_height_min.to_string(),
                format_float(row.veg_p90),
                format_float(row.veg_p95),
                row.veg_height_outlier_count.to_string(),
                row.veg_height_outlier_class7_count.to_string(),
                row.class7_count.to_string(),
            ];
            if self.individual_percentile.is_some() {
                record.push(row.veg_height_individual.map_or_else(String::new, format_float));
            }
            csv.write_record(&record)?;
        }

        csv.flush()?;
        Ok(())
    }

    /// Read a table written by [`CellTable::write_csv`].
    ///
    /// Column order is free, blank or unparsable numeric fields become NaN
    /// (counts become 0), and unknown columns are ignored. Only the four
    /// coordinate columns are mandatory. The summary is recomputed with
    /// `n_cells` equal to the number of rows read.
    pub fn read_csv<R: Read>(reader: R) -> GridResult<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let mut coordinates = [0usize; 4];
        for (slot, name) in coordinates.iter_mut().zip(["x0", "x1", "y0", "y1"]) {
            *slot = position(name).ok_or_else(|| GridError::MalformedTable {
                reason: format!("missing column '{}'", name),
            })?;
        }
        let individual = headers
            .iter()
            .enumerate()
            .find_map(|(i, h)| parse_percentile_column(h).map(|p| (i, p)));
        let columns: Vec<Option<usize>> = CELL_TABLE_COLUMNS[4..]
            .iter()
            .map(|name| position(name))
            .collect();

        let mut rows = Vec::new();
        for (line, record) in csv.records().enumerate() {
            let record = record?;
            let float = |index: Option<usize>| -> f64 {
                index
                    .and_then(|i| record.get(i))
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(f64::NAN)
            };
            let count = |index: Option<usize>| -> u32 {
                index
                    .and_then(|i| record.get(i))
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .map_or(0, |v| v as u32)
            };

            let [x0, x1, y0, y1] = coordinates.map(|i| float(Some(i)));
            if [x0, x1, y0, y1].iter().any(|v| !v.is_finite()) {
                return Err(GridError::MalformedTable {
                    reason: format!("row {} has non-numeric coordinates", line + 1),
                });
            }

            rows.push(CellRow {
                x0,
                x1,
                y0,
                y1,
                count: count(columns[0]),
                z_max: float(columns[1]) as f32,
                z_min: float(columns[2]) as f32,
                veg_height_max: float(columns[3]) as f32,
                veg_height_min: float(columns[4]) as f32,
                veg_p90: float(columns[5]),
                veg_p95: float(columns[6]),
                veg_height_outlier_count: count(columns[7]),
                veg_height_outlier_class7_count: count(columns[8]),
                class7_count: count(columns[9]),
                veg_height_individual: individual.map(|(i, _)| float(Some(i))),
            });
        }

        let summary = GridSummary::from_rows(rows.len() as u64, &rows);
        Ok(Self {
            rows,
            summary,
            individual_percentile: individual.map(|(_, p)| p),
        })
    }
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}
