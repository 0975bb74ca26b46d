/// Per-file cell columns prepared for comparison.
use crate::error::CompareResult;
use constants::processing::{MILLIMETRES_PER_METRE, UNIT_NORMALIZATION_THRESHOLD};
use point_cloud_pre_processing::{CellRow, CellTable, percentile_column_name};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::debug;

/// A named percentile height column, e.g. `veg_height_p95`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileChannel {
    pub name: String,
    pub percentile: f64,
}

impl PercentileChannel {
    pub fn new(percentile: f64) -> Self {
        Self {
            name: percentile_column_name(percentile),
            percentile,
        }
    }
}

/// Values of one percentile channel, aligned with the file's rows
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelColumn {
    pub channel: PercentileChannel,
    pub values: Vec<f64>,
}

/// Columns of one cell table, heights in metres.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileCells {
    pub x0: Vec<f64>,
    pub x1: Vec<f64>,
    pub y0: Vec<f64>,
    pub y1: Vec<f64>,
    pub veg_height_max: Vec<f64>,
    pub count: Vec<f64>,
    pub outlier_count: Vec<f64>,
    pub outlier_class7_count: Vec<f64>,
    pub channels: Vec<ChannelColumn>,
}

impl FileCells {
    /// Read a cell table CSV and normalise its height columns
    pub fn load<R: Read>(reader: R) -> CompareResult<Self> {
        let table = CellTable::read_csv(reader)?;
        Ok(Self::from_table(&table))
    }

    /// Take the columns the comparison needs from a finalized table
    pub fn from_table(table: &CellTable) -> Self {
        let rows = &table.rows;
        let column = |pick: fn(&CellRow) -> f64| -> Vec<f64> {
            rows.iter().map(pick).collect()
        };

        let channels = table
            .individual_percentile
            .map(|p| ChannelColumn {
                channel: PercentileChannel::new(p),
                values: rows
                    .iter()
                    .map(|r| r.veg_height_individual.unwrap_or(f64::NAN))
                    .collect(),
            })
            .into_iter()
            .collect();

        let mut cells = Self {
            x0: column(|r| r.x0),
            x1: column(|r| r.x1),
            y0: column(|r| r.y0),
            y1: column(|r| r.y1),
            veg_height_max: column(|r| r.veg_height_max as f64),
            count: column(|r| r.count as f64),
            outlier_count: column(|r| r.veg_height_outlier_count as f64),
            outlier_class7_count: column(|r| r.veg_height_outlier_class7_count as f64),
            channels,
        };
        cells.normalize();
        cells
    }

    pub fn len(&self) -> usize {
        self.x0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x0.is_empty()
    }

    /// Apply the unit heuristic to the max height column and each channel independently
    fn normalize(&mut self) {
        if normalize_units(&mut self.veg_height_max) {
            debug!(column = "veg_height_max", "Converted millimetres to metres");
        }
        for column in &mut self.channels {
            if normalize_units(&mut column.values) {
                debug!(column = %column.channel.name, "Converted millimetres to metres");
            }
        }
    }
}

/// Millimetre detection: a column whose largest finite magnitude exceeds 100 is
/// divided by 1000. Returns whether the column was rescaled.
///
/// Legitimate heights above 100 m are misread as millimetres; this is kept for
/// compatibility with existing deliveries.
pub fn normalize_units(values: &mut [f64]) -> bool {
    let max_magnitude = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if max_magnitude <= UNIT_NORMALIZATION_THRESHOLD {
        return false;
    }
    for value in values.iter_mut() {
        *value /= MILLIMETRES_PER_METRE;
    }
    true
}
