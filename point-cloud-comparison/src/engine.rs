/// Cross-file cell join.
use crate::columns::FileCells;
use crate::error::{CompareResult, ComparisonError};
use crate::result::{ChannelValues, ComparisonCell, ComparisonResult, GroupMapping};
use crate::statistics::ComparisonStatistics;
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Cells of one file, tagged with the group it belongs to
#[derive(Debug, Clone)]
pub struct GroupedCells {
    pub group_name: String,
    pub cells: FileCells,
}

impl GroupedCells {
    pub fn new(group_name: impl Into<String>, cells: FileCells) -> Self {
        Self {
            group_name: group_name.into(),
            cells,
        }
    }
}

/// Row-major key: y0 first so iteration order matches the cell table order
type CellKey = (OrderedFloat<f64>, OrderedFloat<f64>, OrderedFloat<f64>, OrderedFloat<f64>);

fn cell_key(x0: f64, x1: f64, y0: f64, y1: f64) -> CellKey {
    (
        OrderedFloat(y0),
        OrderedFloat(x0),
        OrderedFloat(x1),
        OrderedFloat(y1),
    )
}

/// Keep the existing reading unless it is absent, non-finite or zero
fn merge_value(slot: &mut Option<f64>, value: f64) {
    let replaceable = match slot {
        None => true,
        Some(current) => !current.is_finite() || *current == 0.0,
    };
    if replaceable {
        *slot = Some(value);
    }
}

/// Merged readings of one side of a rectangle
#[derive(Debug, Default)]
struct SideValues {
    veg_height_max: Option<f64>,
    count: Option<f64>,
    outlier_count: Option<f64>,
    outlier_class7_count: Option<f64>,
    channels: BTreeMap<String, Option<f64>>,
}

impl SideValues {
    fn absorb(&mut self, cells: &FileCells, row: usize) {
        merge_value(&mut self.veg_height_max, cells.veg_height_max[row]);
        merge_value(&mut self.count, cells.count[row]);
        merge_value(&mut self.outlier_count, cells.outlier_count[row]);
        merge_value(&mut self.outlier_class7_count, cells.outlier_class7_count[row]);
        for column in &cells.channels {
            let slot = self.channels.entry(column.channel.name.clone()).or_default();
            merge_value(slot, column.values[row]);
        }
    }

    fn channel(&self, name: &str) -> f64 {
        self.channels.get(name).copied().flatten().unwrap_or(f64::NAN)
    }
}

fn as_count(value: Option<f64>) -> u64 {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(0, |v| v.round() as u64)
}

#[derive(Debug, Default)]
struct MergedCell {
    a: Option<SideValues>,
    b: Option<SideValues>,
}

/// Joins the cell tables of two groups.
///
/// The first group seen becomes side `a`, the second side `b`. Rows sharing a
/// rectangle are merged per field, first legitimate value wins, and only
/// rectangles both groups contributed to survive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComparisonEngine;

impl ComparisonEngine {
    pub fn new() -> Self {
        Self
    }

    /// Merge the files of two groups into matched cells with statistics
    pub fn compare(&self, files: Vec<GroupedCells>) -> CompareResult<ComparisonResult> {
        if files.len() < 2 {
            return Err(ComparisonError::TooFewFiles { count: files.len() });
        }
        let mapping = group_mapping(&files)?;
        info!(
            group_a = %mapping.a,
            group_b = %mapping.b,
            files = files.len(),
            "Comparing cell tables"
        );

        let channels = shared_channels(&files, &mapping);

        let mut merged: BTreeMap<CellKey, MergedCell> = BTreeMap::new();
        for file in &files {
            let cells = &file.cells;
            let on_a = file.group_name == mapping.a;
            for row in 0..cells.len() {
                let key = cell_key(cells.x0[row], cells.x1[row], cells.y0[row], cells.y1[row]);
                let entry = merged.entry(key).or_default();
                let side = if on_a { &mut entry.a } else { &mut entry.b };
                side.get_or_insert_with(SideValues::default).absorb(cells, row);
            }
            debug!(group = %file.group_name, rows = cells.len(), "Merged file");
        }

        let total_keys = merged.len();
        let cells: Vec<ComparisonCell> = merged
            .into_iter()
            .filter_map(|(key, cell)| match (cell.a, cell.b) {
                (Some(a), Some(b)) => Some(build_cell(key, &a, &b, &channels)),
                _ => None,
            })
            .collect();
        info!(
            matched = cells.len(),
            unmatched = total_keys - cells.len(),
            "Joined cells"
        );

        let counts_a: Vec<f64> = cells.iter().map(|c| c.count_a as f64).collect();
        let counts_b: Vec<f64> = cells.iter().map(|c| c.count_b as f64).collect();
        let heights_a: Vec<f64> = cells.iter().map(|c| c.veg_height_max_a).collect();
        let heights_b: Vec<f64> = cells.iter().map(|c| c.veg_height_max_b).collect();
        let statistics = ComparisonStatistics::compute(&heights_a, &heights_b, &counts_a, &counts_b);

        let statistics_p = channels.first().map(|name| {
            let pick = |side_a: bool| -> Vec<f64> {
                cells
                    .iter()
                    .map(|c| {
                        c.channel(name)
                            .map_or(f64::NAN, |v| if side_a { v.a } else { v.b })
                    })
                    .collect()
            };
            ComparisonStatistics::compute(&pick(true), &pick(false), &counts_a, &counts_b)
        });

        Ok(ComparisonResult {
            group_mapping: mapping,
            cells,
            statistics,
            statistics_p,
        })
    }
}

/// Exactly two distinct group names, in order of first appearance
fn group_mapping(files: &[GroupedCells]) -> CompareResult<GroupMapping> {
    let mut groups: Vec<String> = Vec::new();
    for file in files {
        if !groups.contains(&file.group_name) {
            groups.push(file.group_name.clone());
        }
    }
    match <[String; 2]>::try_from(groups) {
        Ok([a, b]) => Ok(GroupMapping { a, b }),
        Err(found) => Err(ComparisonError::GroupCount { found }),
    }
}

/// Channels carried by at least one file of each group, sorted by name
fn shared_channels(files: &[GroupedCells], mapping: &GroupMapping) -> Vec<String> {
    let names_of = |group: &str| -> BTreeSet<String> {
        files
            .iter()
            .filter(|f| f.group_name == group)
            .flat_map(|f| f.cells.channels.iter().map(|c| c.channel.name.clone()))
            .collect()
    };
    let on_a = names_of(&mapping.a);
    let on_b = names_of(&mapping.b);
    for dropped in on_a.symmetric_difference(&on_b) {
        warn!(channel = %dropped, "Percentile channel present in only one group, dropped");
    }
    on_a.intersection(&on_b).cloned().collect()
}

fn build_cell(key: CellKey, a: &SideValues, b: &SideValues, channels: &[String]) -> ComparisonCell {
    let (y0, x0, x1, y1) = key;
    let veg_a = a.veg_height_max.unwrap_or(f64::NAN);
    let veg_b = b.veg_height_max.unwrap_or(f64::NAN);
    let mut cell = ComparisonCell::new(
        x0.into_inner(),
        x1.into_inner(),
        y0.into_inner(),
        y1.into_inner(),
        veg_a,
        veg_b,
    );
    cell.count_a = as_count(a.count);
    cell.count_b = as_count(b.count);
    cell.veg_height_outlier_count_a = as_count(a.outlier_count);
    cell.veg_height_outlier_count_b = as_count(b.outlier_count);
    cell.veg_height_outlier_class7_count_a = as_count(a.outlier_class7_count);
    cell.veg_height_outlier_class7_count_b = as_count(b.outlier_class7_count);
    cell.channels = channels
        .iter()
        .map(|name| ChannelValues::new(name.clone(), a.channel(name), b.channel(name)))
        .collect();
    cell
}
