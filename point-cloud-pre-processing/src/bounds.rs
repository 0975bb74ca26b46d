/// Grid definition and bounding box filtering for point binning
use crate::error::{GridError, GridResult};
use constants::processing::MAX_GRID_CELLS;
use serde::{Deserialize, Serialize};

/// Uniform grid laid over the survey area.
/// Cells are addressed as (row, col) with row 0 at `y_min` and col 0 at `x_min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub cell_width: f64,
    pub cell_height: f64,
}

impl Grid {
    /// Create a validated grid
    pub fn new(
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        cell_width: f64,
        cell_height: f64,
    ) -> GridResult<Self> {
        let grid = Self {
            x_min,
            x_max,
            y_min,
            y_max,
            cell_width,
            cell_height,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Check extents and cell size before any allocation happens
    pub fn validate(&self) -> GridResult<()> {
        let values = [
            self.x_min,
            self.x_max,
            self.y_min,
            self.y_max,
            self.cell_width,
            self.cell_height,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid_grid("all extents and cell sizes must be finite"));
        }
        if self.cell_width <= 0.0 || self.cell_height <= 0.0 {
            return Err(invalid_grid(format!(
                "cell size must be positive, got {}x{}",
                self.cell_width, self.cell_height
            )));
        }
        if self.x_max <= self.x_min || self.y_max <= self.y_min {
            return Err(invalid_grid(format!(
                "empty extent x=[{}, {}) y=[{}, {})",
                self.x_min, self.x_max, self.y_min, self.y_max
            )));
        }

        let cells = (self.rows() as u128) * (self.cols() as u128);
        if cells > MAX_GRID_CELLS as u128 {
            return Err(invalid_grid(format!(
                "{} cells exceed the limit of {}",
                cells, MAX_GRID_CELLS
            )));
        }
        Ok(())
    }

    /// Number of cell rows, ceil((y_max - y_min) / cell_height)
    pub fn rows(&self) -> usize {
        ((self.y_max - self.y_min) / self.cell_height).ceil() as usize
    }

    /// Number of cell columns, ceil((x_max - x_min) / cell_width)
    pub fn cols(&self) -> usize {
        ((self.x_max - self.x_min) / self.cell_width).ceil() as usize
    }

    pub fn cell_count(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Map a coordinate to its (row, col), or None when it falls outside the grid
    pub fn cell_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.x_min) / self.cell_width).floor();
        let row = ((y - self.y_min) / self.cell_height).floor();
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }

        let (row, col) = (row as usize, col as usize);
        if row < self.rows() && col < self.cols() {
            Some((row, col))
        } else {
            None
        }
    }

    /// World-space rectangle (x0, x1, y0, y1) of a cell
    pub fn cell_bounds(&self, row: usize, col: usize) -> (f64, f64, f64, f64) {
        let x0 = self.x_min + col as f64 * self.cell_width;
        let y0 = self.y_min + row as f64 * self.cell_height;
        (x0, x0 + self.cell_width, y0, y0 + self.cell_height)
    }
}

fn invalid_grid(reason: impl Into<String>) -> GridError {
    GridError::InvalidGrid {
        reason: reason.into(),
    }
}

/// Axis-aligned inclusion region. Minimum edges are inclusive, maximum edges exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> GridResult<Self> {
        let bbox = Self {
            x_min,
            x_max,
            y_min,
            y_max,
        };
        bbox.validate(0)?;
        Ok(bbox)
    }

    /// Check finiteness and ordering; `index` locates the box in error messages
    pub fn validate(&self, index: usize) -> GridResult<()> {
        let finite = [self.x_min, self.x_max, self.y_min, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(GridError::InvalidBoundingBox {
                index,
                reason: "coordinates must be finite".to_string(),
            });
        }
        if self.x_max <= self.x_min || self.y_max <= self.y_min {
            return Err(GridError::InvalidBoundingBox {
                index,
                reason: format!(
                    "empty box x=[{}, {}) y=[{}, {})",
                    self.x_min, self.x_max, self.y_min, self.y_max
                ),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x < self.x_max && y >= self.y_min && y < self.y_max
    }
}

/// Validate a list of inclusion boxes; at least one is required
pub fn validate_bboxes(bboxes: &[BoundingBox]) -> GridResult<()> {
    if bboxes.is_empty() {
        return Err(GridError::InvalidBoundingBox {
            index: 0,
            reason: "at least one bounding box is required".to_string(),
        });
    }
    bboxes
        .iter()
        .enumerate()
        .try_for_each(|(index, bbox)| bbox.validate(index))
}

/// Per-point membership in the union of all boxes
pub fn union_mask(bboxes: &[BoundingBox], xs: &[f64], ys: &[f64]) -> Vec<bool> {
    let mut mask = vec![false; xs.len()];
    for bbox in bboxes {
        for ((inside, &x), &y) in mask.iter_mut().zip(xs).zip(ys) {
            *inside |= bbox.contains(x, y);
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_uses_ceiling() {
        let grid = Grid::new(0.0, 10.5, 0.0, 3.0, 1.0, 2.0).unwrap();
        assert_eq!(grid.cols(), 11);
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cell_count(), 22);
    }

    #[test]
    fn cell_index_floors_and_rejects_outside() {
        let grid = Grid::new(0.0, 10.0, 0.0, 10.0, 1.0, 1.0).unwrap();
        assert_eq!(grid.cell_index(0.5, 0.5), Some((0, 0)));
        assert_eq!(grid.cell_index(2.0, 2.5), Some((2, 2)));
        assert_eq!(grid.cell_index(9.5, 9.2), Some((9, 9)));
        assert_eq!(grid.cell_index(-0.1, 0.5), None);
        assert_eq!(grid.cell_index(10.0, 0.5), None);
        assert_eq!(grid.cell_index(f64::NAN, 0.5), None);
    }

    #[test]
    fn cell_bounds_are_derived_from_indices() {
        let grid = Grid::new(100.0, 110.0, 50.0, 60.0, 2.0, 5.0).unwrap();
        assert_eq!(grid.cell_bounds(1, 3), (106.0, 108.0, 55.0, 60.0));
    }

    #[test]
    fn malformed_grids_are_rejected() {
        assert!(Grid::new(0.0, 10.0, 0.0, 10.0, 0.0, 1.0).is_err());
        assert!(Grid::new(10.0, 0.0, 0.0, 10.0, 1.0, 1.0).is_err());
        assert!(Grid::new(0.0, f64::INFINITY, 0.0, 10.0, 1.0, 1.0).is_err());
        assert!(Grid::new(0.0, 1e9, 0.0, 1e9, 1.0, 1.0).is_err());
    }

    #[test]
    fn union_mask_is_half_open_union() {
        let boxes = [
            BoundingBox::new(0.0, 1.0, 0.0, 1.0).unwrap(),
            BoundingBox::new(5.0, 6.0, 5.0, 6.0).unwrap(),
        ];
        let xs = [0.0, 1.0, 5.5, 3.0];
        let ys = [0.0, 0.5, 5.5, 3.0];
        assert_eq!(union_mask(&boxes, &xs, &ys), vec![true, false, true, false]);
    }

    #[test]
    fn empty_bbox_list_is_invalid() {
        assert!(validate_bboxes(&[]).is_err());
        let bad = BoundingBox {
            x_min: 1.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 1.0,
        };
        match validate_bboxes(&[bad]) {
            Err(GridError::InvalidBoundingBox { index, .. }) => assert_eq!(index, 0),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
