//! # Fixed size motion grids

use crate::decoder::MotionVector;
use crate::reader::RawFrame;
use log::*;
use nalgebra::DMatrix;

/// Default pixel stride of a grid cell.
pub const GRID_STEP: usize = 16;
/// Default upper bound on grid rows and columns.
pub const MAX_GRID_SIZE: usize = 512;

/// Grid resolution settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct GridConfig {
    /// Size of a grid cell in pixels.
    pub step: usize,
    /// Maximum number of rows and columns.
    pub max_size: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            step: GRID_STEP,
            max_size: MAX_GRID_SIZE,
        }
    }
}

/// Number of rows and columns of a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    /// Compute the grid shape for a video.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the video in pixels.
    /// * `height` - height of the video in pixels.
    /// * `config` - grid resolution settings.
    pub fn new(width: usize, height: usize, config: &GridConfig) -> Self {
        let step = config.step.max(1);
        Self {
            rows: std::cmp::min(height / step, config.max_size),
            cols: std::cmp::min(width / step, config.max_size),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

/// Per-cell horizontal and vertical displacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MotionGrid {
    dx: DMatrix<i32>,
    dy: DMatrix<i32>,
}

impl MotionGrid {
    /// Create a grid filled with zero motion.
    pub fn zeros(shape: GridShape) -> Self {
        Self {
            dx: DMatrix::zeros(shape.rows, shape.cols),
            dy: DMatrix::zeros(shape.rows, shape.cols),
        }
    }

    pub fn shape(&self) -> GridShape {
        GridShape {
            rows: self.dx.nrows(),
            cols: self.dx.ncols(),
        }
    }

    /// Get `(dx, dy)` at given cell.
    pub fn get(&self, row: usize, col: usize) -> (i32, i32) {
        (self.dx[(row, col)], self.dy[(row, col)])
    }

    /// Set `(dx, dy)` at given cell, replacing the previous value.
    pub fn set(&mut self, row: usize, col: usize, (dx, dy): (i32, i32)) {
        self.dx[(row, col)] = dx;
        self.dy[(row, col)] = dy;
    }

    /// Horizontal displacement matrix.
    pub fn dx(&self) -> &DMatrix<i32> {
        &self.dx
    }

    /// Vertical displacement matrix.
    pub fn dy(&self) -> &DMatrix<i32> {
        &self.dy
    }

    /// Whether every cell holds zero motion.
    pub fn is_zero(&self) -> bool {
        self.dx.iter().chain(self.dy.iter()).all(|&v| v == 0)
    }

    /// Cell-wise average of two grids, rounding towards zero.
    ///
    /// Both grids must have the same shape.
    pub fn average(a: &Self, b: &Self) -> Self {
        assert_eq!(a.shape(), b.shape());
        Self {
            dx: a.dx.zip_map(&b.dx, |a, b| (a + b) / 2),
            dy: a.dy.zip_map(&b.dy, |a, b| (a + b) / 2),
        }
    }
}

/// Motion grid of a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GridFrame {
    pub index: usize,
    pub pts: i64,
    pub pict_type: char,
    pub grid: MotionGrid,
    /// Set when the frame carried no motion vectors at all.
    ///
    /// A frame whose vectors all have zero displacement is not empty.
    pub empty: bool,
}

/// Projects motion vectors of frames onto a grid of fixed shape.
pub struct GridBuilder {
    shape: GridShape,
    step: usize,
}

impl GridBuilder {
    pub fn new(shape: GridShape, config: &GridConfig) -> Self {
        Self {
            shape,
            step: config.step.max(1),
        }
    }

    /// Create a builder for a video of given dimensions.
    pub fn for_video(width: usize, height: usize, config: &GridConfig) -> Self {
        Self::new(GridShape::new(width, height, config), config)
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Get the cell a vector lands in.
    ///
    /// Source blocks outside the frame (border padding) collapse onto the nearest edge cell.
    /// Returns `None` only when the grid has no cells.
    pub fn cell_of(&self, mv: &MotionVector) -> Option<(usize, usize)> {
        if self.shape.is_zero() {
            return None;
        }

        let clip = |coord: i32, len: usize| {
            if coord < 0 {
                0
            } else {
                std::cmp::min(coord as usize / self.step, len - 1)
            }
        };

        Some((
            clip(mv.src_y, self.shape.rows),
            clip(mv.src_x, self.shape.cols),
        ))
    }

    /// Build the grid of a frame.
    ///
    /// When several vectors fall into the same cell, the last one wins.
    pub fn build(&self, frame: &RawFrame) -> GridFrame {
        let mut grid = MotionGrid::zeros(self.shape);

        for mv in &frame.motion_vectors {
            match self.cell_of(mv) {
                Some((row, col)) => grid.set(row, col, (mv.dx(), mv.dy())),
                None => trace!("Grid has no cells, dropping {:?}", mv),
            }
        }

        GridFrame {
            index: frame.index,
            pts: frame.pts,
            pict_type: frame.pict_type,
            grid,
            empty: frame.motion_vectors.is_empty(),
        }
    }
}
