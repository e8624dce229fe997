//! Dense optical flow: a motion vector per pixel (or per block of pixels)
//! between two consecutive grayscale frames.

use nalgebra as na;
use ndarray::{prelude::*, s};
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// Grayscale raster, indexed `[row, col]`
pub type GrayImage = Array2<u8>;

/// Motion field between two frames in pixels/frame. Each stored vector
/// covers a `cell x cell` square of the source frame.
#[derive(Debug, Clone)]
pub struct FlowField {
    vectors: Array3<f32>,
    cell: usize,
    width: usize,
    height: usize,
}

impl FlowField {
    /// Per-pixel field shaped `(rows, cols, 2)`
    pub fn dense(vectors: Array3<f32>) -> Self {
        let (height, width, _) = vectors.dim();

        Self {
            vectors,
            cell: 1,
            width,
            height,
        }
    }

    /// Per-block field covering a `width x height` frame
    pub fn blocks(vectors: Array3<f32>, cell: usize, width: usize, height: usize) -> Self {
        Self {
            vectors,
            cell: cell.max(1),
            width,
            height,
        }
    }

    /// Same vector everywhere, mostly useful for synthetic input
    pub fn uniform(width: usize, height: usize, dx: f32, dy: f32) -> Self {
        let mut vectors = Array3::zeros((1, 1, 2));
        vectors[[0, 0, 0]] = dx;
        vectors[[0, 0, 1]] = dy;

        Self::blocks(vectors, width.max(height).max(1), width, height)
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Vector at pixel `(x, y)`, `None` outside the frame
    pub fn at(&self, x: i32, y: i32) -> Option<na::Vector2<f32>> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }

        let (rows, cols, _) = self.vectors.dim();
        if rows == 0 || cols == 0 {
            return None;
        }

        let row = (y as usize / self.cell).min(rows - 1);
        let col = (x as usize / self.cell).min(cols - 1);

        Some(na::Vector2::new(
            self.vectors[[row, col, 0]],
            self.vectors[[row, col, 1]],
        ))
    }

    #[inline]
    pub fn magnitude_at(&self, x: i32, y: i32) -> Option<f32> {
        self.at(x, y).map(|v| v.norm())
    }
}

/// Something that turns two consecutive frames into a motion field
pub trait DenseFlow {
    type Image;

    fn compute(&mut self, prev: &Self::Image, next: &Self::Image) -> Result<FlowField, Error>;
}

/// Parameters of the Farneback polynomial expansion flow
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FarnebackParams {
    pub pyr_scale: f64,
    pub levels: i32,
    pub winsize: i32,
    pub iterations: i32,
    pub poly_n: i32,
    pub poly_sigma: f64,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            winsize: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

/// Pure Rust SAD block matcher. Coarser than Farneback, but needs nothing
/// beyond the grayscale pixels.
#[derive(Debug, Clone)]
pub struct BlockMatchFlow {
    pub block_size: usize,
    pub search_range: usize,
}

impl Default for BlockMatchFlow {
    fn default() -> Self {
        Self {
            block_size: 16,
            search_range: 8,
        }
    }
}

impl BlockMatchFlow {
    pub fn new(block_size: usize, search_range: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            search_range,
        }
    }

    fn sad(
        prev: &GrayImage,
        next: &GrayImage,
        (px, py): (usize, usize),
        (nx, ny): (usize, usize),
        size: usize,
    ) -> u32 {
        let a = prev.slice(s![py..py + size, px..px + size]);
        let b = next.slice(s![ny..ny + size, nx..nx + size]);

        a.iter()
            .zip(b.iter())
            .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs())
            .sum()
    }

    /// Best displacement of the block at `(bx, by)`, zero motion wins ties
    fn match_block(&self, prev: &GrayImage, next: &GrayImage, bx: usize, by: usize) -> (f32, f32) {
        let size = self.block_size;
        let (rows, cols) = next.dim();
        let range = self.search_range as isize;

        let mut best = (0isize, 0isize);
        let mut best_sad = Self::sad(prev, next, (bx, by), (bx, by), size);

        for dy in -range..=range {
            for dx in -range..=range {
                if (dx, dy) == (0, 0) {
                    continue;
                }

                let nx = bx as isize + dx;
                let ny = by as isize + dy;
                if nx < 0 || ny < 0 || nx as usize + size > cols || ny as usize + size > rows {
                    continue;
                }

                let sad = Self::sad(prev, next, (bx, by), (nx as usize, ny as usize), size);
                if sad < best_sad {
                    best_sad = sad;
                    best = (dx, dy);
                }
            }
        }

        (best.0 as f32, best.1 as f32)
    }
}

impl DenseFlow for BlockMatchFlow {
    type Image = GrayImage;

    fn compute(&mut self, prev: &GrayImage, next: &GrayImage) -> Result<FlowField, Error> {
        if prev.dim() != next.dim() {
            return Err(Error::Flow(format!(
                "frame size changed from {:?} to {:?}",
                prev.dim(),
                next.dim()
            )));
        }

        let (height, width) = prev.dim();
        let size = self.block_size;
        let (rows, cols) = (height / size, width / size);
        let mut vectors = Array3::zeros((rows, cols, 2));

        for row in 0..rows {
            for col in 0..cols {
                let (dx, dy) = self.match_block(prev, next, col * size, row * size);
                vectors[[row, col, 0]] = dx;
                vectors[[row, col, 1]] = dy;
            }
        }

        Ok(FlowField::blocks(vectors, size, width, height))
    }
}

#[cfg(feature = "video")]
pub use self::farneback::FarnebackFlow;

#[cfg(feature = "video")]
mod farneback {
    use super::*;
    use opencv::{core, prelude::*, video};

    /// OpenCV dense Farneback flow over grayscale `Mat`s
    #[derive(Debug, Clone, Default)]
    pub struct FarnebackFlow {
        pub params: FarnebackParams,
    }

    impl FarnebackFlow {
        pub fn new(params: FarnebackParams) -> Self {
            Self { params }
        }
    }

    impl DenseFlow for FarnebackFlow {
        type Image = core::Mat;

        fn compute(&mut self, prev: &core::Mat, next: &core::Mat) -> Result<FlowField, Error> {
            let p = &self.params;
            let mut flow = core::Mat::default();

            video::calc_optical_flow_farneback(
                prev,
                next,
                &mut flow,
                p.pyr_scale,
                p.levels,
                p.winsize,
                p.iterations,
                p.poly_n,
                p.poly_sigma,
                0,
            )?;

            let (rows, cols) = (flow.rows().max(0) as usize, flow.cols().max(0) as usize);
            let mut vectors = Array3::zeros((rows, cols, 2));

            for y in 0..rows {
                for x in 0..cols {
                    let v = flow.at_2d::<core::Vec2f>(y as i32, x as i32)?;
                    vectors[[y, x, 0]] = v[0];
                    vectors[[y, x, 1]] = v[1];
                }
            }

            Ok(FlowField::dense(vectors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(x: i64, y: i64) -> u8 {
        let h = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663)).rem_euclid(251);
        h as u8
    }

    fn shifted(width: usize, height: usize, dx: i64, dy: i64) -> (GrayImage, GrayImage) {
        let prev = Array2::from_shape_fn((height, width), |(y, x)| texture(x as i64, y as i64));
        let next = Array2::from_shape_fn((height, width), |(y, x)| {
            texture(x as i64 - dx, y as i64 - dy)
        });

        (prev, next)
    }

    #[test]
    fn uniform_field_reads_everywhere_inside() {
        let field = FlowField::uniform(100, 50, 3.0, 4.0);

        assert_eq!(field.magnitude_at(0, 0), Some(5.0));
        assert_eq!(field.magnitude_at(99, 49), Some(5.0));
        assert_eq!(field.at(100, 10), None);
        assert_eq!(field.at(-1, 10), None);
    }

    #[test]
    fn dense_field_indexes_row_major() {
        let mut vectors = Array3::zeros((2, 3, 2));
        vectors[[1, 2, 0]] = 1.5;
        vectors[[1, 2, 1]] = -2.0;
        let field = FlowField::dense(vectors);

        assert_eq!(field.dims(), (3, 2));
        assert_eq!(field.at(2, 1), Some(na::Vector2::new(1.5, -2.0)));
        assert_eq!(field.at(0, 0), Some(na::Vector2::new(0.0, 0.0)));
    }

    #[test]
    fn block_matcher_recovers_translation() {
        let (prev, next) = shifted(64, 64, 3, -2);
        let mut flow = BlockMatchFlow::new(16, 4);
        let field = flow.compute(&prev, &next).unwrap();

        assert_eq!(field.at(24, 24), Some(na::Vector2::new(3.0, -2.0)));
        assert_eq!(field.at(40, 40), Some(na::Vector2::new(3.0, -2.0)));
    }

    #[test]
    fn block_matcher_reports_still_scene_as_zero() {
        let (prev, next) = shifted(48, 48, 0, 0);
        let field = BlockMatchFlow::default().compute(&prev, &next).unwrap();

        assert_eq!(field.magnitude_at(20, 20), Some(0.0));
    }

    #[test]
    fn block_matcher_rejects_size_change() {
        let a = Array2::zeros((32, 32));
        let b = Array2::zeros((32, 48));

        assert!(BlockMatchFlow::default().compute(&a, &b).is_err());
    }
}
