//! # Gap filling
//!
//! Many codecs do not export motion vectors on frames that are still motion predicted (notably
//! B-frames). [`Interpolator`] recovers an approximate grid for such a frame from its temporal
//! neighbours.

use crate::grid::{GridFrame, MotionGrid};
use anyhow::Result;
use log::*;

/// Fills a single empty frame sitting between two vector-bearing frames.
///
/// At most two frames are held at any time: the grid of the last vector-bearing frame, which has
/// already been emitted and serves as the left neighbour, and one empty frame waiting for its
/// right neighbour. Frames always come out in the order they went in, each exactly once.
///
/// Only isolated gaps are filled. Runs of two or more empty frames are passed through unchanged.
#[derive(Default)]
pub struct Interpolator {
    left: Option<(usize, MotionGrid)>,
    gap: Option<GridFrame>,
    interpolated: usize,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames that had their grid interpolated so far.
    pub fn interpolated(&self) -> usize {
        self.interpolated
    }

    /// Number of frames currently held.
    pub fn buffered(&self) -> usize {
        self.left.iter().count() + self.gap.iter().count()
    }

    /// Take in the next frame.
    ///
    /// Frames that are ready are passed to `emit`, in order. The first error returned by `emit`
    /// is propagated.
    pub fn push<F: FnMut(&GridFrame) -> Result<()>>(
        &mut self,
        frame: GridFrame,
        mut emit: F,
    ) -> Result<()> {
        if frame.empty {
            if self.gap.is_none() && self.left.is_some() {
                trace!("Hold frame {} as gap candidate", frame.index);
                self.gap = Some(frame);
            } else {
                self.left = None;
                if let Some(gap) = self.gap.take() {
                    emit(&gap)?;
                }
                emit(&frame)?;
            }
        } else {
            if let Some(mut gap) = self.gap.take() {
                if let Some((left_index, left)) = &self.left {
                    debug!(
                        "Interpolate frame {} from {} and {}",
                        gap.index, left_index, frame.index
                    );
                    gap.grid = MotionGrid::average(left, &frame.grid);
                    gap.empty = false;
                    self.interpolated += 1;
                }
                emit(&gap)?;
            }

            emit(&frame)?;
            self.left = Some((frame.index, frame.grid));
        }

        Ok(())
    }

    /// Release every held frame that has not been emitted yet.
    ///
    /// Call this once the stream is over.
    pub fn finish<F: FnMut(&GridFrame) -> Result<()>>(&mut self, mut emit: F) -> Result<()> {
        self.left = None;
        match self.gap.take() {
            Some(gap) => emit(&gap),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridShape;

    const SHAPE: GridShape = GridShape { rows: 2, cols: 3 };

    fn frame(index: usize, cells: &[((usize, usize), (i32, i32))]) -> GridFrame {
        let mut grid = MotionGrid::zeros(SHAPE);
        for &((row, col), motion) in cells {
            grid.set(row, col, motion);
        }
        GridFrame {
            index,
            pts: index as i64,
            pict_type: if cells.is_empty() { 'B' } else { 'P' },
            grid,
            empty: cells.is_empty(),
        }
    }

    fn push(interp: &mut Interpolator, frame: GridFrame) -> Vec<GridFrame> {
        let mut out = vec![];
        interp
            .push(frame, |f| {
                out.push(f.clone());
                Ok(())
            })
            .unwrap();
        out
    }

    fn finish(interp: &mut Interpolator) -> Vec<GridFrame> {
        let mut out = vec![];
        interp
            .finish(|f| {
                out.push(f.clone());
                Ok(())
            })
            .unwrap();
        out
    }

    fn run(frames: Vec<GridFrame>) -> Vec<GridFrame> {
        let mut interp = Interpolator::new();
        let mut out = vec![];
        for f in frames {
            out.extend(push(&mut interp, f));
            assert!(interp.buffered() <= 2);
        }
        out.extend(finish(&mut interp));
        out
    }

    fn indices(frames: &[GridFrame]) -> Vec<usize> {
        frames.iter().map(|f| f.index).collect()
    }

    #[test]
    fn fills_single_gap() {
        let a = frame(1, &[((0, 0), (4, 2)), ((1, 2), (-3, 5))]);
        let b = frame(2, &[]);
        let c = frame(3, &[((0, 0), (1, 1)), ((0, 1), (6, -6))]);

        let mut interp = Interpolator::new();

        assert_eq!(indices(&push(&mut interp, a)), [1]);
        assert!(push(&mut interp, b).is_empty());
        let out = push(&mut interp, c);
        assert_eq!(indices(&out), [2, 3]);

        let b = &out[0];
        assert!(!b.empty);
        assert_eq!(b.pict_type, 'B');
        assert_eq!(b.grid.get(0, 0), (2, 1));
        assert_eq!(b.grid.get(0, 1), (3, -3));
        assert_eq!(b.grid.get(1, 2), (-1, 2));
        assert_eq!(b.grid.get(1, 0), (0, 0));
        assert_eq!(interp.interpolated(), 1);
        assert!(finish(&mut interp).is_empty());
    }

    #[test]
    fn run_of_empty_frames_passes_through() {
        let out = run(vec![
            frame(1, &[((0, 0), (4, 4))]),
            frame(2, &[]),
            frame(3, &[]),
            frame(4, &[((0, 0), (8, 8))]),
        ]);

        assert_eq!(indices(&out), [1, 2, 3, 4]);
        assert!(out[1].empty && out[1].grid.is_zero());
        assert!(out[2].empty && out[2].grid.is_zero());
    }

    #[test]
    fn gap_after_run_is_not_filled() {
        // The frame before the gap at 4 is empty itself.
        let out = run(vec![
            frame(1, &[((0, 0), (4, 4))]),
            frame(2, &[]),
            frame(3, &[]),
            frame(4, &[]),
            frame(5, &[((0, 0), (8, 8))]),
        ]);

        assert_eq!(indices(&out), [1, 2, 3, 4, 5]);
        assert!(out[1..4].iter().all(|f| f.empty && f.grid.is_zero()));
    }

    #[test]
    fn leading_empty_frames_pass_through() {
        let out = run(vec![
            frame(1, &[]),
            frame(2, &[((1, 1), (2, 2))]),
            frame(3, &[]),
            frame(4, &[((1, 1), (4, 6))]),
        ]);

        assert_eq!(indices(&out), [1, 2, 3, 4]);
        assert!(out[0].empty);
        assert!(!out[2].empty);
        assert_eq!(out[2].grid.get(1, 1), (3, 4));
    }

    #[test]
    fn trailing_gap_flushed_unchanged() {
        let mut interp = Interpolator::new();

        assert_eq!(indices(&push(&mut interp, frame(1, &[((0, 0), (2, 2))]))), [1]);
        assert!(push(&mut interp, frame(2, &[])).is_empty());
        assert_eq!(interp.buffered(), 2);

        let last = finish(&mut interp);
        assert_eq!(indices(&last), [2]);
        assert!(last[0].empty && last[0].grid.is_zero());
        assert_eq!(interp.buffered(), 0);
        assert!(finish(&mut interp).is_empty());
    }

    #[test]
    fn consecutive_gaps_each_filled() {
        let out = run(vec![
            frame(1, &[((0, 0), (2, 0))]),
            frame(2, &[]),
            frame(3, &[((0, 0), (4, 0))]),
            frame(4, &[]),
            frame(5, &[((0, 0), (8, 0))]),
        ]);

        assert_eq!(indices(&out), [1, 2, 3, 4, 5]);
        assert_eq!(out[1].grid.get(0, 0), (3, 0));
        assert_eq!(out[3].grid.get(0, 0), (6, 0));
        assert!(out.iter().all(|f| !f.empty));
    }

    #[test]
    fn every_frame_emitted_once_in_order() {
        let pattern = [true, false, false, true, false, true, true, false, false, false, true, false];
        let frames = pattern
            .iter()
            .enumerate()
            .map(|(i, &has_mvs)| {
                if has_mvs {
                    frame(i + 1, &[((0, 0), (1, 1))])
                } else {
                    frame(i + 1, &[])
                }
            })
            .collect();

        let out = run(frames);

        assert_eq!(indices(&out), (1..=pattern.len()).collect::<Vec<_>>());
    }

    #[test]
    fn left_neighbour_keeps_only_grid() {
        let mut interp = Interpolator::new();

        push(&mut interp, frame(1, &[((0, 0), (2, 2))]));
        assert_eq!(interp.buffered(), 1);

        let (index, grid) = interp.left.as_ref().unwrap();
        assert_eq!(*index, 1);
        assert_eq!(grid.get(0, 0), (2, 2));
    }

    #[test]
    fn emit_error_propagates() {
        let mut interp = Interpolator::new();

        let res = interp.push(frame(1, &[((0, 0), (2, 2))]), |_| {
            Err(anyhow::anyhow!("broken pipe"))
        });

        assert!(res.is_err());
    }
}
