//! # Text output
//!
//! One block per frame: a `#` header line describing the frame, followed by its data lines.

use crate::grid::GridFrame;
use crate::reader::RawFrame;
use anyhow::Result;
use std::io::Write;

/// Output layout, chosen once for the whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum OutputMode {
    /// Every motion vector on its own line, no grid projection.
    Raw,
    /// Motion arranged into a fixed grid, with gaps interpolated.
    Arranged,
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::Arranged
    }
}

impl OutputMode {
    /// Name used in the `output_type` header field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Arranged => "arranged",
        }
    }
}

/// Writes frames in the line oriented text format.
pub struct FrameWriter<W> {
    out: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(Into::into)
    }

    fn header(
        &mut self,
        pts: i64,
        index: usize,
        pict_type: char,
        mode: OutputMode,
        shape: (usize, usize),
    ) -> Result<()> {
        writeln!(
            self.out,
            "# pts={} frame_index={} pict_type={} output_type={} shape={}x{}",
            pts,
            index,
            pict_type,
            mode.name(),
            shape.0,
            shape.1
        )
        .map_err(Into::into)
    }

    /// Write motion vectors of a frame as `src_x src_y dx dy` lines.
    pub fn write_raw(&mut self, frame: &RawFrame) -> Result<()> {
        self.header(
            frame.pts,
            frame.index,
            frame.pict_type,
            OutputMode::Raw,
            (frame.motion_vectors.len(), 4),
        )?;

        for mv in &frame.motion_vectors {
            writeln!(
                self.out,
                "{}\t{}\t{}\t{}",
                mv.src_x,
                mv.src_y,
                mv.dx(),
                mv.dy()
            )?;
        }

        Ok(())
    }

    /// Write the grid of a frame: all dx rows, then all dy rows.
    ///
    /// Every value is followed by a tab, including the last one on a line.
    pub fn write_grid(&mut self, frame: &GridFrame) -> Result<()> {
        let shape = frame.grid.shape();

        self.header(
            frame.pts,
            frame.index,
            frame.pict_type,
            OutputMode::Arranged,
            (shape.rows, shape.cols),
        )?;

        for m in [frame.grid.dx(), frame.grid.dy()] {
            for row in m.row_iter() {
                for v in row.iter() {
                    write!(self.out, "{}\t", v)?;
                }
                writeln!(self.out)?;
            }
        }

        Ok(())
    }
}
