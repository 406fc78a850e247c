//! # Extraction pipeline
//!
//! Frames flow strictly one at a time: decode, build grid, interpolate, write.

use crate::decoder::VideoSource;
use crate::grid::{GridBuilder, GridConfig, GridFrame};
use crate::interpolator::Interpolator;
use crate::output::{FrameWriter, OutputMode};
use crate::reader::FrameReader;
use anyhow::Result;
use log::*;
use std::io::Write;

/// Settings of a single extraction run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct ExtractConfig {
    pub mode: OutputMode,
    pub grid: GridConfig,
}

/// Summary of an extraction run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Frames that came out of the decoder.
    pub decoded: usize,
    /// Frame blocks written to the output.
    pub written: usize,
    /// Written frames that carried no motion.
    pub empty: usize,
    /// Written frames whose grid was interpolated.
    pub interpolated: usize,
}

impl ExtractStats {
    fn record(&mut self, frame: &GridFrame) {
        self.written += 1;
        if frame.empty {
            self.empty += 1;
        }
    }
}

/// Decode the whole source and write every frame to `out`.
///
/// Frames written before an error stay valid output.
pub fn extract<S: VideoSource, W: Write>(
    source: S,
    config: &ExtractConfig,
    out: W,
) -> Result<ExtractStats> {
    let mut reader = FrameReader::new(source);
    let mut writer = FrameWriter::new(out);
    let mut stats = ExtractStats::default();

    match config.mode {
        OutputMode::Raw => {
            for frame in reader.by_ref() {
                writer.write_raw(&frame)?;
                stats.written += 1;
                if frame.motion_vectors.is_empty() {
                    stats.empty += 1;
                }
            }
        }
        OutputMode::Arranged => {
            let (width, height) = reader.dimensions();
            let builder = GridBuilder::for_video(width, height, &config.grid);
            let mut interpolator = Interpolator::new();

            debug!("{}x{} video, grid {:?}", width, height, builder.shape());

            let mut emit = |frame: &GridFrame| -> Result<()> {
                writer.write_grid(frame)?;
                stats.record(frame);
                Ok(())
            };

            for frame in reader.by_ref() {
                interpolator.push(builder.build(&frame), &mut emit)?;
            }

            interpolator.finish(&mut emit)?;

            stats.interpolated = interpolator.interpolated();
        }
    }

    writer.flush()?;

    stats.decoded = reader.frames_read();

    info!(
        "Decoded {} frames, wrote {} ({} empty, {} interpolated)",
        stats.decoded, stats.written, stats.empty, stats.interpolated
    );

    Ok(stats)
}
