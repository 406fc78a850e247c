//! # Motion Vector Flow Library
//!
//! This library turns the block motion vectors exported by video codecs into either raw vector
//! lists, or fixed-size grids with gaps on vector-less frames (typically B-frames) filled in by
//! interpolation.
//!
//! Decoding itself is done by a [`VideoSource`](decoder::VideoSource) implementation, such as the
//! FFmpeg backed one in the `av-decoder` crate. The easiest way to use the library is to import
//! its prelude:
//!
//! ```
//! use mvflow::prelude::v1::*;
//! ```

pub mod decoder;
pub mod grid;
pub mod interpolator;
pub mod output;
pub mod pipeline;
pub mod reader;
pub mod utils;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            decoder::{DecodedFrame, EncodedPacket, MotionVector, SourceError, VideoSource},
            grid::{GridBuilder, GridConfig, GridFrame, GridShape, MotionGrid},
            interpolator::Interpolator,
            output::{FrameWriter, OutputMode},
            pipeline::{extract, ExtractConfig, ExtractStats},
            reader::{FrameReader, RawFrame},
        };
        pub use anyhow::{anyhow, Error, Result};
    }
}
