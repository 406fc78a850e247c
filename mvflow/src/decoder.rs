//! # Motion vector decoding
//!
//! Container demuxing and codec decoding are done by an external backend. This module describes
//! the contract such a backend has to fulfil.

use std::fmt;

/// Single block motion vector, as reported by the codec.
///
/// Coordinates are block centres in pixels. They may lie outside the frame when the codec
/// references padded border blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MotionVector {
    pub src_x: i32,
    pub src_y: i32,
    pub dst_x: i32,
    pub dst_y: i32,
}

impl MotionVector {
    pub fn new(src_x: i32, src_y: i32, dst_x: i32, dst_y: i32) -> Self {
        Self {
            src_x,
            src_y,
            dst_x,
            dst_y,
        }
    }

    /// Horizontal displacement from the destination block back to the source block.
    pub fn dx(&self) -> i32 {
        self.src_x - self.dst_x
    }

    /// Vertical displacement from the destination block back to the source block.
    pub fn dy(&self) -> i32 {
        self.src_y - self.dst_y
    }
}

/// Frame as it comes out of the decoder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedFrame {
    /// Presentation timestamp, if the decoder knows it.
    pub pts: Option<i64>,
    /// Decode timestamp, if the decoder knows it.
    pub dts: Option<i64>,
    /// Picture type character (`I`, `P`, `B`, ...).
    pub pict_type: char,
    /// Exported motion vectors. `None` when the frame carries no motion side data.
    pub motion_vectors: Option<Vec<MotionVector>>,
}

/// Encoded packet handed out by a [`VideoSource`].
pub trait EncodedPacket {
    /// Index of the container stream this packet belongs to.
    fn stream_index(&self) -> usize;

    /// Whether the decoder has taken in all of the packet's data.
    ///
    /// A packet may need several decode calls before it is consumed. Each of those calls may
    /// produce a frame.
    fn is_consumed(&self) -> bool;
}

/// Demuxer and decoder pair for a single video stream.
///
/// Opening happens on construction, closing happens on drop.
pub trait VideoSource {
    type Packet: EncodedPacket;

    /// Get width and height of the selected video stream.
    fn dimensions(&self) -> (usize, usize);

    /// Get index of the selected video stream.
    fn video_stream(&self) -> usize;

    /// Read the next packet of any stream.
    ///
    /// Returns `None` once the container is exhausted.
    fn read_packet(&mut self) -> Option<Self::Packet>;

    /// Feed the decoder and try to get a frame back.
    ///
    /// Passing `None` flushes the decoder, returning frames it still holds. A failed decode
    /// call is reported as `None`, there is no separate error path.
    ///
    /// A packet that comes back unconsumed is fed again, so a call returning `None` must make
    /// progress on the packet.
    fn decode(&mut self, packet: Option<&mut Self::Packet>) -> Option<DecodedFrame>;
}

/// Fatal errors when opening a video source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceError {
    /// The input could not be opened.
    Open { code: i32, message: String },
    /// Container metadata could not be parsed.
    StreamInfo { code: i32, message: String },
    /// No video stream, no decoder, or the decoder refused motion vector export.
    Codec { code: i32, message: String },
}

impl SourceError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Open { code, .. } | Self::StreamInfo { code, .. } | Self::Codec { code, .. } => {
                *code
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Open { message, .. }
            | Self::StreamInfo { message, .. }
            | Self::Codec { message, .. } => message,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self {
            Self::Open { .. } => "Couldn't open input",
            Self::StreamInfo { .. } => "Stream information not found",
            Self::Codec { .. } => "Codec not found or cannot open codec",
        };
        write!(f, "{} ({}): {}", kind, self.code(), self.message())
    }
}

impl std::error::Error for SourceError {}
