//! # Frame acquisition
//!
//! Decoders may buffer frames, split a packet into several frames, or only partially consume a
//! packet per call. [`FrameReader`] hides all of that behind a plain iterator of frames.

use crate::decoder::{DecodedFrame, EncodedPacket, MotionVector, VideoSource};
use log::*;

/// Fully decoded frame with its motion vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    /// 1-based index of the frame in output order.
    pub index: usize,
    /// Presentation timestamp. Best-effort, see [`FrameReader`].
    pub pts: i64,
    pub pict_type: char,
    /// Motion vectors in decode order. Empty when the codec exported none.
    pub motion_vectors: Vec<MotionVector>,
}

enum ReaderState<P> {
    /// No packet is held.
    Idle,
    /// A packet is held that the decoder has not fully consumed yet.
    PacketPending(P),
    /// The demuxer is exhausted, frames still buffered in the decoder are being flushed out.
    Draining,
    Done,
}

/// Pulls packets out of a [`VideoSource`] until exactly one frame comes out of the decoder.
///
/// Timestamps are taken from the decoder's presentation timestamp, falling back to the decode
/// timestamp, and then to the previous timestamp plus one. This is a heuristic; the result is not
/// guaranteed to be monotonic or unique for every codec.
pub struct FrameReader<S: VideoSource> {
    source: S,
    state: ReaderState<S::Packet>,
    frames: usize,
    last_pts: i64,
}

impl<S: VideoSource> FrameReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: ReaderState::Idle,
            frames: 0,
            last_pts: -1,
        }
    }

    /// Get width and height of the video.
    pub fn dimensions(&self) -> (usize, usize) {
        self.source.dimensions()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Number of frames returned so far.
    pub fn frames_read(&self) -> usize {
        self.frames
    }

    /// Whether end of stream has been reached.
    pub fn is_done(&self) -> bool {
        matches!(self.state, ReaderState::Done)
    }

    /// Decode the next frame.
    ///
    /// Returns `None` once both the demuxer and the decoder are exhausted. Any further calls will
    /// keep returning `None`.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            match std::mem::replace(&mut self.state, ReaderState::Done) {
                ReaderState::Idle => match self.source.read_packet() {
                    Some(packet) if packet.stream_index() == self.source.video_stream() => {
                        self.state = ReaderState::PacketPending(packet);
                    }
                    Some(packet) => {
                        trace!("Skip packet of stream {}", packet.stream_index());
                        self.state = ReaderState::Idle;
                    }
                    None => {
                        debug!("Demuxer exhausted, draining decoder");
                        self.state = ReaderState::Draining;
                    }
                },
                ReaderState::PacketPending(mut packet) => {
                    match self.source.decode(Some(&mut packet)) {
                        Some(frame) => {
                            if !packet.is_consumed() {
                                self.state = ReaderState::PacketPending(packet);
                            } else {
                                self.state = ReaderState::Idle;
                            }
                            return Some(self.finish_frame(frame));
                        }
                        None if !packet.is_consumed() => {
                            trace!("Packet not taken in yet, feeding it again");
                            self.state = ReaderState::PacketPending(packet);
                        }
                        None => {
                            trace!("Packet produced no frame");
                            self.state = ReaderState::Idle;
                        }
                    }
                }
                ReaderState::Draining => match self.source.decode(None) {
                    Some(frame) => {
                        self.state = ReaderState::Draining;
                        return Some(self.finish_frame(frame));
                    }
                    None => {
                        debug!("Decoder drained after {} frames", self.frames);
                        self.state = ReaderState::Done;
                    }
                },
                ReaderState::Done => return None,
            }
        }
    }

    fn finish_frame(&mut self, frame: DecodedFrame) -> RawFrame {
        self.frames += 1;

        let pts = frame.pts.or(frame.dts).unwrap_or(self.last_pts + 1);
        self.last_pts = pts;

        let motion_vectors = frame.motion_vectors.unwrap_or_default();

        trace!(
            "Frame {}: pts={} type={} mvs={}",
            self.frames,
            pts,
            frame.pict_type,
            motion_vectors.len()
        );

        RawFrame {
            index: self.frames,
            pts,
            pict_type: frame.pict_type,
            motion_vectors,
        }
    }
}

impl<S: VideoSource> Iterator for FrameReader<S> {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        self.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::scripted::*;

    #[test]
    fn reads_frames_in_order() {
        let source = ScriptedSource::new(320, 240)
            .frame(decoded('I', 0, &[]))
            .frame(decoded('P', 1, &[(100, 80, 96, 78)]))
            .frame(decoded('P', 2, &[(10, 10, 8, 10), (20, 20, 20, 18)]));

        let frames = FrameReader::new(source).collect::<Vec<_>>();

        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| f.index).collect::<Vec<_>>(),
            [1, 2, 3]
        );
        assert_eq!(
            frames.iter().map(|f| f.pict_type).collect::<String>(),
            "IPP"
        );
        assert!(frames[0].motion_vectors.is_empty());
        assert_eq!(frames[1].motion_vectors, [MotionVector::new(100, 80, 96, 78)]);
        assert_eq!(frames[2].motion_vectors.len(), 2);
    }

    #[test]
    fn skips_other_streams() {
        let source = ScriptedSource::new(320, 240)
            .packet(1, vec![Some(decoded('I', 100, &[]))])
            .frame(decoded('I', 0, &[]))
            .packet(2, vec![Some(decoded('P', 200, &[]))])
            .packet(1, vec![])
            .frame(decoded('P', 1, &[]));

        let frames = FrameReader::new(source).collect::<Vec<_>>();

        assert_eq!(frames.iter().map(|f| f.pts).collect::<Vec<_>>(), [0, 1]);
    }

    #[test]
    fn resumes_partially_consumed_packet() {
        let source = ScriptedSource::new(320, 240)
            .packet(
                0,
                vec![
                    Some(decoded('I', 0, &[])),
                    Some(decoded('P', 1, &[])),
                    None,
                ],
            )
            .frame(decoded('P', 2, &[]));

        let frames = FrameReader::new(source).collect::<Vec<_>>();

        assert_eq!(frames.iter().map(|f| f.pts).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn failed_decode_moves_to_next_packet() {
        let source = ScriptedSource::new(320, 240)
            .packet(0, vec![None])
            .frame(decoded('P', 6, &[]));

        let frames = FrameReader::new(source).collect::<Vec<_>>();

        assert_eq!(frames.iter().map(|f| f.pts).collect::<Vec<_>>(), [6]);
    }

    #[test]
    fn unconsumed_packet_is_fed_again() {
        // The decoder had no output and did not take the packet in, it must not be dropped.
        let source = ScriptedSource::new(320, 240)
            .packet(0, vec![None, Some(decoded('I', 5, &[]))])
            .frame(decoded('P', 6, &[]));

        let frames = FrameReader::new(source).collect::<Vec<_>>();

        assert_eq!(frames.iter().map(|f| f.pts).collect::<Vec<_>>(), [5, 6]);
    }

    #[test]
    fn drains_buffered_frames() {
        let source = ScriptedSource::new(320, 240)
            .packet(0, vec![None])
            .frame(decoded('I', 0, &[]))
            .buffer(decoded('B', 1, &[]))
            .buffer(decoded('P', 2, &[]));

        let mut reader = FrameReader::new(source);
        let frames = reader.by_ref().collect::<Vec<_>>();

        assert_eq!(frames.iter().map(|f| f.pts).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(frames.last().map(|f| f.index), Some(3));
        assert!(reader.is_done());
        // Two productive flushes, then one that comes back empty.
        assert_eq!(reader.source().flush_calls, 3);
    }

    #[test]
    fn done_is_sticky() {
        let mut reader = FrameReader::new(ScriptedSource::new(16, 16).frame(decoded('I', 0, &[])));

        assert!(reader.next_frame().is_some());
        assert!(reader.next_frame().is_none());
        assert!(reader.next_frame().is_none());
        assert_eq!(reader.source().flush_calls, 1);
        assert_eq!(reader.frames_read(), 1);
    }

    #[test]
    fn empty_stream() {
        let mut reader = FrameReader::new(ScriptedSource::new(16, 16));

        assert!(reader.next_frame().is_none());
        assert!(reader.is_done());
    }

    #[test]
    fn pts_fallback_chain() {
        let frame = |pts, dts| DecodedFrame {
            pts,
            dts,
            pict_type: 'P',
            motion_vectors: None,
        };

        let source = ScriptedSource::new(320, 240)
            .frame(frame(None, None))
            .frame(frame(None, None))
            .frame(frame(Some(10), Some(3)))
            .frame(frame(None, Some(12)))
            .frame(frame(None, None))
            .frame(frame(Some(4), None))
            .frame(frame(None, None));

        let pts = FrameReader::new(source)
            .map(|f| f.pts)
            .collect::<Vec<_>>();

        // Not monotonic when the decoder reports a smaller pts, the fallback is best-effort.
        assert_eq!(pts, [0, 1, 10, 12, 13, 4, 5]);
    }

    #[test]
    fn missing_side_data_is_empty() {
        let source = ScriptedSource::new(320, 240).frame(DecodedFrame {
            pts: Some(0),
            dts: None,
            pict_type: 'B',
            motion_vectors: Some(vec![]),
        });

        let frames = FrameReader::new(source).collect::<Vec<_>>();

        assert!(frames[0].motion_vectors.is_empty());
    }
}
