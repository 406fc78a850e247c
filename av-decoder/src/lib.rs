//! FFMPEG's AV Decoder

use c_str_macro::c_str;
use ffmpeg_sys_next::*;
use libc::c_int;
use log::*;
use mvflow::prelude::v1::*;
use mvflow::utils::*;
use std::ffi::{CStr, CString};
use std::{ptr, slice};

/// Marker FFmpeg uses for unknown timestamps.
const NOPTS_VALUE: i64 = i64::MIN;

/// Get a readable message for an FFmpeg error code.
pub fn av_error_string(code: c_int) -> String {
    let mut buf = [0 as libc::c_char; 128];

    match unsafe { av_strerror(code, buf.as_mut_ptr(), buf.len()) } {
        e if e < 0 => format!("Unknown error {}", code),
        _ => unsafe { CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned(),
    }
}

struct FormatInput(&'static mut AVFormatContext);

impl Drop for FormatInput {
    fn drop(&mut self) {
        // SAFETY: the reference will be dangling,
        // but after the drop nobody will read it.
        unsafe { avformat_close_input(&mut (self.0 as *mut _)) };
    }
}

struct CodecContext(&'static mut AVCodecContext);

impl Drop for CodecContext {
    fn drop(&mut self) {
        unsafe { avcodec_free_context(&mut (self.0 as *mut _)) };
    }
}

struct FrameBuf(&'static mut AVFrame);

impl Drop for FrameBuf {
    fn drop(&mut self) {
        unsafe { av_frame_free(&mut (self.0 as *mut _)) };
    }
}

/// Owned demuxed packet.
pub struct AvPacket {
    pkt: &'static mut AVPacket,
    sent: bool,
}

impl AvPacket {
    fn alloc() -> Option<Self> {
        unsafe { av_packet_alloc().as_mut() }.map(|pkt| Self { pkt, sent: false })
    }
}

impl Drop for AvPacket {
    fn drop(&mut self) {
        unsafe { av_packet_free(&mut (self.pkt as *mut _)) };
    }
}

impl EncodedPacket for AvPacket {
    fn stream_index(&self) -> usize {
        self.pkt.stream_index as usize
    }

    fn is_consumed(&self) -> bool {
        self.sent
    }
}

/// Video file opened through libavformat, decoded through libavcodec with motion vector export
/// enabled.
///
/// Everything is released on drop.
pub struct AvSource {
    // Fields drop in declaration order, the format context has to go last.
    codec_ctx: CodecContext,
    av_frame: FrameBuf,
    fmt: FormatInput,
    stream_idx: usize,
    width: usize,
    height: usize,
    flushing: bool,
}

impl AvSource {
    /// Open a video file and prepare its best video stream for decoding.
    pub fn open(path: &str) -> std::result::Result<Self, SourceError> {
        let c_path = CString::new(path).map_err(|_| SourceError::Open {
            code: AVERROR(libc::EINVAL),
            message: format!("{}: path contains a NUL byte", path),
        })?;

        let mut fmt_ctx: Option<&'static mut AVFormatContext> = None;

        match unsafe {
            avformat_open_input(
                fmt_ctx.as_mut_ptr(),
                c_path.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
            )
        } {
            0 => {}
            e => {
                return Err(SourceError::Open {
                    code: e,
                    message: format!("{}: {}", path, av_error_string(e)),
                })
            }
        }

        let fmt = FormatInput(fmt_ctx.ok_or_else(|| SourceError::Open {
            code: AVERROR(libc::ENOMEM),
            message: "Format context not allocated".into(),
        })?);

        match unsafe { avformat_find_stream_info(fmt.0, ptr::null_mut()) } {
            e if e < 0 => {
                return Err(SourceError::StreamInfo {
                    code: e,
                    message: av_error_string(e),
                })
            }
            _ => {}
        }

        let mut decoder: Option<&'static AVCodec> = None;

        let stream_idx = match unsafe {
            av_find_best_stream(
                fmt.0,
                AVMediaType::AVMEDIA_TYPE_VIDEO,
                -1,
                -1,
                decoder.as_const_ptr(),
                0,
            )
        } {
            e if e < 0 => {
                return Err(SourceError::Codec {
                    code: e,
                    message: format!("Video stream not found ({})", av_error_string(e)),
                })
            }
            i => i as usize,
        };

        let decoder = decoder.ok_or_else(|| SourceError::Codec {
            code: AVERROR_DECODER_NOT_FOUND,
            message: "No decoder for the video stream".into(),
        })?;

        let codec_ctx = unsafe { avcodec_alloc_context3(decoder).as_mut() }
            .map(CodecContext)
            .ok_or_else(|| SourceError::Codec {
                code: AVERROR(libc::ENOMEM),
                message: "Failed to allocate codec context".into(),
            })?;

        let stream = unsafe { (*fmt.0.streams.add(stream_idx)).as_ref() }.ok_or_else(|| {
            SourceError::StreamInfo {
                code: AVERROR_STREAM_NOT_FOUND,
                message: "Stream info null".into(),
            }
        })?;

        match unsafe { avcodec_parameters_to_context(codec_ctx.0, stream.codecpar) } {
            e if e < 0 => {
                return Err(SourceError::Codec {
                    code: e,
                    message: format!("Failed to get codec parameters ({})", av_error_string(e)),
                })
            }
            _ => {}
        }

        let mut av_opts: Option<&mut AVDictionary> = None;

        unsafe {
            av_dict_set(
                av_opts.as_mut_ptr(),
                c_str!("flags2").as_ptr(),
                c_str!("+export_mvs").as_ptr(),
                0,
            );
        }

        let opened = unsafe { avcodec_open2(codec_ctx.0, decoder, av_opts.as_mut_ptr()) };

        // Options the codec did not take are left in the dictionary.
        let export_refused = !unsafe {
            av_dict_get(*av_opts.as_mut_ptr(), c_str!("flags2").as_ptr(), ptr::null(), 0)
        }
        .is_null();

        unsafe { av_dict_free(av_opts.as_mut_ptr()) };

        match opened {
            e if e < 0 => {
                return Err(SourceError::Codec {
                    code: e,
                    message: format!("Failed to open codec ({})", av_error_string(e)),
                })
            }
            _ if export_refused => {
                return Err(SourceError::Codec {
                    code: AVERROR(libc::ENOSYS),
                    message: "Codec cannot export motion vectors".into(),
                })
            }
            _ => {}
        }

        let av_frame = unsafe { av_frame_alloc().as_mut() }
            .map(FrameBuf)
            .ok_or_else(|| SourceError::Codec {
                code: AVERROR(libc::ENOMEM),
                message: "Unable to allocate frame".into(),
            })?;

        let (width, height) = (codec_ctx.0.width as usize, codec_ctx.0.height as usize);

        debug!(
            "Opened {}: stream {}, {}x{}",
            path, stream_idx, width, height
        );

        Ok(Self {
            codec_ctx,
            av_frame,
            fmt,
            stream_idx,
            width,
            height,
            flushing: false,
        })
    }

    /// Print container information to stderr.
    pub fn dump_format(&mut self) {
        unsafe { av_dump_format(self.fmt.0, self.stream_idx as _, ptr::null(), 0) };
    }

    /// Hand a packet to the decoder.
    ///
    /// Returns `false` if decoding the packet failed. A packet the decoder has no room for yet
    /// stays unsent.
    fn send_packet(&mut self, packet: &mut AvPacket) -> bool {
        match unsafe { avcodec_send_packet(self.codec_ctx.0, packet.pkt) } {
            0 => {
                packet.sent = true;
                true
            }
            // Decoder output is full, the packet goes in on a later call.
            e if e == AVERROR(libc::EAGAIN) => true,
            e => {
                debug!("Failed to send packet ({})", av_error_string(e));
                packet.sent = true;
                false
            }
        }
    }

    fn receive_frame(&mut self) -> Option<DecodedFrame> {
        let frame = &mut *self.av_frame.0;

        match unsafe { avcodec_receive_frame(self.codec_ctx.0, frame) } {
            0 => {}
            e if e == AVERROR(libc::EAGAIN) || e == AVERROR_EOF => return None,
            e => {
                debug!("Failed to recv frame ({})", av_error_string(e));
                return None;
            }
        }

        let timestamp = |ts: i64| Some(ts).filter(|&ts| ts != NOPTS_VALUE);

        let motion_vectors = unsafe {
            av_frame_get_side_data(frame, AVFrameSideDataType::AV_FRAME_DATA_MOTION_VECTORS)
                .as_ref()
        }
        .map(|side_data| {
            let size = side_data.size as usize / std::mem::size_of::<AVMotionVector>();
            trace!("Got {} motion vectors", size);
            let mvs =
                unsafe { slice::from_raw_parts(side_data.data as *const AVMotionVector, size) };
            mvs.iter()
                .map(|mv| {
                    MotionVector::new(
                        mv.src_x as i32,
                        mv.src_y as i32,
                        mv.dst_x as i32,
                        mv.dst_y as i32,
                    )
                })
                .collect()
        });

        let decoded = DecodedFrame {
            pts: timestamp(frame.pts),
            dts: timestamp(frame.pkt_dts),
            pict_type: unsafe { av_get_picture_type_char(frame.pict_type) } as u8 as char,
            motion_vectors,
        };

        unsafe { av_frame_unref(frame) };

        Some(decoded)
    }
}

impl VideoSource for AvSource {
    type Packet = AvPacket;

    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn video_stream(&self) -> usize {
        self.stream_idx
    }

    fn read_packet(&mut self) -> Option<AvPacket> {
        let packet = AvPacket::alloc().or_else(|| {
            error!("Unable to allocate packet");
            None
        })?;

        match unsafe { av_read_frame(self.fmt.0, packet.pkt) } {
            0 => {
                trace!(
                    "Read packet: {} {}",
                    packet.pkt.stream_index,
                    packet.pkt.size
                );
                Some(packet)
            }
            e if e == AVERROR_EOF => None,
            e => {
                warn!("Failed to read frame ({}), ending stream", av_error_string(e));
                None
            }
        }
    }

    fn decode(&mut self, packet: Option<&mut AvPacket>) -> Option<DecodedFrame> {
        match packet {
            Some(packet) => {
                if !packet.sent && !self.send_packet(packet) {
                    return None;
                }

                let frame = self.receive_frame();

                if frame.is_none() && !packet.sent {
                    // Nothing came out, so the decoder has room for the packet now. If it still
                    // refuses, drop the packet rather than feed it forever.
                    if self.send_packet(packet) && !packet.sent {
                        debug!("Decoder keeps refusing packet, dropping it");
                        packet.sent = true;
                    }
                }

                frame
            }
            None => {
                if !self.flushing {
                    self.flushing = true;
                    match unsafe { avcodec_send_packet(self.codec_ctx.0, ptr::null()) } {
                        e if e < 0 => debug!("Failed to flush decoder ({})", av_error_string(e)),
                        _ => {}
                    }
                }

                self.receive_frame()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_fails_to_open() {
        match AvSource::open("/nonexistent/video.mp4") {
            Err(SourceError::Open { code, message }) => {
                assert!(code < 0);
                assert!(message.starts_with("/nonexistent/video.mp4: "));
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("opened a missing file"),
        }
    }

    #[test]
    fn nul_in_path_fails_to_open() {
        assert!(matches!(
            AvSource::open("a\0b"),
            Err(SourceError::Open { .. })
        ));
    }

    #[test]
    fn error_strings() {
        assert!(!av_error_string(AVERROR_EOF).is_empty());
        assert!(!av_error_string(AVERROR(libc::EAGAIN)).is_empty());
    }
}
