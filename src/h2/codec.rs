//! Frame encoding and decoding
//!
//! `FrameCodec` turns typed frames into wire bytes and back. Reading is
//! split in two steps: `read_raw_frame` pulls one preamble + payload off any
//! `Read`, and `decode` validates the payload for its type. Frames of an
//! unknown type decode to `Frame::Unknown` instead of failing.

use super::bits;
use super::error::{Error, ErrorCode, Result};
use super::frames::*;
use super::settings::Settings;
use super::stream::StreamId;
use super::MAX_FRAME_PAYLOAD;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read};

/// Frame preamble size (8 bytes)
pub const FRAME_HEADER_SIZE: usize = 8;

/// Size of one SETTINGS entry on the wire
pub const SETTINGS_ENTRY_SIZE: usize = 8;

/// Frame codec for encoding/decoding frames
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame preamble
    pub fn encode_header(
        frame_type: u8,
        flags: FrameFlags,
        stream_id: StreamId,
        length: usize,
    ) -> Result<[u8; FRAME_HEADER_SIZE]> {
        if length > MAX_FRAME_PAYLOAD {
            return Err(Error::FrameTooLarge(length));
        }
        let mut header = [0u8; FRAME_HEADER_SIZE];
        bits::set_u16(&mut header, 0, length as u16)?;
        bits::set_u8(&mut header, 2, frame_type)?;
        bits::set_u8(&mut header, 3, flags.as_u8())?;
        bits::set_u31(&mut header, 4, stream_id)?;
        Ok(header)
    }

    /// Decode a frame preamble into (type byte, flags, stream id, length)
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> Result<(u8, FrameFlags, StreamId, usize)> {
        let length = bits::get_u16(bytes, 0)? as usize;
        let frame_type = bits::get_u8(bytes, 2)?;
        let flags = FrameFlags::from_u8(bits::get_u8(bytes, 3)?);
        // Reserved bit is ignored on read
        let stream_id = bits::get_u31(bytes, 4)?;
        Ok((frame_type, flags, stream_id, length))
    }

    fn with_header(frame_type: FrameType, flags: FrameFlags, stream_id: StreamId, payload_len: usize) -> Result<BytesMut> {
        let header = Self::encode_header(frame_type.as_u8(), flags, stream_id, payload_len)?;
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);
        buf.put_slice(&header);
        Ok(buf)
    }

    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame) -> Result<Bytes> {
        let mut flags = FrameFlags::empty();
        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let mut buf = Self::with_header(FrameType::Data, flags, frame.stream_id, frame.data.len())?;
        buf.put_slice(&frame.data);
        Ok(buf.freeze())
    }

    /// Encode a HEADERS frame
    pub fn encode_headers_frame(frame: &HeadersFrame) -> Result<Bytes> {
        let mut payload_len = frame.header_block.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        if frame.priority.is_some() {
            flags.set(FrameFlags::PRIORITY);
            payload_len += 4;
        }

        let mut buf = Self::with_header(FrameType::Headers, flags, frame.stream_id, payload_len)?;
        if let Some(priority) = frame.priority {
            put_u31(&mut buf, priority)?;
        }
        buf.put_slice(&frame.header_block);
        Ok(buf.freeze())
    }

    /// Encode a PRIORITY frame
    pub fn encode_priority_frame(frame: &PriorityFrame) -> Result<Bytes> {
        let mut buf = Self::with_header(FrameType::Priority, FrameFlags::empty(), frame.stream_id, 4)?;
        put_u31(&mut buf, frame.priority)?;
        Ok(buf.freeze())
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame) -> Result<Bytes> {
        let mut buf = Self::with_header(FrameType::RstStream, FrameFlags::empty(), frame.stream_id, 4)?;
        buf.put_u32(frame.error_code.as_u32());
        Ok(buf.freeze())
    }

    /// Encode a SETTINGS frame
    pub fn encode_settings_frame(frame: &SettingsFrame) -> Result<Bytes> {
        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let entries = if frame.ack {
            Vec::new()
        } else {
            frame.settings.entries()
        };

        let mut buf = Self::with_header(
            FrameType::Settings,
            flags,
            0,
            entries.len() * SETTINGS_ENTRY_SIZE,
        )?;
        for (param, value) in entries {
            let mut entry = [0u8; SETTINGS_ENTRY_SIZE];
            bits::set_u24(&mut entry, 1, param.as_u32())?;
            bits::set_u32(&mut entry, 4, value)?;
            buf.put_slice(&entry);
        }
        Ok(buf.freeze())
    }

    /// Encode a PUSH_PROMISE frame
    pub fn encode_push_promise_frame(frame: &PushPromiseFrame) -> Result<Bytes> {
        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let mut buf = Self::with_header(
            FrameType::PushPromise,
            flags,
            frame.stream_id,
            4 + frame.header_block.len(),
        )?;
        put_u31(&mut buf, frame.promised_stream_id)?;
        buf.put_slice(&frame.header_block);
        Ok(buf.freeze())
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(frame: &PingFrame) -> Result<Bytes> {
        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let mut buf = Self::with_header(FrameType::Ping, flags, 0, 8)?;
        buf.put_slice(&frame.data);
        Ok(buf.freeze())
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoAwayFrame) -> Result<Bytes> {
        let payload_len = 8 + frame.debug_data.len();
        let mut buf = Self::with_header(FrameType::GoAway, FrameFlags::empty(), 0, payload_len)?;
        put_u31(&mut buf, frame.last_stream_id)?;
        buf.put_u32(frame.error_code.as_u32());
        buf.put_slice(&frame.debug_data);
        Ok(buf.freeze())
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame) -> Result<Bytes> {
        let flags = if frame.end_flow_control {
            FrameFlags::from_u8(FrameFlags::END_FLOW_CONTROL)
        } else {
            FrameFlags::empty()
        };

        let mut buf = Self::with_header(FrameType::WindowUpdate, flags, frame.stream_id, 4)?;
        put_u31(&mut buf, frame.size_increment)?;
        Ok(buf.freeze())
    }

    /// Encode a CONTINUATION frame
    pub fn encode_continuation_frame(frame: &ContinuationFrame) -> Result<Bytes> {
        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let mut buf = Self::with_header(
            FrameType::Continuation,
            flags,
            frame.stream_id,
            frame.header_block.len(),
        )?;
        buf.put_slice(&frame.header_block);
        Ok(buf.freeze())
    }

    /// Encode a raw frame verbatim
    pub fn encode_raw_frame(frame: &RawFrame) -> Result<Bytes> {
        let header = Self::encode_header(frame.frame_type, frame.flags, frame.stream_id, frame.payload.len())?;
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());
        buf.put_slice(&header);
        buf.put_slice(&frame.payload);
        Ok(buf.freeze())
    }

    /// Serialize any frame into preamble + payload
    pub fn encode(frame: &Frame) -> Result<Bytes> {
        match frame {
            Frame::Data(f) => Self::encode_data_frame(f),
            Frame::Headers(f) => Self::encode_headers_frame(f),
            Frame::Priority(f) => Self::encode_priority_frame(f),
            Frame::RstStream(f) => Self::encode_rst_stream_frame(f),
            Frame::Settings(f) => Self::encode_settings_frame(f),
            Frame::PushPromise(f) => Self::encode_push_promise_frame(f),
            Frame::Ping(f) => Self::encode_ping_frame(f),
            Frame::GoAway(f) => Self::encode_goaway_frame(f),
            Frame::WindowUpdate(f) => Self::encode_window_update_frame(f),
            Frame::Continuation(f) => Self::encode_continuation_frame(f),
            Frame::Unknown(f) => Self::encode_raw_frame(f),
        }
    }

    /// Resolve a raw frame into its concrete type, validating the payload
    pub fn decode(raw: RawFrame) -> Result<Frame> {
        let Some(frame_type) = FrameType::from_u8(raw.frame_type) else {
            return Ok(Frame::Unknown(raw));
        };

        let RawFrame {
            flags,
            stream_id,
            payload,
            ..
        } = raw;

        match frame_type {
            FrameType::Data => {
                require_stream(frame_type, stream_id)?;
                Ok(Frame::Data(DataFrame::new(stream_id, payload, flags.is_end_stream())))
            }
            FrameType::Headers => {
                require_stream(frame_type, stream_id)?;
                let (priority, header_block) = if flags.is_priority() {
                    require_min_len(frame_type, &payload, 4)?;
                    (Some(bits::get_u31(&payload, 0)?), payload.slice(4..))
                } else {
                    (None, payload)
                };
                Ok(Frame::Headers(HeadersFrame {
                    stream_id,
                    header_block,
                    end_stream: flags.is_end_stream(),
                    end_headers: flags.is_end_headers(),
                    priority,
                }))
            }
            FrameType::Priority => {
                require_stream(frame_type, stream_id)?;
                require_len(frame_type, &payload, 4)?;
                Ok(Frame::Priority(PriorityFrame {
                    stream_id,
                    priority: bits::get_u31(&payload, 0)?,
                }))
            }
            FrameType::RstStream => {
                require_stream(frame_type, stream_id)?;
                require_len(frame_type, &payload, 4)?;
                Ok(Frame::RstStream(RstStreamFrame {
                    stream_id,
                    error_code: ErrorCode::from_wire(bits::get_u32(&payload, 0)?),
                }))
            }
            FrameType::Settings => {
                require_connection(frame_type, stream_id)?;
                if flags.is_ack() {
                    require_len(frame_type, &payload, 0)?;
                    return Ok(Frame::Settings(SettingsFrame::ack()));
                }
                if payload.len() % SETTINGS_ENTRY_SIZE != 0 {
                    return Err(Error::FrameSize(format!(
                        "SETTINGS payload of {} bytes is not a multiple of {}",
                        payload.len(),
                        SETTINGS_ENTRY_SIZE
                    )));
                }
                let mut settings = Settings::new();
                for offset in (0..payload.len()).step_by(SETTINGS_ENTRY_SIZE) {
                    let id = bits::get_u24(&payload, offset + 1)?;
                    let value = bits::get_u32(&payload, offset + 4)?;
                    settings.set(id, value);
                }
                Ok(Frame::Settings(SettingsFrame::new(settings)))
            }
            FrameType::PushPromise => {
                require_stream(frame_type, stream_id)?;
                require_min_len(frame_type, &payload, 4)?;
                Ok(Frame::PushPromise(PushPromiseFrame {
                    stream_id,
                    promised_stream_id: bits::get_u31(&payload, 0)?,
                    header_block: payload.slice(4..),
                    end_headers: flags.is_end_headers(),
                }))
            }
            FrameType::Ping => {
                require_connection(frame_type, stream_id)?;
                require_len(frame_type, &payload, 8)?;
                let mut data = [0u8; 8];
                data.copy_from_slice(&payload);
                Ok(Frame::Ping(PingFrame {
                    ack: flags.is_ack(),
                    data,
                }))
            }
            FrameType::GoAway => {
                require_connection(frame_type, stream_id)?;
                require_min_len(frame_type, &payload, 8)?;
                Ok(Frame::GoAway(GoAwayFrame {
                    last_stream_id: bits::get_u31(&payload, 0)?,
                    error_code: ErrorCode::from_wire(bits::get_u32(&payload, 4)?),
                    debug_data: payload.slice(8..),
                }))
            }
            FrameType::WindowUpdate => {
                require_len(frame_type, &payload, 4)?;
                Ok(Frame::WindowUpdate(WindowUpdateFrame {
                    stream_id,
                    size_increment: bits::get_u31(&payload, 0)?,
                    end_flow_control: flags.is_set(FrameFlags::END_FLOW_CONTROL),
                }))
            }
            FrameType::Continuation => {
                require_stream(frame_type, stream_id)?;
                Ok(Frame::Continuation(ContinuationFrame {
                    stream_id,
                    header_block: payload,
                    end_headers: flags.is_end_headers(),
                }))
            }
        }
    }

    /// Read one preamble + payload
    ///
    /// Returns `Ok(None)` when the reader ends cleanly before a new frame.
    pub fn read_raw_frame<R: Read>(reader: &mut R) -> Result<Option<RawFrame>> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        match read_full(reader, &mut header)? {
            0 => return Ok(None),
            FRAME_HEADER_SIZE => {}
            _ => return Err(Error::UnexpectedEof),
        }

        let (frame_type, flags, stream_id, payload_len) = Self::decode_header(&header)?;

        if payload_len > MAX_FRAME_PAYLOAD {
            return Err(Error::FrameTooLarge(payload_len));
        }

        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 && read_full(reader, &mut payload)? != payload_len {
            return Err(Error::UnexpectedEof);
        }

        Ok(Some(RawFrame::new(frame_type, flags, stream_id, Bytes::from(payload))))
    }

    /// Read and decode one frame
    pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Frame>> {
        match Self::read_raw_frame(reader)? {
            Some(raw) => Self::decode(raw).map(Some),
            None => Ok(None),
        }
    }
}

fn put_u31(buf: &mut BytesMut, value: u32) -> Result<()> {
    let mut field = [0u8; 4];
    bits::set_u31(&mut field, 0, value)?;
    buf.put_slice(&field);
    Ok(())
}

/// Fill `buf` until it is full or the reader ends; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(read)
}

fn require_stream(frame_type: FrameType, stream_id: StreamId) -> Result<()> {
    if stream_id == 0 {
        return Err(Error::Protocol(format!("{} frame on stream 0", frame_type.name())));
    }
    Ok(())
}

fn require_connection(frame_type: FrameType, stream_id: StreamId) -> Result<()> {
    if stream_id != 0 {
        return Err(Error::Protocol(format!(
            "{} frame must be on stream 0, got {}",
            frame_type.name(),
            stream_id
        )));
    }
    Ok(())
}

fn require_len(frame_type: FrameType, payload: &[u8], len: usize) -> Result<()> {
    if payload.len() != len {
        return Err(Error::FrameSize(format!(
            "{} payload must be {} bytes, got {}",
            frame_type.name(),
            len,
            payload.len()
        )));
    }
    Ok(())
}

fn require_min_len(frame_type: FrameType, payload: &[u8], len: usize) -> Result<()> {
    if payload.len() < len {
        return Err(Error::FrameSize(format!(
            "{} payload must be at least {} bytes, got {}",
            frame_type.name(),
            len,
            payload.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h2::settings::SettingsBuilder;
    use std::io::Cursor;

    fn decode_bytes(bytes: &[u8]) -> Result<Option<Frame>> {
        FrameCodec::read_frame(&mut Cursor::new(bytes))
    }

    #[test]
    fn test_encode_decode_header() {
        let flags = FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS);
        let header = FrameCodec::encode_header(FrameType::Headers.as_u8(), flags, 42, 1234).unwrap();
        let (decoded_type, decoded_flags, decoded_id, decoded_len) =
            FrameCodec::decode_header(&header).unwrap();

        assert_eq!(decoded_type, FrameType::Headers.as_u8());
        assert_eq!(decoded_flags, flags);
        assert_eq!(decoded_id, 42);
        assert_eq!(decoded_len, 1234);
    }

    #[test]
    fn test_header_rejects_oversized_length_and_id() {
        assert!(matches!(
            FrameCodec::encode_header(0, FrameFlags::empty(), 1, MAX_FRAME_PAYLOAD + 1),
            Err(Error::FrameTooLarge(_))
        ));
        assert!(FrameCodec::encode_header(0, FrameFlags::empty(), 0x8000_0000, 0).is_err());
    }

    #[test]
    fn test_encode_data_frame() {
        let frame = DataFrame::new(1, Bytes::from("Hello"), true);
        let encoded = FrameCodec::encode_data_frame(&frame).unwrap();

        assert_eq!(encoded[0..2], [0, 5]);
        assert_eq!(encoded[2], FrameType::Data.as_u8());
        assert_eq!(encoded[3], FrameFlags::END_STREAM);
        assert_eq!(&encoded[4..8], &[0, 0, 0, 1]);
        assert_eq!(&encoded[8..], b"Hello");
    }

    #[test]
    fn test_headers_frame_with_priority() {
        let frame = HeadersFrame::new(3, Bytes::from_static(b"\x82"), false, true).with_priority(6);
        let encoded = FrameCodec::encode_headers_frame(&frame).unwrap();
        assert_eq!(encoded[0..2], [0, 5]);
        assert_eq!(encoded[3], FrameFlags::END_HEADERS | FrameFlags::PRIORITY);

        let decoded = decode_bytes(&encoded).unwrap().unwrap();
        assert_eq!(decoded, Frame::Headers(frame));
    }

    #[test]
    fn test_encode_settings_frame() {
        let settings = SettingsBuilder::new()
            .max_concurrent_streams(100)
            .initial_window_size(65535)
            .build()
            .unwrap();

        let encoded = FrameCodec::encode_settings_frame(&SettingsFrame::new(settings.clone())).unwrap();

        assert_eq!(encoded[2], FrameType::Settings.as_u8());
        assert_eq!(&encoded[4..8], &[0, 0, 0, 0]);
        assert_eq!(encoded[0..2], [0, 16]);
        // reserved byte, then 24-bit id 4
        assert_eq!(&encoded[8..12], &[0, 0, 0, 4]);

        let decoded = decode_bytes(&encoded).unwrap().unwrap();
        assert_eq!(decoded, Frame::Settings(SettingsFrame::new(settings)));
    }

    #[test]
    fn test_encode_settings_ack() {
        let encoded = FrameCodec::encode_settings_frame(&SettingsFrame::ack()).unwrap();
        assert_eq!(encoded[0..2], [0, 0]);
        assert_eq!(encoded[3], FrameFlags::ACK);
    }

    #[test]
    fn test_settings_ack_with_payload_rejected() {
        let raw = RawFrame::new(
            FrameType::Settings.as_u8(),
            FrameFlags::from_u8(FrameFlags::ACK),
            0,
            Bytes::from_static(&[0; 8]),
        );
        assert!(matches!(FrameCodec::decode(raw), Err(Error::FrameSize(_))));
    }

    #[test]
    fn test_ping_roundtrip() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let encoded = FrameCodec::encode_ping_frame(&PingFrame::ack(data)).unwrap();
        assert_eq!(encoded[0..2], [0, 8]);
        assert_eq!(&encoded[8..16], &data);
        assert_eq!(
            decode_bytes(&encoded).unwrap().unwrap(),
            Frame::Ping(PingFrame::ack(data))
        );
    }

    #[test]
    fn test_window_update_end_flow_control() {
        let frame = WindowUpdateFrame::end_flow_control(5);
        let encoded = FrameCodec::encode_window_update_frame(&frame).unwrap();
        assert_eq!(encoded[3], FrameFlags::END_FLOW_CONTROL);
        assert_eq!(decode_bytes(&encoded).unwrap().unwrap(), Frame::WindowUpdate(frame));
    }

    #[test]
    fn test_goaway_and_rst_roundtrip() {
        let goaway = GoAwayFrame::new(7, ErrorCode::ProtocolError, Bytes::from("bye"));
        let encoded = FrameCodec::encode_goaway_frame(&goaway).unwrap();
        assert_eq!(decode_bytes(&encoded).unwrap().unwrap(), Frame::GoAway(goaway));

        let rst = RstStreamFrame {
            stream_id: 9,
            error_code: ErrorCode::Cancel,
        };
        let encoded = FrameCodec::encode_rst_stream_frame(&rst).unwrap();
        assert_eq!(decode_bytes(&encoded).unwrap().unwrap(), Frame::RstStream(rst));
    }

    #[test]
    fn test_push_promise_roundtrip() {
        let frame = PushPromiseFrame {
            stream_id: 1,
            promised_stream_id: 2,
            header_block: Bytes::from_static(b"\x41\x05/push"),
            end_headers: true,
        };
        let encoded = FrameCodec::encode_push_promise_frame(&frame).unwrap();
        assert_eq!(decode_bytes(&encoded).unwrap().unwrap(), Frame::PushPromise(frame));
    }

    #[test]
    fn test_unknown_frame_type_is_not_fatal() {
        let raw = RawFrame::new(0x42, FrameFlags::empty(), 3, Bytes::from_static(b"abc"));
        let encoded = FrameCodec::encode_raw_frame(&raw).unwrap();
        assert_eq!(decode_bytes(&encoded).unwrap().unwrap(), Frame::Unknown(raw));
    }

    #[test]
    fn test_read_clean_eof() {
        assert!(decode_bytes(&[]).unwrap().is_none());
    }

    #[test]
    fn test_read_truncated_frame() {
        let encoded = FrameCodec::encode_data_frame(&DataFrame::new(1, Bytes::from("Hello"), false)).unwrap();
        assert!(matches!(decode_bytes(&encoded[..4]), Err(Error::UnexpectedEof)));
        assert!(matches!(decode_bytes(&encoded[..10]), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn test_read_oversized_frame() {
        let mut bytes = vec![0xFF, 0xFF, 0x0, 0x0, 0, 0, 0, 1];
        bytes.extend(std::iter::repeat(0).take(0xFFFF));
        assert!(matches!(decode_bytes(&bytes), Err(Error::FrameTooLarge(0xFFFF))));
    }

    #[test]
    fn test_stream_id_rules() {
        let headers_on_zero = RawFrame::new(FrameType::Headers.as_u8(), FrameFlags::empty(), 0, Bytes::new());
        assert!(matches!(FrameCodec::decode(headers_on_zero), Err(Error::Protocol(_))));

        let ping_on_stream = RawFrame::new(FrameType::Ping.as_u8(), FrameFlags::empty(), 1, Bytes::from_static(&[0; 8]));
        assert!(matches!(FrameCodec::decode(ping_on_stream), Err(Error::Protocol(_))));

        let short_rst = RawFrame::new(FrameType::RstStream.as_u8(), FrameFlags::empty(), 1, Bytes::from_static(&[0; 3]));
        assert!(matches!(FrameCodec::decode(short_rst), Err(Error::FrameSize(_))));
    }

    #[test]
    fn test_reserved_bit_ignored() {
        let bytes = [0, 0, FrameType::Data.as_u8(), 0, 0x80, 0, 0, 3];
        let frame = decode_bytes(&bytes).unwrap().unwrap();
        assert_eq!(frame.stream_id(), 3);
    }
}
