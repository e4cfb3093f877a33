//! Frame types
//!
//! Every frame starts with an 8-byte preamble:
//!
//! ```text
//!  0                   1                   2                   3
//! +-------------------------------+---------------+---------------+
//! |         Length (16)           |   Type (8)    |   Flags (8)   |
//! +-+-----------------------------+---------------+---------------+
//! |R|                 Stream Identifier (31)                      |
//! +-+-------------------------------------------------------------+
//! ```
//!
//! followed by `Length` bytes of type-specific payload.

use super::error::ErrorCode;
use super::settings::Settings;
use super::stream::StreamId;
use bytes::Bytes;
use std::fmt;

/// Frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// DATA (0x0): stream payload
    Data = 0x0,
    /// HEADERS (0x1): opens a stream or carries response headers and trailers
    Headers = 0x1,
    /// PRIORITY frame (0x2) - Changes the sender-advised priority of a stream
    Priority = 0x2,
    /// RST_STREAM (0x3): abort one stream
    RstStream = 0x3,
    /// SETTINGS (0x4): id/value parameters, or an ACK
    Settings = 0x4,
    /// PUSH_PROMISE (0x5): server reserves a stream for a pushed response
    PushPromise = 0x5,
    /// PING (0x6): liveness probe, echoed back with ACK
    Ping = 0x6,
    /// GOAWAY (0x7): connection shutdown notice
    GoAway = 0x7,
    /// WINDOW_UPDATE (0x8): window credit, or END_FLOW_CONTROL
    WindowUpdate = 0x8,
    /// CONTINUATION (0x9): further fragments of a header block
    Continuation = 0x9,
}

impl FrameType {
    /// Wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// `None` for types this engine does not know
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::GoAway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::GoAway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// Frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    /// END_STREAM flag (0x1) - DATA and HEADERS
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_FLOW_CONTROL flag (0x1) - WINDOW_UPDATE
    pub const END_FLOW_CONTROL: u8 = 0x1;

    /// END_HEADERS flag (0x4) - HEADERS, PUSH_PROMISE and CONTINUATION
    pub const END_HEADERS: u8 = 0x4;

    /// PRIORITY flag (0x8) - HEADERS
    pub const PRIORITY: u8 = 0x8;

    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    /// SETTINGS or PING acknowledgement
    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// Undecoded frame: preamble fields plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame type byte as read from the wire
    pub frame_type: u8,
    /// Frame flags
    pub flags: FrameFlags,
    /// Stream ID
    pub stream_id: StreamId,
    /// Frame payload
    pub payload: Bytes,
}

impl RawFrame {
    /// Create a new raw frame
    pub fn new(frame_type: u8, flags: FrameFlags, stream_id: StreamId, payload: Bytes) -> Self {
        RawFrame {
            frame_type,
            flags,
            stream_id,
            payload,
        }
    }

    /// Get payload size
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// DATA frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: StreamId,
    pub data: Bytes,
    pub end_stream: bool,
}

impl DataFrame {
    pub fn new(stream_id: StreamId, data: Bytes, end_stream: bool) -> Self {
        DataFrame {
            stream_id,
            data,
            end_stream,
        }
    }
}

/// HEADERS frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: StreamId,
    /// Header block fragment
    pub header_block: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
    /// 31-bit priority, present when the PRIORITY flag is set
    pub priority: Option<u32>,
}

impl HeadersFrame {
    /// HEADERS without a priority field
    pub fn new(stream_id: StreamId, header_block: Bytes, end_stream: bool, end_headers: bool) -> Self {
        HeadersFrame {
            stream_id,
            header_block,
            end_stream,
            end_headers,
            priority: None,
        }
    }

    /// Set priority
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// PRIORITY frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFrame {
    pub stream_id: StreamId,
    pub priority: u32,
}

/// RST_STREAM frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub error_code: ErrorCode,
}

/// SETTINGS frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub ack: bool,
    pub settings: Settings,
}

impl SettingsFrame {
    pub fn new(settings: Settings) -> Self {
        SettingsFrame {
            ack: false,
            settings,
        }
    }

    /// Empty SETTINGS with the ACK flag
    pub fn ack() -> Self {
        SettingsFrame {
            ack: true,
            settings: Settings::default(),
        }
    }
}

/// PUSH_PROMISE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromiseFrame {
    /// Stream the promise is associated with
    pub stream_id: StreamId,
    pub promised_stream_id: StreamId,
    pub header_block: Bytes,
    pub end_headers: bool,
}

/// PING frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub ack: bool,
    /// Opaque data (8 bytes)
    pub data: [u8; 8],
}

impl PingFrame {
    pub fn new(data: [u8; 8]) -> Self {
        PingFrame { ack: false, data }
    }

    /// Reply to a received PING
    pub fn ack(data: [u8; 8]) -> Self {
        PingFrame { ack: true, data }
    }
}

/// GOAWAY frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayFrame {
    /// Highest stream id the sender processed
    pub last_stream_id: StreamId,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
}

impl GoAwayFrame {
    pub fn new(last_stream_id: StreamId, error_code: ErrorCode, debug_data: Bytes) -> Self {
        GoAwayFrame {
            last_stream_id,
            error_code,
            debug_data,
        }
    }
}

/// WINDOW_UPDATE frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    /// 0 for connection-level frames
    pub stream_id: StreamId,
    pub size_increment: u32,
    /// Flow control is switched off for the stream (or the session on id 0)
    pub end_flow_control: bool,
}

impl WindowUpdateFrame {
    pub fn new(stream_id: StreamId, size_increment: u32) -> Self {
        WindowUpdateFrame {
            stream_id,
            size_increment,
            end_flow_control: false,
        }
    }

    /// Create a WINDOW_UPDATE that ends flow control
    pub fn end_flow_control(stream_id: StreamId) -> Self {
        WindowUpdateFrame {
            stream_id,
            size_increment: 0,
            end_flow_control: true,
        }
    }
}

/// CONTINUATION frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationFrame {
    pub stream_id: StreamId,
    pub header_block: Bytes,
    pub end_headers: bool,
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Headers(HeadersFrame),
    Priority(PriorityFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    PushPromise(PushPromiseFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    WindowUpdate(WindowUpdateFrame),
    Continuation(ContinuationFrame),
    /// Frame of a type this engine does not know; ignored by the session
    Unknown(RawFrame),
}

impl Frame {
    /// Frame type, `None` for unknown frames
    pub fn frame_type(&self) -> Option<FrameType> {
        match self {
            Frame::Data(_) => Some(FrameType::Data),
            Frame::Headers(_) => Some(FrameType::Headers),
            Frame::Priority(_) => Some(FrameType::Priority),
            Frame::RstStream(_) => Some(FrameType::RstStream),
            Frame::Settings(_) => Some(FrameType::Settings),
            Frame::PushPromise(_) => Some(FrameType::PushPromise),
            Frame::Ping(_) => Some(FrameType::Ping),
            Frame::GoAway(_) => Some(FrameType::GoAway),
            Frame::WindowUpdate(_) => Some(FrameType::WindowUpdate),
            Frame::Continuation(_) => Some(FrameType::Continuation),
            Frame::Unknown(_) => None,
        }
    }

    /// Stream the frame belongs to (0 for connection-level frames)
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data(f) => f.stream_id,
            Frame::Headers(f) => f.stream_id,
            Frame::Priority(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::PushPromise(f) => f.stream_id,
            Frame::WindowUpdate(f) => f.stream_id,
            Frame::Continuation(f) => f.stream_id,
            Frame::Unknown(f) => f.stream_id,
            Frame::Settings(_) | Frame::Ping(_) | Frame::GoAway(_) => 0,
        }
    }

    /// Frame type name for logging
    pub fn name(&self) -> &'static str {
        self.frame_type().map_or("UNKNOWN", |t| t.name())
    }
}
