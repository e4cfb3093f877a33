//! Session error types
//!
//! This module defines the error type shared by every layer of the engine,
//! the wire status codes carried by RST_STREAM and GOAWAY, and the
//! classification used by the session to decide how an error is answered.

use super::stream::StreamId;
use std::fmt;

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation that tears the connection down
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Implementation fault
    #[error("Internal error: {0}")]
    Internal(String),

    /// Connection-level flow control violation
    #[error("Flow control error: {0}")]
    FlowControl(String),

    /// Stream-level flow control violation
    #[error("Flow control error on stream {0}")]
    StreamFlowControl(StreamId),

    /// Settings were not acknowledged in time
    #[error("Settings timeout")]
    SettingsTimeout,

    /// Ping was not acknowledged in time
    #[error("Ping timeout")]
    PingTimeout,

    /// Frame arrived for a stream that is closed or was never opened
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Frame or write on a stream whose relevant half is closed
    #[error("Stream closed: {0}")]
    StreamClosed(StreamId),

    /// Payload length does not fit the frame type or the size limit
    #[error("Frame size error: {0}")]
    FrameSize(String),

    /// Declared payload length above the maximum frame payload
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Remote opened a stream past the local concurrency bound
    #[error("Refused stream: {0}")]
    RefusedStream(StreamId),

    /// Header block could not be decoded; compression state is lost
    #[error("Compression error: {0}")]
    Compression(String),

    /// Header with a missing name
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Local side would exceed the peer's concurrency bound
    #[error("Too many concurrent streams")]
    TooManyStreams,

    /// Stream id maps onto an occupied pool slot
    #[error("Stream id collision: {0}")]
    StreamIdCollision(StreamId),

    /// Invalid stream id for the requested operation
    #[error("Invalid stream ID: {0}")]
    InvalidStreamId(StreamId),

    /// Invalid settings value
    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// Invalid session options
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Bit-field value does not fit its width
    #[error("Value {value} does not fit in {bits} bits")]
    FieldOutOfRange { value: u64, bits: u32 },

    /// Bit-field access past the end of the buffer
    #[error("Buffer too short: need {needed} bytes, have {available}")]
    BufferTooShort { needed: usize, available: usize },

    /// Missing or malformed connection preface
    #[error("Missing connection preface")]
    MissingPreface,

    /// Unexpected end of the transport inside a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Operation not valid for this side of the connection
    #[error("Wrong role: {0}")]
    WrongRole(&'static str),

    /// Session closed
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Classify this error for the dispatch loop and callers
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Io(_) | Error::UnexpectedEof => ErrorClass::Transport,
            Error::Protocol(_) | Error::MissingPreface | Error::InvalidStreamId(_) => {
                ErrorClass::Connection(ErrorCode::ProtocolError)
            }
            Error::InvalidSettings(_) => ErrorClass::Connection(ErrorCode::ProtocolError),
            Error::Internal(_) => ErrorClass::Connection(ErrorCode::InternalError),
            Error::FlowControl(_) => ErrorClass::Connection(ErrorCode::FlowControlError),
            Error::FrameSize(_) | Error::FrameTooLarge(_) => {
                ErrorClass::Connection(ErrorCode::FrameTooLarge)
            }
            Error::Compression(_) => ErrorClass::Connection(ErrorCode::CompressionError),
            Error::StreamFlowControl(id) => ErrorClass::Stream(*id, ErrorCode::FlowControlError),
            Error::StreamNotFound(id) | Error::StreamClosed(id) => {
                ErrorClass::Stream(*id, ErrorCode::StreamClosed)
            }
            Error::RefusedStream(id) => ErrorClass::Stream(*id, ErrorCode::RefusedStream),
            Error::TooManyStreams | Error::StreamIdCollision(_) => ErrorClass::ResourceLimit,
            Error::SettingsTimeout => ErrorClass::Timeout(ErrorCode::SettingsTimeout),
            Error::PingTimeout => ErrorClass::Timeout(ErrorCode::InternalError),
            Error::InvalidHeader(_)
            | Error::InvalidOptions(_)
            | Error::FieldOutOfRange { .. }
            | Error::BufferTooShort { .. }
            | Error::WrongRole(_)
            | Error::ConnectionClosed => ErrorClass::Usage,
        }
    }
}

/// How an error is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// GOAWAY with the code, then full teardown
    Connection(ErrorCode),
    /// RST_STREAM with the code on that stream only
    Stream(StreamId, ErrorCode),
    /// Connection lost; teardown without GOAWAY
    Transport,
    /// Request rejected; the caller decides whether to escalate
    ResourceLimit,
    /// Peer unresponsive; GOAWAY with the code, then teardown
    Timeout(ErrorCode),
    /// Invalid use of the local API
    Usage,
}

/// Status codes carried by RST_STREAM and GOAWAY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown
    NoError = 0x0,
    /// Protocol error detected
    ProtocolError = 0x1,
    /// Implementation fault
    InternalError = 0x2,
    /// Flow-control limits exceeded
    FlowControlError = 0x3,
    /// Settings not acknowledged
    SettingsTimeout = 0x4,
    /// Frame received for closed stream
    StreamClosed = 0x5,
    /// Frame larger than allowed
    FrameTooLarge = 0x6,
    /// Stream not processed
    RefusedStream = 0x7,
    /// Stream cancelled
    Cancel = 0x8,
    /// Compression state not updated
    CompressionError = 0x9,
    /// TCP connection error for CONNECT method
    ConnectError = 0xa,
    /// Processing capacity exceeded
    EnhanceYourCalm = 0xb,
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create error code from u32
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameTooLarge),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            _ => None,
        }
    }

    /// Lenient conversion for codes read off the wire
    pub fn from_wire(code: u32) -> Self {
        Self::from_u32(code).unwrap_or(ErrorCode::InternalError)
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameTooLarge => "FRAME_TOO_LARGE",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ErrorCode::NoError.as_u32(), 0x0);
        assert_eq!(ErrorCode::ProtocolError.as_u32(), 0x1);
        assert_eq!(ErrorCode::EnhanceYourCalm.as_u32(), 0xb);

        assert_eq!(ErrorCode::from_u32(0x0), Some(ErrorCode::NoError));
        assert_eq!(ErrorCode::from_u32(0x9), Some(ErrorCode::CompressionError));
        assert_eq!(ErrorCode::from_u32(0xff), None);
        assert_eq!(ErrorCode::from_wire(0xff), ErrorCode::InternalError);
    }

    #[test]
    fn test_error_code_name() {
        assert_eq!(ErrorCode::NoError.name(), "NO_ERROR");
        assert_eq!(ErrorCode::FrameTooLarge.name(), "FRAME_TOO_LARGE");
        assert_eq!(ErrorCode::FlowControlError.to_string(), "FLOW_CONTROL_ERROR (0x3)");
    }

    #[test]
    fn test_error_display() {
        let err = Error::Protocol("test error".to_string());
        assert_eq!(err.to_string(), "Protocol error: test error");

        let err = Error::StreamNotFound(42);
        assert_eq!(err.to_string(), "Stream not found: 42");
    }

    #[test]
    fn test_error_class() {
        assert_eq!(
            Error::Protocol("x".into()).class(),
            ErrorClass::Connection(ErrorCode::ProtocolError)
        );
        assert_eq!(
            Error::Compression("x".into()).class(),
            ErrorClass::Connection(ErrorCode::CompressionError)
        );
        assert_eq!(
            Error::StreamNotFound(7).class(),
            ErrorClass::Stream(7, ErrorCode::StreamClosed)
        );
        assert_eq!(Error::UnexpectedEof.class(), ErrorClass::Transport);
        assert_eq!(Error::TooManyStreams.class(), ErrorClass::ResourceLimit);
        assert_eq!(
            Error::SettingsTimeout.class(),
            ErrorClass::Timeout(ErrorCode::SettingsTimeout)
        );
    }
}
