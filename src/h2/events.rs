//! Notifications delivered from a session to the application

use super::compression::HeaderField;
use super::error::ErrorCode;
use super::stream::StreamId;
use bytes::Bytes;

/// Something the session wants the application to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A complete header block arrived on a stream
    Headers {
        stream_id: StreamId,
        headers: Vec<HeaderField>,
        /// Stream priority at the time the headers arrived
        priority: u8,
        end_stream: bool,
    },
    /// DATA payload arrived on a stream
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    /// Peer reserved `promised_stream_id` for a pushed response
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: Vec<HeaderField>,
    },
    /// Stream was reset, by the peer (`remote`) or locally
    StreamReset {
        stream_id: StreamId,
        error_code: ErrorCode,
        remote: bool,
    },
    /// Both directions finished and the stream left the table
    StreamClosed { stream_id: StreamId },
    /// Peer is shutting the connection down
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    /// Peer acknowledged our SETTINGS
    SettingsAcked,
    /// Session is torn down; always the last event
    Disposed { status: ErrorCode },
}

impl SessionEvent {
    /// Stream the event concerns, if any
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            SessionEvent::Headers { stream_id, .. }
            | SessionEvent::Data { stream_id, .. }
            | SessionEvent::PushPromise { stream_id, .. }
            | SessionEvent::StreamReset { stream_id, .. }
            | SessionEvent::StreamClosed { stream_id } => Some(*stream_id),
            SessionEvent::GoAway { .. } | SessionEvent::SettingsAcked | SessionEvent::Disposed { .. } => {
                None
            }
        }
    }
}
