//! Multiplexed HTTP/2-family protocol engine
//!
//! This module implements the draft-era binary framing layer: an 8-byte frame
//! preamble with a 16-bit length, stream multiplexing over a single transport,
//! header compression with a reference set, per-stream and per-connection
//! flow control, and a priority-aware outbound write queue.
//!
//! # Architecture
//!
//! A [`Session`] owns one transport and runs two pump threads:
//!
//! - the **inbound pump** reads frames with [`FrameCodec`] and dispatches
//!   them against the session state (stream table, header decoder, flow
//!   windows, pending header sequences);
//! - the **outbound pump** drains the [`write_queue::WriteQueue`], writing
//!   control frames first and data frames by stream priority.
//!
//! Applications talk to the session through its methods (downward) and a
//! channel of [`SessionEvent`]s (upward).
//!
//! # Example
//!
//! ```no_run
//! use h2mux::h2::{HeaderField, Session, SessionEvent, SessionOptions};
//! use h2mux::transport::TcpTransport;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = TcpTransport::connect("127.0.0.1:8080", Duration::from_secs(5))?;
//! let session = Session::client(transport, SessionOptions::default())?;
//!
//! let stream_id = session.send_request(
//!     vec![
//!         HeaderField::new(":method", "GET"),
//!         HeaderField::new(":path", "/"),
//!     ],
//!     true,
//! )?;
//!
//! for event in session.events().iter() {
//!     match event {
//!         SessionEvent::Headers { stream_id: id, headers, .. } if id == stream_id => {
//!             println!("response headers: {:?}", headers);
//!         }
//!         SessionEvent::StreamClosed { stream_id: id } if id == stream_id => break,
//!         _ => {}
//!     }
//! }
//! session.close(h2mux::h2::ErrorCode::NoError);
//! # Ok(())
//! # }
//! ```

pub mod active_streams;
pub mod bits;
pub mod codec;
pub mod compression;
pub mod error;
pub mod events;
pub mod flow_control;
pub mod frames;
pub mod headers_sequence;
pub mod options;
pub mod session;
pub mod settings;
pub mod stream;
pub mod write_queue;

pub use codec::FrameCodec;
pub use compression::{Decoder, Encoder, HeaderField};
pub use error::{Error, ErrorClass, ErrorCode, Result};
pub use events::SessionEvent;
pub use frames::{Frame, FrameFlags, FrameType, RawFrame};
pub use options::{SessionBuilder, SessionOptions};
pub use session::{Role, Session};
pub use settings::{Settings, SettingsBuilder};
pub use stream::{StreamId, StreamState};

/// Connection preface written by the client before any frame
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Largest legal window (2^31 - 1)
pub const MAX_WINDOW_SIZE: u32 = 0x7FFF_FFFF;

/// Largest frame payload (2^14 - 1)
pub const MAX_FRAME_PAYLOAD: usize = 16383;

/// Default header table budget (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: usize = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;

/// Priority given to streams that never asked for one
pub const DEFAULT_PRIORITY: u8 = 4;

/// Least urgent priority; 0 is the most urgent
pub const LOWEST_PRIORITY: u8 = 7;
