//! Session orchestration
//!
//! A [`Session`] drives one connection. It owns the transport through three
//! handles (reader, writer, closer), runs an inbound and an outbound pump
//! thread, and exposes the local operations as methods. Everything the peer
//! does comes back as [`SessionEvent`]s on a channel.
//!
//! Locking: the header encoder has its own mutex and is always taken before
//! the state lock, and the write queue is only touched under the state lock
//! or by the outbound pump. Compressing a block and queueing it happen in one
//! critical section, so header blocks reach the wire in compression order.

mod state;
mod pumps;

use self::state::SessionCore;
use super::codec::FrameCodec;
use super::compression::table::TableKind;
use super::compression::{find_header, Encoder, HeaderField};
use super::error::{Error, ErrorClass, ErrorCode, Result};
use super::events::SessionEvent;
use super::frames::SettingsFrame;
use super::options::SessionOptions;
use super::settings::Settings;
use super::stream::StreamId;
use super::write_queue::WriteQueue;
use super::{CONNECTION_PREFACE, CONNECTION_STREAM_ID, DEFAULT_PRIORITY};
use crate::transport::Transport;
use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Which end of the connection a session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// How a session is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    /// Local close or connection error: GOAWAY, then drain the queue
    GoAway(ErrorCode),
    /// Peer sent GOAWAY: drain without answering it
    Remote(ErrorCode),
    /// Transport is gone: nothing more can be written
    Lost(ErrorCode),
}

/// State shared by the session handle and its threads
pub(crate) struct Shared {
    role: Role,
    options: SessionOptions,
    encoder: Mutex<Encoder>,
    core: Mutex<SessionCore>,
    queue: Arc<WriteQueue>,
    events: Sender<SessionEvent>,
    closer: Mutex<Box<dyn Transport>>,
    closing: AtomicBool,
    disposed: Mutex<bool>,
    disposed_cv: Condvar,
    /// Disconnects when the outbound pump exits
    writer_done: Receiver<()>,
    next_ping: AtomicU64,
}

impl Shared {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Answer an error according to its class
    pub(crate) fn fail(&self, err: Error) {
        match err.class() {
            ErrorClass::Connection(code) => {
                warn!(role = %self.role, error = %err, code = %code, "connection error");
                self.dispose(Teardown::GoAway(code));
            }
            ErrorClass::Stream(stream_id, code) => {
                debug!(stream_id, error = %err, code = %code, "stream error");
                if let Err(e) = self.core.lock().send_reset(stream_id, code) {
                    debug!(stream_id, error = %e, "could not reset stream");
                }
            }
            ErrorClass::Transport => {
                if !self.is_closing() {
                    debug!(role = %self.role, error = %err, "transport failed");
                }
                self.dispose(Teardown::Lost(ErrorCode::InternalError));
            }
            ErrorClass::ResourceLimit => {
                warn!(role = %self.role, error = %err, "resource limit reached");
            }
            ErrorClass::Timeout(code) => {
                warn!(role = %self.role, error = %err, "peer unresponsive");
                self.dispose(Teardown::GoAway(code));
            }
            ErrorClass::Usage => {
                error!(role = %self.role, error = %err, "unexpected error inside session");
                self.dispose(Teardown::GoAway(ErrorCode::InternalError));
            }
        }
    }

    /// Tear the session down; only the first call does anything
    pub(crate) fn dispose(&self, teardown: Teardown) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        let (status, send_frames, send_goaway) = match teardown {
            Teardown::GoAway(code) => (code, true, true),
            Teardown::Remote(code) => (code, true, false),
            Teardown::Lost(code) => (code, false, false),
        };
        info!(role = %self.role, status = %status, "closing session");

        self.core.lock().shutdown(status, send_frames, send_goaway);
        if send_frames {
            self.queue.close();
            // bounded: a peer that stops reading must not hold us forever
            match self.writer_done.recv_timeout(self.options.settings_timeout) {
                Err(RecvTimeoutError::Timeout) => warn!("write queue did not drain before close"),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            }
        } else {
            self.queue.abort();
        }
        self.encoder.lock().dispose();

        if let Err(e) = self.closer.lock().close() {
            debug!(error = %e, "transport close failed");
        }
        let _ = self.events.send(SessionEvent::Disposed { status });

        *self.disposed.lock() = true;
        self.disposed_cv.notify_all();
    }
}

/// A multiplexed connection
///
/// Dropping the session closes it with `NO_ERROR`.
pub struct Session {
    shared: Arc<Shared>,
    events: Receiver<SessionEvent>,
}

impl Session {
    /// Start a client session; the preface and SETTINGS go out immediately
    pub fn client<T: Transport>(transport: T, options: SessionOptions) -> Result<Self> {
        Self::start(Role::Client, transport, options)
    }

    /// Start a server session; the peer's preface is verified first
    pub fn server<T: Transport>(transport: T, options: SessionOptions) -> Result<Self> {
        Self::start(Role::Server, transport, options)
    }

    fn start<T: Transport>(role: Role, transport: T, options: SessionOptions) -> Result<Self> {
        options.validate()?;
        let reader = transport.try_clone()?;
        let writer = transport.try_clone()?;

        let (event_tx, event_rx) = unbounded();
        let (done_tx, done_rx) = bounded::<()>(0);
        let (ack_tx, ack_rx) = bounded(1);
        let queue = Arc::new(WriteQueue::new());

        let encode_kind = match role {
            Role::Client => TableKind::Request,
            Role::Server => TableKind::Response,
        };
        let settings_ack = options.use_handshake.then_some(ack_tx);
        let core = SessionCore::new(role, &options, Arc::clone(&queue), event_tx.clone(), settings_ack);

        if options.use_handshake {
            if role == Role::Client {
                queue.push_control(Bytes::from_static(CONNECTION_PREFACE), "PREFACE", CONNECTION_STREAM_ID)?;
            }
            let settings = FrameCodec::encode_settings_frame(&SettingsFrame::new(options.local_settings()))?;
            queue.push_control(settings, "SETTINGS", CONNECTION_STREAM_ID)?;
        }

        let shared = Arc::new(Shared {
            role,
            encoder: Mutex::new(Encoder::new(encode_kind, options.header_table_size)),
            core: Mutex::new(core),
            queue,
            events: event_tx,
            closer: Mutex::new(Box::new(transport)),
            closing: AtomicBool::new(false),
            disposed: Mutex::new(false),
            disposed_cv: Condvar::new(),
            writer_done: done_rx,
            next_ping: AtomicU64::new(1),
            options,
        });

        let session = Session {
            shared: Arc::clone(&shared),
            events: event_rx,
        };

        let outbound = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("h2-{}-out", role))
                .spawn(move || pumps::outbound(shared, writer, done_tx))
        };
        if let Err(e) = outbound {
            shared.dispose(Teardown::Lost(ErrorCode::InternalError));
            return Err(e.into());
        }

        let inbound = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("h2-{}-in", role))
                .spawn(move || pumps::inbound(shared, reader))
        };
        if let Err(e) = inbound {
            shared.dispose(Teardown::Lost(ErrorCode::InternalError));
            return Err(e.into());
        }

        if shared.options.use_handshake {
            let watchdog = {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("h2-{}-settings", role))
                    .spawn(move || pumps::settings_watchdog(shared, ack_rx))
            };
            if let Err(e) = watchdog {
                shared.dispose(Teardown::Lost(ErrorCode::InternalError));
                return Err(e.into());
            }
        }

        info!(role = %role, "session started");
        Ok(session)
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Receiver for session events
    ///
    /// Clones share one queue: each event goes to exactly one receiver.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events.clone()
    }

    /// Open a request stream at the default priority
    pub fn send_request(&self, headers: Vec<HeaderField>, end_stream: bool) -> Result<StreamId> {
        self.open_stream(headers, DEFAULT_PRIORITY, end_stream)
    }

    /// Open a stream by sending its first header block
    ///
    /// Fails with `Error::Protocol` if `:path` names a resource the peer has
    /// promised to push and the pushed stream is still open.
    pub fn open_stream(&self, headers: Vec<HeaderField>, priority: u8, end_stream: bool) -> Result<StreamId> {
        if self.shared.role != Role::Client {
            return Err(Error::WrongRole("servers open streams with push_promise"));
        }
        check_headers(&headers)?;

        let mut encoder = self.shared.encoder.lock();
        let mut core = self.shared.core.lock();
        if let Some(path) = find_header(&headers, ":path") {
            if core.is_promised(path) {
                return Err(Error::Protocol(format!(
                    "{} is already promised by the peer",
                    path
                )));
            }
        }

        let id = core.reserve_local_stream(priority)?;
        let block = match encoder.compress(&headers) {
            Ok(block) => block,
            Err(e) => {
                core.abandon_local_stream(id);
                return Err(e);
            }
        };
        core.open_local_stream(id, block, end_stream)?;
        debug!(stream_id = id, end_stream, "opened stream");
        Ok(id)
    }

    /// Send a header block on an open stream (responses, trailers)
    ///
    /// DATA already queued on the stream is written first.
    pub fn send_headers(&self, stream_id: StreamId, headers: Vec<HeaderField>, end_stream: bool) -> Result<()> {
        check_headers(&headers)?;
        if self.shared.core.lock().has_queued_data(stream_id) {
            self.flush()?;
        }

        let mut encoder = self.shared.encoder.lock();
        let mut core = self.shared.core.lock();
        core.prepare_headers(stream_id, end_stream)?;
        let block = encoder.compress(&headers)?;
        core.finish_headers(stream_id, block, end_stream)
    }

    /// Send DATA; what the windows do not allow yet is queued
    pub fn send_data(&self, stream_id: StreamId, data: impl Into<Bytes>, end_stream: bool) -> Result<()> {
        self.shared.core.lock().send_data(stream_id, data.into(), end_stream)
    }

    /// RST_STREAM a stream and drop whatever it still had to send
    pub fn reset_stream(&self, stream_id: StreamId, error_code: ErrorCode) -> Result<()> {
        self.shared.core.lock().reset_stream(stream_id, error_code)
    }

    /// Promise a pushed response on `associated`; returns the reserved stream
    ///
    /// The response follows with [`send_headers`](Self::send_headers) and
    /// [`send_data`](Self::send_data) on the returned id.
    pub fn push_promise(&self, associated: StreamId, headers: Vec<HeaderField>) -> Result<StreamId> {
        if self.shared.role != Role::Server {
            return Err(Error::WrongRole("only servers push"));
        }
        check_headers(&headers)?;

        let mut encoder = self.shared.encoder.lock();
        let mut core = self.shared.core.lock();
        let promised = core.reserve_push(associated, find_header(&headers, ":path"))?;
        let block = match encoder.compress(&headers) {
            Ok(block) => block,
            Err(e) => {
                core.abandon_local_stream(promised);
                return Err(e);
            }
        };
        core.promise_stream(associated, promised, block)?;
        debug!(stream_id = associated, promised_stream_id = promised, "push promised");
        Ok(promised)
    }

    /// Change a stream's priority (0 most urgent, 7 least)
    pub fn set_stream_priority(&self, stream_id: StreamId, priority: u8) -> Result<()> {
        self.shared.core.lock().set_stream_priority(stream_id, priority)
    }

    /// Stop flow control on one stream, in both directions
    pub fn disable_stream_flow_control(&self, stream_id: StreamId) -> Result<()> {
        self.shared.core.lock().disable_stream_flow_control(stream_id)
    }

    /// Measure a round-trip
    ///
    /// If the peer does not answer within the ping timeout the session is
    /// closed with `INTERNAL_ERROR`.
    pub fn ping(&self) -> Result<Duration> {
        let data = self.shared.next_ping.fetch_add(1, Ordering::Relaxed).to_be_bytes();
        let (done_tx, done_rx) = bounded(1);
        let started = Instant::now();
        self.shared.core.lock().start_ping(data, done_tx)?;

        match done_rx.recv_timeout(self.shared.options.ping_timeout) {
            Ok(()) => Ok(started.elapsed()),
            Err(RecvTimeoutError::Timeout) => {
                self.shared.core.lock().cancel_ping(&data);
                self.shared.fail(Error::PingTimeout);
                Err(Error::PingTimeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionClosed),
        }
    }

    /// Block until everything queued so far has been written
    pub fn flush(&self) -> Result<()> {
        self.shared
            .queue
            .flush_marker()?
            .recv()
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Close the session
    ///
    /// Resets open streams, sends GOAWAY with `status` (unless the peer sent
    /// one), drains the write queue, and closes the transport. Only the first
    /// call does anything; later and concurrent calls return at once.
    pub fn close(&self, status: ErrorCode) {
        self.shared.dispose(Teardown::GoAway(status));
    }

    /// Block until the session has been torn down
    pub fn wait_closed(&self) {
        let mut disposed = self.shared.disposed.lock();
        while !*disposed {
            self.shared.disposed_cv.wait(&mut disposed);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closing()
    }

    pub fn active_stream_count(&self) -> usize {
        self.shared.core.lock().active_stream_count()
    }

    /// Settings received from the peer so far
    pub fn remote_settings(&self) -> Settings {
        self.shared.core.lock().remote_settings()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.dispose(Teardown::GoAway(ErrorCode::NoError));
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.shared.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn check_headers(headers: &[HeaderField]) -> Result<()> {
    match headers.iter().position(|h| h.name.is_empty()) {
        Some(pos) => Err(Error::InvalidHeader(format!("header {} has an empty name", pos))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::Server.to_string(), "server");
    }

    #[test]
    fn test_check_headers() {
        assert!(check_headers(&[HeaderField::new(":path", "/")]).is_ok());
        assert!(matches!(
            check_headers(&[HeaderField::new(":path", "/"), HeaderField::new("", "x")]),
            Err(Error::InvalidHeader(_))
        ));
    }
}
