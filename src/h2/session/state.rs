//! Session state and inbound frame dispatch
//!
//! Everything here runs under the session state lock. Frames are encoded and
//! pushed onto the write queue while the lock is held, so the queue sees
//! them in the order the state changed.

use super::Role;
use crate::h2::active_streams::ActiveStreams;
use crate::h2::codec::FrameCodec;
use crate::h2::compression::table::TableKind;
use crate::h2::compression::{find_header, Decoder, HeaderField};
use crate::h2::error::{Error, ErrorCode, Result};
use crate::h2::events::SessionEvent;
use crate::h2::flow_control::{check_increment, SessionFlowControl};
use crate::h2::frames::{
    DataFrame, Frame, GoAwayFrame, PingFrame, PriorityFrame, RstStreamFrame, SettingsFrame,
    WindowUpdateFrame,
};
use crate::h2::headers_sequence::{
    fragment_headers, fragment_push_promise, HeadersSequence, SequenceKind,
};
use crate::h2::options::SessionOptions;
use crate::h2::settings::Settings;
use crate::h2::stream::{clamp_priority, H2Stream, StreamId, StreamState, UnshippedChunk};
use crate::h2::write_queue::WriteQueue;
use crate::h2::{CONNECTION_STREAM_ID, DEFAULT_PRIORITY, MAX_STREAM_ID};
use bytes::Bytes;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// What the inbound pump does after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Continue,
    /// Peer sent GOAWAY with this code
    RemoteGoAway(ErrorCode),
}

pub(crate) struct SessionCore {
    role: Role,
    use_handshake: bool,
    use_priorities: bool,
    /// Bound on streams the peer may open
    max_concurrent_streams: Option<u32>,
    streams: ActiveStreams,
    decoder: Decoder,
    flow: SessionFlowControl,
    /// Header block waiting for CONTINUATION frames
    pending: Option<HeadersSequence>,
    remote_settings: Settings,
    settings_received: bool,
    settings_ack: Option<Sender<()>>,
    next_local_id: StreamId,
    last_remote_id: StreamId,
    /// `:path` of promises received and not yet fulfilled, with how many
    /// promised streams still carry it
    promised_paths: HashMap<String, usize>,
    pings: HashMap<[u8; 8], Sender<()>>,
    remote_closing: bool,
    queue: Arc<WriteQueue>,
    events: Sender<SessionEvent>,
}

impl SessionCore {
    pub(super) fn new(
        role: Role,
        options: &SessionOptions,
        queue: Arc<WriteQueue>,
        events: Sender<SessionEvent>,
        settings_ack: Option<Sender<()>>,
    ) -> Self {
        let decode_kind = match role {
            Role::Client => TableKind::Response,
            Role::Server => TableKind::Request,
        };
        SessionCore {
            role,
            use_handshake: options.use_handshake,
            use_priorities: options.use_priorities,
            max_concurrent_streams: options.max_concurrent_streams,
            streams: ActiveStreams::with_capacity(options.stream_pool_capacity),
            decoder: Decoder::new(decode_kind, options.header_table_size),
            flow: SessionFlowControl::new(options.use_flow_control, options.initial_window_size),
            pending: None,
            remote_settings: Settings::new(),
            settings_received: false,
            settings_ack,
            next_local_id: match role {
                Role::Client => 1,
                Role::Server => 2,
            },
            last_remote_id: 0,
            promised_paths: HashMap::new(),
            pings: HashMap::new(),
            remote_closing: false,
            queue,
            events,
        }
    }

    fn is_local(&self, id: StreamId) -> bool {
        (id % 2 == 1) == (self.role == Role::Client)
    }

    /// No stream has used this id yet
    fn is_idle(&self, id: StreamId) -> bool {
        if self.is_local(id) {
            id >= self.next_local_id
        } else {
            id > self.last_remote_id
        }
    }

    fn local_stream_count(&self) -> usize {
        self.streams.iter().filter(|s| self.is_local(s.id())).count()
    }

    fn remote_stream_count(&self) -> usize {
        self.streams.iter().filter(|s| !self.is_local(s.id())).count()
    }

    fn emit(&self, event: SessionEvent) {
        // the session holds a receiver until it is dropped
        let _ = self.events.send(event);
    }

    fn send_frame(&self, frame: Frame) -> Result<()> {
        let bytes = FrameCodec::encode(&frame)?;
        self.queue.push_control(bytes, frame.name(), frame.stream_id())
    }

    fn new_stream(&self, id: StreamId) -> H2Stream {
        H2Stream::with_window_sizes(
            id,
            self.flow.initial_send_window(),
            self.flow.initial_recv_window(),
        )
    }

    pub(super) fn check_open(&self) -> Result<()> {
        if self.remote_closing || self.queue.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    pub(super) fn active_stream_count(&self) -> usize {
        self.streams.len()
    }

    pub(super) fn remote_settings(&self) -> Settings {
        self.remote_settings.clone()
    }

    pub(super) fn is_promised(&self, path: &str) -> bool {
        self.promised_paths.contains_key(path)
    }

    pub(super) fn has_queued_data(&self, id: StreamId) -> bool {
        self.streams.get(id).is_some_and(H2Stream::has_queued_data)
    }

    /// Remove a stream from the table, announcing it closed
    fn finish_stream(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.remove(id) {
            self.release_promise(&stream);
            debug!(stream_id = id, "stream closed");
            self.emit(SessionEvent::StreamClosed { stream_id: id });
        }
    }

    fn release_promise(&mut self, stream: &H2Stream) {
        let Some(path) = stream.promised_path() else {
            return;
        };
        if let Some(count) = self.promised_paths.get_mut(path) {
            *count -= 1;
            if *count == 0 {
                self.promised_paths.remove(path);
            }
        }
    }

    // ---- locally initiated work ----

    /// Put a new locally initiated stream in the table
    ///
    /// The id is only consumed by [`open_local_stream`](Self::open_local_stream)
    /// or [`promise_stream`](Self::promise_stream); on failure in between the
    /// caller hands it back with [`abandon_local_stream`](Self::abandon_local_stream).
    pub(super) fn reserve_local_stream(&mut self, priority: u8) -> Result<StreamId> {
        self.check_open()?;
        if let Some(max) = self.remote_settings.get_max_concurrent_streams() {
            if self.local_stream_count() >= max as usize {
                return Err(Error::TooManyStreams);
            }
        }
        let id = self.next_local_id;
        if id > MAX_STREAM_ID {
            return Err(Error::InvalidStreamId(id));
        }
        let mut stream = self.new_stream(id);
        stream.set_priority(priority);
        self.streams.insert(stream)?;
        Ok(id)
    }

    pub(super) fn abandon_local_stream(&mut self, id: StreamId) {
        self.streams.remove(id);
    }

    /// Send the opening header block of a reserved stream
    pub(super) fn open_local_stream(&mut self, id: StreamId, block: Bytes, end_stream: bool) -> Result<()> {
        let stream = self.streams.get_mut(id).ok_or(Error::StreamNotFound(id))?;
        stream.send_headers(end_stream)?;
        let priority = self.use_priorities.then_some(stream.priority() as u32);
        self.next_local_id = id + 2;

        for frame in fragment_headers(id, block, end_stream, priority) {
            self.send_frame(frame)?;
        }
        Ok(())
    }

    /// Reserve a stream for a pushed response to `associated`
    pub(super) fn reserve_push(&mut self, associated: StreamId, path: Option<&str>) -> Result<StreamId> {
        let parent = self
            .streams
            .get(associated)
            .ok_or(Error::StreamNotFound(associated))?;
        if !parent.state().can_send() {
            return Err(Error::StreamClosed(associated));
        }
        let priority = parent.priority();

        let promised = self.reserve_local_stream(priority)?;
        if let Some(stream) = self.streams.get_mut(promised) {
            stream.set_state(StreamState::ReservedLocal);
            stream.set_promised_path(path.map(str::to_string));
        }
        Ok(promised)
    }

    /// Send PUSH_PROMISE for a reserved stream
    pub(super) fn promise_stream(&mut self, associated: StreamId, promised: StreamId, block: Bytes) -> Result<()> {
        self.next_local_id = promised + 2;
        for frame in fragment_push_promise(associated, promised, block) {
            self.send_frame(frame)?;
        }
        Ok(())
    }

    /// Validate and apply the state change for locally sent HEADERS
    pub(super) fn prepare_headers(&mut self, id: StreamId, end_stream: bool) -> Result<()> {
        self.check_open()?;
        let stream = self.streams.get_mut(id).ok_or(Error::StreamNotFound(id))?;
        if stream.has_unshipped() {
            return Err(Error::Protocol(format!(
                "HEADERS on stream {} would overtake DATA waiting for window",
                id
            )));
        }
        stream.send_headers(end_stream)
    }

    /// Queue a header block for an existing stream
    pub(super) fn finish_headers(&mut self, id: StreamId, block: Bytes, end_stream: bool) -> Result<()> {
        for frame in fragment_headers(id, block, end_stream, None) {
            self.send_frame(frame)?;
        }
        if self.streams.get(id).is_some_and(|s| s.state().is_closed()) {
            self.finish_stream(id);
        }
        Ok(())
    }

    /// Queue DATA, shipping as much as the windows allow
    pub(super) fn send_data(&mut self, id: StreamId, data: Bytes, end_stream: bool) -> Result<()> {
        self.check_open()?;
        let stream = self.streams.get_mut(id).ok_or(Error::StreamNotFound(id))?;
        if end_stream {
            stream.queue_end_stream()?;
        } else if !stream.can_send() {
            return Err(Error::StreamClosed(id));
        }
        stream.push_unshipped(UnshippedChunk { data, end_stream });
        self.ship(id)
    }

    /// Move unshipped DATA of one stream to the write queue
    ///
    /// No frame exceeds the credit available when it is queued; what does
    /// not fit stays unshipped until a WINDOW_UPDATE arrives.
    fn ship(&mut self, id: StreamId) -> Result<()> {
        loop {
            let Some(stream) = self.streams.get_mut(id) else {
                return Ok(());
            };
            let Some(mut chunk) = stream.pop_unshipped() else {
                return Ok(());
            };

            let amount = self.flow.sendable(stream.gating_window(), chunk.data.len());
            if amount == 0 && !chunk.data.is_empty() {
                trace!(stream_id = id, pending = chunk.data.len(), "DATA blocked on window");
                stream.requeue_unshipped(chunk);
                return Ok(());
            }

            let gated = stream.is_flow_controlled() && self.flow.send_enabled();
            if gated {
                stream.send_window_mut().consume(amount);
            }
            self.flow.record_sent(gated, amount);

            let payload = chunk.data.split_to(amount);
            let last = chunk.data.is_empty();
            let end_stream = last && chunk.end_stream;
            let priority = if self.use_priorities {
                stream.priority()
            } else {
                DEFAULT_PRIORITY
            };

            stream.mark_data_queued();
            if !last {
                stream.requeue_unshipped(chunk);
            } else if end_stream {
                stream.finish_sending();
            }
            let closed = stream.state().is_closed();

            let bytes = FrameCodec::encode_data_frame(&DataFrame::new(id, payload, end_stream))?;
            self.queue.push_data(priority, bytes, id)?;

            if closed {
                self.finish_stream(id);
                return Ok(());
            }
        }
    }

    /// Ship every stream with unshipped DATA, most urgent first
    fn ship_all(&mut self) -> Result<()> {
        let mut blocked: Vec<(u8, StreamId)> = self
            .streams
            .iter()
            .filter(|s| s.has_unshipped())
            .map(|s| (s.priority(), s.id()))
            .collect();
        blocked.sort_unstable();
        for (_, id) in blocked {
            self.ship(id)?;
        }
        Ok(())
    }

    /// RST_STREAM a stream, removing it if it is still in the table
    pub(super) fn send_reset(&mut self, id: StreamId, code: ErrorCode) -> Result<()> {
        let dropped = self.queue.purge_stream(id);
        if dropped > 0 {
            trace!(stream_id = id, frames = dropped, "dropped queued DATA of reset stream");
        }
        if let Some(mut stream) = self.streams.remove(id) {
            stream.reset();
            self.release_promise(&stream);
            self.emit(SessionEvent::StreamReset {
                stream_id: id,
                error_code: code,
                remote: false,
            });
            self.emit(SessionEvent::StreamClosed { stream_id: id });
        }
        self.send_frame(Frame::RstStream(RstStreamFrame {
            stream_id: id,
            error_code: code,
        }))
    }

    pub(super) fn reset_stream(&mut self, id: StreamId, code: ErrorCode) -> Result<()> {
        self.check_open()?;
        if !self.streams.contains(id) {
            return Err(Error::StreamNotFound(id));
        }
        debug!(stream_id = id, code = %code, "resetting stream");
        self.send_reset(id, code)
    }

    pub(super) fn set_stream_priority(&mut self, id: StreamId, priority: u8) -> Result<()> {
        self.check_open()?;
        let stream = self.streams.get_mut(id).ok_or(Error::StreamNotFound(id))?;
        stream.set_priority(priority);
        let priority = stream.priority();
        if self.use_priorities {
            self.queue.reprioritize(id, priority);
            self.send_frame(Frame::Priority(PriorityFrame {
                stream_id: id,
                priority: priority as u32,
            }))?;
        }
        Ok(())
    }

    pub(super) fn disable_stream_flow_control(&mut self, id: StreamId) -> Result<()> {
        self.check_open()?;
        if !self.streams.disable_flow_control(id) {
            return Err(Error::StreamNotFound(id));
        }
        self.send_frame(Frame::WindowUpdate(WindowUpdateFrame::end_flow_control(id)))?;
        self.ship(id)
    }

    pub(super) fn start_ping(&mut self, data: [u8; 8], done: Sender<()>) -> Result<()> {
        self.check_open()?;
        self.pings.insert(data, done);
        self.send_frame(Frame::Ping(PingFrame::new(data)))
    }

    pub(super) fn cancel_ping(&mut self, data: &[u8; 8]) {
        self.pings.remove(data);
    }

    /// Reset every stream and queue the final frames
    ///
    /// `send_frames` is false when the transport is gone. GOAWAY is only
    /// sent when asked for and the peer has not sent one itself.
    pub(super) fn shutdown(&mut self, status: ErrorCode, send_frames: bool, send_goaway: bool) {
        for mut stream in self.streams.drain() {
            let id = stream.id();
            stream.reset();
            self.queue.purge_stream(id);
            if send_frames {
                let _ = self.send_frame(Frame::RstStream(RstStreamFrame {
                    stream_id: id,
                    error_code: ErrorCode::Cancel,
                }));
            }
            self.emit(SessionEvent::StreamReset {
                stream_id: id,
                error_code: ErrorCode::Cancel,
                remote: false,
            });
        }

        if send_frames && send_goaway && !self.remote_closing {
            let goaway = GoAwayFrame::new(self.last_remote_id, status, Bytes::new());
            if let Err(e) = self.send_frame(Frame::GoAway(goaway)) {
                debug!(error = %e, "could not queue GOAWAY");
            }
        }

        self.pending = None;
        self.promised_paths.clear();
        // dropping the senders wakes anyone waiting on them
        self.pings.clear();
        self.settings_ack = None;
        self.decoder.dispose();
    }

    // ---- inbound dispatch ----

    /// Apply one received frame
    pub(super) fn dispatch(&mut self, frame: Frame) -> Result<Dispatch> {
        trace!(frame_type = frame.name(), stream_id = frame.stream_id(), "received frame");

        if self.use_handshake
            && !self.settings_received
            && !matches!(&frame, Frame::Settings(s) if !s.ack)
        {
            return Err(Error::Protocol(format!(
                "expected SETTINGS as the first frame, got {}",
                frame.name()
            )));
        }
        if let Some(pending) = &self.pending {
            if !matches!(frame, Frame::Continuation(_)) {
                return Err(Error::Protocol(format!(
                    "{} interleaved with header block on stream {}",
                    frame.name(),
                    pending.stream_id()
                )));
            }
        }

        match frame {
            Frame::Data(f) => self.on_data(f)?,
            Frame::Headers(f) => {
                if f.stream_id == CONNECTION_STREAM_ID {
                    return Err(Error::Protocol("HEADERS on stream 0".to_string()));
                }
                self.on_header_fragment(HeadersSequence::from_headers(f))?
            }
            Frame::PushPromise(f) => self.on_header_fragment(HeadersSequence::from_push_promise(f))?,
            Frame::Continuation(f) => {
                let mut sequence = self.pending.take().ok_or_else(|| {
                    Error::Protocol(format!(
                        "CONTINUATION on stream {} without a header block",
                        f.stream_id
                    ))
                })?;
                sequence.append(f)?;
                self.on_header_fragment(sequence)?
            }
            Frame::Priority(f) => self.on_priority(f)?,
            Frame::RstStream(f) => self.on_rst_stream(f),
            Frame::Settings(f) => self.on_settings(f)?,
            Frame::Ping(f) => self.on_ping(f)?,
            Frame::GoAway(f) => return Ok(self.on_goaway(f)),
            Frame::WindowUpdate(f) => self.on_window_update(f)?,
            Frame::Unknown(raw) => {
                trace!(frame_type = raw.frame_type, "ignoring frame of unknown type")
            }
        }
        Ok(Dispatch::Continue)
    }

    fn on_header_fragment(&mut self, sequence: HeadersSequence) -> Result<()> {
        if !sequence.is_complete() {
            self.pending = Some(sequence);
            return Ok(());
        }

        // decode before any stream checks so the tables stay in step
        let headers = self.decoder.decompress(sequence.block())?;
        let id = sequence.stream_id();
        match sequence.kind() {
            SequenceKind::Headers => {
                self.on_headers(id, headers, sequence.end_stream(), sequence.priority())
            }
            SequenceKind::PushPromise => {
                let promised = sequence.promised_stream_id().ok_or_else(|| {
                    Error::Internal("push promise sequence without promised id".to_string())
                })?;
                self.on_push_promise(id, promised, headers)
            }
        }
    }

    fn accept_remote_stream(&mut self, id: StreamId) -> Result<()> {
        if self.is_local(id) {
            if id < self.next_local_id {
                return Err(Error::StreamNotFound(id));
            }
            return Err(Error::Protocol(format!("HEADERS on idle local stream {}", id)));
        }
        if self.role == Role::Client {
            return Err(Error::Protocol(format!(
                "server opened stream {} without a promise",
                id
            )));
        }
        if id <= self.last_remote_id {
            return Err(Error::Protocol(format!(
                "stream id {} not greater than last remote stream {}",
                id, self.last_remote_id
            )));
        }
        self.last_remote_id = id;

        if let Some(max) = self.max_concurrent_streams {
            if self.remote_stream_count() >= max as usize {
                return Err(Error::RefusedStream(id));
            }
        }
        let stream = self.new_stream(id);
        self.streams
            .insert(stream)
            .map_err(|_| Error::RefusedStream(id))?;
        debug!(stream_id = id, "peer opened stream");
        Ok(())
    }

    fn on_headers(
        &mut self,
        id: StreamId,
        headers: Vec<HeaderField>,
        end_stream: bool,
        priority: Option<u32>,
    ) -> Result<()> {
        if !self.streams.contains(id) {
            self.accept_remote_stream(id)?;
        }
        let stream = self.streams.get_mut(id).ok_or(Error::StreamNotFound(id))?;
        if let Some(priority) = priority {
            stream.set_priority(clamp_priority(priority));
            if self.use_priorities {
                self.queue.reprioritize(id, stream.priority());
            }
        }
        stream.receive_headers(end_stream)?;
        let priority = stream.priority();
        let closed = stream.state().is_closed();

        debug!(stream_id = id, end_stream, count = headers.len(), "header block received");
        self.emit(SessionEvent::Headers {
            stream_id: id,
            headers,
            priority,
            end_stream,
        });
        if closed {
            self.finish_stream(id);
        }
        Ok(())
    }

    fn on_push_promise(&mut self, associated: StreamId, promised: StreamId, headers: Vec<HeaderField>) -> Result<()> {
        if self.role == Role::Server {
            return Err(Error::Protocol("PUSH_PROMISE sent to a server".to_string()));
        }
        if promised == 0 || self.is_local(promised) || promised <= self.last_remote_id {
            return Err(Error::Protocol(format!("invalid promised stream id {}", promised)));
        }
        self.last_remote_id = promised;
        if !self.streams.contains(associated) {
            return Err(Error::StreamNotFound(promised));
        }

        let path = find_header(&headers, ":path").map(str::to_string);
        let mut stream = self.new_stream(promised);
        stream.set_state(StreamState::ReservedRemote);
        stream.set_promised_path(path.clone());
        self.streams
            .insert(stream)
            .map_err(|_| Error::RefusedStream(promised))?;
        if let Some(path) = path {
            *self.promised_paths.entry(path).or_insert(0) += 1;
        }

        debug!(stream_id = associated, promised_stream_id = promised, "push promise received");
        self.emit(SessionEvent::PushPromise {
            stream_id: associated,
            promised_stream_id: promised,
            headers,
        });
        Ok(())
    }

    fn on_data(&mut self, frame: DataFrame) -> Result<()> {
        if self.flow.recv_enabled() {
            self.flow.recv_window_mut().receive(frame.data.len())?;
        }
        let result = self.receive_stream_data(frame);
        self.replenish_session_window()?;
        result
    }

    fn receive_stream_data(&mut self, frame: DataFrame) -> Result<()> {
        let id = frame.stream_id;
        let checked = self.flow.recv_enabled();
        let Some(stream) = self.streams.get_mut(id) else {
            return self.on_missing_stream(id, "DATA");
        };
        let checked = checked && stream.is_flow_controlled();

        if checked {
            stream
                .recv_window_mut()
                .receive(frame.data.len())
                .map_err(|_| Error::StreamFlowControl(id))?;
        }
        stream.receive_data(frame.end_stream)?;

        let update = if checked && !frame.end_stream {
            stream.recv_window().update_needed()
        } else {
            None
        };
        if let Some(increment) = update {
            stream.recv_window_mut().increase(increment)?;
        }
        let closed = stream.state().is_closed();

        self.emit(SessionEvent::Data {
            stream_id: id,
            data: frame.data,
            end_stream: frame.end_stream,
        });
        if let Some(increment) = update {
            self.send_frame(Frame::WindowUpdate(WindowUpdateFrame::new(id, increment)))?;
        }
        if closed {
            self.finish_stream(id);
        }
        Ok(())
    }

    fn replenish_session_window(&mut self) -> Result<()> {
        if !self.flow.recv_enabled() {
            return Ok(());
        }
        if let Some(increment) = self.flow.recv_window().update_needed() {
            self.flow.recv_window_mut().increase(increment)?;
            self.send_frame(Frame::WindowUpdate(WindowUpdateFrame::new(
                CONNECTION_STREAM_ID,
                increment,
            )))?;
        }
        Ok(())
    }

    /// Frame for a stream not in the table
    ///
    /// Ids that were never used are answered with RST_STREAM. Closed streams
    /// are ignored: the peer may send these before it learns of the close.
    /// DATA has already been charged to the session window by then.
    fn on_missing_stream(&self, id: StreamId, frame_type: &'static str) -> Result<()> {
        if self.is_idle(id) {
            return Err(Error::StreamNotFound(id));
        }
        trace!(stream_id = id, frame_type, "frame for closed stream ignored");
        Ok(())
    }

    fn on_priority(&mut self, frame: PriorityFrame) -> Result<()> {
        match self.streams.get_mut(frame.stream_id) {
            Some(stream) => {
                stream.set_priority(clamp_priority(frame.priority));
                if self.use_priorities {
                    self.queue.reprioritize(frame.stream_id, stream.priority());
                }
                Ok(())
            }
            None => self.on_missing_stream(frame.stream_id, "PRIORITY"),
        }
    }

    fn on_rst_stream(&mut self, frame: RstStreamFrame) {
        let id = frame.stream_id;
        let Some(mut stream) = self.streams.remove(id) else {
            trace!(stream_id = id, "RST_STREAM for unknown stream");
            return;
        };
        stream.reset();
        self.release_promise(&stream);

        debug!(stream_id = id, code = %frame.error_code, "stream reset by peer");
        self.emit(SessionEvent::StreamReset {
            stream_id: id,
            error_code: frame.error_code,
            remote: true,
        });
        self.emit(SessionEvent::StreamClosed { stream_id: id });
    }

    fn on_settings(&mut self, frame: SettingsFrame) -> Result<()> {
        if frame.ack {
            debug!("SETTINGS acknowledged");
            if let Some(acked) = self.settings_ack.take() {
                let _ = acked.send(());
            }
            self.emit(SessionEvent::SettingsAcked);
            return Ok(());
        }

        let settings = frame.settings;
        settings.validate()?;
        self.settings_received = true;

        if let Some(size) = settings.initial_window_size {
            for stream in self.streams.iter_mut() {
                stream.send_window_mut().update_initial_size(size)?;
            }
            self.flow.set_initial_send_window(size);
        }
        if settings.flow_control_disabled() {
            debug!("peer disabled flow control");
            self.flow.disable_remote();
        }
        self.remote_settings.merge(&settings);
        debug!(?settings, "applied peer SETTINGS");

        self.send_frame(Frame::Settings(SettingsFrame::ack()))?;
        self.ship_all()
    }

    fn on_ping(&mut self, frame: PingFrame) -> Result<()> {
        if !frame.ack {
            return self.send_frame(Frame::Ping(PingFrame::ack(frame.data)));
        }
        match self.pings.remove(&frame.data) {
            Some(done) => {
                let _ = done.send(());
            }
            None => debug!("PING ack without a matching ping"),
        }
        Ok(())
    }

    fn on_goaway(&mut self, frame: GoAwayFrame) -> Dispatch {
        info!(
            last_stream_id = frame.last_stream_id,
            code = %frame.error_code,
            "peer sent GOAWAY"
        );
        self.remote_closing = true;
        self.emit(SessionEvent::GoAway {
            last_stream_id: frame.last_stream_id,
            error_code: frame.error_code,
            debug_data: frame.debug_data,
        });
        Dispatch::RemoteGoAway(frame.error_code)
    }

    fn on_window_update(&mut self, frame: WindowUpdateFrame) -> Result<()> {
        let id = frame.stream_id;
        if !frame.end_flow_control {
            check_increment(frame.size_increment)?;
        }
        if id == CONNECTION_STREAM_ID {
            if frame.end_flow_control {
                debug!("peer ended session flow control");
                self.flow.disable_remote();
            } else {
                self.flow.send_window_mut().increase(frame.size_increment)?;
            }
            return self.ship_all();
        }

        if frame.end_flow_control {
            if !self.streams.disable_flow_control(id) {
                return self.on_missing_stream(id, "WINDOW_UPDATE");
            }
            debug!(stream_id = id, "peer ended stream flow control");
        } else {
            match self.streams.get_mut(id) {
                Some(stream) => {
                    stream
                        .send_window_mut()
                        .increase(frame.size_increment)
                        .map_err(|_| Error::StreamFlowControl(id))?;
                }
                None => return self.on_missing_stream(id, "WINDOW_UPDATE"),
            }
        }
        self.ship(id)
    }
}
