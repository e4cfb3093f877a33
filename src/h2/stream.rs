//! Stream state
//!
//! A stream is created idle (or reserved by a push promise), opens when its
//! first header block is sent or received, and closes once END_STREAM has
//! travelled in both directions or a reset is sent or received.

use super::error::{Error, Result};
use super::flow_control::FlowControlWindow;
use super::{DEFAULT_PRIORITY, LOWEST_PRIORITY};
use bytes::Bytes;
use std::collections::VecDeque;

/// Stream ID type
pub type StreamId = u32;

/// Map a wire priority onto the 0..=7 range; larger values are least urgent
pub fn clamp_priority(wire: u32) -> u8 {
    wire.min(LOWEST_PRIORITY as u32) as u8
}

/// Stream states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Idle: No frames have been sent/received
    Idle,
    /// Reserved (local): PUSH_PROMISE sent
    ReservedLocal,
    /// Reserved (remote): PUSH_PROMISE received
    ReservedRemote,
    /// Open: Both sides can send frames
    Open,
    /// Half-closed (local): We can't send, they can
    HalfClosedLocal,
    /// Half-closed (remote): They can't send, we can
    HalfClosedRemote,
    /// Closed: Stream is closed
    Closed,
}

impl StreamState {
    /// Check if stream can send data
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if stream can receive data
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// DATA waiting for flow-control credit
#[derive(Debug, Clone)]
pub struct UnshippedChunk {
    pub data: Bytes,
    pub end_stream: bool,
}

/// Multiplexed stream
#[derive(Debug)]
pub struct H2Stream {
    id: StreamId,
    state: StreamState,
    priority: u8,
    send_window: FlowControlWindow,
    recv_window: FlowControlWindow,
    flow_controlled: bool,
    /// END_STREAM has been queued locally (possibly still unshipped)
    end_stream_queued: bool,
    /// Some DATA went to the write queue
    data_queued: bool,
    unshipped: VecDeque<UnshippedChunk>,
    /// `:path` of the promise this stream fulfils
    promised_path: Option<String>,
}

impl H2Stream {
    /// Create a new stream
    pub fn new(id: StreamId) -> Self {
        Self::with_window_sizes(id, super::DEFAULT_INITIAL_WINDOW_SIZE, super::DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Create a new stream with specified window sizes
    pub fn with_window_sizes(id: StreamId, send_size: u32, recv_size: u32) -> Self {
        H2Stream {
            id,
            state: StreamState::Idle,
            priority: DEFAULT_PRIORITY,
            send_window: FlowControlWindow::with_initial_size(send_size),
            recv_window: FlowControlWindow::with_initial_size(recv_size),
            flow_controlled: true,
            end_stream_queued: false,
            data_queued: false,
            unshipped: VecDeque::new(),
            promised_path: None,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Set stream state
    pub fn set_state(&mut self, state: StreamState) {
        self.state = state;
    }

    /// Priority, 0 (most urgent) to 7
    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority.min(LOWEST_PRIORITY);
    }

    pub fn send_window(&self) -> &FlowControlWindow {
        &self.send_window
    }

    pub fn send_window_mut(&mut self) -> &mut FlowControlWindow {
        &mut self.send_window
    }

    pub fn recv_window(&self) -> &FlowControlWindow {
        &self.recv_window
    }

    pub fn recv_window_mut(&mut self) -> &mut FlowControlWindow {
        &mut self.recv_window
    }

    pub fn is_flow_controlled(&self) -> bool {
        self.flow_controlled
    }

    /// Stop gating this stream by windows
    pub fn disable_flow_control(&mut self) {
        self.flow_controlled = false;
    }

    /// Send window to gate DATA with, `None` when not flow controlled
    pub fn gating_window(&self) -> Option<&FlowControlWindow> {
        self.flow_controlled.then_some(&self.send_window)
    }

    pub fn promised_path(&self) -> Option<&str> {
        self.promised_path.as_deref()
    }

    pub fn set_promised_path(&mut self, path: Option<String>) {
        self.promised_path = path;
    }

    /// Local DATA or HEADERS may still be queued
    pub fn can_send(&self) -> bool {
        self.state.can_send() && !self.end_stream_queued
    }

    /// Process a received header block
    pub fn receive_headers(&mut self, end_stream: bool) -> Result<()> {
        self.state = match (self.state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedRemote,
            (StreamState::ReservedRemote, false) => StreamState::HalfClosedLocal,
            (StreamState::ReservedRemote, true) => StreamState::Closed,
            (StreamState::Open, false) => StreamState::Open,
            (StreamState::Open, true) => StreamState::HalfClosedRemote,
            (StreamState::HalfClosedLocal, false) => StreamState::HalfClosedLocal,
            (StreamState::HalfClosedLocal, true) => StreamState::Closed,
            _ => return Err(Error::StreamClosed(self.id)),
        };
        Ok(())
    }

    /// Process a received DATA payload
    pub fn receive_data(&mut self, end_stream: bool) -> Result<()> {
        if !self.state.can_receive() {
            return Err(Error::StreamClosed(self.id));
        }

        if end_stream {
            self.state = match self.state {
                StreamState::Open => StreamState::HalfClosedRemote,
                _ => StreamState::Closed,
            };
        }

        Ok(())
    }

    /// Transition for locally sent HEADERS
    pub fn send_headers(&mut self, end_stream: bool) -> Result<()> {
        let next = match (self.state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedLocal,
            (StreamState::ReservedLocal, false) => StreamState::HalfClosedRemote,
            (StreamState::ReservedLocal, true) => StreamState::Closed,
            (StreamState::Open, false) | (StreamState::HalfClosedRemote, false)
                if !self.end_stream_queued =>
            {
                self.state
            }
            (StreamState::Open, true) if !self.end_stream_queued => StreamState::HalfClosedLocal,
            (StreamState::HalfClosedRemote, true) if !self.end_stream_queued => StreamState::Closed,
            _ => return Err(Error::StreamClosed(self.id)),
        };

        self.state = next;
        if end_stream {
            self.end_stream_queued = true;
        }
        Ok(())
    }

    /// Mark END_STREAM as queued for DATA; the state changes once it ships
    pub fn queue_end_stream(&mut self) -> Result<()> {
        if !self.can_send() {
            return Err(Error::StreamClosed(self.id));
        }
        self.end_stream_queued = true;
        Ok(())
    }

    /// Final DATA frame went to the write queue
    pub fn finish_sending(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => other,
        };
    }

    pub fn mark_data_queued(&mut self) {
        self.data_queued = true;
    }

    pub fn has_queued_data(&self) -> bool {
        self.data_queued
    }

    pub fn push_unshipped(&mut self, chunk: UnshippedChunk) {
        self.unshipped.push_back(chunk);
    }

    pub fn pop_unshipped(&mut self) -> Option<UnshippedChunk> {
        self.unshipped.pop_front()
    }

    /// Put a partly shipped chunk back at the head of the queue
    pub fn requeue_unshipped(&mut self, chunk: UnshippedChunk) {
        self.unshipped.push_front(chunk);
    }

    pub fn has_unshipped(&self) -> bool {
        !self.unshipped.is_empty()
    }

    pub fn unshipped_len(&self) -> usize {
        self.unshipped.iter().map(|c| c.data.len()).sum()
    }

    /// Close the stream
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }

    /// RST_STREAM sent or received: deferred data is dropped
    pub fn reset(&mut self) {
        self.unshipped.clear();
        self.state = StreamState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_state_transitions() {
        let mut stream = H2Stream::new(1);
        assert_eq!(stream.state(), StreamState::Idle);

        // Idle -> Open (send HEADERS without END_STREAM)
        stream.send_headers(false).unwrap();
        assert_eq!(stream.state(), StreamState::Open);

        // Open -> HalfClosedLocal once the final DATA is queued
        stream.queue_end_stream().unwrap();
        assert!(!stream.can_send());
        stream.finish_sending();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);

        stream.receive_headers(false).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
        stream.receive_data(true).unwrap();
        assert!(stream.state().is_closed());
    }

    #[test]
    fn test_stream_receive_headers() {
        let mut stream = H2Stream::new(1);
        stream.receive_headers(true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedRemote);

        // nothing more may arrive
        assert!(matches!(stream.receive_data(false), Err(Error::StreamClosed(1))));

        stream.send_headers(true).unwrap();
        assert!(stream.state().is_closed());
    }

    #[test]
    fn test_reserved_streams() {
        let mut pushed = H2Stream::new(2);
        pushed.set_state(StreamState::ReservedRemote);
        pushed.receive_headers(false).unwrap();
        assert_eq!(pushed.state(), StreamState::HalfClosedLocal);

        let mut local = H2Stream::new(2);
        local.set_state(StreamState::ReservedLocal);
        local.send_headers(false).unwrap();
        assert_eq!(local.state(), StreamState::HalfClosedRemote);
        assert!(local.can_send());
    }

    #[test]
    fn test_send_after_end_stream_rejected() {
        let mut stream = H2Stream::new(1);
        stream.send_headers(true).unwrap();
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
        assert!(stream.send_headers(false).is_err());
        assert!(stream.queue_end_stream().is_err());
    }

    #[test]
    fn test_priority_clamped() {
        let mut stream = H2Stream::new(1);
        assert_eq!(stream.priority(), DEFAULT_PRIORITY);
        stream.set_priority(200);
        assert_eq!(stream.priority(), LOWEST_PRIORITY);
        assert_eq!(clamp_priority(0), 0);
        assert_eq!(clamp_priority(0x7FFF_FFFF), 7);
    }

    #[test]
    fn test_unshipped_queue_and_reset() {
        let mut stream = H2Stream::new(1);
        stream.push_unshipped(UnshippedChunk {
            data: Bytes::from_static(b"abc"),
            end_stream: false,
        });
        stream.push_unshipped(UnshippedChunk {
            data: Bytes::from_static(b"de"),
            end_stream: true,
        });
        assert_eq!(stream.unshipped_len(), 5);

        let head = stream.pop_unshipped().unwrap();
        assert_eq!(&head.data[..], b"abc");
        stream.requeue_unshipped(UnshippedChunk {
            data: head.data.slice(1..),
            end_stream: false,
        });
        assert_eq!(stream.unshipped_len(), 4);

        stream.reset();
        assert!(!stream.has_unshipped());
        assert!(stream.state().is_closed());
    }

    #[test]
    fn test_flow_control_toggle() {
        let mut stream = H2Stream::with_window_sizes(1, 100, 200);
        assert_eq!(stream.send_window().size(), 100);
        assert_eq!(stream.recv_window().size(), 200);
        assert!(stream.gating_window().is_some());
        stream.disable_flow_control();
        assert!(stream.gating_window().is_none());
    }
}
