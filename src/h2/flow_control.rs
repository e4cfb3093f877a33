//! Flow control
//!
//! Flow control is applied at both the connection and stream level. Every
//! DATA payload byte is charged against the receiver's stream window and the
//! session window; WINDOW_UPDATE returns credit. A WINDOW_UPDATE carrying
//! END_FLOW_CONTROL switches gating off for one stream, or for the whole
//! session on stream 0.

use super::error::{Error, Result};
use super::{DEFAULT_INITIAL_WINDOW_SIZE, MAX_FRAME_PAYLOAD, MAX_WINDOW_SIZE};

/// Reject a WINDOW_UPDATE increment outside `1..=2^31-1`
pub fn check_increment(increment: u32) -> Result<()> {
    if increment == 0 || increment > MAX_WINDOW_SIZE {
        return Err(Error::FlowControl(format!(
            "window increment {} outside 1..=2^31-1",
            increment
        )));
    }
    Ok(())
}

/// Flow control window
///
/// The current size is signed: lowering the initial window through SETTINGS
/// can leave a window negative, and nothing is sent until it is positive
/// again.
#[derive(Debug, Clone)]
pub struct FlowControlWindow {
    initial_size: u32,
    current_size: i64,
}

impl FlowControlWindow {
    /// Create a new flow control window with default size
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Create a new flow control window with specified initial size
    pub fn with_initial_size(initial_size: u32) -> Self {
        FlowControlWindow {
            initial_size,
            current_size: initial_size as i64,
        }
    }

    /// Get current window size
    pub fn size(&self) -> i64 {
        self.current_size
    }

    /// Get initial window size
    pub fn initial_size(&self) -> u32 {
        self.initial_size
    }

    /// Bytes that may be sent now (0 when the window is exhausted or negative)
    pub fn available(&self) -> usize {
        self.current_size.max(0) as usize
    }

    /// Check if window has available capacity
    pub fn has_capacity(&self) -> bool {
        self.current_size > 0
    }

    /// Check if window can send specified amount
    pub fn can_send(&self, amount: usize) -> bool {
        self.current_size >= amount as i64
    }

    /// Consume window capacity for sending data
    ///
    /// Returns the amount actually granted (may be less than requested)
    pub fn consume(&mut self, amount: usize) -> usize {
        if amount == 0 || self.current_size <= 0 {
            return 0;
        }

        let granted = std::cmp::min(amount as i64, self.current_size) as usize;
        self.current_size -= granted as i64;
        granted
    }

    /// Increase window size (WINDOW_UPDATE)
    ///
    /// The increment must be in `1..=2^31-1` and the result may not exceed
    /// 2^31-1. Returns the new window size.
    pub fn increase(&mut self, increment: u32) -> Result<i64> {
        check_increment(increment)?;

        let new_size = self.current_size + increment as i64;
        if new_size > MAX_WINDOW_SIZE as i64 {
            return Err(Error::FlowControl(format!(
                "Window size {} exceeds maximum (2^31-1)",
                new_size
            )));
        }

        self.current_size = new_size;
        Ok(self.current_size)
    }

    /// Decrease window size without checks
    pub fn decrease(&mut self, amount: usize) {
        self.current_size -= amount as i64;
    }

    /// Charge received data; fails if the peer sent more than the window
    pub fn receive(&mut self, amount: usize) -> Result<()> {
        if amount as i64 > self.current_size {
            return Err(Error::FlowControl(format!(
                "received {} bytes with only {} of window left",
                amount, self.current_size
            )));
        }
        self.current_size -= amount as i64;
        Ok(())
    }

    /// Increment to restore the window once it fell below half its initial size
    pub fn update_needed(&self) -> Option<u32> {
        let initial = self.initial_size as i64;
        if self.current_size < initial / 2 {
            Some((initial - self.current_size) as u32)
        } else {
            None
        }
    }

    /// Update initial window size from SETTINGS
    ///
    /// The difference is applied to the current size, which may go negative.
    pub fn update_initial_size(&mut self, new_initial_size: u32) -> Result<()> {
        let diff = new_initial_size as i64 - self.initial_size as i64;
        let new_current = self.current_size + diff;

        if new_current > MAX_WINDOW_SIZE as i64 {
            return Err(Error::FlowControl(format!(
                "New window size {} exceeds maximum (2^31-1)",
                new_current
            )));
        }

        self.initial_size = new_initial_size;
        self.current_size = new_current;

        Ok(())
    }
}

impl Default for FlowControlWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection-wide flow control state
///
/// Holds the session windows, the initial stream window sizes negotiated in
/// each direction, and whether gating applies at all.
#[derive(Debug)]
pub struct SessionFlowControl {
    send_window: FlowControlWindow,
    recv_window: FlowControlWindow,
    /// Peer's INITIAL_WINDOW_SIZE, used for new streams' send windows
    initial_send_window: u32,
    /// Our INITIAL_WINDOW_SIZE, used for new streams' receive windows
    initial_recv_window: u32,
    local_enabled: bool,
    remote_disabled: bool,
}

impl SessionFlowControl {
    pub fn new(use_flow_control: bool, initial_recv_window: u32) -> Self {
        SessionFlowControl {
            send_window: FlowControlWindow::new(),
            recv_window: FlowControlWindow::new(),
            initial_send_window: DEFAULT_INITIAL_WINDOW_SIZE,
            initial_recv_window,
            local_enabled: use_flow_control,
            remote_disabled: false,
        }
    }

    /// Outbound DATA is gated by windows
    pub fn send_enabled(&self) -> bool {
        self.local_enabled && !self.remote_disabled
    }

    /// Inbound DATA is checked against windows
    pub fn recv_enabled(&self) -> bool {
        self.local_enabled
    }

    /// Peer stopped enforcing flow control for the whole session
    pub fn disable_remote(&mut self) {
        self.remote_disabled = true;
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

    pub fn initial_send_window(&self) -> u32 {
        self.initial_send_window
    }

    pub fn initial_recv_window(&self) -> u32 {
        self.initial_recv_window
    }

    /// Record the peer's INITIAL_WINDOW_SIZE; callers apply it to open streams
    pub fn set_initial_send_window(&mut self, size: u32) {
        self.initial_send_window = size;
    }

    /// Largest DATA payload that may go out now for a stream
    ///
    /// `stream_window` is `None` for streams that are not flow controlled.
    pub fn sendable(&self, stream_window: Option<&FlowControlWindow>, wanted: usize) -> usize {
        let capped = wanted.min(MAX_FRAME_PAYLOAD);
        match stream_window {
            Some(window) if self.send_enabled() => capped
                .min(window.available())
                .min(self.send_window.available()),
            _ => capped,
        }
    }

    /// Charge a sent DATA payload against the session window
    pub fn record_sent(&mut self, gated: bool, amount: usize) {
        if gated && self.send_enabled() {
            self.send_window.decrease(amount);
        }
    }
}
