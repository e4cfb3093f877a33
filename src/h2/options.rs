//! Session configuration

use super::active_streams::DEFAULT_POOL_CAPACITY;
use super::error::{Error, Result};
use super::session::Session;
use super::settings::{Settings, FLOW_CONTROL_DISABLED};
use super::{DEFAULT_HEADER_TABLE_SIZE, DEFAULT_INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};
use crate::transport::Transport;
use std::time::Duration;

/// Default bound on a ping round-trip
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for the peer to acknowledge our SETTINGS
pub const DEFAULT_SETTINGS_TIMEOUT: Duration = Duration::from_secs(10);

/// Default MAX_CONCURRENT_STREAMS advertised to the peer
pub const DEFAULT_MAX_CONCURRENT_STREAMS: u32 = 100;

/// Session options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Exchange the preface and SETTINGS before anything else
    pub use_handshake: bool,
    /// Schedule DATA by stream priority (otherwise every stream uses the default)
    pub use_priorities: bool,
    /// Gate DATA by windows and enforce the peer's use of ours
    pub use_flow_control: bool,
    /// INITIAL_WINDOW_SIZE advertised for streams the peer sends on
    pub initial_window_size: u32,
    /// MAX_CONCURRENT_STREAMS advertised; `None` means unlimited
    pub max_concurrent_streams: Option<u32>,
    /// Byte budget of each header table
    pub header_table_size: usize,
    /// Slots in the active-streams table
    pub stream_pool_capacity: usize,
    pub ping_timeout: Duration,
    pub settings_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            use_handshake: true,
            use_priorities: true,
            use_flow_control: true,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_concurrent_streams: Some(DEFAULT_MAX_CONCURRENT_STREAMS),
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            stream_pool_capacity: DEFAULT_POOL_CAPACITY,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            settings_timeout: DEFAULT_SETTINGS_TIMEOUT,
        }
    }
}

impl SessionOptions {
    /// Check option values
    pub fn validate(&self) -> Result<()> {
        if self.initial_window_size > MAX_WINDOW_SIZE {
            return Err(Error::InvalidOptions(format!(
                "initial window size {} exceeds 2^31-1",
                self.initial_window_size
            )));
        }
        if self.stream_pool_capacity == 0 {
            return Err(Error::InvalidOptions(
                "stream pool capacity must be at least 1".to_string(),
            ));
        }
        if self.ping_timeout.is_zero() || self.settings_timeout.is_zero() {
            return Err(Error::InvalidOptions("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// SETTINGS sent to the peer during the handshake
    pub fn local_settings(&self) -> Settings {
        Settings {
            max_concurrent_streams: self.max_concurrent_streams,
            initial_window_size: Some(self.initial_window_size),
            flow_control_options: (!self.use_flow_control).then_some(FLOW_CONTROL_DISABLED),
        }
    }
}

/// Builder for sessions
#[derive(Debug, Default)]
pub struct SessionBuilder {
    options: SessionOptions,
}

impl SessionBuilder {
    /// Create a new builder with default options
    pub fn new() -> Self {
        SessionBuilder::default()
    }

    /// Exchange preface and SETTINGS first
    pub fn use_handshake(mut self, enabled: bool) -> Self {
        self.options.use_handshake = enabled;
        self
    }

    /// Schedule DATA by priority
    pub fn use_priorities(mut self, enabled: bool) -> Self {
        self.options.use_priorities = enabled;
        self
    }

    /// Apply flow control
    pub fn use_flow_control(mut self, enabled: bool) -> Self {
        self.options.use_flow_control = enabled;
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.options.initial_window_size = size;
        self
    }

    /// Set max concurrent streams (`None` = unlimited)
    pub fn max_concurrent_streams(mut self, max: Option<u32>) -> Self {
        self.options.max_concurrent_streams = max;
        self
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: usize) -> Self {
        self.options.header_table_size = size;
        self
    }

    /// Set number of stream slots
    pub fn stream_pool_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_pool_capacity = capacity;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.options.ping_timeout = timeout;
        self
    }

    pub fn settings_timeout(mut self, timeout: Duration) -> Self {
        self.options.settings_timeout = timeout;
        self
    }

    /// Validate and return the options
    pub fn build(self) -> Result<SessionOptions> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Start a client session over `transport`
    pub fn client<T: Transport>(self, transport: T) -> Result<Session> {
        Session::client(transport, self.build()?)
    }

    /// Start a server session over `transport`
    pub fn server<T: Transport>(self, transport: T) -> Result<Session> {
        Session::server(transport, self.build()?)
    }
}
