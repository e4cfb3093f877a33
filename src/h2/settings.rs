//! SETTINGS parameters
//!
//! Each SETTINGS entry on the wire is 8 bytes: an 8-bit reserved field, a
//! 24-bit identifier and a 32-bit value. A received frame is applied as a
//! whole; identifiers this engine does not know are ignored.

use super::error::{Error, Result};
use super::{DEFAULT_INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};
use std::fmt;

/// Bit 0 of FLOW_CONTROL_OPTIONS: the sender does not use flow control
pub const FLOW_CONTROL_DISABLED: u32 = 0x1;

/// Settings identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SettingsParameter {
    /// SETTINGS_MAX_CONCURRENT_STREAMS (4)
    /// Streams the sender allows the receiver to open
    MaxConcurrentStreams = 4,

    /// SETTINGS_INITIAL_WINDOW_SIZE (7)
    /// Initial stream window for data the receiver sends
    InitialWindowSize = 7,

    /// SETTINGS_FLOW_CONTROL_OPTIONS (10)
    /// Bit 0 turns flow control off for the whole connection
    FlowControlOptions = 10,
}

impl SettingsParameter {
    /// Convert to the 24-bit wire identifier
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create from a wire identifier
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            4 => Some(SettingsParameter::MaxConcurrentStreams),
            7 => Some(SettingsParameter::InitialWindowSize),
            10 => Some(SettingsParameter::FlowControlOptions),
            _ => None,
        }
    }

    /// Get parameter name
    pub fn name(&self) -> &'static str {
        match self {
            SettingsParameter::MaxConcurrentStreams => "MAX_CONCURRENT_STREAMS",
            SettingsParameter::InitialWindowSize => "INITIAL_WINDOW_SIZE",
            SettingsParameter::FlowControlOptions => "FLOW_CONTROL_OPTIONS",
        }
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u32())
    }
}

/// Connection settings
///
/// `None` means "not sent"; the getters fall back to protocol defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Maximum concurrent streams (default: unlimited)
    pub max_concurrent_streams: Option<u32>,

    /// Initial stream window size (default: 65535)
    pub initial_window_size: Option<u32>,

    /// Flow control option bits (default: 0)
    pub flow_control_options: Option<u32>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Settings::default()
    }

    /// Get max concurrent streams (None = unlimited)
    pub fn get_max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Get initial window size (with default)
    pub fn get_initial_window_size(&self) -> u32 {
        self.initial_window_size.unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Whether the sender of these settings turned flow control off
    pub fn flow_control_disabled(&self) -> bool {
        self.flow_control_options.unwrap_or(0) & FLOW_CONTROL_DISABLED != 0
    }

    /// Number of entries that will be written on the wire
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// True when no parameter is set
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set parameters as (parameter, value) pairs, in identifier order
    pub fn entries(&self) -> Vec<(SettingsParameter, u32)> {
        let mut entries = Vec::with_capacity(3);
        if let Some(val) = self.max_concurrent_streams {
            entries.push((SettingsParameter::MaxConcurrentStreams, val));
        }
        if let Some(val) = self.initial_window_size {
            entries.push((SettingsParameter::InitialWindowSize, val));
        }
        if let Some(val) = self.flow_control_options {
            entries.push((SettingsParameter::FlowControlOptions, val));
        }
        entries
    }

    /// Record a received entry; unknown identifiers are ignored
    pub fn set(&mut self, id: u32, value: u32) {
        match SettingsParameter::from_u32(id) {
            Some(SettingsParameter::MaxConcurrentStreams) => {
                self.max_concurrent_streams = Some(value)
            }
            Some(SettingsParameter::InitialWindowSize) => self.initial_window_size = Some(value),
            Some(SettingsParameter::FlowControlOptions) => self.flow_control_options = Some(value),
            None => {}
        }
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if let Some(initial_window_size) = self.initial_window_size {
            if initial_window_size > MAX_WINDOW_SIZE {
                return Err(Error::InvalidSettings(format!(
                    "Initial window size {} exceeds maximum (2^31-1)",
                    initial_window_size
                )));
            }
        }

        Ok(())
    }

    /// Merge settings from another Settings object
    /// (values in `other` override values in `self`)
    pub fn merge(&mut self, other: &Settings) {
        if other.max_concurrent_streams.is_some() {
            self.max_concurrent_streams = other.max_concurrent_streams;
        }
        if other.initial_window_size.is_some() {
            self.initial_window_size = other.initial_window_size;
        }
        if other.flow_control_options.is_some() {
            self.flow_control_options = other.flow_control_options;
        }
    }
}

/// Builder for connection settings
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Create a new settings builder
    pub fn new() -> Self {
        SettingsBuilder::default()
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings.max_concurrent_streams = Some(max);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings.initial_window_size = Some(size);
        self
    }

    /// Turn flow control off for the connection
    pub fn disable_flow_control(mut self) -> Self {
        self.settings.flow_control_options = Some(FLOW_CONTROL_DISABLED);
        self
    }

    /// Build the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_parameter_conversion() {
        assert_eq!(SettingsParameter::MaxConcurrentStreams.as_u32(), 4);
        assert_eq!(SettingsParameter::InitialWindowSize.as_u32(), 7);
        assert_eq!(SettingsParameter::FlowControlOptions.as_u32(), 10);

        assert_eq!(
            SettingsParameter::from_u32(7),
            Some(SettingsParameter::InitialWindowSize)
        );
        assert_eq!(SettingsParameter::from_u32(0xff), None);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.get_initial_window_size(), 65535);
        assert_eq!(settings.get_max_concurrent_streams(), None);
        assert!(!settings.flow_control_disabled());
        assert!(settings.is_empty());
    }

    #[test]
    fn test_settings_builder() {
        let settings = SettingsBuilder::new()
            .max_concurrent_streams(100)
            .initial_window_size(200_000)
            .disable_flow_control()
            .build()
            .unwrap();

        assert_eq!(settings.get_max_concurrent_streams(), Some(100));
        assert_eq!(settings.get_initial_window_size(), 200_000);
        assert!(settings.flow_control_disabled());
        assert_eq!(settings.len(), 3);
    }

    #[test]
    fn test_settings_validation() {
        assert!(SettingsBuilder::new().initial_window_size(0x7FFF_FFFF).build().is_ok());
        assert!(SettingsBuilder::new().initial_window_size(0x8000_0000).build().is_err());
    }

    #[test]
    fn test_settings_set_ignores_unknown() {
        let mut settings = Settings::new();
        settings.set(4, 10);
        settings.set(99, 1);
        assert_eq!(settings.max_concurrent_streams, Some(10));
        assert_eq!(settings.len(), 1);
    }

    #[test]
    fn test_settings_merge() {
        let mut settings1 = SettingsBuilder::new()
            .initial_window_size(1000)
            .build()
            .unwrap();

        let settings2 = SettingsBuilder::new()
            .initial_window_size(2000)
            .max_concurrent_streams(100)
            .build()
            .unwrap();

        settings1.merge(&settings2);

        assert_eq!(settings1.get_initial_window_size(), 2000);
        assert_eq!(settings1.get_max_concurrent_streams(), Some(100));
        assert!(!settings1.flow_control_disabled());
    }
}
