//! Stream configuration.

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::event_buf::DEFAULT_EVENT_CAPACITY;

/// Options for opening a device stream.
///
/// # TOML Format
///
/// ```toml
/// output_channels = 2
/// buffer_frames = 256
/// sample_rate = 48000
/// stream_name = "main"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Backend-specific input device id. `None` selects the default device.
    pub input_device: Option<u32>,
    /// Backend-specific output device id. `None` selects the default device.
    pub output_device: Option<u32>,
    pub input_channels: u32,
    pub output_channels: u32,
    /// 1-based device channel of the first input lane.
    pub first_input_channel: u32,
    /// 1-based device channel of the first output lane.
    pub first_output_channel: u32,
    /// Requested sample rate; `None` lets the backend choose.
    pub sample_rate: Option<u32>,
    /// Requested frames per cycle. The backend may negotiate another size.
    pub buffer_frames: u32,
    /// Backend buffering hint.
    pub number_of_buffers: Option<u32>,
    pub stream_name: Option<String>,
    /// Byte capacity of event process buffers.
    pub event_buffer_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            input_channels: 0,
            output_channels: 0,
            first_input_channel: 1,
            first_output_channel: 1,
            sample_rate: None,
            buffer_frames: 256,
            number_of_buffers: None,
            stream_name: None,
            event_buffer_bytes: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl StreamConfig {
    /// Output-only configuration.
    pub fn output(channels: u32, buffer_frames: u32) -> Self {
        Self {
            output_channels: channels,
            buffer_frames,
            ..Self::default()
        }
    }

    /// Duplex configuration.
    pub fn duplex(inputs: u32, outputs: u32, buffer_frames: u32) -> Self {
        Self {
            input_channels: inputs,
            output_channels: outputs,
            buffer_frames,
            ..Self::default()
        }
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.stream_name = Some(name.into());
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_channels == 0 && self.output_channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        if self.input_channels > 0 && !(1..=self.input_channels).contains(&self.first_input_channel) {
            return Err(ConfigError::InvalidFirstChannel {
                direction: "input",
                first: self.first_input_channel,
                count: self.input_channels,
            });
        }
        if self.output_channels > 0 && !(1..=self.output_channels).contains(&self.first_output_channel) {
            return Err(ConfigError::InvalidFirstChannel {
                direction: "output",
                first: self.first_output_channel,
                count: self.output_channels,
            });
        }
        if self.buffer_frames == 0 {
            return Err(ConfigError::ZeroBufferFrames);
        }
        Ok(())
    }
}
