//! Configuration for the rendezvous core

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PeerConnectError, Result};
use crate::protocol::{MessageCodec, DEFAULT_MAX_BODY_LEN, DEFAULT_MAX_NAME_LEN, MAX_NAME_LEN};

/// Service namespace both sides advertise and discover under
pub const DEFAULT_SERVICE_NAMESPACE: &str = "peerconnect.chat";

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the core channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for the command channel (UI → core)
    pub command_buffer_size: usize,
    /// Buffer size for the app event broadcast (core → UI)
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            app_event_buffer_size: 128,
        }
    }
}

// ----------------------------------------------------------------------------
// Rendezvous Configuration
// ----------------------------------------------------------------------------

/// Policy values for the rendezvous state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    pub service_namespace: String,
    /// Period of the discovery pulse
    #[serde(with = "duration_millis")]
    pub pulse_interval: Duration,
    /// Time the radio stack gets to release resources after a reset
    #[serde(with = "duration_millis")]
    pub settle_delay: Duration,
    pub max_name_len: usize,
    pub max_body_len: usize,
    pub channels: ChannelConfig,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            service_namespace: DEFAULT_SERVICE_NAMESPACE.to_string(),
            pulse_interval: Duration::from_secs(8),
            settle_delay: Duration::from_millis(1500),
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            channels: ChannelConfig::default(),
        }
    }
}

impl RendezvousConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace<T: Into<String>>(mut self, namespace: T) -> Self {
        self.service_namespace = namespace.into();
        self
    }

    pub fn with_pulse_interval(mut self, interval: Duration) -> Self {
        self.pulse_interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Codec honouring the configured field limits
    pub fn codec(&self) -> MessageCodec {
        MessageCodec::new(self.max_name_len, self.max_body_len)
    }

    /// Reject values the state machine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.service_namespace.trim().is_empty() {
            return Err(PeerConnectError::config_error("service_namespace must not be empty"));
        }
        if self.pulse_interval.is_zero() {
            return Err(PeerConnectError::config_error("pulse_interval must be greater than zero"));
        }
        if self.max_name_len == 0 || self.max_name_len > MAX_NAME_LEN {
            return Err(PeerConnectError::config_error(format!(
                "max_name_len must be between 1 and {}",
                MAX_NAME_LEN
            )));
        }
        if self.max_body_len == 0 || self.max_body_len > u32::MAX as usize {
            return Err(PeerConnectError::config_error("max_body_len out of range"));
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
