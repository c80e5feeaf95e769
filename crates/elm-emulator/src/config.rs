//! Emulator Settings
//!
//! Loaded from an optional TOML file, then overridden by `ELM_` environment
//! variables (`__` separates nested keys, e.g. `ELM_BUFFERS__FRAME_CAPACITY`).

use config::{Config, ConfigError, Environment, File};
use elm_protocol::{CanFrame, EmulatorConfig, SessionDefaults, DEFAULT_FILTER_SLOTS};
use ring_buffer::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// File looked up (with any supported extension) when no path is given
pub const DEFAULT_CONFIG_NAME: &str = "elm-emulator";

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
    /// Persisted adapter flags
    pub session: SessionDefaults,
    /// Capture buffer and filter table sizing
    pub buffers: BufferSettings,
    /// How hosts reach the emulator
    pub transport: TransportConfig,
    /// Simulated vehicle bus
    pub bus: BusConfig,
    /// Prometheus exporter address; metrics are not exported when unset
    pub metrics_listen: Option<SocketAddr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            session: SessionDefaults::default(),
            buffers: BufferSettings::default(),
            transport: TransportConfig::default(),
            bus: BusConfig::default(),
            metrics_listen: None,
        }
    }
}

impl Settings {
    /// Load settings from `path` (required) or the default file (optional),
    /// layered under environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("ELM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the emulator can't run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffers.frame_capacity < 2 {
            return Err(ConfigError::Message(format!(
                "buffers.frame_capacity must be at least 2, got {}",
                self.buffers.frame_capacity
            )));
        }
        if let Some(traffic) = self.bus.traffic.iter().find(|t| t.interval_ms == 0) {
            return Err(ConfigError::Message(format!(
                "bus.traffic frame {:03X} needs a non-zero interval_ms",
                traffic.frame.id
            )));
        }
        Ok(())
    }

    /// Settings handed to the protocol engine
    pub fn emulator_config(&self) -> EmulatorConfig {
        EmulatorConfig {
            session: self.session,
            filter_slots: self.buffers.filter_slots,
            monitor_filtering: self.buffers.monitor_filtering,
        }
    }
}

/// Capture buffer and filter table sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    /// Ring buffer slots (one is always kept free)
    pub frame_capacity: usize,
    /// Pass filter slots
    pub filter_slots: usize,
    /// Apply pass filters to monitor output
    pub monitor_filtering: bool,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_CAPACITY,
            filter_slots: DEFAULT_FILTER_SLOTS,
            monitor_filtering: false,
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// TCP listener, one client at a time
    Tcp(TcpConfig),
    /// Serial port, e.g. a Bluetooth RFCOMM device
    Serial(SerialConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Tcp(TcpConfig::default())
    }
}

/// TCP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:35000".to_string()
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/rfcomm0" or "COM3")
    pub device: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    115200
}

/// Simulated vehicle bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Attach a simulated engine ECU that answers PID requests
    pub ecu_enabled: bool,
    /// Identifier the simulated ECU answers from
    pub ecu_response_id: u32,
    /// Frames injected periodically, visible in monitor mode
    pub traffic: Vec<TrafficFrame>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            ecu_enabled: true,
            ecu_response_id: 0x7E8,
            traffic: Vec::new(),
        }
    }
}

/// A frame broadcast on a fixed period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficFrame {
    #[serde(flatten)]
    pub frame: CanFrame,
    /// Period in milliseconds
    pub interval_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = parse("");
        assert_eq!(settings.log_level, "info");
        assert!(!settings.session.headers);
        assert_eq!(settings.buffers.frame_capacity, 32);
        assert_eq!(settings.buffers.filter_slots, 32);
        assert!(settings.bus.ecu_enabled);
        assert!(matches!(
            settings.transport,
            TransportConfig::Tcp(ref tcp) if tcp.listen == "0.0.0.0:35000"
        ));
        settings.validate().unwrap();
    }

    #[test]
    fn test_full_file() {
        let settings = parse(
            r#"
            log_level = "debug"
            metrics_listen = "127.0.0.1:9100"

            [session]
            linefeed = true

            [buffers]
            frame_capacity = 64
            monitor_filtering = true

            [transport]
            type = "serial"
            device = "/dev/rfcomm0"

            [bus]
            ecu_enabled = false

            [[bus.traffic]]
            id = 0x3E9
            data = [1, 2, 3]
            interval_ms = 100
            "#,
        );

        assert!(settings.session.linefeed);
        assert_eq!(settings.buffers.frame_capacity, 64);
        assert_eq!(settings.buffers.filter_slots, 32);
        assert!(settings.emulator_config().monitor_filtering);
        assert_eq!(settings.metrics_listen, Some("127.0.0.1:9100".parse().unwrap()));
        match &settings.transport {
            TransportConfig::Serial(serial) => {
                assert_eq!(serial.device, "/dev/rfcomm0");
                assert_eq!(serial.baud_rate, 115200);
            }
            other => panic!("unexpected transport {:?}", other),
        }
        assert!(!settings.bus.ecu_enabled);
        assert_eq!(settings.bus.traffic.len(), 1);
        assert_eq!(settings.bus.traffic[0].frame.id, 0x3E9);
        assert_eq!(settings.bus.traffic[0].frame.payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.buffers.frame_capacity = 1;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.bus.traffic.push(TrafficFrame {
            frame: CanFrame::new(0x100, &[]).unwrap(),
            interval_ms: 0,
        });
        assert!(settings.validate().is_err());
    }
}
