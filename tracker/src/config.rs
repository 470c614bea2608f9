/*!
Configuration management for the tracker application.
*/

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use tracker_core::TrackerConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub tracker: TrackerConfig,
    pub sampler: SamplerConfig,
    pub gui: GuiConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        config.tracker.validate()
            .with_context(|| format!("Invalid tracker settings in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

/// Which transport feeds the decoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Serial,
    Udp,
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParitySetting {
    None,
    #[default]
    Odd,
    Even,
}

/// Transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,

    /// Serial port name (e.g. `COM3` or `/dev/ttyUSB0`)
    pub serial_port: String,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Serial data bits (5-8)
    pub data_bits: u8,

    pub parity: ParitySetting,

    /// Serial stop bits (1 or 2)
    pub stop_bits: u8,

    /// UDP bind address
    pub udp_bind_addr: String,

    /// UDP port to listen on
    pub udp_port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Serial,
            serial_port: String::new(),
            baud_rate: 38_400,
            data_bits: 8,
            parity: ParitySetting::Odd,
            stop_bits: 1,
            udp_bind_addr: "0.0.0.0".to_string(),
            udp_port: 40_000,
        }
    }
}

/// Headless sampler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// How often a sample is printed
    pub interval_ms: u64,

    /// Pretty-print JSON samples
    pub pretty: bool,
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            pretty: false,
        }
    }
}

/// GUI specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    /// Window width
    pub window_width: f32,

    /// Window height
    pub window_height: f32,

    /// Enable dark mode
    pub dark_mode: bool,

    /// Auto-save configuration on exit
    pub auto_save_config: bool,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            window_width: 720.0,
            window_height: 640.0,
            dark_mode: true,
            auto_save_config: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tracker_core::CalibrationMode;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = AppConfig::new();
        original_config.transport.serial_port = "COM4".to_string();
        original_config.tracker.offsets.rotate.y = 90.0;

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        // Save and load
        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_path).unwrap();

        assert_eq!(loaded_config.transport, original_config.transport);
        assert_eq!(loaded_config.tracker, original_config.tracker);
        assert_eq!(loaded_config.sampler, original_config.sampler);
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::new();

        assert_eq!(config.transport.kind, TransportKind::Serial);
        assert_eq!(config.transport.baud_rate, 38_400);
        assert_eq!(config.transport.data_bits, 8);
        assert_eq!(config.transport.parity, ParitySetting::Odd);
        assert_eq!(config.transport.stop_bits, 1);
        assert_eq!(config.tracker.device_id, 1);
        assert_eq!(config.sampler.interval(), Duration::from_millis(100));
        assert!(config.gui.dark_mode);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [transport]
            kind = "udp"
            udp_port = 6301

            [tracker]
            device_id = 2
            calibration = "manual"
            "#,
        )
        .unwrap();

        assert_eq!(config.transport.kind, TransportKind::Udp);
        assert_eq!(config.transport.udp_port, 6301);
        assert_eq!(config.transport.baud_rate, 38_400);
        assert_eq!(config.tracker.device_id, 2);
        assert_eq!(config.tracker.calibration, CalibrationMode::Manual);
    }

    #[test]
    fn test_invalid_tracker_settings_are_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[tracker]\nread_timeout_ms = 0\n").unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).is_err());
    }
}
