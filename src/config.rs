use serde::Deserialize;
use std::fs;

use crate::errors::{ConfigError, ConfigResult};

/// Root configuration struct for `hub.toml`
#[derive(Debug, Deserialize)]
pub struct HubConfig {
    pub bus: BusSection,
    pub sensor: SensorSection,
    #[serde(default)]
    pub channels: ChannelConfig,
}

/// `[bus]` section: the I2C character device and the physical lines
#[derive(Debug, Deserialize)]
pub struct BusSection {
    pub path: String,
    pub sda_pin: u8,
    pub scl_pin: u8,
    /// Stability-oriented default; signal integrity over long or noisy wires
    /// matters more than throughput here.
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,
}

/// `[sensor]` section
#[derive(Debug, Deserialize)]
pub struct SensorSection {
    #[serde(default = "default_address")]
    pub address: u8,
    #[serde(default = "default_als_gain")]
    pub als_gain: u32,
    /// User calibration offset added on top of the factory NVM value
    #[serde(default)]
    pub range_offset_mm: i8,
    /// Cold-boot detection strategy: "marker" or "reset-flag"
    #[serde(default = "default_calibration")]
    pub calibration: String,
}

/// `[channels]` section: poll cadence and optional error reporting
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_distance_interval")]
    pub distance_interval_ms: u64,
    #[serde(default = "default_als_interval")]
    pub als_interval_ms: u64,
    #[serde(default)]
    pub distance_error_channel: bool,
    #[serde(default)]
    pub als_error_channel: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            distance_interval_ms: default_distance_interval(),
            als_interval_ms: default_als_interval(),
            distance_error_channel: false,
            als_error_channel: false,
        }
    }
}

fn default_clock_hz() -> u32 {
    50_000
}

fn default_address() -> u8 {
    0x29
}

fn default_als_gain() -> u32 {
    20
}

fn default_calibration() -> String {
    "marker".to_string()
}

fn default_distance_interval() -> u64 {
    1_000
}

fn default_als_interval() -> u64 {
    10_000
}

/// Loads config from a TOML file
pub fn load_hub_config(path: &str) -> ConfigResult<HubConfig> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadError {
        path: path.to_string(),
        source: e,
    })?;
    let parsed: HubConfig = toml::from_str(&content)?;
    validate(&parsed)?;
    Ok(parsed)
}

fn validate(cfg: &HubConfig) -> ConfigResult<()> {
    if !matches!(cfg.sensor.calibration.as_str(), "marker" | "reset-flag") {
        return Err(ConfigError::InvalidValue {
            field: "sensor.calibration".to_string(),
            reason: format!("unknown strategy '{}'", cfg.sensor.calibration),
        });
    }
    if cfg.channels.distance_interval_ms == 0 || cfg.channels.als_interval_ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: "channels".to_string(),
            reason: "poll intervals must be nonzero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg: HubConfig = toml::from_str(
            r#"
            [bus]
            path = "/dev/i2c-1"
            sda_pin = 2
            scl_pin = 3

            [sensor]
            address = 41
            als_gain = 20
            range_offset_mm = -5
            calibration = "reset-flag"

            [channels]
            distance_interval_ms = 500
            als_interval_ms = 5000
            distance_error_channel = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.bus.clock_hz, 50_000);
        assert_eq!(cfg.sensor.address, 0x29);
        assert_eq!(cfg.sensor.range_offset_mm, -5);
        assert_eq!(cfg.sensor.calibration, "reset-flag");
        assert!(cfg.channels.distance_error_channel);
        assert!(!cfg.channels.als_error_channel);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn sensor_defaults_apply() {
        let cfg: HubConfig = toml::from_str(
            r#"
            [bus]
            path = "/dev/i2c-1"
            sda_pin = 2
            scl_pin = 3

            [sensor]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.sensor.address, 0x29);
        assert_eq!(cfg.sensor.als_gain, 20);
        assert_eq!(cfg.sensor.range_offset_mm, 0);
        assert_eq!(cfg.sensor.calibration, "marker");
        assert_eq!(cfg.channels.distance_interval_ms, 1_000);
    }

    #[test]
    fn unknown_calibration_strategy_fails_validation() {
        let cfg: HubConfig = toml::from_str(
            r#"
            [bus]
            path = "/dev/i2c-1"
            sda_pin = 2
            scl_pin = 3

            [sensor]
            calibration = "nvram"
            "#,
        )
        .unwrap();

        assert!(matches!(
            validate(&cfg),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
