use async_trait::async_trait;

use crate::bus::BusError;
use crate::errors::ConfigError;
use crate::hub::Hub;
use crate::vl6180x::{reg, MARKER_SENTINEL};

/// What a strategy did with the hardware offset register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationAction {
    /// Cold boot: factory NVM offset plus the user offset was written back.
    Applied { total: i8 },
    /// Soft reset: the hardware already holds the combined offset.
    Retained,
}

/// Cold-boot vs soft-reset disambiguation for the additive range offset.
///
/// The total offset (factory + user) must be computed additively at most
/// once per sensor power cycle; re-adding on every host restart would drift
/// the signed 8-bit register. Both variants guarantee that `apply` is
/// idempotent while the sensor stays powered.
#[async_trait]
pub trait CalibrationStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn apply(&self, hub: &mut Hub, user_offset: i8) -> Result<CalibrationAction, BusError>;
}

/// Canonical variant: a scratch register powers up as 0x00 and is set to a
/// sentinel byte right after the first offset application. Seeing the
/// sentinel means the sensor kept power across the host restart.
pub struct MarkerRegister;

#[async_trait]
impl CalibrationStrategy for MarkerRegister {
    fn name(&self) -> &'static str {
        "marker"
    }

    async fn apply(&self, hub: &mut Hub, user_offset: i8) -> Result<CalibrationAction, BusError> {
        let marker = hub.sensor.read_reg(reg::PERSISTENCE_SCRATCH).await?;
        if marker == MARKER_SENTINEL {
            return Ok(CalibrationAction::Retained);
        }

        let factory = hub.sensor.read_reg(reg::SYSRANGE_PART_TO_PART_OFFSET).await? as i8;
        // Same wraparound the 8-bit hardware register applies.
        let total = factory.wrapping_add(user_offset);
        hub.sensor
            .write_reg(reg::SYSRANGE_PART_TO_PART_OFFSET, total as u8)
            .await?;
        hub.sensor
            .write_reg(reg::PERSISTENCE_SCRATCH, MARKER_SENTINEL)
            .await?;
        Ok(CalibrationAction::Applied { total })
    }
}

/// Alternative variant: branch on the "fresh out of reset" bit the hub
/// captured (and acknowledged) during setup instead of a marker byte. The
/// hub hands the flag out once, so repeated attach calls stay idempotent.
pub struct ResetFlag;

#[async_trait]
impl CalibrationStrategy for ResetFlag {
    fn name(&self) -> &'static str {
        "reset-flag"
    }

    async fn apply(&self, hub: &mut Hub, user_offset: i8) -> Result<CalibrationAction, BusError> {
        if !hub.take_fresh_flag() {
            return Ok(CalibrationAction::Retained);
        }

        let factory = hub.sensor.read_reg(reg::SYSRANGE_PART_TO_PART_OFFSET).await? as i8;
        let total = factory.wrapping_add(user_offset);
        hub.sensor
            .write_reg(reg::SYSRANGE_PART_TO_PART_OFFSET, total as u8)
            .await?;
        Ok(CalibrationAction::Applied { total })
    }
}

/// Resolve the strategy named in the configuration file.
pub fn strategy_from_name(name: &str) -> Result<Box<dyn CalibrationStrategy>, ConfigError> {
    match name {
        "marker" => Ok(Box::new(MarkerRegister)),
        "reset-flag" => Ok(Box::new(ResetFlag)),
        other => Err(ConfigError::InvalidValue {
            field: "sensor.calibration".to_string(),
            reason: format!("unknown strategy '{}', expected 'marker' or 'reset-flag'", other),
        }),
    }
}
