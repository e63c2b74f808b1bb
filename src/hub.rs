use tracing::{error, info, warn};

use crate::bus::{BusError, BusPins, BusTransport};
use crate::errors::{HubError, HubResult};
use crate::vl6180x::{reg, Vl6180x, ALS_INTEGRATION_100MS, MODEL_ID, RANGING_TIMEOUT, SETUP_TIMEOUT};

/// Static sensor configuration the hub needs at setup time.
#[derive(Debug, Clone, Copy)]
pub struct SensorSettings {
    pub address: u8,
    pub als_gain: u32,
    pub pins: BusPins,
    pub clock_hz: u32,
}

/// Map a human gain tier onto one of the four documented analogue-gain
/// register codes. Total and deterministic.
pub fn analogue_gain_code(gain: u32) -> u8 {
    if gain <= 1 {
        0x46
    } else if gain <= 10 {
        0x43
    } else if gain <= 40 {
        0x41
    } else {
        0x44 // default 1.67x
    }
}

/// Owns the sensor handle (which owns the bus) and performs the one-time
/// identification and configuration. Both channels read `initialized` before
/// attempting any bus I/O.
pub struct Hub {
    pub sensor: Vl6180x,
    pub initialized: bool,
    /// Warning indication, raised when identification fails.
    pub fault: bool,
    settings: SensorSettings,
    fresh_at_setup: bool,
}

impl Hub {
    pub fn new(bus: Box<dyn BusTransport>, settings: SensorSettings) -> Self {
        Self {
            sensor: Vl6180x::new(bus, settings.address),
            initialized: false,
            fault: false,
            settings,
            fresh_at_setup: false,
        }
    }

    /// One-time identification and configuration. On identity mismatch the
    /// hub stays uninitialized and no further register writes happen; every
    /// dependent channel then short-circuits without bus I/O.
    pub async fn setup(&mut self) -> HubResult<()> {
        info!(
            "starting VL6180X hub on sda:{} scl:{} @ {}Hz",
            self.settings.pins.sda, self.settings.pins.scl, self.settings.clock_hz
        );
        self.initialized = false;
        self.sensor.set_io_timeout(SETUP_TIMEOUT);

        let result = self.setup_inner().await;
        match &result {
            Ok(()) => {
                self.initialized = true;
                self.fault = false;
                info!("VL6180X successfully identified and initialized");
            }
            Err(e) => {
                self.fault = true;
                error!("HARDWARE FAILURE: VL6180X not usable: {}", e);
            }
        }
        result
    }

    async fn setup_inner(&mut self) -> HubResult<()> {
        self.sensor.init().await?;

        let id = self.sensor.read_reg(reg::IDENTIFICATION_MODEL_ID).await?;
        if id != MODEL_ID {
            return Err(HubError::Identification {
                expected: MODEL_ID,
                actual: id,
            });
        }

        self.sensor.configure_default().await?;
        self.sensor
            .write_reg16(reg::SYSALS_INTEGRATION_PERIOD, ALS_INTEGRATION_100MS)
            .await?;

        // Capture the power-on flag for the reset-flag calibration variant,
        // then acknowledge the reset so the next host restart can tell a
        // continuously powered sensor from a cold one.
        self.fresh_at_setup = self.sensor.read_reg(reg::RESET_STATUS).await? & 0x01 == 0x01;
        self.sensor.write_reg(reg::FRESH_OUT_OF_RESET, 0x00).await?;

        self.sensor.set_io_timeout(RANGING_TIMEOUT);

        let gain = analogue_gain_code(self.settings.als_gain);
        self.sensor.write_reg(reg::SYSALS_ANALOGUE_GAIN, gain).await?;
        Ok(())
    }

    /// Side-effect-free diagnostic dump.
    pub fn dump_config(&self) {
        info!("VL6180X hub configuration:");
        info!("  I2C address: {:#04x}", self.settings.address);
        info!(
            "  pins: sda:{} scl:{} @ {}Hz",
            self.settings.pins.sda, self.settings.pins.scl, self.settings.clock_hz
        );
        info!("  ALS gain tier: {}", self.settings.als_gain);
    }

    /// True exactly once per power cycle: whether the sensor reported fresh
    /// out of reset when `setup()` ran. Consumed by the reset-flag
    /// calibration strategy so repeated attach calls stay idempotent.
    pub fn take_fresh_flag(&mut self) -> bool {
        std::mem::take(&mut self.fresh_at_setup)
    }

    /// Manual bus recovery: 9-pulse clock release, controller reinit, then
    /// peripheral reinitialize and reconfigure. Runs under the single hub
    /// lock, so no other transaction can interleave.
    pub async fn recover_bus(&mut self) -> Result<(), BusError> {
        warn!("I2C bus frozen, applying 9-pulse clock release");
        self.sensor.bus_mut().pulse_clock_line(9)?;
        self.sensor.bus_mut().reinit()?;
        self.refresh_sensor().await
    }

    /// Reinitialize and reconfigure the peripheral without touching the
    /// bus lines.
    pub async fn refresh_sensor(&mut self) -> Result<(), BusError> {
        self.sensor.init().await?;
        self.sensor.configure_default().await?;
        self.sensor.set_io_timeout(RANGING_TIMEOUT);
        Ok(())
    }
}
