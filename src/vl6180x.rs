use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::bus::{BusError, BusTransport};

/// Register map used by this component. Indices are 16-bit.
pub mod reg {
    /// Identity register, reads back [`MODEL_ID`](super::MODEL_ID)
    pub const IDENTIFICATION_MODEL_ID: u16 = 0x000;
    /// Power-on status, captured at setup for the reset-flag calibration variant
    pub const RESET_STATUS: u16 = 0x010;
    /// Scratch byte that survives host restarts while the sensor stays powered
    pub const PERSISTENCE_SCRATCH: u16 = 0x011;
    pub const SYSTEM_INTERRUPT_CLEAR: u16 = 0x015;
    /// "Fresh out of reset" bit, acknowledged (cleared) once configured
    pub const FRESH_OUT_OF_RESET: u16 = 0x016;
    pub const SYSRANGE_START: u16 = 0x018;
    /// Part-to-part range offset, signed 8-bit, factory value from NVM
    pub const SYSRANGE_PART_TO_PART_OFFSET: u16 = 0x024;
    pub const SYSALS_START: u16 = 0x038;
    pub const SYSALS_ANALOGUE_GAIN: u16 = 0x03F;
    /// ALS integration period, 16-bit
    pub const SYSALS_INTEGRATION_PERIOD: u16 = 0x040;
    /// Range error code in bits [7:4]
    pub const RESULT_RANGE_STATUS: u16 = 0x04D;
    /// ALS error code in bits [5:3]
    pub const RESULT_ALS_STATUS: u16 = 0x04E;
    pub const RESULT_INTERRUPT_STATUS: u16 = 0x04F;
    pub const RESULT_ALS_VAL: u16 = 0x050;
    pub const RESULT_RANGE_VAL: u16 = 0x062;
}

/// Expected value of the identity register.
pub const MODEL_ID: u8 = 0xB4;

/// Marker byte written to the persistence scratch register after the first
/// calibration-offset application. The register powers up as 0x00.
pub const MARKER_SENTINEL: u8 = 0x12;

/// 100ms ALS integration period register setting. Long enough that light
/// readings do not time out at default gain.
pub const ALS_INTEGRATION_100MS: u16 = 0x0063;

/// Fast tier, used for ranging.
pub const RANGING_TIMEOUT: Duration = Duration::from_millis(50);
/// Wide tier, applied only around a single ALS measurement.
pub const ALS_TIMEOUT: Duration = Duration::from_millis(250);
/// Generous tier, used while the hub runs its one-time setup.
pub const SETUP_TIMEOUT: Duration = Duration::from_millis(500);

/// Mandatory private tuning registers, loaded once after power-up
/// (ST application note AN4545). Values are opaque.
const TUNING: &[(u16, u8)] = &[
    (0x0207, 0x01),
    (0x0208, 0x01),
    (0x0096, 0x00),
    (0x0097, 0xFD),
    (0x00E3, 0x00),
    (0x00E4, 0x04),
    (0x00E5, 0x02),
    (0x00E6, 0x01),
    (0x00E7, 0x03),
    (0x00F5, 0x02),
    (0x00D9, 0x05),
    (0x00DB, 0xCE),
    (0x00DC, 0x03),
    (0x00DD, 0xF8),
    (0x009F, 0x00),
    (0x00A3, 0x3C),
    (0x00B7, 0x00),
    (0x00BB, 0x3C),
    (0x00B2, 0x09),
    (0x00CA, 0x09),
    (0x0198, 0x01),
    (0x01B0, 0x17),
    (0x01AD, 0x00),
    (0x00FF, 0x05),
    (0x0100, 0x05),
    (0x0199, 0x05),
    (0x01A6, 0x1B),
    (0x01AC, 0x3E),
    (0x01A7, 0x1F),
    (0x0030, 0x00),
];

/// Recommended public configuration: averaging, default gain, VHV
/// calibration cadence, intermeasurement periods, interrupt routing.
const DEFAULT_CONFIG: &[(u16, u8)] = &[
    (0x010A, 0x30), // readout averaging sample period
    (0x003F, 0x46), // analogue gain (reset to lowest; the hub reapplies its tier)
    (0x0031, 0xFF), // VHV repeat rate, every 255 measurements
    (0x002E, 0x01), // perform a single VHV recalibration
    (0x001C, 0x31), // max convergence time
    (0x001B, 0x09), // range intermeasurement period
    (0x003E, 0x31), // ALS intermeasurement period
    (0x0014, 0x24), // interrupt on new sample ready, both channels
];

/// Wrapper over the peripheral's register-level operations: single-shot
/// measurements bounded by a configurable per-operation timeout, plus the
/// raw register access the hub and calibration code need.
pub struct Vl6180x {
    bus: Box<dyn BusTransport>,
    address: u8,
    io_timeout: Duration,
    bus_timed_out: bool,
}

impl Vl6180x {
    pub fn new(bus: Box<dyn BusTransport>, address: u8) -> Self {
        Self {
            bus,
            address,
            io_timeout: SETUP_TIMEOUT,
            bus_timed_out: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = timeout;
    }

    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Sticky flag: set when a measurement times out or fails mid-transfer,
    /// cleared by the next successful measurement. The ALS channel checks it
    /// before touching a possibly stuck bus.
    pub fn bus_timed_out(&self) -> bool {
        self.bus_timed_out
    }

    /// Exclusive access to the underlying transport for bus recovery.
    pub fn bus_mut(&mut self) -> &mut dyn BusTransport {
        self.bus.as_mut()
    }

    pub async fn read_reg(&mut self, reg: u16) -> Result<u8, BusError> {
        self.bus.read_reg(self.address, reg).await
    }

    pub async fn read_reg16(&mut self, reg: u16) -> Result<u16, BusError> {
        self.bus.read_reg16(self.address, reg).await
    }

    pub async fn write_reg(&mut self, reg: u16, value: u8) -> Result<(), BusError> {
        self.bus.write_reg(self.address, reg, value).await
    }

    pub async fn write_reg16(&mut self, reg: u16, value: u16) -> Result<(), BusError> {
        self.bus.write_reg16(self.address, reg, value).await
    }

    /// Load the mandatory tuning registers if the sensor reports fresh out
    /// of reset. A sensor that kept power across a host restart skips the
    /// list, its registers are already loaded.
    pub async fn init(&mut self) -> Result<(), BusError> {
        let fresh = self.read_reg(reg::FRESH_OUT_OF_RESET).await? & 0x01;
        if fresh == 0x01 {
            for &(r, v) in TUNING {
                self.write_reg(r, v).await?;
            }
        }
        Ok(())
    }

    /// Apply the recommended public register configuration.
    pub async fn configure_default(&mut self) -> Result<(), BusError> {
        for &(r, v) in DEFAULT_CONFIG {
            self.write_reg(r, v).await?;
        }
        self.write_reg16(reg::SYSALS_INTEGRATION_PERIOD, ALS_INTEGRATION_100MS)
            .await
    }

    /// Single-shot ranging. Blocks until the reading completes or the
    /// configured timeout elapses; either failure marks the bus timed out.
    pub async fn read_range_single(&mut self) -> Result<u8, BusError> {
        let result = self.range_single_inner().await;
        self.bus_timed_out = result.is_err();
        result
    }

    async fn range_single_inner(&mut self) -> Result<u8, BusError> {
        self.write_reg(reg::SYSRANGE_START, 0x01).await?;
        self.wait_ready(0x07, 0x04).await?;
        let range = self.read_reg(reg::RESULT_RANGE_VAL).await?;
        self.write_reg(reg::SYSTEM_INTERRUPT_CLEAR, 0x07).await?;
        Ok(range)
    }

    /// Single-shot ambient light measurement, raw 16-bit count.
    pub async fn read_ambient_single(&mut self) -> Result<u16, BusError> {
        let result = self.ambient_single_inner().await;
        self.bus_timed_out = result.is_err();
        result
    }

    async fn ambient_single_inner(&mut self) -> Result<u16, BusError> {
        self.write_reg(reg::SYSALS_START, 0x01).await?;
        self.wait_ready(0x38, 0x20).await?;
        let raw = self.read_reg16(reg::RESULT_ALS_VAL).await?;
        self.write_reg(reg::SYSTEM_INTERRUPT_CLEAR, 0x07).await?;
        Ok(raw)
    }

    async fn wait_ready(&mut self, mask: u8, ready: u8) -> Result<(), BusError> {
        let deadline = Instant::now() + self.io_timeout;
        loop {
            let status = self.read_reg(reg::RESULT_INTERRUPT_STATUS).await?;
            if status & mask == ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                trace!("measurement wait exceeded {:?}", self.io_timeout);
                return Err(BusError::Timeout {
                    ms: self.io_timeout.as_millis() as u64,
                });
            }
            sleep(Duration::from_millis(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{MockBus, MockState};

    fn sensor() -> (Vl6180x, std::sync::Arc<std::sync::Mutex<MockState>>) {
        let state = MockState::powered_vl6180x();
        let bus = MockBus {
            state: state.clone(),
        };
        (Vl6180x::new(Box::new(bus), 0x29), state)
    }

    #[tokio::test]
    async fn range_single_reads_value_and_clears_interrupt() {
        let (mut dev, state) = sensor();
        state.lock().unwrap().regs.insert(reg::RESULT_RANGE_VAL, 42);

        let range = dev.read_range_single().await.unwrap();
        assert_eq!(range, 42);
        assert!(!dev.bus_timed_out());
        let writes = &state.lock().unwrap().writes;
        assert!(writes.contains(&(reg::SYSRANGE_START, 0x01)));
        assert!(writes.contains(&(reg::SYSTEM_INTERRUPT_CLEAR, 0x07)));
    }

    #[tokio::test(start_paused = true)]
    async fn range_single_times_out_when_never_ready() {
        let (mut dev, state) = sensor();
        state
            .lock()
            .unwrap()
            .regs
            .insert(reg::RESULT_INTERRUPT_STATUS, 0x00);
        dev.set_io_timeout(RANGING_TIMEOUT);

        let err = dev.read_range_single().await.unwrap_err();
        assert!(matches!(err, BusError::Timeout { ms: 50 }));
        assert!(dev.bus_timed_out());
    }

    #[tokio::test]
    async fn timeout_flag_clears_on_next_success() {
        let (mut dev, state) = sensor();
        state.lock().unwrap().fail_transfers = true;
        assert!(dev.read_range_single().await.is_err());
        assert!(dev.bus_timed_out());

        state.lock().unwrap().fail_transfers = false;
        dev.read_range_single().await.unwrap();
        assert!(!dev.bus_timed_out());
    }

    #[tokio::test]
    async fn init_skips_tuning_after_reset_acknowledged() {
        let (mut dev, state) = sensor();
        state.lock().unwrap().regs.insert(reg::FRESH_OUT_OF_RESET, 0x00);

        dev.init().await.unwrap();
        assert!(state.lock().unwrap().writes.is_empty());
    }

    #[tokio::test]
    async fn init_loads_tuning_when_fresh() {
        let (mut dev, state) = sensor();
        dev.init().await.unwrap();
        let writes = &state.lock().unwrap().writes;
        assert!(writes.contains(&(0x0207, 0x01)));
        assert!(writes.contains(&(0x0030, 0x00)));
    }
}
