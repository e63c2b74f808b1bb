use tracing::{debug, info, warn};

use crate::bus::BusError;
use crate::calibration::{CalibrationAction, CalibrationStrategy};
use crate::channels::{PollOutput, Reading, FAULT_HARDWARE_UNAVAILABLE};
use crate::hub::Hub;
use crate::vl6180x::reg;

/// Consecutive bus timeouts before the manual 9-pulse recovery runs.
pub const BUS_RECOVERY_THRESHOLD: u32 = 5;
/// Below this many consecutive underflows the last published value stands.
pub const UNDERFLOW_HOLD_LIMIT: u32 = 10;
/// Above this many consecutive underflows the sensor gets refreshed.
pub const UNDERFLOW_REFRESH_LIMIT: u32 = 50;

/// Range status code for an internal underflow: target too close or
/// crosstalk pushed the algorithm below 0mm.
const RANGE_ERROR_UNDERFLOW: u8 = 12;

/// One ranging poll, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeClass {
    Valid(u8),
    Underflow,
    HardError(u8),
    BusTimeout,
}

impl RangeClass {
    fn status_code(&self) -> f32 {
        match self {
            RangeClass::Valid(_) => 0.0,
            RangeClass::Underflow => f32::from(RANGE_ERROR_UNDERFLOW),
            RangeClass::HardError(code) => f32::from(*code),
            RangeClass::BusTimeout => FAULT_HARDWARE_UNAVAILABLE,
        }
    }
}

fn classify_range(millimeters: u8, status: u8) -> RangeClass {
    match status >> 4 {
        0 => RangeClass::Valid(millimeters),
        RANGE_ERROR_UNDERFLOW => RangeClass::Underflow,
        code => RangeClass::HardError(code),
    }
}

/// Distance channel: applies the calibration strategy once at attach, then
/// classifies every ranging poll and runs the latching/backoff policy that
/// decides what gets published, held, or remediated.
pub struct DistanceChannel {
    user_offset: i8,
    strategy: Box<dyn CalibrationStrategy>,
    consecutive_errors: u32,
}

impl DistanceChannel {
    pub fn new(user_offset: i8, strategy: Box<dyn CalibrationStrategy>) -> Self {
        Self {
            user_offset,
            strategy,
            consecutive_errors: 0,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Runs once after the hub setup. No-op while the hub is uninitialized.
    /// Safe to call again on a host restart: the strategy applies the
    /// additive offset at most once per sensor power cycle.
    pub async fn attach(&mut self, hub: &mut Hub) -> Result<(), BusError> {
        if !hub.initialized {
            return Ok(());
        }
        match self.strategy.apply(hub, self.user_offset).await? {
            CalibrationAction::Applied { total } => {
                info!("cold boot: applied additive range offset (total={})", total);
            }
            CalibrationAction::Retained => {
                info!("soft reset: sensor retains previously calibrated offset");
            }
        }
        Ok(())
    }

    /// One scheduled tick.
    pub async fn poll(&mut self, hub: &mut Hub) -> PollOutput {
        if !hub.initialized {
            return PollOutput {
                measurement: Some(Reading::NoReading),
                fault: Some(FAULT_HARDWARE_UNAVAILABLE),
            };
        }

        let class = match hub.sensor.read_range_single().await {
            Ok(mm) => match hub.sensor.read_reg(reg::RESULT_RANGE_STATUS).await {
                Ok(status) => classify_range(mm, status),
                Err(_) => RangeClass::BusTimeout,
            },
            Err(_) => RangeClass::BusTimeout,
        };

        let fault = Some(class.status_code());
        match class {
            RangeClass::BusTimeout => self.on_bus_timeout(hub).await,
            RangeClass::Valid(mm) => {
                self.consecutive_errors = 0;
                PollOutput {
                    measurement: Some(Reading::Value(f32::from(mm))),
                    fault,
                }
            }
            RangeClass::Underflow => {
                self.consecutive_errors += 1;
                let measurement = if self.consecutive_errors < UNDERFLOW_HOLD_LIMIT {
                    // Latch: hold the last published value through short
                    // glitches instead of spiking the series with NaN.
                    debug!("range underflow (code 12), holding last published value");
                    None
                } else {
                    if self.consecutive_errors > UNDERFLOW_REFRESH_LIMIT {
                        warn!("persistent range underflow, refreshing sensor configuration");
                        if let Err(e) = hub.refresh_sensor().await {
                            warn!("sensor refresh failed: {}", e);
                        }
                        self.consecutive_errors = 0;
                    }
                    Some(Reading::NoReading)
                };
                PollOutput { measurement, fault }
            }
            RangeClass::HardError(code) => {
                // Hard logical errors surface immediately, no latching.
                debug!("range status code {}, reporting no reading", code);
                self.consecutive_errors = 0;
                PollOutput {
                    measurement: Some(Reading::NoReading),
                    fault,
                }
            }
        }
    }

    async fn on_bus_timeout(&mut self, hub: &mut Hub) -> PollOutput {
        self.consecutive_errors += 1;
        warn!(
            "I2C transaction failed (timeout/NACK), consecutive={}",
            self.consecutive_errors
        );

        if self.consecutive_errors >= BUS_RECOVERY_THRESHOLD {
            if let Err(e) = hub.recover_bus().await {
                warn!("bus recovery failed: {}", e);
            }
            self.consecutive_errors = 0;
        }

        PollOutput {
            measurement: Some(Reading::NoReading),
            fault: Some(FAULT_HARDWARE_UNAVAILABLE),
        }
    }
}
