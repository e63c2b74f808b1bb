use tracing::{debug, warn};

use crate::channels::{PollOutput, Reading, FAULT_HARDWARE_UNAVAILABLE};
use crate::hub::Hub;
use crate::vl6180x::{reg, ALS_TIMEOUT, RANGING_TIMEOUT};

/// Ambient light channel. Stateless between ticks: it never latches, and it
/// reports nothing at all while the hub is unusable or the bus is stuck.
pub struct AmbientLightChannel;

impl AmbientLightChannel {
    pub fn new() -> Self {
        Self
    }

    /// One scheduled tick. Light integration takes longer than ranging, so
    /// the operation timeout is widened for this single measurement and
    /// restored right after.
    pub async fn poll(&mut self, hub: &mut Hub) -> PollOutput {
        if !hub.initialized {
            return PollOutput::silent();
        }
        if hub.sensor.bus_timed_out() {
            // Don't compound a stuck bus; the distance channel owns recovery.
            debug!("ALS poll skipped, bus is in a timeout state");
            return PollOutput::silent();
        }

        // Clear pending interrupt status so the measurement starts fresh.
        if hub
            .sensor
            .write_reg(reg::SYSTEM_INTERRUPT_CLEAR, 0x07)
            .await
            .is_err()
        {
            warn!("ALS interrupt clear failed");
            return PollOutput {
                measurement: Some(Reading::NoReading),
                fault: Some(FAULT_HARDWARE_UNAVAILABLE),
            };
        }

        hub.sensor.set_io_timeout(ALS_TIMEOUT);
        let result = hub.sensor.read_ambient_single().await;
        hub.sensor.set_io_timeout(RANGING_TIMEOUT);

        let lux = match result {
            Ok(raw) => raw,
            Err(_) => {
                warn!("ALS timeout, light integration failed");
                return PollOutput {
                    measurement: Some(Reading::NoReading),
                    fault: Some(FAULT_HARDWARE_UNAVAILABLE),
                };
            }
        };

        let code = match hub.sensor.read_reg(reg::RESULT_ALS_STATUS).await {
            Ok(status) => (status >> 3) & 0x07,
            Err(_) => {
                return PollOutput {
                    measurement: Some(Reading::NoReading),
                    fault: Some(FAULT_HARDWARE_UNAVAILABLE),
                }
            }
        };

        // Unlike the distance channel, a nonzero ALS status code does not
        // suppress publication. Historical policy, kept as-is.
        PollOutput {
            measurement: Some(Reading::Value(f32::from(lux))),
            fault: Some(f32::from(code)),
        }
    }
}

impl Default for AmbientLightChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testhub::{hub_with_mock, ready_hub};

    #[tokio::test]
    async fn uninitialized_hub_publishes_nothing() {
        let (mut hub, state) = hub_with_mock();
        {
            let mut s = state.lock().unwrap();
            s.regs.insert(reg::IDENTIFICATION_MODEL_ID, 0x00);
            s.regs.insert(0x016, 0x00);
        }
        assert!(hub.setup().await.is_err());
        let reads_before = state.lock().unwrap().reads;

        let out = AmbientLightChannel::new().poll(&mut hub).await;
        assert_eq!(out, PollOutput::silent());
        assert_eq!(state.lock().unwrap().reads, reads_before);
    }

    #[tokio::test]
    async fn publishes_lux_even_with_nonzero_status_code() {
        let (mut hub, state) = ready_hub().await;
        {
            let mut s = state.lock().unwrap();
            s.regs16.insert(reg::RESULT_ALS_VAL, 321);
            s.regs.insert(reg::RESULT_ALS_STATUS, 3 << 3);
        }

        let out = AmbientLightChannel::new().poll(&mut hub).await;
        assert_eq!(out.measurement, Some(Reading::Value(321.0)));
        assert_eq!(out.fault, Some(3.0));
    }

    #[tokio::test]
    async fn restores_ranging_timeout_after_measurement() {
        let (mut hub, state) = ready_hub().await;
        state.lock().unwrap().regs16.insert(reg::RESULT_ALS_VAL, 10);

        AmbientLightChannel::new().poll(&mut hub).await;
        // The next ranging poll must not inherit the wide ALS timeout.
        assert_eq!(hub.sensor.io_timeout(), RANGING_TIMEOUT);
    }

    #[tokio::test]
    async fn timeout_reports_fault_and_no_reading() {
        let (mut hub, state) = ready_hub().await;
        state.lock().unwrap().fail_transfers = true;

        let out = AmbientLightChannel::new().poll(&mut hub).await;
        assert_eq!(out.measurement, Some(Reading::NoReading));
        assert_eq!(out.fault, Some(FAULT_HARDWARE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn skips_tick_while_bus_is_in_timeout_state() {
        let (mut hub, state) = ready_hub().await;

        // A failed ranging measurement leaves the sticky timeout flag set.
        state.lock().unwrap().fail_transfers = true;
        assert!(hub.sensor.read_range_single().await.is_err());
        state.lock().unwrap().fail_transfers = false;

        let reads_before = state.lock().unwrap().reads;
        let out = AmbientLightChannel::new().poll(&mut hub).await;
        assert_eq!(out, PollOutput::silent());
        assert_eq!(state.lock().unwrap().reads, reads_before);

        // A successful ranging poll clears the flag and the ALS resumes.
        assert!(hub.sensor.read_range_single().await.is_ok());
        let out = AmbientLightChannel::new().poll(&mut hub).await;
        assert!(matches!(out.measurement, Some(Reading::Value(_))));
    }
}
