use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::channels::{AmbientLightChannel, DistanceChannel, PollOutput};
use crate::config::ChannelConfig;
use crate::hub::Hub;
use crate::messages::{AmbientLightMessage, DistanceMessage, FaultMessage, Header, SensorMessage};
use crate::sink::TelemetryBus;

/// Spawn one polling task per channel. Every tick takes the hub lock for
/// the duration of the poll, which is the single mutual-exclusion point
/// serializing all bus access (including the recovery pulse sequence).
pub fn spawn_channel_tasks(
    hub: Arc<Mutex<Hub>>,
    mut distance: DistanceChannel,
    mut ambient: AmbientLightChannel,
    sink: Arc<TelemetryBus>,
    cfg: &ChannelConfig,
) {
    let interval = Duration::from_millis(cfg.distance_interval_ms);
    let report_errors = cfg.distance_error_channel;
    let d_hub = hub.clone();
    let d_sink = sink.clone();
    tokio::spawn(async move {
        info!("[distance] channel task started ({:?} interval)", interval);
        let mut seq = 0u64;
        let mut fault_seq = 0u64;
        loop {
            let out = {
                let mut hub = d_hub.lock().await;
                distance.poll(&mut hub).await
            };
            publish_output(&d_sink, out, report_errors, &mut seq, &mut fault_seq, |h, v| {
                SensorMessage::Distance(DistanceMessage {
                    h,
                    millimeters: v,
                })
            }, "distance");
            sleep(interval).await;
        }
    });

    let interval = Duration::from_millis(cfg.als_interval_ms);
    let report_errors = cfg.als_error_channel;
    tokio::spawn(async move {
        info!("[als] channel task started ({:?} interval)", interval);
        let mut seq = 0u64;
        let mut fault_seq = 0u64;
        loop {
            let out = {
                let mut hub = hub.lock().await;
                ambient.poll(&mut hub).await
            };
            publish_output(&sink, out, report_errors, &mut seq, &mut fault_seq, |h, v| {
                SensorMessage::AmbientLight(AmbientLightMessage { h, lux: v })
            }, "als");
            sleep(interval).await;
        }
    });
}

fn publish_output(
    sink: &TelemetryBus,
    out: PollOutput,
    report_errors: bool,
    seq: &mut u64,
    fault_seq: &mut u64,
    make: impl Fn(Header, f32) -> SensorMessage,
    channel: &str,
) {
    if let Some(reading) = out.measurement {
        *seq += 1;
        let msg = make(Header::new(channel.to_string(), *seq), reading.as_f32());
        if let Err(e) = sink.publish(msg) {
            debug!("[{}] publish skipped: {}", channel, e);
        }
    }
    if report_errors {
        if let Some(code) = out.fault {
            *fault_seq += 1;
            let msg = SensorMessage::Fault(FaultMessage {
                h: Header::new(format!("{}_error", channel), *fault_seq),
                code,
            });
            if let Err(e) = sink.publish(msg) {
                debug!("[{}] fault publish skipped: {}", channel, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Reading;

    #[tokio::test]
    async fn held_measurement_publishes_only_the_fault_code() {
        let sink = TelemetryBus::new(8);
        let mut rx = sink.subscribe();
        let mut seq = 0;
        let mut fault_seq = 0;

        let out = PollOutput {
            measurement: None,
            fault: Some(12.0),
        };
        publish_output(&sink, out, true, &mut seq, &mut fault_seq, |h, v| {
            SensorMessage::Distance(DistanceMessage { h, millimeters: v })
        }, "distance");

        match rx.try_recv().unwrap() {
            SensorMessage::Fault(f) => {
                assert_eq!(f.code, 12.0);
                assert_eq!(f.h.channel_id, "distance_error");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(seq, 0);
    }

    #[tokio::test]
    async fn no_reading_publishes_nan() {
        let sink = TelemetryBus::new(8);
        let mut rx = sink.subscribe();
        let mut seq = 0;
        let mut fault_seq = 0;

        let out = PollOutput {
            measurement: Some(Reading::NoReading),
            fault: Some(199.0),
        };
        publish_output(&sink, out, false, &mut seq, &mut fault_seq, |h, v| {
            SensorMessage::Distance(DistanceMessage { h, millimeters: v })
        }, "distance");

        match rx.try_recv().unwrap() {
            SensorMessage::Distance(d) => assert!(d.millimeters.is_nan()),
            other => panic!("unexpected message: {:?}", other),
        }
        // Error channel disabled: no fault message follows.
        assert!(rx.try_recv().is_err());
    }
}
