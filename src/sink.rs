use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::errors::SinkError;
use crate::messages::SensorMessage;

/// In-process fan-out for published measurements and fault codes. Consumers
/// subscribe independently; slow consumers drop old messages rather than
/// back-pressuring the channels.
#[derive(Clone)]
pub struct TelemetryBus {
    tx: broadcast::Sender<SensorMessage>,
}

impl TelemetryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SensorMessage> {
        self.tx.subscribe()
    }

    pub fn publish(&self, msg: SensorMessage) -> Result<usize, SinkError> {
        self.tx.send(msg).map_err(|_| SinkError::NoSubscribers)
    }
}

/// Log every published message as one JSON line.
pub fn spawn_console_logger(bus: &TelemetryBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => match msg.to_json() {
                    Ok(json) => info!("{}", json),
                    Err(e) => warn!("failed to serialize {}: {}", msg.channel_id(), e),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("console logger lagged, dropped {} message(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{DistanceMessage, Header};

    fn distance_msg(mm: f32) -> SensorMessage {
        SensorMessage::Distance(DistanceMessage {
            h: Header::new("distance".to_string(), 1),
            millimeters: mm,
        })
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = TelemetryBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(distance_msg(42.0)).unwrap();
        match rx.recv().await.unwrap() {
            SensorMessage::Distance(d) => assert_eq!(d.millimeters, 42.0),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_reports_error() {
        let bus = TelemetryBus::new(8);
        assert!(matches!(
            bus.publish(distance_msg(1.0)),
            Err(SinkError::NoSubscribers)
        ));
    }
}
