use serde::{Deserialize, Serialize};

/// Device identifier stamped on every published message
pub const DEVICE_ID: &str = "vl6180x-hub";

/// Header metadata common to all published messages
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Header {
    /// Unique device identifier
    pub device_id: String,
    /// Channel identifier (e.g., "distance", "als", "distance_error")
    pub channel_id: String,
    /// Sequence number for message ordering
    pub seq: u64,
    /// UTC timestamp in nanoseconds
    pub t_utc_ns: u64,
    /// Message schema version for evolution
    pub schema_v: u16,
}

impl Header {
    /// Create a new header with the current timestamp
    pub fn new(channel_id: String, seq: u64) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        let t_utc_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        Self {
            device_id: DEVICE_ID.to_string(),
            channel_id,
            seq,
            t_utc_ns,
            schema_v: 1,
        }
    }
}

/// Distance measurement in millimeters; NaN means "no reading"
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DistanceMessage {
    pub h: Header,
    pub millimeters: f32,
}

/// Ambient light measurement in lux; NaN means "no reading"
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AmbientLightMessage {
    pub h: Header,
    pub lux: f32,
}

/// Out-of-band status/error code: the peripheral's 0-15 status codes, or
/// 199 for "hardware unavailable / bus timeout"
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FaultMessage {
    pub h: Header,
    pub code: f32,
}

/// Unified message enum for everything the hub publishes
#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum SensorMessage {
    Distance(DistanceMessage),
    AmbientLight(AmbientLightMessage),
    Fault(FaultMessage),
}

impl SensorMessage {
    /// Get the header from any message
    pub fn header(&self) -> &Header {
        match self {
            SensorMessage::Distance(msg) => &msg.h,
            SensorMessage::AmbientLight(msg) => &msg.h,
            SensorMessage::Fault(msg) => &msg.h,
        }
    }

    /// Get the channel ID from any message
    pub fn channel_id(&self) -> &str {
        &self.header().channel_id
    }

    /// Serialize to JSON for debugging. NaN readings come out as `null`,
    /// which JSON-consuming dashboards already treat as "no data".
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_creation() {
        let header = Header::new("distance".to_string(), 42);

        assert_eq!(header.device_id, DEVICE_ID);
        assert_eq!(header.channel_id, "distance");
        assert_eq!(header.seq, 42);
        assert_eq!(header.schema_v, 1);
        assert!(header.t_utc_ns > 0);
    }

    #[test]
    fn distance_message_serialization() {
        let msg = SensorMessage::Distance(DistanceMessage {
            h: Header::new("distance".to_string(), 1),
            millimeters: 87.0,
        });

        let json = msg.to_json().unwrap();
        assert!(json.contains("distance"));
        assert!(json.contains("87"));

        let decoded: SensorMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            SensorMessage::Distance(d) => {
                assert_eq!(d.millimeters, 87.0);
                assert_eq!(d.h.channel_id, "distance");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn no_reading_serializes_as_null() {
        let msg = SensorMessage::AmbientLight(AmbientLightMessage {
            h: Header::new("als".to_string(), 1),
            lux: f32::NAN,
        });
        assert!(msg.to_json().unwrap().contains("\"lux\":null"));
    }
}
