pub mod ambient;
pub mod distance;

pub use ambient::AmbientLightChannel;
pub use distance::DistanceChannel;

/// Out-of-band fault code meaning "hardware unavailable / bus timeout",
/// deliberately outside the peripheral's 0-15 status code range.
pub const FAULT_HARDWARE_UNAVAILABLE: f32 = 199.0;

/// A measurement as the sink sees it. `NoReading` publishes as NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Value(f32),
    NoReading,
}

impl Reading {
    pub fn as_f32(&self) -> f32 {
        match self {
            Reading::Value(v) => *v,
            Reading::NoReading => f32::NAN,
        }
    }
}

/// What one poll tick decided. `measurement: None` means hold the last
/// published value (the latching policy); `fault` carries the status code
/// for the optional error-reporting channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOutput {
    pub measurement: Option<Reading>,
    pub fault: Option<f32>,
}

impl PollOutput {
    /// Publish nothing on either channel this tick.
    pub fn silent() -> Self {
        Self {
            measurement: None,
            fault: None,
        }
    }
}
