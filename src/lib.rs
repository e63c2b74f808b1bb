// Public modules
pub mod bus;
pub mod calibration;
pub mod channels;
pub mod config;
pub mod errors;
pub mod hub;
pub mod messages;
pub mod scheduler;
pub mod sink;
pub mod vl6180x;

// Re-export commonly used types
pub use calibration::{strategy_from_name, CalibrationStrategy};
pub use channels::{AmbientLightChannel, DistanceChannel};
pub use config::{load_hub_config, HubConfig};
pub use errors::{ConfigError, HubError, HubResult};
pub use hub::{Hub, SensorSettings};
pub use scheduler::spawn_channel_tasks;
pub use sink::TelemetryBus;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bus::{BusPins, I2cBus};
use sink::spawn_console_logger;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Run the VL6180X hub with the given configuration file
pub async fn run_hub(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("[vl6180x-hub] starting up...");

    let cfg = load_hub_config(config_path)?;
    let pins = BusPins {
        sda: cfg.bus.sda_pin,
        scl: cfg.bus.scl_pin,
    };

    let bus = I2cBus::new(&cfg.bus.path, pins, cfg.bus.clock_hz)?;
    let settings = SensorSettings {
        address: cfg.sensor.address,
        als_gain: cfg.sensor.als_gain,
        pins,
        clock_hz: cfg.bus.clock_hz,
    };
    let mut hub = Hub::new(Box::new(bus), settings);

    // Setup failures are absorbed into the hub state: channels keep running
    // and publish fault values until a restart re-runs setup.
    if let Err(e) = hub.setup().await {
        error!("[hub] setup failed: {}", e);
    }
    hub.dump_config();

    let strategy = strategy_from_name(&cfg.sensor.calibration)?;
    let mut distance = DistanceChannel::new(cfg.sensor.range_offset_mm, strategy);
    if let Err(e) = distance.attach(&mut hub).await {
        warn!("[distance] attach failed: {}", e);
    }
    let ambient = AmbientLightChannel::new();

    let sink = Arc::new(TelemetryBus::new(64));
    spawn_console_logger(&sink);

    let hub = Arc::new(Mutex::new(hub));
    spawn_channel_tasks(hub, distance, ambient, sink, &cfg.channels);
    info!("[main] channel tasks launched");

    tokio::signal::ctrl_c().await?;
    info!("[main] shutting down");
    Ok(())
}
