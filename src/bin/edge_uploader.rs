//! ==============================================================================
//! edge_uploader.rs - sensor-gated photo uploader entry point
//! ==============================================================================
//!
//! purpose:
//!     reads light, climate and uv every cycle. when the uv index is above
//!     the threshold it takes a photo and uploads it together with a json
//!     snapshot of the readings.
//!
//! relationships:
//!     - uses: hal.rs (i2c sensors), camera.rs, storage.rs, edge.rs
//!     - reads: config/cloud-riddle.toml [sensors] [camera] [storage] [polling]
//!
//! ==============================================================================

use anyhow::Result;

use cloud_riddle::camera::LibcameraStill;
use cloud_riddle::config::{self, AppConfig};
use cloud_riddle::edge::EdgeUploader;
use cloud_riddle::hal::Hal;
use cloud_riddle::storage::Storage;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let env_file = config::load_env();
    let config = AppConfig::load_or_default();
    cloud_riddle::init_logging(&config.logging.level);

    tracing::info!("===========================================================");
    tracing::info!("  Edge Sensor Uploader");
    tracing::info!("===========================================================");
    if let Some(path) = env_file {
        tracing::info!("[CONFIG] Environment seeded from {}", path.display());
    }
    config.print_summary();

    let sensors = match Hal::new(&config.sensors) {
        Ok(hal) => {
            tracing::info!("[STARTUP] ✓ Sensors ready");
            hal
        }
        Err(e) => {
            tracing::error!("[ERROR] Fatal: failed to open sensors: {:#}", e);
            return Err(e);
        }
    };
    let store = match Storage::from_config(&config.storage) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("[ERROR] Fatal: failed to set up storage: {:#}", e);
            return Err(e);
        }
    };
    let camera = LibcameraStill::new(&config.camera);

    tracing::info!(
        "[RUNTIME] Reading sensors every {}s, photos above UV {}",
        config.polling.edge_interval_seconds,
        config.sensors.uv_threshold
    );
    let mut uploader =
        EdgeUploader::new(sensors, camera, store, &config.sensors).show_sensor_data(config.logging.show_sensor_data);
    uploader.run(config.polling.edge_interval(), cloud_riddle::shutdown_signal()).await;
    Ok(())
}
