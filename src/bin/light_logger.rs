//! ==============================================================================
//! light_logger.rs - ambient light logger entry point
//! ==============================================================================
//!
//! purpose:
//!     reads the veml7700 every cycle and pushes {timestamp, lux} records
//!     into the realtime database.
//!
//! relationships:
//!     - uses: hal.rs, realtime.rs, light.rs
//!     - reads: config/cloud-riddle.toml [sensors] [realtime] [polling]
//!
//! ==============================================================================

use anyhow::Result;

use cloud_riddle::config::{self, AppConfig};
use cloud_riddle::hal::Hal;
use cloud_riddle::light::LightLogger;
use cloud_riddle::realtime::RealtimeDb;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let env_file = config::load_env();
    let config = AppConfig::load_or_default();
    cloud_riddle::init_logging(&config.logging.level);

    tracing::info!("===========================================================");
    tracing::info!("  Light Logger");
    tracing::info!("===========================================================");
    if let Some(path) = env_file {
        tracing::info!("[CONFIG] Environment seeded from {}", path.display());
    }
    config.print_summary();

    let sensor = match Hal::new(&config.sensors) {
        Ok(hal) => hal,
        Err(e) => {
            tracing::error!("[ERROR] Fatal: failed to open sensors: {:#}", e);
            return Err(e);
        }
    };
    let db = match RealtimeDb::from_config(&config.realtime) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("[ERROR] Fatal: failed to set up realtime database: {:#}", e);
            return Err(e);
        }
    };

    tracing::info!(
        "[RUNTIME] Logging light every {}s under /{}",
        config.polling.light_interval_seconds,
        config.realtime.path.trim_matches('/')
    );
    LightLogger::new(sensor, db)
        .run(config.polling.light_interval(), cloud_riddle::shutdown_signal())
        .await;
    Ok(())
}
