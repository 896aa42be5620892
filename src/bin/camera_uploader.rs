//! ==============================================================================
//! camera_uploader.rs - periodic photo uploader entry point
//! ==============================================================================
//!
//! purpose:
//!     takes a still photo every cycle and uploads it to the configured
//!     object store. runs until ctrl-c.
//!
//! relationships:
//!     - uses: camera.rs, storage.rs, camera_loop.rs
//!     - reads: config/cloud-riddle.toml [camera] [storage] [polling]
//!
//! ==============================================================================

use anyhow::Result;

use cloud_riddle::camera::LibcameraStill;
use cloud_riddle::camera_loop::CameraUploader;
use cloud_riddle::config::{self, AppConfig};
use cloud_riddle::storage::Storage;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let env_file = config::load_env();
    let config = AppConfig::load_or_default();
    cloud_riddle::init_logging(&config.logging.level);

    tracing::info!("===========================================================");
    tracing::info!("  Camera Uploader");
    tracing::info!("===========================================================");
    if let Some(path) = env_file {
        tracing::info!("[CONFIG] Environment seeded from {}", path.display());
    }
    config.print_summary();

    let store = match Storage::from_config(&config.storage) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("[ERROR] Fatal: failed to set up storage: {:#}", e);
            return Err(e);
        }
    };
    let camera = LibcameraStill::new(&config.camera);

    tracing::info!(
        "[RUNTIME] Capturing every {}s into {}",
        config.polling.camera_interval_seconds,
        config.camera.photo_dir.display()
    );
    CameraUploader::new(camera, store)
        .run(config.polling.camera_interval(), cloud_riddle::shutdown_signal())
        .await;
    Ok(())
}
