//! ==============================================================================
//! cloud-riddle - shared library for the four programs
//! ==============================================================================
//!
//! programs (src/bin):
//!     - riddle-web: cloud photo riddle game in the browser
//!     - camera-uploader: photo every 10s -> object storage
//!     - edge-uploader: sensors + uv-gated photo -> object storage
//!     - light-logger: lux every 5s -> realtime database
//!
//! layout:
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  hal.rs      │   │  camera.rs   │   │  riddle/     │
//!     │ (i2c sensors)│   │ (libcamera)  │   │ (web app)    │
//!     └──────┬───────┘   └──────┬───────┘   └──────────────┘
//!            │                  │
//!     ┌──────┴──────────────────┴───────┐
//!     │ edge.rs / camera_loop.rs /      │
//!     │ light.rs  (one loop per binary) │
//!     └──────┬──────────────────┬───────┘
//!            │                  │
//!     ┌──────┴───────┐   ┌──────┴───────┐
//!     │  storage.rs  │   │ realtime.rs  │
//!     │ (blob store) │   │ (rtdb push)  │
//!     └──────────────┘   └──────────────┘
//! ```
//!
//! ==============================================================================

pub mod camera;
pub mod camera_loop;
pub mod config;
pub mod domain;
pub mod edge;
pub mod filter;
pub mod hal;
pub mod light;
pub mod realtime;
pub mod riddle;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Resolves on Ctrl-C. If the handler cannot be installed the loop just runs
/// until the process is killed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}
