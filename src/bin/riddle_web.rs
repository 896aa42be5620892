//! ==============================================================================
//! riddle_web.rs - cloud riddle web app entry point
//! ==============================================================================
//!
//! purpose:
//!     serves the three-page riddle game: landing, photo upload, and reveal.
//!     the reveal page sends the photo to the hosted vision model and lists
//!     the top five animals it resembles.
//!
//! relationships:
//!     - uses: riddle/web.rs (routes, sessions), riddle/vision.rs (replicate)
//!     - reads: config/cloud-riddle.toml [riddle], REPLICATE_API_TOKEN
//!
//! ==============================================================================

use anyhow::Result;
use std::sync::Arc;

use cloud_riddle::config::{self, AppConfig};
use cloud_riddle::riddle::vision::{ReplicateClient, API_TOKEN_ENV};
use cloud_riddle::riddle::web::{self, RiddleApp};

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = config::load_env();
    let config = AppConfig::load_or_default();
    cloud_riddle::init_logging(&config.logging.level);

    tracing::info!("===========================================================");
    tracing::info!("  Cloud Riddle and Time-Lapse");
    tracing::info!("===========================================================");
    if let Some(path) = env_file {
        tracing::info!("[CONFIG] Environment seeded from {}", path.display());
    }
    config.print_summary();

    let token = match config::require_env(API_TOKEN_ENV) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("[ERROR] Fatal: {:#}", e);
            return Err(e);
        }
    };

    let vision = ReplicateClient::new(&config.riddle, token);
    let app = Arc::new(RiddleApp::new(vision, &config.riddle));
    tracing::info!("[STARTUP] ✓ Riddle app live at http://{}", config.riddle.bind_address);

    web::serve(app, &config.riddle).await
}
