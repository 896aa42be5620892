//! ==============================================================================
//! camera.rs - still capture through libcamera
//! ==============================================================================
//!
//! purpose:
//!     takes one photo per call by running `libcamera-still -o <path>` as a
//!     subprocess.
//!
//! relationships:
//!     - used by: camera_loop.rs, edge.rs (through the Camera trait)
//!     - uses: tokio::process
//!
//! ==============================================================================

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::CameraConfig;
use crate::domain::photo_file_name;

/// A photo that has been written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPhoto {
    pub path: PathBuf,
    /// bare file name, also used as the storage blob name
    pub file_name: String,
}

pub trait Camera {
    fn capture(&self) -> impl Future<Output = Result<CapturedPhoto>> + Send;
}

pub struct LibcameraStill {
    command: String,
    photo_dir: PathBuf,
}

impl LibcameraStill {
    pub fn new(config: &CameraConfig) -> Self {
        Self { command: config.command.clone(), photo_dir: config.photo_dir.clone() }
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }
}

impl Camera for LibcameraStill {
    async fn capture(&self) -> Result<CapturedPhoto> {
        tokio::fs::create_dir_all(&self.photo_dir)
            .await
            .with_context(|| format!("failed to create {}", self.photo_dir.display()))?;

        let file_name = photo_file_name(Local::now());
        let path = self.photo_dir.join(&file_name);

        let output = Command::new(&self.command)
            .arg("-o")
            .arg(&path)
            .output()
            .await
            .map_err(|e| anyhow!("Failed to run {}: {}", self.command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} exited with {}: {}", self.command, output.status, stderr.trim()));
        }

        tracing::info!("Captured {}", path.display());
        Ok(CapturedPhoto { path, file_name })
    }
}
