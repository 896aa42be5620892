//! Periodic photo uploader: capture, upload under the photo's file name, wait.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

use crate::camera::Camera;
use crate::storage::{upload_file, ObjectStore};

pub struct CameraUploader<C, O> {
    camera: C,
    store: O,
}

impl<C: Camera, O: ObjectStore> CameraUploader<C, O> {
    pub fn new(camera: C, store: O) -> Self {
        Self { camera, store }
    }

    /// One shot. Returns the uploaded blob name.
    pub async fn run_cycle(&self) -> Result<String> {
        let photo = self.camera.capture().await?;
        upload_file(&self.store, &photo.path, &photo.file_name).await?;
        Ok(photo.file_name)
    }

    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("[CAMERA] Program interrupted");
                    return;
                }
                _ = self.tick(interval) => {}
            }
        }
    }

    async fn tick(&self, interval: Duration) {
        if let Err(e) = self.run_cycle().await {
            tracing::error!("[CAMERA] Capture/upload failed: {:#}", e);
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CapturedPhoto;
    use crate::storage::LocalStore;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCamera {
        dir: PathBuf,
        shots: AtomicUsize,
        fail: bool,
    }

    impl Camera for FakeCamera {
        async fn capture(&self) -> Result<CapturedPhoto> {
            if self.fail {
                anyhow::bail!("camera not detected");
            }
            let n = self.shots.fetch_add(1, Ordering::SeqCst);
            let file_name = format!("photo_{:02}.jpg", n);
            let path = self.dir.join(&file_name);
            std::fs::write(&path, format!("frame {}", n))?;
            Ok(CapturedPhoto { path, file_name })
        }
    }

    fn fake(dir: &std::path::Path, fail: bool) -> FakeCamera {
        FakeCamera { dir: dir.to_path_buf(), shots: AtomicUsize::new(0), fail }
    }

    #[tokio::test]
    async fn test_cycle_uploads_photo_under_its_file_name() {
        let shots = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let uploader = CameraUploader::new(fake(shots.path(), false), LocalStore::new(bucket.path()));

        assert_eq!(uploader.run_cycle().await.unwrap(), "photo_00.jpg");
        assert_eq!(uploader.run_cycle().await.unwrap(), "photo_01.jpg");

        assert_eq!(std::fs::read_to_string(bucket.path().join("photo_01.jpg")).unwrap(), "frame 1");
    }

    #[tokio::test]
    async fn test_capture_failure_skips_upload() {
        let shots = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let uploader = CameraUploader::new(fake(shots.path(), true), LocalStore::new(bucket.path().join("b")));

        assert!(uploader.run_cycle().await.is_err());
        assert!(!bucket.path().join("b").exists());
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown() {
        let shots = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let uploader = CameraUploader::new(fake(shots.path(), false), LocalStore::new(bucket.path()));

        uploader.run(Duration::from_secs(3600), tokio::time::sleep(Duration::from_millis(50))).await;

        assert_eq!(uploader.camera.shots.load(Ordering::SeqCst), 1);
    }
}
