//! ==============================================================================
//! edge.rs - threshold-gated sensor + photo uploader
//! ==============================================================================
//!
//! purpose:
//!     every cycle reads all sensors, smooths lux, and when the uv index is
//!     above the threshold takes a photo and uploads it together with a json
//!     snapshot of the reading. below the threshold nothing is captured or
//!     uploaded.
//!
//! cycle:
//! ```text
//!     read sensors ──► uv_index > threshold? ──no──► log skip ─┐
//!                             │ yes                            │
//!                             ▼                                │
//!                      capture photo                           │
//!                      upload photo (blob = file name)         │
//!                      upload sensor_data_<stamp>.json         │
//!                             │                                │
//!                             └──────────► sleep ◄─────────────┘
//! ```
//!
//! relationships:
//!     - uses: hal.rs (SensorSuite), camera.rs (Camera), storage.rs (ObjectStore)
//!     - uses: filter.rs (lux moving average)
//!     - driven by: bin/edge_uploader.rs
//!
//! ==============================================================================

use anyhow::Result;
use chrono::Local;
use std::future::Future;
use std::time::Duration;

use crate::camera::Camera;
use crate::config::SensorsConfig;
use crate::domain::{snapshot_file_name, EdgeReading};
use crate::filter::MovingAverage;
use crate::hal::SensorSuite;
use crate::storage::{upload_file, upload_json, ObjectStore};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// uv index at or below the threshold, nothing captured
    Skipped(EdgeReading),
    Uploaded {
        reading: EdgeReading,
        photo: String,
        snapshot: String,
    },
}

pub struct EdgeUploader<S, C, O> {
    sensors: S,
    camera: C,
    store: O,
    lux: MovingAverage,
    uv_scale: f64,
    uv_threshold: f64,
    show_sensor_data: bool,
}

impl<S: SensorSuite, C: Camera, O: ObjectStore> EdgeUploader<S, C, O> {
    pub fn new(sensors: S, camera: C, store: O, config: &SensorsConfig) -> Self {
        Self {
            sensors,
            camera,
            store,
            lux: MovingAverage::new(config.lux_window),
            uv_scale: config.uv_scale,
            uv_threshold: config.uv_threshold,
            show_sensor_data: true,
        }
    }

    pub fn show_sensor_data(mut self, show: bool) -> Self {
        self.show_sensor_data = show;
        self
    }

    /// Read every channel, feeding raw lux through the moving average.
    pub fn read_sensors(&mut self) -> Result<EdgeReading> {
        let raw_lux = self.sensors.read_lux()?;
        let lux = self.lux.push(raw_lux);
        let climate = self.sensors.read_climate()?;
        let uv_index = self.sensors.read_uv_voltage()? * self.uv_scale;

        let reading = EdgeReading {
            lux,
            temperature: climate.temperature,
            humidity: climate.humidity,
            pressure: climate.pressure,
            uv_index,
        };
        if self.show_sensor_data {
            tracing::info!(
                "[EDGE] Lux: {:.2} (raw {:.2}) | Temp: {:.1}°C | Humidity: {:.1}% | Pressure: {:.1} hPa | UV: {:.3}",
                reading.lux,
                raw_lux,
                reading.temperature,
                reading.humidity,
                reading.pressure,
                reading.uv_index
            );
        }
        Ok(reading)
    }

    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let reading = self.read_sensors()?;

        if reading.uv_index <= self.uv_threshold {
            tracing::info!(
                "[EDGE] UV index {:.3} is not above {}, skipping this cycle.",
                reading.uv_index,
                self.uv_threshold
            );
            return Ok(CycleOutcome::Skipped(reading));
        }

        let photo = self.camera.capture().await?;
        upload_file(&self.store, &photo.path, &photo.file_name).await?;

        let snapshot = snapshot_file_name(Local::now());
        upload_json(&self.store, &snapshot, &reading).await?;

        Ok(CycleOutcome::Uploaded { reading, photo: photo.file_name, snapshot })
    }

    /// Cycle until `shutdown` resolves. A failed cycle is logged and the loop
    /// carries on after the normal pause.
    pub async fn run(&mut self, interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("[EDGE] Program interrupted");
                    return;
                }
                _ = self.tick(interval) => {}
            }
        }
    }

    async fn tick(&mut self, interval: Duration) {
        if let Err(e) = self.run_cycle().await {
            tracing::error!("[EDGE] An error occurred: {:#}", e);
        }
        tokio::time::sleep(interval).await;
    }

    pub fn lux_window(&self) -> &MovingAverage {
        &self.lux
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CapturedPhoto;
    use crate::hal::Climate;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedSensors {
        lux: Mutex<VecDeque<f64>>,
        uv_volts: Mutex<VecDeque<f64>>,
    }

    impl ScriptedSensors {
        fn new(lux: &[f64], uv_volts: &[f64]) -> Self {
            Self {
                lux: Mutex::new(lux.iter().copied().collect()),
                uv_volts: Mutex::new(uv_volts.iter().copied().collect()),
            }
        }
    }

    impl SensorSuite for ScriptedSensors {
        fn read_lux(&self) -> Result<f64> {
            self.lux.lock().unwrap().pop_front().ok_or_else(|| anyhow::anyhow!("lux script exhausted"))
        }

        fn read_climate(&self) -> Result<Climate> {
            Ok(Climate { temperature: 18.0, humidity: 60.0, pressure: 1009.0 })
        }

        fn read_uv_voltage(&self) -> Result<f64> {
            self.uv_volts.lock().unwrap().pop_front().ok_or_else(|| anyhow::anyhow!("uv script exhausted"))
        }
    }

    struct FakeCamera {
        dir: PathBuf,
        shots: Arc<AtomicUsize>,
    }

    impl Camera for FakeCamera {
        async fn capture(&self) -> Result<CapturedPhoto> {
            let n = self.shots.fetch_add(1, Ordering::SeqCst);
            let file_name = format!("photo_{}.jpg", n);
            let path = self.dir.join(&file_name);
            std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xD9])?;
            Ok(CapturedPhoto { path, file_name })
        }
    }

    #[derive(Default, Clone)]
    struct RecordingStore {
        puts: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ObjectStore for RecordingStore {
        async fn put(&self, name: &str, _body: Vec<u8>, content_type: &str) -> Result<()> {
            self.puts.lock().unwrap().push((name.to_string(), content_type.to_string()));
            Ok(())
        }
    }

    fn uploader(
        dir: &std::path::Path,
        lux: &[f64],
        uv_volts: &[f64],
    ) -> (EdgeUploader<ScriptedSensors, FakeCamera, RecordingStore>, Arc<AtomicUsize>, RecordingStore) {
        let shots = Arc::new(AtomicUsize::new(0));
        let store = RecordingStore::default();
        let up = EdgeUploader::new(
            ScriptedSensors::new(lux, uv_volts),
            FakeCamera { dir: dir.to_path_buf(), shots: shots.clone() },
            store.clone(),
            &SensorsConfig::default(),
        )
        .show_sensor_data(false);
        (up, shots, store)
    }

    #[tokio::test]
    async fn test_low_uv_skips_capture_and_upload() {
        let dir = tempfile::tempdir().unwrap();
        // 0.5 V * 0.2 = 0.1, not strictly above the threshold
        let (mut up, shots, store) = uploader(dir.path(), &[100.0, 100.0], &[0.0, 0.5]);

        for _ in 0..2 {
            assert!(matches!(up.run_cycle().await.unwrap(), CycleOutcome::Skipped(_)));
        }
        assert_eq!(shots.load(Ordering::SeqCst), 0);
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_high_uv_uploads_one_photo_and_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (mut up, shots, store) = uploader(dir.path(), &[100.0], &[1.0]);

        let outcome = up.run_cycle().await.unwrap();

        assert_eq!(shots.load(Ordering::SeqCst), 1);
        let puts = store.puts.lock().unwrap();
        assert_eq!(puts.len(), 2);
        assert_eq!(puts[0], ("photo_0.jpg".to_string(), "image/jpeg".to_string()));
        assert!(puts[1].0.starts_with("sensor_data_") && puts[1].0.ends_with(".json"));
        assert_eq!(puts[1].1, "application/json");

        match outcome {
            CycleOutcome::Uploaded { reading, photo, snapshot } => {
                assert_eq!(photo, "photo_0.jpg");
                assert_eq!(snapshot, puts[1].0);
                assert!((reading.uv_index - 0.2).abs() < 1e-9);
                assert_eq!(reading.pressure, 1009.0);
            }
            other => panic!("expected upload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lux_is_smoothed_over_last_five() {
        let dir = tempfile::tempdir().unwrap();
        let lux = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        let (mut up, _, _) = uploader(dir.path(), &lux, &[0.0; 6]);

        let mut last = 0.0;
        for _ in 0..6 {
            last = up.read_sensors().unwrap().lux;
        }
        // (20+30+40+50+60)/5
        assert_eq!(last, 40.0);
        assert_eq!(up.lux_window().len(), 5);
    }

    #[tokio::test]
    async fn test_sensor_failure_fails_the_cycle_without_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let (mut up, shots, store) = uploader(dir.path(), &[], &[1.0]);

        assert!(up.run_cycle().await.is_err());
        assert_eq!(shots.load(Ordering::SeqCst), 0);
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_survives_errors() {
        let dir = tempfile::tempdir().unwrap();
        // one good cycle, then the script runs dry and every cycle errors
        let (mut up, shots, _) = uploader(dir.path(), &[5.0], &[1.0]);

        up.run(Duration::from_millis(5), tokio::time::sleep(Duration::from_millis(60))).await;

        assert_eq!(shots.load(Ordering::SeqCst), 1);
    }
}
