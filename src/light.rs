//! Light logger: read lux, print it, push `{timestamp, lux}` to the realtime db.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

use crate::domain::LightRecord;
use crate::hal::SensorSuite;
use crate::realtime::RecordSink;

pub struct LightLogger<S, D> {
    sensors: S,
    sink: D,
}

impl<S: SensorSuite, D: RecordSink> LightLogger<S, D> {
    pub fn new(sensors: S, sink: D) -> Self {
        Self { sensors, sink }
    }

    pub async fn run_cycle(&self) -> Result<LightRecord> {
        let lux = self.sensors.read_lux()?;
        tracing::info!("Light Intensity: {:.2} Lux", lux);

        let record = LightRecord::now(lux);
        let id = self.sink.push(&record).await?;
        tracing::debug!("[LIGHT] Stored record {}", id);
        Ok(record)
    }

    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("[LIGHT] Program interrupted");
                    return;
                }
                _ = self.tick(interval) => {}
            }
        }
    }

    async fn tick(&self, interval: Duration) {
        if let Err(e) = self.run_cycle().await {
            tracing::error!("[LIGHT] Read/push failed: {:#}", e);
        }
        tokio::time::sleep(interval).await;
    }
}
