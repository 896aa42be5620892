//! ==============================================================================
//! vision.rs - remote captioning through the replicate predictions api
//! ==============================================================================
//!
//! purpose:
//!     sends the uploaded photo (as a base64 data url) and the riddle prompt
//!     to a hosted llava model and returns the model's free-text answer.
//!
//! flow:
//! ```text
//!     POST /v1/predictions  (Prefer: wait)  ──► finished? ──yes──► output text
//!                                                │ no
//!                                                ▼
//!                                   GET urls.get every second until the
//!                                   prediction finishes or the deadline hits
//! ```
//!
//! there is no retry: a failed prediction is reported to the user as is.
//!
//! ==============================================================================

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::RiddleConfig;

pub const RIDDLE_PROMPT: &str =
    "What are the top 5 animals this cloud looks like, with confidence scores (in the form of percentage)?";

pub const API_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

const POLL_EVERY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("unrecognised image format")]
    UnknownImageFormat,
    #[error("replicate returned HTTP {status}: {body}")]
    Http { status: reqwest::StatusCode, body: String },
    #[error("prediction {status}: {message}")]
    PredictionFailed { status: String, message: String },
    #[error("prediction did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("prediction finished without text output")]
    EmptyOutput,
}

pub trait CaptionService: Send + Sync + 'static {
    /// Ask the model about `image_url` (a data url) and return its raw answer.
    fn caption(&self, image_url: String, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Image subtype as used in a data url ("jpeg", "png", ...), sniffed from the bytes.
pub fn image_subtype(bytes: &[u8]) -> Result<&'static str, VisionError> {
    let format = image::guess_format(bytes).map_err(|_| VisionError::UnknownImageFormat)?;
    Ok(match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        _ => return Err(VisionError::UnknownImageFormat),
    })
}

/// `data:image/<subtype>;base64,<payload>`
pub fn data_url(bytes: &[u8], subtype: &str) -> String {
    format!("data:image/{};base64,{}", subtype, STANDARD.encode(bytes))
}

/// Models stream their answer as a list of chunks; some return a string or
/// an object with a `text` field instead.
pub fn output_text(output: &Value) -> Option<String> {
    match output {
        Value::String(s) => Some(s.clone()),
        Value::Array(chunks) => {
            let joined: String = chunks.iter().filter_map(Value::as_str).collect();
            Some(joined)
        }
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    fn into_text(self) -> Result<String> {
        if self.status != "succeeded" {
            let message = match &self.error {
                Value::Null => "no error message".to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(VisionError::PredictionFailed { status: self.status, message }.into());
        }
        output_text(&self.output).ok_or_else(|| VisionError::EmptyOutput.into())
    }
}

#[derive(Clone)]
pub struct ReplicateClient {
    client: reqwest::Client,
    api_base: String,
    version: String,
    token: String,
    timeout: Duration,
}

impl ReplicateClient {
    pub fn new(config: &RiddleConfig, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            version: config.model_version.clone(),
            token: token.into(),
            timeout: Duration::from_secs(config.prediction_timeout_seconds),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Prediction> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .context("replicate request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Http { status, body }.into());
        }
        response.json::<Prediction>().await.context("unexpected prediction payload")
    }
}

impl CaptionService for ReplicateClient {
    async fn caption(&self, image_url: String, prompt: &str) -> Result<String> {
        let started = Instant::now();
        let body = json!({
            "version": self.version,
            "input": { "image": image_url, "prompt": prompt },
        });

        let create = self
            .client
            .post(format!("{}/v1/predictions", self.api_base))
            .header("Prefer", "wait")
            .json(&body);
        let mut prediction = self.send(create).await?;

        while !prediction.is_terminal() {
            if started.elapsed() >= self.timeout {
                return Err(VisionError::TimedOut(self.timeout).into());
            }
            let get = match &prediction.urls {
                Some(urls) => urls.get.clone(),
                None => return Err(VisionError::EmptyOutput.into()),
            };
            tokio::time::sleep(POLL_EVERY).await;
            tracing::debug!("[VISION] prediction {}, polling", prediction.status);
            prediction = self.send(self.client.get(get)).await?;
        }

        tracing::info!("[VISION] prediction {} after {:?}", prediction.status, started.elapsed());
        prediction.into_text()
    }
}
