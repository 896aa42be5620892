//! Realtime database push client (firebase rtdb REST api).
//!
//! Records are appended under a fixed path with `POST <db>/<path>.json`; the
//! database answers with the generated push id.

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::future::Future;

use crate::config::RealtimeConfig;

pub const DB_AUTH_ENV: &str = "FIREBASE_DB_AUTH";

pub trait RecordSink {
    /// Append `record` and return the id the database assigned to it.
    fn push<T: serde::Serialize + Sync>(&self, record: &T) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Deserialize)]
struct PushAck {
    name: String,
}

pub struct RealtimeDb {
    client: reqwest::Client,
    endpoint: Url,
}

impl RealtimeDb {
    pub fn new(database_url: &str, path: &str, auth: Option<&str>) -> Result<Self> {
        Ok(Self { client: reqwest::Client::new(), endpoint: push_endpoint(database_url, path, auth)? })
    }

    /// `auth` comes from FIREBASE_DB_AUTH when set; open databases work without it.
    pub fn from_config(config: &RealtimeConfig) -> Result<Self> {
        if config.database_url.is_empty() {
            return Err(anyhow!("realtime.database_url must be set"));
        }
        let auth = std::env::var(DB_AUTH_ENV).ok();
        Self::new(&config.database_url, &config.path, auth.as_deref())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl RecordSink for RealtimeDb {
    async fn push<T: serde::Serialize + Sync>(&self, record: &T) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(record)
            .send()
            .await
            .context("realtime database push failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("realtime database rejected push: HTTP {}: {}", status, body));
        }

        let ack: PushAck = response.json().await.context("unexpected push acknowledgment")?;
        Ok(ack.name)
    }
}

/// `https://db.firebaseio.com/` + `vemldata` -> `https://db.firebaseio.com/vemldata.json`
pub fn push_endpoint(database_url: &str, path: &str, auth: Option<&str>) -> Result<Url> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Err(anyhow!("realtime.path must not be empty"));
    }
    let raw = format!("{}/{}.json", database_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&raw).with_context(|| format!("invalid database url {:?}", raw))?;
    if let Some(token) = auth {
        url.query_pairs_mut().append_pair("auth", token);
    }
    Ok(url)
}
