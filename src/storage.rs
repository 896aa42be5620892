//! ==============================================================================
//! storage.rs - cloud object storage uploads
//! ==============================================================================
//!
//! purpose:
//!     pushes photos and json snapshots to a blob store, keyed by file name.
//!     every backend overwrites an existing object with the same name.
//!
//! backends:
//!     - azure: block blob PUT against a container url + sas token
//!     - firebase: firebase storage media upload with a bearer token
//!     - local: plain directory, for development boxes without credentials
//!
//! relationships:
//!     - used by: camera_loop.rs, edge.rs
//!     - configured by: config.rs ([storage]) + env secrets
//!
//! ==============================================================================

use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{require_env, StorageBackendKind, StorageConfig};

pub const AZURE_SAS_ENV: &str = "AZURE_STORAGE_SAS";
pub const FIREBASE_TOKEN_ENV: &str = "FIREBASE_TOKEN";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{backend} rejected upload of {name}: HTTP {status}: {body}")]
    Rejected {
        backend: &'static str,
        name: String,
        status: StatusCode,
        body: String,
    },
    #[error("{backend} storage is not configured: missing {setting}")]
    NotConfigured { backend: &'static str, setting: &'static str },
}

pub trait ObjectStore {
    /// Store `body` under `name`, replacing any previous object.
    fn put(&self, name: &str, body: Vec<u8>, content_type: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Upload a file from disk under `name`.
pub async fn upload_file<S: ObjectStore>(store: &S, path: &Path, name: &str) -> Result<()> {
    let body = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    store.put(name, body, content_type_for(name)).await?;
    tracing::info!("Uploaded {} as {}", path.display(), name);
    Ok(())
}

/// Serialize `value` and upload it under `name`.
pub async fn upload_json<S: ObjectStore, T: serde::Serialize>(store: &S, name: &str, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value).context("failed to serialize snapshot")?;
    store.put(name, body, "application/json").await?;
    tracing::info!("Uploaded {}", name);
    Ok(())
}

pub fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

// ==============================================================================
// azure blob storage
// ==============================================================================

pub struct AzureBlobStore {
    client: reqwest::Client,
    container_url: Url,
    sas: String,
}

impl AzureBlobStore {
    pub fn new(container_url: &str, sas: &str) -> Result<Self> {
        let container_url = Url::parse(container_url.trim_end_matches('/'))
            .with_context(|| format!("invalid container url {:?}", container_url))?;
        Ok(Self {
            client: reqwest::Client::new(),
            container_url,
            sas: sas.trim_start_matches('?').to_string(),
        })
    }

    pub fn blob_url(&self, name: &str) -> Result<Url> {
        let mut url = self.container_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("container url cannot be a base"))?
            .push(name);
        if !self.sas.is_empty() {
            url.set_query(Some(&self.sas));
        }
        Ok(url)
    }
}

impl ObjectStore for AzureBlobStore {
    async fn put(&self, name: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .client
            .put(self.blob_url(name)?)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("azure upload of {} failed", name))?;

        check_status("azure", name, response).await
    }
}

// ==============================================================================
// firebase storage
// ==============================================================================

pub struct FirebaseStorage {
    client: reqwest::Client,
    api_base: String,
    bucket: String,
    token: String,
}

impl FirebaseStorage {
    pub fn new(api_base: &str, bucket: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token: token.to_string(),
        }
    }

    pub fn upload_url(&self, name: &str) -> Result<Url> {
        let base = format!("{}/v0/b/{}/o", self.api_base, self.bucket);
        Url::parse_with_params(&base, &[("uploadType", "media"), ("name", name)])
            .with_context(|| format!("invalid firebase upload url {:?}", base))
    }
}

impl ObjectStore for FirebaseStorage {
    async fn put(&self, name: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .client
            .post(self.upload_url(name)?)
            .bearer_auth(&self.token)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("firebase upload of {} failed", name))?;

        check_status("firebase", name, response).await
    }
}

// ==============================================================================
// local directory
// ==============================================================================

pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ObjectStore for LocalStore {
    async fn put(&self, name: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let target = self.dir.join(name);
        tokio::fs::write(&target, body)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        Ok(())
    }
}

// ==============================================================================
// backend selection
// ==============================================================================

pub enum Storage {
    Azure(AzureBlobStore),
    Firebase(FirebaseStorage),
    Local(LocalStore),
}

impl Storage {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            StorageBackendKind::Azure => {
                if config.azure_container_url.is_empty() {
                    return Err(StorageError::NotConfigured {
                        backend: "azure",
                        setting: "storage.azure_container_url",
                    }
                    .into());
                }
                let sas = require_env(AZURE_SAS_ENV)?;
                Ok(Self::Azure(AzureBlobStore::new(&config.azure_container_url, &sas)?))
            }
            StorageBackendKind::Firebase => {
                if config.firebase_bucket.is_empty() {
                    return Err(StorageError::NotConfigured {
                        backend: "firebase",
                        setting: "storage.firebase_bucket",
                    }
                    .into());
                }
                let token = require_env(FIREBASE_TOKEN_ENV)?;
                Ok(Self::Firebase(FirebaseStorage::new(
                    &config.firebase_api_base,
                    &config.firebase_bucket,
                    &token,
                )))
            }
            StorageBackendKind::Local => Ok(Self::Local(LocalStore::new(&config.local_dir))),
        }
    }
}

impl ObjectStore for Storage {
    async fn put(&self, name: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        match self {
            Self::Azure(store) => store.put(name, body, content_type).await,
            Self::Firebase(store) => store.put(name, body, content_type).await,
            Self::Local(store) => store.put(name, body, content_type).await,
        }
    }
}

async fn check_status(backend: &'static str, name: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Rejected { backend, name: name.to_string(), status, body }.into())
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        extract::{Path as UrlPath, RawQuery, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::put,
        Router,
    };
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("photo_20240101_000000.jpg"), "image/jpeg");
        assert_eq!(content_type_for("PHOTO.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("sensor_data_20240101_000000.json"), "application/json");
        assert_eq!(content_type_for("notes"), "application/octet-stream");
    }

    #[test]
    fn test_azure_blob_url_appends_name_and_sas() {
        let store = AzureBlobStore::new("https://acct.blob.core.windows.net/clouds/", "?sv=2022&sig=abc").unwrap();
        let url = store.blob_url("photo_1.jpg").unwrap();
        assert_eq!(url.as_str(), "https://acct.blob.core.windows.net/clouds/photo_1.jpg?sv=2022&sig=abc");
    }

    #[test]
    fn test_firebase_upload_url() {
        let store = FirebaseStorage::new("https://firebasestorage.googleapis.com/", "demo.appspot.com", "t");
        let url = store.upload_url("photo 1.jpg").unwrap();
        assert_eq!(
            url.as_str(),
            "https://firebasestorage.googleapis.com/v0/b/demo.appspot.com/o?uploadType=media&name=photo+1.jpg"
        );
    }

    #[test]
    fn test_from_config_requires_container_url() {
        let config = StorageConfig { backend: StorageBackendKind::Azure, ..Default::default() };
        let err = Storage::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("azure_container_url"), "{}", err);
    }

    #[tokio::test]
    async fn test_local_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::from_config(&StorageConfig {
            backend: StorageBackendKind::Local,
            local_dir: dir.path().join("bucket"),
            ..Default::default()
        })
        .unwrap();

        store.put("a.json", b"{\"v\":1}".to_vec(), "application/json").await.unwrap();
        store.put("a.json", b"{\"v\":2}".to_vec(), "application/json").await.unwrap();

        let stored = std::fs::read_to_string(dir.path().join("bucket").join("a.json")).unwrap();
        assert_eq!(stored, "{\"v\":2}");
    }

    #[tokio::test]
    async fn test_upload_file_and_json_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo_x.jpg");
        std::fs::write(&photo, [0xFF, 0xD8, 0xFF]).unwrap();
        let store = LocalStore::new(dir.path().join("out"));

        upload_file(&store, &photo, "photo_x.jpg").await.unwrap();
        upload_json(&store, "snap.json", &serde_json::json!({"lux": 1.5})).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("out/photo_x.jpg")).unwrap(), vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(std::fs::read_to_string(dir.path().join("out/snap.json")).unwrap(), r#"{"lux":1.5}"#);
        assert!(upload_file(&store, &dir.path().join("missing.jpg"), "m.jpg").await.is_err());
    }

    #[derive(Clone, Default)]
    struct Seen {
        requests: Arc<Mutex<Vec<(String, Option<String>, HeaderMap, Bytes)>>>,
    }

    async fn spawn_blob_server(reply: AxumStatus) -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/clouds/:name",
                put(
                    move |State(seen): State<Seen>,
                          UrlPath(name): UrlPath<String>,
                          RawQuery(query): RawQuery,
                          headers: HeaderMap,
                          body: Bytes| async move {
                        seen.requests.lock().unwrap().push((name, query, headers, body));
                        reply
                    },
                ),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/clouds", addr), seen)
    }

    #[tokio::test]
    async fn test_azure_put_sends_block_blob() {
        let (container, seen) = spawn_blob_server(AxumStatus::CREATED).await;
        let store = AzureBlobStore::new(&container, "sig=abc").unwrap();

        store.put("photo_1.jpg", vec![1, 2, 3], "image/jpeg").await.unwrap();

        let requests = seen.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (name, query, headers, body) = &requests[0];
        assert_eq!(name, "photo_1.jpg");
        assert_eq!(query.as_deref(), Some("sig=abc"));
        assert_eq!(headers["x-ms-blob-type"], "BlockBlob");
        assert_eq!(headers["content-type"], "image/jpeg");
        assert_eq!(body.as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_azure_rejection_is_typed() {
        let (container, _seen) = spawn_blob_server(AxumStatus::FORBIDDEN).await;
        let store = AzureBlobStore::new(&container, "").unwrap();

        let err = store.put("photo_1.jpg", vec![], "image/jpeg").await.unwrap_err();
        match err.downcast_ref::<StorageError>() {
            Some(StorageError::Rejected { status, .. }) => assert_eq!(*status, StatusCode::FORBIDDEN),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
