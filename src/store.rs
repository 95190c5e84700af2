use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;
use url::Url;

use crate::error::GastoreError;

pub const TOKEN_ENV: &str = "GCS_ACCESS_TOKEN";

/// Where a URI points: a local file or an object in a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    File(Utf8PathBuf),
    Object { bucket: String, key: String },
}

impl StoreTarget {
    /// Dispatches on the URI scheme. `file` and `gs` (case-insensitive) are
    /// the only supported backends.
    pub fn parse(uri: &str) -> Result<Self, GastoreError> {
        let parsed = Url::parse(uri).map_err(|_| GastoreError::InvalidUri(uri.to_string()))?;
        match parsed.scheme() {
            "file" => {
                let path = urlencoding::decode(parsed.path())
                    .map_err(|_| GastoreError::InvalidUri(uri.to_string()))?;
                Ok(StoreTarget::File(Utf8PathBuf::from(path.into_owned())))
            }
            "gs" => {
                let bucket = parsed
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| GastoreError::InvalidUri(uri.to_string()))?
                    .to_string();
                let key = parsed.path().trim_start_matches('/').to_string();
                Ok(StoreTarget::Object { bucket, key })
            }
            _ => Err(GastoreError::UnsupportedScheme(uri.to_string())),
        }
    }
}

pub trait ObjectStoreClient: Send + Sync {
    /// Metadata lookup; `Ok(false)` means the object does not exist.
    fn head(&self, bucket: &str, key: &str) -> Result<bool, GastoreError>;
    fn put(&self, bucket: &str, key: &str, body: &str) -> Result<(), GastoreError>;
}

/// Existence-check and write primitives over `file://` and `gs://` URIs.
pub struct UriStore<C: ObjectStoreClient> {
    object_client: C,
}

impl<C: ObjectStoreClient> UriStore<C> {
    pub fn new(object_client: C) -> Self {
        Self { object_client }
    }

    pub fn exists(&self, uri: &str) -> Result<bool, GastoreError> {
        match StoreTarget::parse(uri)? {
            StoreTarget::File(path) => Ok(path.as_std_path().is_file()),
            StoreTarget::Object { bucket, key } => self.object_client.head(&bucket, &key),
        }
    }

    /// Writes UTF-8 text to the URI, overwriting any existing content. File
    /// writes create missing parent directories and go through a sibling temp
    /// file plus rename, so a crash never leaves a truncated artifact.
    pub fn write(&self, data: &str, uri: &str) -> Result<(), GastoreError> {
        match StoreTarget::parse(uri)? {
            StoreTarget::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent.as_std_path())
                        .map_err(|err| GastoreError::Filesystem(err.to_string()))?;
                }
                let tmp = tempfile::Builder::new()
                    .prefix(".gastore")
                    .tempfile_in(path.parent().map(|p| p.as_std_path()).unwrap_or_else(|| {
                        std::path::Path::new(".")
                    }))
                    .map_err(|err| GastoreError::Filesystem(err.to_string()))?;
                fs::write(tmp.path(), data.as_bytes())
                    .map_err(|err| GastoreError::Filesystem(err.to_string()))?;
                if path.as_std_path().exists() {
                    fs::remove_file(path.as_std_path())
                        .map_err(|err| GastoreError::Filesystem(err.to_string()))?;
                }
                tmp.persist(path.as_std_path())
                    .map_err(|err| GastoreError::Filesystem(err.to_string()))?;
                debug!(%path, bytes = data.len(), "wrote local file");
                Ok(())
            }
            StoreTarget::Object { bucket, key } => {
                self.object_client.put(&bucket, &key, data)?;
                debug!(%bucket, %key, bytes = data.len(), "wrote object");
                Ok(())
            }
        }
    }
}

/// Google Cloud Storage JSON API client: metadata GET for existence, media
/// upload for writes. Auth is a bearer token from the environment, required
/// only when a `gs://` URI is actually touched.
#[derive(Clone)]
pub struct GcsHttpClient {
    client: Client,
    base_url: String,
    upload_url: String,
    token: Option<String>,
}

impl GcsHttpClient {
    pub fn new() -> Result<Self, GastoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gastore/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GastoreError::ObjectStoreHttp(err.to_string()))?,
        );

        let token = std::env::var(TOKEN_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| GastoreError::ObjectStoreHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://storage.googleapis.com/storage/v1".to_string(),
            upload_url: "https://storage.googleapis.com/upload/storage/v1".to_string(),
            token,
        })
    }

    fn token(&self) -> Result<&str, GastoreError> {
        self.token
            .as_deref()
            .ok_or(GastoreError::MissingCredentials(TOKEN_ENV))
    }
}

impl ObjectStoreClient for GcsHttpClient {
    fn head(&self, bucket: &str, key: &str) -> Result<bool, GastoreError> {
        let token = self.token()?;
        let url = format!(
            "{}/b/{}/o/{}",
            self.base_url,
            bucket,
            urlencoding::encode(key)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .map_err(|err| GastoreError::ObjectStoreHttp(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "object metadata lookup failed".to_string());
            return Err(GastoreError::ObjectStoreStatus { status, message });
        }
        Ok(true)
    }

    fn put(&self, bucket: &str, key: &str, body: &str) -> Result<(), GastoreError> {
        let token = self.token()?;
        let url = format!(
            "{}/b/{}/o?uploadType=media&name={}",
            self.upload_url,
            bucket,
            urlencoding::encode(key)
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body.to_string())
            .send()
            .map_err(|err| GastoreError::ObjectStoreHttp(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "object upload failed".to_string());
            return Err(GastoreError::ObjectStoreStatus { status, message });
        }
        Ok(())
    }
}
