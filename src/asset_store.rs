use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::{Client, ClientBuilder, StatusCode};
use thiserror::Error;
use url::Url;

use crate::url_resolver::{self, ResourceBucket};

/// What went wrong with one resource. A failure here is terminal for that
/// single reference, never for the run.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("connection failed for {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: StatusCode },
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected error for {url}: {source}")]
    Unexpected {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    fn from_transport(url: &Url, source: reqwest::Error) -> Self {
        if source.is_connect() || source.is_timeout() {
            DownloadError::Connection {
                url: url.to_string(),
                source,
            }
        } else {
            DownloadError::Unexpected {
                url: url.to_string(),
                source,
            }
        }
    }

    /// Prints the failure with the severity it warrants: unauthorized is a
    /// warning, a missing resource is a notice, everything else an error.
    pub fn report(&self) {
        match self {
            DownloadError::Http { url, status } if *status == StatusCode::UNAUTHORIZED => {
                eprintln!("{} unauthorized access downloading {}", "warning:".yellow().bold(), url);
            }
            DownloadError::Http { url, status } if *status == StatusCode::NOT_FOUND => {
                eprintln!("{}", format!("resource not found (404): {}", url).dimmed());
            }
            _ => {
                eprintln!("{} {}", "error:".red().bold(), self);
            }
        }
    }
}

/// One configured HTTP client for the whole run, passed explicitly to every
/// component that fetches. Carries the browser-like headers, the cookie jar
/// and the fixed request timeout.
pub struct FetchSession {
    client: Client,
}

impl FetchSession {
    pub fn new(user_agent: &str, referer: &Url, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(referer.as_str()) {
            headers.insert(REFERER, value);
        }

        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// Sends one GET and classifies the outcome. Any non-success status is
    /// surfaced as `DownloadError::Http` with the status attached.
    pub async fn get(&self, url: &Url) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::from_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                url: url.to_string(),
                status,
            });
        }

        Ok(response)
    }
}

/// A membership set whose check-and-insert is a single atomic step, so two
/// concurrent workers can never both act on the same key.
#[derive(Default)]
pub struct ClaimSet {
    members: Mutex<HashSet<String>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`. Returns false when it was already claimed.
    pub fn claim(&self, key: &str) -> bool {
        self.members.lock().unwrap().insert(key.to_string())
    }

    /// Gives a claim back, letting another reference retry the key.
    pub fn release(&self, key: &str) {
        self.members.lock().unwrap().remove(key);
    }
}

/// Downloads assets into the bucket subdirectories of the mirror root,
/// deduplicating by destination file path.
pub struct AssetStore {
    mirror_root: PathBuf,
    claimed: ClaimSet,
}

impl AssetStore {
    pub fn new(mirror_root: &Path) -> Self {
        Self {
            mirror_root: mirror_root.to_path_buf(),
            claimed: ClaimSet::new(),
        }
    }

    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }

    /// Downloads `url` into the bucket's directory and returns the saved
    /// path relative to the mirror root, forward slashes.
    ///
    /// `Ok(None)` means the reference was skipped (data URI). A destination
    /// that already exists on disk, or that another worker has claimed this
    /// run, is reused without fetching again. The content type is read from
    /// the same request that fetches the bytes; no extra round-trip happens
    /// when the URL itself names the file.
    pub async fn fetch_and_place(
        &self,
        url: &Url,
        bucket: ResourceBucket,
        session: &FetchSession,
    ) -> Result<Option<String>, DownloadError> {
        if url.scheme() == "data" {
            return Ok(None);
        }

        let mut url = url.clone();
        url.set_fragment(None);

        let name_from_url = url_resolver::derive_filename(&url, None);
        if url_resolver::has_extension(&name_from_url) {
            return self.place(&url, bucket, &name_from_url, None, session).await;
        }

        // The URL gives no usable name, so the Content-Type header has to
        // decide it. The body of this same response is what gets written.
        let response = session.get(&url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let file_name = url_resolver::derive_filename(&url, content_type.as_deref());

        self.place(&url, bucket, &file_name, Some(response), session).await
    }

    async fn place(
        &self,
        url: &Url,
        bucket: ResourceBucket,
        file_name: &str,
        response: Option<reqwest::Response>,
        session: &FetchSession,
    ) -> Result<Option<String>, DownloadError> {
        let relative = format!("{}/{}", bucket.dir_name(), file_name);
        let destination = self.mirror_root.join(bucket.dir_name()).join(file_name);

        // Existing files are reused as-is; the claim closes the window where
        // a concurrent reference resolves to the same destination while the
        // first download is still in flight.
        if destination.exists() || !self.claimed.claim(&relative) {
            return Ok(Some(relative));
        }

        let response = match response {
            Some(response) => response,
            None => match session.get(url).await {
                Ok(response) => response,
                Err(e) => {
                    self.claimed.release(&relative);
                    return Err(e);
                }
            },
        };

        if let Err(e) = write_streamed(&destination, response, url).await {
            self.claimed.release(&relative);
            let _ = fs::remove_file(&destination);
            return Err(e);
        }

        Ok(Some(relative))
    }
}

async fn write_streamed(
    destination: &Path,
    mut response: reqwest::Response,
    url: &Url,
) -> Result<(), DownloadError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| DownloadError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut file = fs::File::create(destination).map_err(|e| DownloadError::Io {
        path: destination.to_path_buf(),
        source: e,
    })?;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| DownloadError::from_transport(url, e))?
    {
        file.write_all(&chunk).map_err(|e| DownloadError::Io {
            path: destination.to_path_buf(),
            source: e,
        })?;
    }

    Ok(())
}
