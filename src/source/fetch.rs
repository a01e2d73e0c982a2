use super::Source;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur while fetching one source
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    /// Local source missing
    #[error("No such file: {0:?}")]
    NotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Writes the bytes behind a [`Source`] to a local file.
pub trait Fetch {
    /// Fetches `source` into `dest`, creating parent directories, and returns
    /// the number of bytes written.
    fn fetch(&self, source: &Source, dest: &Path) -> Result<u64>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a blocking client. Without a timeout, requests wait as long as
    /// the transport allows.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("model-bundler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn fetch_inner(&self, source: &Source, dest: &Path) -> std::result::Result<u64, FetchError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        match source {
            Source::Http(url) => {
                // reqwest errors embed the full URL, signature included
                let mut response = self
                    .client
                    .get(url.clone())
                    .send()
                    .map_err(|e| e.without_url())?;

                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: source.to_string(),
                    });
                }

                let mut file = File::create(dest)?;
                let written = response.copy_to(&mut file).map_err(|e| e.without_url())?;
                file.sync_all()?;
                Ok(written)
            }
            Source::Local(path) => {
                if !path.is_file() {
                    return Err(FetchError::NotFound(path.clone()));
                }
                Ok(fs::copy(path, dest)?)
            }
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, source: &Source, dest: &Path) -> Result<u64> {
        tracing::info!("Fetching {} -> {:?}", source, dest);

        let written = self
            .fetch_inner(source, dest)
            .map_err(|e| Error::FetchFailed(format!("{}: {}", source, e)))?;

        tracing::info!("Fetched {} bytes from {}", written, source);
        Ok(written)
    }
}
