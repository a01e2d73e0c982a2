pub mod fetch;

pub use fetch::{Fetch, HttpFetcher};

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Where an input archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Http(Url),
    Local(PathBuf),
}

impl Source {
    /// Parses an `http(s)://` URL, a `file://` URL or a plain filesystem path.
    pub fn parse(location: &str) -> Result<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(Error::InvalidInput("empty source location".to_string()));
        }

        if !location.contains("://") {
            return Ok(Source::Local(PathBuf::from(location)));
        }

        let url = Url::parse(location)
            .map_err(|e| Error::InvalidInput(format!("Invalid URL {}: {}", location, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(Source::Http(url)),
            "file" => url.to_file_path().map(Source::Local).map_err(|_| {
                Error::InvalidInput(format!("Invalid file URL: {}", location))
            }),
            scheme => Err(Error::InvalidInput(format!(
                "Unsupported source scheme '{}' in {}",
                scheme, location
            ))),
        }
    }
}

// Presigned URLs carry credentials in the query string, so it never reaches logs.
impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Http(url) => {
                let mut shown = url.clone();
                shown.set_query(None);
                shown.set_fragment(None);
                let _ = shown.set_password(None);
                let _ = shown.set_username("");
                write!(f, "{}", shown)
            }
            Source::Local(path) => write!(f, "{}", path.display()),
        }
    }
}
