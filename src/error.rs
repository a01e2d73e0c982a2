use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
	FetchFailed(String),
	ExtractionFailed(String),
	ArchiveFailed(String),
	PathCollision(PathBuf),
	InvalidInput(String),
	ConfigError(String),
	IoError(std::io::Error),
	SerializationError(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::FetchFailed(msg) => write!(f, "Fetch failed: {}", msg),
			Error::ExtractionFailed(msg) => write!(f, "Extraction failed: {}", msg),
			Error::ArchiveFailed(msg) => write!(f, "Archive creation failed: {}", msg),
			Error::PathCollision(path) => write!(
				f,
				"Path collision: model archive already provides {:?}",
				path
			),
			Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
			Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
			Error::IoError(e) => write!(f, "IO error: {}", e),
			Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::IoError(err)
	}
}

impl From<walkdir::Error> for Error {
	fn from(err: walkdir::Error) -> Self {
		match err.into_io_error() {
			Some(io) => Error::IoError(io),
			None => Error::IoError(std::io::Error::other("filesystem loop detected")),
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

impl From<toml::de::Error> for Error {
	fn from(err: toml::de::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
