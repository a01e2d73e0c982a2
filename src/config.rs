use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INPUT_DIR: &str = "/asset-input";
pub const DEFAULT_OUTPUT_DIR: &str = "/asset-output";

/// What to do when the model archive already provides a top-level `code` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
	#[default]
	Error,
	Overwrite,
}

impl std::str::FromStr for CollisionPolicy {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"error" => Ok(CollisionPolicy::Error),
			"overwrite" => Ok(CollisionPolicy::Overwrite),
			other => Err(Error::ConfigError(format!(
				"Unknown collision policy: {}",
				other
			))),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub input_dir: PathBuf,
	pub output_dir: PathBuf,
	pub collision_policy: CollisionPolicy,
	pub fetch_timeout_secs: Option<u64>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
			output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
			collision_policy: CollisionPolicy::default(),
			fetch_timeout_secs: None,
		}
	}
}

impl Config {
	/// Loads settings from an explicit TOML file, or from the per-user config
	/// file when one exists, then applies `BUNDLER_*` environment overrides.
	pub fn from_env(config_path: Option<&Path>) -> Result<Self> {
		let mut config = match config_path {
			Some(path) => Self::from_file(path)?,
			None => match Self::default_config_path() {
				Some(path) if path.is_file() => Self::from_file(&path)?,
				_ => Self::default(),
			},
		};

		config.apply_overrides(|key| std::env::var(key).ok())?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path).map_err(|e| {
			Error::ConfigError(format!("Could not read config file {:?}: {}", path, e))
		})?;
		let config: Config = toml::from_str(&content)?;
		tracing::debug!("Loaded settings from {:?}", path);
		Ok(config)
	}

	fn default_config_path() -> Option<PathBuf> {
		ProjectDirs::from("", "", "model-bundler")
			.map(|dirs| dirs.config_dir().join("config.toml"))
	}

	fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(dir) = lookup("BUNDLER_INPUT_DIR") {
			self.input_dir = PathBuf::from(dir);
		}
		if let Some(dir) = lookup("BUNDLER_OUTPUT_DIR") {
			self.output_dir = PathBuf::from(dir);
		}
		if let Some(policy) = lookup("BUNDLER_COLLISION_POLICY") {
			self.collision_policy = policy.parse()?;
		}
		if let Some(secs) = lookup("BUNDLER_FETCH_TIMEOUT_SECS") {
			let secs = secs.parse::<u64>().map_err(|_| {
				Error::ConfigError(format!("Invalid BUNDLER_FETCH_TIMEOUT_SECS: {}", secs))
			})?;
			self.fetch_timeout_secs = Some(secs);
		}
		Ok(())
	}

	pub fn fetch_timeout(&self) -> Option<Duration> {
		self.fetch_timeout_secs.map(Duration::from_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use tempfile::TempDir;

	#[test]
	fn test_defaults() {
		let config = Config::default();
		assert_eq!(config.input_dir, PathBuf::from("/asset-input"));
		assert_eq!(config.output_dir, PathBuf::from("/asset-output"));
		assert_eq!(config.collision_policy, CollisionPolicy::Error);
		assert!(config.fetch_timeout().is_none());
	}

	#[test]
	fn test_partial_file_keeps_defaults() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.toml");
		std::fs::write(&path, "collision_policy = \"overwrite\"\nfetch_timeout_secs = 90\n").unwrap();

		let config = Config::from_file(&path).unwrap();
		assert_eq!(config.collision_policy, CollisionPolicy::Overwrite);
		assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(90)));
		assert_eq!(config.input_dir, PathBuf::from(DEFAULT_INPUT_DIR));
	}

	#[test]
	fn test_missing_explicit_file_is_error() {
		let temp = TempDir::new().unwrap();
		let result = Config::from_env(Some(&temp.path().join("nope.toml")));
		assert!(matches!(result, Err(Error::ConfigError(_))));
	}

	#[test]
	fn test_env_overrides() {
		let vars: HashMap<&str, &str> = HashMap::from([
			("BUNDLER_INPUT_DIR", "/tmp/in"),
			("BUNDLER_OUTPUT_DIR", "/tmp/out"),
			("BUNDLER_COLLISION_POLICY", "Overwrite"),
		]);

		let mut config = Config::default();
		config
			.apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
			.unwrap();

		assert_eq!(config.input_dir, PathBuf::from("/tmp/in"));
		assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
		assert_eq!(config.collision_policy, CollisionPolicy::Overwrite);
	}

	#[test]
	fn test_invalid_timeout_override() {
		let mut config = Config::default();
		let result = config.apply_overrides(|key| {
			(key == "BUNDLER_FETCH_TIMEOUT_SECS").then(|| "soon".to_string())
		});
		assert!(matches!(result, Err(Error::ConfigError(_))));
	}
}
