//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::ConfigError;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
const BASE_URL_ENV: &str = "PLUME_BASE_URL";

/// Top-level client configuration.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
	pub base_url: Url,
	pub request_timeout_ms: u64,
	/// Items requested per page by the collection controller.
	pub page_size: u32,
	pub stream: StreamConfig,
}

/// Event stream tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
	/// Path of the push endpoint, relative to `base_url`.
	pub path: String,
	/// Silence after which the connection is considered dead.
	pub idle_deadline_ms: u64,
	/// Fixed delay before each reconnect attempt.
	pub reconnect_backoff_ms: u64,
	/// Frames starting with this text are liveness acknowledgements.
	pub ack_prefix: String,
	/// Capacity of the surfaced-message broadcast channel.
	pub buffer: usize,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: default_base_url(),
			request_timeout_ms: 30_000,
			page_size: 10,
			stream: StreamConfig::default(),
		}
	}
}

impl Default for StreamConfig {
	fn default() -> Self {
		Self {
			path: "/notifications/subscribe".to_string(),
			idle_deadline_ms: 35_000,
			reconnect_backoff_ms: 5_000,
			ack_prefix: "EventStream Created".to_string(),
			buffer: 64,
		}
	}
}

fn default_base_url() -> Url {
	match Url::parse(DEFAULT_BASE_URL) {
		Ok(url) => url,
		Err(_) => unreachable!("default base URL is a valid absolute URL"),
	}
}

impl StreamConfig {
	pub fn idle_deadline(&self) -> Duration {
		Duration::from_millis(self.idle_deadline_ms)
	}

	pub fn reconnect_backoff(&self) -> Duration {
		Duration::from_millis(self.reconnect_backoff_ms)
	}
}

impl ClientConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	/// Default location: `$XDG_CONFIG_HOME/plume/config.toml`.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("plume").join("config.toml"))
	}

	/// Loads configuration from `path`, or from [`Self::default_path`] when
	/// `None`, then applies environment overrides.
	///
	/// A missing default file yields the defaults; a missing explicit file is
	/// an error.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => match Self::default_path() {
				Some(path) if path.exists() => Self::from_file(&path)?,
				_ => Self::default(),
			},
		};
		config.apply_env(|name| std::env::var(name).ok())?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		debug!(path = %path.display(), "config.load");
		Self::from_toml_str(&text)
	}

	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Applies overrides from a variable lookup. Split from [`Self::load`] so
	/// tests can supply a map instead of the process environment.
	pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
		if let Some(raw) = lookup(BASE_URL_ENV).filter(|raw| !raw.trim().is_empty()) {
			self.base_url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl(raw.clone(), e.to_string()))?;
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidUrl(self.base_url.to_string(), "not a base URL".to_string()));
		}
		let positive = [
			("request_timeout_ms", self.request_timeout_ms),
			("page_size", u64::from(self.page_size)),
			("stream.idle_deadline_ms", self.stream.idle_deadline_ms),
			("stream.reconnect_backoff_ms", self.stream.reconnect_backoff_ms),
			("stream.buffer", self.stream.buffer as u64),
		];
		match positive.into_iter().find(|(_, value)| *value == 0) {
			Some((name, _)) => Err(ConfigError::Zero(name)),
			None => Ok(()),
		}
	}
}
