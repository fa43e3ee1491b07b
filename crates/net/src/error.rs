//! Error types shared by every plume component.

use std::path::PathBuf;

use thiserror::Error;

/// A convenient type alias for `Result` with `E` = [`ClientError`].
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Failure of one backend interaction.
///
/// Nothing here is fatal: mutations roll back, page loads keep their prior
/// pages and the event stream reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ClientError {
	/// Missing or rejected credential. Propagated to the caller, never retried.
	#[error("authentication required")]
	AuthRequired,
	/// Transport-level failure (connect, timeout, reset, truncated body).
	#[error("network failure: {0}")]
	NetworkFailure(String),
	/// Non-2xx response. `message` is the server's text when it sent one.
	#[error("server rejected request ({status}): {message}")]
	ServerRejected { status: u16, message: String },
	/// Response for a superseded query identity.
	#[error("response superseded by a newer query")]
	StaleResponse,
	/// 2xx response whose body did not decode.
	#[error("unexpected response body: {0}")]
	Decode(String),
}

impl ClientError {
	/// Classifies a non-2xx response.
	pub fn from_status(status: u16, body: &str) -> Self {
		match status {
			401 | 403 => Self::AuthRequired,
			_ => Self::ServerRejected {
				status,
				message: extract_message(body),
			},
		}
	}

	/// Whether offering the user a retry makes sense.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::NetworkFailure(_) => true,
			Self::ServerRejected { status, .. } => *status >= 500 || *status == 429,
			Self::AuthRequired | Self::StaleResponse | Self::Decode(_) => false,
		}
	}

	/// Whether this error is the silent stale-query case.
	pub fn is_stale(&self) -> bool {
		matches!(self, Self::StaleResponse)
	}

	/// Transient text suitable for a toast or inline error.
	///
	/// Server messages are surfaced verbatim.
	pub fn user_message(&self) -> String {
		match self {
			Self::AuthRequired => "Please sign in to continue.".to_string(),
			Self::NetworkFailure(_) => "Network error. Check your connection and try again.".to_string(),
			Self::ServerRejected { message, .. } if !message.is_empty() => message.clone(),
			Self::ServerRejected { status, .. } => format!("Request failed ({status})."),
			Self::StaleResponse => String::new(),
			Self::Decode(_) => "Unexpected response from the server.".to_string(),
		}
	}
}

impl From<reqwest::Error> for ClientError {
	fn from(err: reqwest::Error) -> Self {
		if err.is_decode() {
			return Self::Decode(err.to_string());
		}
		if let Some(status) = err.status() {
			return Self::from_status(status.as_u16(), "");
		}
		Self::NetworkFailure(err.to_string())
	}
}

impl From<serde_json::Error> for ClientError {
	fn from(err: serde_json::Error) -> Self {
		Self::Decode(err.to_string())
	}
}

/// Pulls a human-readable message out of an error body: the JSON `message`
/// field when present, otherwise the trimmed body text.
fn extract_message(body: &str) -> String {
	serde_json::from_str::<serde_json::Value>(body)
		.ok()
		.and_then(|value| value.get("message")?.as_str().map(str::to_owned))
		.unwrap_or_else(|| body.trim().to_owned())
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {error}")]
	Io {
		path: PathBuf,
		error: std::io::Error,
	},

	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("invalid base URL {0:?}: {1}")]
	InvalidUrl(String, String),

	/// A numeric setting that must be positive was zero.
	#[error("{0} must be greater than zero")]
	Zero(&'static str),
}
