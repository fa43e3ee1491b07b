//! Backend access for the plume client core.
//!
//! * [`ClientError`]: the failure taxonomy shared by mutations, page loads
//!   and the event stream.
//! * [`ClientConfig`]: base URL, timeouts and stream tuning, loaded from TOML
//!   with environment overrides.
//! * [`Credential`]: the bearer token, never printed.
//! * [`FeedBackend`]: the REST surface the core consumes, with the reqwest
//!   implementation [`HttpBackend`].

mod backend;
mod config;
mod credential;
mod error;
mod http;

pub use backend::{CommentDraft, FeedBackend};
pub use config::{ClientConfig, StreamConfig};
pub use credential::Credential;
pub use error::{ClientError, ConfigError, Result};
pub use http::HttpBackend;
