use std::fmt;
use std::sync::Arc;

const TOKEN_ENV: &str = "PLUME_TOKEN";

/// Bearer credential. `Debug` never prints the token.
///
/// Two credentials are equal when their tokens are equal; the stream hub keys
/// sessions on this.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(Arc<str>);

impl Credential {
	/// Returns `None` for an empty or whitespace-only token.
	pub fn new(token: impl AsRef<str>) -> Option<Self> {
		let token = token.as_ref().trim();
		(!token.is_empty()).then(|| Self(Arc::from(token)))
	}

	pub fn from_env() -> Option<Self> {
		std::env::var(TOKEN_ENV).ok().and_then(Self::new)
	}

	pub fn token(&self) -> &str {
		&self.0
	}

	/// Value of the `Authorization` header.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}

impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Credential(<redacted>)")
	}
}
