//! Visitor identity resolved from the provider profile.

// self
use crate::_prelude::*;

/// Identity established by a completed login.
///
/// `provider_id` is the provider's stable account id; `username` is the mutable display
/// handle shown to backends and in pages.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
	/// Provider-assigned account identifier.
	pub provider_id: String,
	/// Display handle reported by the provider.
	pub username: String,
}
impl Identity {
	/// Creates an identity from its parts.
	pub fn new(provider_id: impl Into<String>, username: impl Into<String>) -> Self {
		Self { provider_id: provider_id.into(), username: username.into() }
	}
}
impl Display for Identity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} ({})", self.username, self.provider_id)
	}
}
