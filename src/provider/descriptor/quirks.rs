// self
use crate::_prelude::*;

/// Provider-specific quirks that influence the login flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Sends a PKCE S256 challenge with the authorization request.
	pub use_pkce: bool,
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
	/// Profile field holding the stable account id (string or number).
	pub profile_id_field: String,
	/// Profile field holding the display handle.
	pub profile_username_field: String,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self {
			use_pkce: true,
			scope_delimiter: ' ',
			profile_id_field: "id".into(),
			profile_username_field: "username".into(),
		}
	}
}
