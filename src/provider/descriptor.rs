//! Provider descriptor data structures and presets for well-known identity providers.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{_prelude::*, auth::ProviderId};

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// Public clients that prove possession via PKCE.
	NoneWithPkce,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the visitor is redirected to.
	pub authorization: Url,
	/// Token endpoint used for the code exchange.
	pub token: Url,
	/// Profile endpoint queried with the access token.
	pub profile: Url,
}

/// Immutable provider descriptor consumed by the login flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Scopes requested when none are configured explicitly.
	pub default_scopes: Vec<String>,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}
}

/// Identity providers the gateway knows endpoints for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPreset {
	/// Discord (`identify` scope, `id` + `username` profile fields).
	Discord,
	/// GitHub (`read:user` scope, numeric `id` + `login` profile fields).
	Github,
	/// No preset; every endpoint must be configured explicitly.
	Custom,
}
impl ProviderPreset {
	/// Returns the stable preset label.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderPreset::Discord => "discord",
			ProviderPreset::Github => "github",
			ProviderPreset::Custom => "custom",
		}
	}

	/// Seeds a builder with the preset's endpoints, scopes, and quirks.
	pub fn builder(self) -> Result<ProviderDescriptorBuilder, ProviderDescriptorError> {
		let id = ProviderId::new(self.as_str())
			.map_err(|e| ProviderDescriptorError::InvalidId { reason: e.to_string() })?;
		let builder = ProviderDescriptor::builder(id);

		Ok(match self {
			ProviderPreset::Discord => builder
				.authorization_endpoint(parse_endpoint(
					"authorization",
					"https://discord.com/oauth2/authorize",
				)?)
				.token_endpoint(parse_endpoint("token", "https://discord.com/api/oauth2/token")?)
				.profile_endpoint(parse_endpoint("profile", "https://discord.com/api/users/@me")?)
				.default_scopes(["identify"])
				.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost),
			ProviderPreset::Github => builder
				.authorization_endpoint(parse_endpoint(
					"authorization",
					"https://github.com/login/oauth/authorize",
				)?)
				.token_endpoint(parse_endpoint(
					"token",
					"https://github.com/login/oauth/access_token",
				)?)
				.profile_endpoint(parse_endpoint("profile", "https://api.github.com/user")?)
				.default_scopes(["read:user"])
				.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
				.quirks(ProviderQuirks { profile_username_field: "login".into(), ..Default::default() }),
			ProviderPreset::Custom => builder,
		})
	}
}
impl FromStr for ProviderPreset {
	type Err = ProviderDescriptorError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"discord" => Ok(ProviderPreset::Discord),
			"github" => Ok(ProviderPreset::Github),
			"custom" => Ok(ProviderPreset::Custom),
			other => Err(ProviderDescriptorError::UnknownPreset { name: other.to_owned() }),
		}
	}
}

fn parse_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, ProviderDescriptorError> {
	Url::parse(raw)
		.map_err(|_| ProviderDescriptorError::InvalidEndpoint { endpoint, url: raw.to_owned() })
}
