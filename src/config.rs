//! Environment-driven gateway configuration.
//!
//! [`GatewayConfig::from_env`] reads the process environment; [`GatewayConfig::from_lookup`]
//! takes any key lookup so tests can pass a map. Empty values count as unset. Every
//! problem surfaces as a [`ConfigError`] naming the offending variable.

// std
use std::{env, path::PathBuf};
// crates.io
use serde::de::{self, MapAccess, Visitor};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
	login::ClientRegistration,
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderPreset},
	proxy::ProxySettings,
	session::MemorySessionStore,
};

/// Minimum `SESSION_SECRET` length in bytes.
pub const MIN_SESSION_SECRET_LEN: usize = 32;
/// Listen port used when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 3000;

/// Session cookie and store settings.
#[derive(Clone)]
pub struct SessionSettings {
	/// Secret the cookie signing key is derived from.
	pub secret: TokenSecret,
	/// Sliding idle TTL.
	pub ttl: Duration,
	/// Session capacity.
	pub max_sessions: usize,
}
impl Debug for SessionSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionSettings")
			.field("secret", &self.secret)
			.field("ttl", &self.ttl)
			.field("max_sessions", &self.max_sessions)
			.finish()
	}
}

/// Identity provider settings.
#[derive(Clone, Debug)]
pub struct OAuthSettings {
	/// Validated provider descriptor.
	pub descriptor: ProviderDescriptor,
	/// Client registration at the provider.
	pub client: ClientRegistration,
	/// Requested scopes.
	pub scope: ScopeSet,
}

/// Fully validated gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	/// Listen port on all interfaces.
	pub port: u16,
	/// Session settings.
	pub session: SessionSettings,
	/// Identity provider settings.
	pub oauth: OAuthSettings,
	/// Provider ids allowed through.
	pub allowed_users: Vec<String>,
	/// Static routes in document order.
	pub static_routes: Vec<(String, String)>,
	/// Append-only route log, when dynamic routes should persist.
	pub routes_log: Option<PathBuf>,
	/// Proxy settings.
	pub proxy: ProxySettings,
}
impl GatewayConfig {
	/// Loads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Loads the configuration from an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| {
			lookup(name).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
		};
		let secret =
			var("SESSION_SECRET").ok_or(ConfigError::MissingVar { name: "SESSION_SECRET" })?;

		if secret.len() < MIN_SESSION_SECRET_LEN {
			return Err(ConfigError::WeakSessionSecret { min: MIN_SESSION_SECRET_LEN });
		}

		let session = SessionSettings {
			secret: TokenSecret::new(secret),
			ttl: Duration::seconds(
				parse_number(
					"SESSION_TTL_SECS",
					var("SESSION_TTL_SECS"),
					MemorySessionStore::DEFAULT_TTL.whole_seconds(),
				)?
				.max(1),
			),
			max_sessions: parse_number(
				"MAX_SESSIONS",
				var("MAX_SESSIONS"),
				MemorySessionStore::DEFAULT_MAX_SESSIONS,
			)?,
		};
		let oauth = oauth_settings(&var)?;
		let public_tls = match var("PUBLIC_TLS") {
			Some(raw) => parse_bool("PUBLIC_TLS", &raw)?,
			None => oauth.client.redirect_uri.scheme() == "https",
		};
		let proxy = ProxySettings {
			timeout: StdDuration::from_secs(
				parse_number(
					"PROXY_TIMEOUT_SECS",
					var("PROXY_TIMEOUT_SECS"),
					ProxySettings::DEFAULT_TIMEOUT.as_secs(),
				)?
				.max(1),
			),
			follow_redirects: var("PROXY_FOLLOW_REDIRECTS")
				.map(|raw| parse_number("PROXY_FOLLOW_REDIRECTS", Some(raw), 0))
				.transpose()?,
			environment: var("GATEWAY_ENVIRONMENT")
				.unwrap_or_else(|| ProxySettings::DEFAULT_ENVIRONMENT.into()),
			public_tls,
			..Default::default()
		};
		let allowed_users = var("ALLOWED_USERS")
			.map(|raw| {
				raw.split(',')
					.map(str::trim)
					.filter(|entry| !entry.is_empty())
					.map(str::to_owned)
					.collect()
			})
			.unwrap_or_default();
		let static_routes = match var("TARGET_URLS") {
			Some(raw) => parse_route_table(&raw)?,
			None => Vec::new(),
		};

		Ok(Self {
			port: parse_number("PORT", var("PORT"), DEFAULT_PORT)?,
			session,
			oauth,
			allowed_users,
			static_routes,
			routes_log: var("ROUTES_LOG").map(PathBuf::from),
			proxy,
		})
	}
}

fn oauth_settings(var: &impl Fn(&str) -> Option<String>) -> Result<OAuthSettings, ConfigError> {
	let client_id = var("OAUTH_CLIENT_ID")
		.or_else(|| var("DISCORD_CLIENT_ID"))
		.ok_or(ConfigError::MissingVar { name: "OAUTH_CLIENT_ID" })?;
	let client_secret =
		var("OAUTH_CLIENT_SECRET").or_else(|| var("DISCORD_CLIENT_SECRET")).map(TokenSecret::new);
	let (callback_name, callback) = match var("OAUTH_CALLBACK_URL") {
		Some(value) => ("OAUTH_CALLBACK_URL", value),
		None => (
			"CALLBACK_URL",
			var("CALLBACK_URL").ok_or(ConfigError::MissingVar { name: "OAUTH_CALLBACK_URL" })?,
		),
	};
	let redirect_uri = Url::parse(&callback)
		.map_err(|source| ConfigError::InvalidUrl { name: callback_name, source })?;
	let preset = match var("OAUTH_PROVIDER") {
		Some(raw) => ProviderPreset::from_str(&raw)?,
		None => ProviderPreset::Discord,
	};
	let mut builder = preset.builder()?;

	if let Some(url) = parse_url("OAUTH_AUTHORIZE_URL", var("OAUTH_AUTHORIZE_URL"))? {
		builder = builder.authorization_endpoint(url);
	}
	if let Some(url) = parse_url("OAUTH_TOKEN_URL", var("OAUTH_TOKEN_URL"))? {
		builder = builder.token_endpoint(url);
	}
	if let Some(url) = parse_url("OAUTH_PROFILE_URL", var("OAUTH_PROFILE_URL"))? {
		builder = builder.profile_endpoint(url);
	}
	if let Some(field) = var("OAUTH_PROFILE_ID_FIELD") {
		builder.quirks.profile_id_field = field;
	}
	if let Some(field) = var("OAUTH_PROFILE_USERNAME_FIELD") {
		builder.quirks.profile_username_field = field;
	}
	if client_secret.is_none() {
		builder.quirks.use_pkce = true;
		builder = builder.preferred_client_auth_method(ClientAuthMethod::NoneWithPkce);
	}

	let descriptor: ProviderDescriptor = builder.build()?;
	let scope = match var("OAUTH_SCOPES") {
		Some(raw) => ScopeSet::from_str(&raw)?,
		None => ScopeSet::new(descriptor.default_scopes.clone())?,
	};

	Ok(OAuthSettings {
		descriptor,
		client: ClientRegistration { client_id, client_secret, redirect_uri },
		scope,
	})
}

fn parse_url(name: &'static str, raw: Option<String>) -> Result<Option<Url>, ConfigError> {
	raw.map(|raw| Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { name, source }))
		.transpose()
}

fn parse_number<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: Display,
{
	match raw {
		Some(raw) => raw
			.parse()
			.map_err(|e: T::Err| ConfigError::InvalidVar { name, reason: e.to_string() }),
		None => Ok(default),
	}
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
	match raw.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::InvalidVar { name, reason: format!("`{raw}` is not a boolean") }),
	}
}

/// Parses `TARGET_URLS`: a JSON object of route key to backend URL, keeping document order.
pub fn parse_route_table(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
	let mut deserializer = serde_json::Deserializer::from_str(raw);
	let table: OrderedRouteTable = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| ConfigError::InvalidRouteTable { source })?;

	deserializer.end().map_err(|e| ConfigError::InvalidVar {
		name: "TARGET_URLS",
		reason: e.to_string(),
	})?;

	Ok(table.0)
}

struct OrderedRouteTable(Vec<(String, String)>);
impl<'de> Deserialize<'de> for OrderedRouteTable {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: de::Deserializer<'de>,
	{
		struct TableVisitor;
		impl<'de> Visitor<'de> for TableVisitor {
			type Value = OrderedRouteTable;

			fn expecting(&self, f: &mut Formatter) -> FmtResult {
				f.write_str("a JSON object mapping route keys to backend URLs")
			}

			fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
			where
				A: MapAccess<'de>,
			{
				let mut entries = Vec::with_capacity(map.size_hint().unwrap_or_default());

				while let Some(entry) = map.next_entry::<String, String>()? {
					entries.push(entry);
				}

				Ok(OrderedRouteTable(entries))
			}
		}

		deserializer.deserialize_map(TableVisitor)
	}
}
