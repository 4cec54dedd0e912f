//! Provider strategy hooks that customize the code exchange and identity resolution.
//!
//! Implementations classify token endpoint failures and map the provider's profile document
//! into an [`Identity`] without tying the login flow to any particular HTTP client.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::Identity,
	error::LoginError,
	provider::ProviderQuirks,
};

/// Strategy hook that allows providers to decorate requests, classify errors, and read
/// profiles.
///
/// Implementors are required to be `Send + Sync`. Only [`classify_token_error`] is required;
/// the other hooks have defaults that suit providers returning flat JSON profiles.
///
/// [`classify_token_error`]: ProviderStrategy::classify_token_error
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed code exchange into the gateway taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Gives providers a chance to add custom form parameters to the code exchange.
	fn augment_token_request(&self, _form: &mut Vec<(String, String)>) {}

	/// Resolves the profile document into an identity using the descriptor's field names.
	///
	/// Numeric ids are rendered in decimal so allow-lists can be written as plain strings.
	fn resolve_identity(
		&self,
		profile: &Value,
		quirks: &ProviderQuirks,
	) -> Result<Identity, LoginError> {
		let provider_id = read_field(profile, &quirks.profile_id_field)?;
		let username = read_field(profile, &quirks.profile_username_field)?;

		Ok(Identity::new(provider_id, username))
	}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the authorization code.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Failure is temporary or unexpected; the visitor may try again later.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
///
/// The struct keeps only primitive data (status codes, OAuth fields, body preview) so
/// strategies stay decoupled from reqwest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy that applies RFC-guided heuristics.
///
/// It prioritizes structured OAuth fields (`error`, `error_description`), then falls back to
/// body text hints, and finally the HTTP status code.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if let Some(kind) = ctx
			.oauth_error
			.as_deref()
			.and_then(match_exact_value)
			.or_else(|| ctx.error_description.as_deref().and_then(match_exact_value))
			.or_else(|| classify_body(ctx.error_description.as_deref()))
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn read_field(profile: &Value, field: &str) -> Result<String, LoginError> {
	match profile.get(field) {
		Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
		Some(Value::Number(value)) => Ok(value.to_string()),
		_ => Err(LoginError::ProfileField { field: field.to_owned() }),
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant")
		|| value.eq_ignore_ascii_case("access_denied")
		|| value.eq_ignore_ascii_case("invalid_request")
	{
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401 | 403) => ProviderErrorKind::InvalidClient,
		_ => ProviderErrorKind::Transient,
	}
}
