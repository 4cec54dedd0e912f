//! Gateway-level error types shared across login, routing, proxying, and configuration.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::session::StoreError,
	),
	/// Local configuration problem; fatal at startup.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Login could not be started or completed.
	#[error(transparent)]
	Login(#[from] LoginError),
	/// Route registration or removal failed.
	#[error(transparent)]
	Registry(#[from] RegistryError),
	/// Forwarding to a backend failed.
	#[error(transparent)]
	Proxy(#[from] ProxyError),
	/// Listener or socket failure.
	#[error("I/O error occurred while serving the gateway.")]
	Io(#[from] std::io::Error),
}

/// Configuration and validation failures raised while assembling the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required environment variable is absent.
	#[error("Required variable `{name}` is not set.")]
	MissingVar {
		/// Variable name.
		name: &'static str,
	},
	/// Session secret is too short to derive a signing key from.
	#[error("`SESSION_SECRET` must be at least {min} bytes long.")]
	WeakSessionSecret {
		/// Minimum accepted length in bytes.
		min: usize,
	},
	/// A variable holds a value that cannot be interpreted.
	#[error("Variable `{name}` is invalid: {reason}.")]
	InvalidVar {
		/// Variable name.
		name: &'static str,
		/// Human-readable reason.
		reason: String,
	},
	/// A variable holds a malformed URL.
	#[error("Variable `{name}` is not a valid URL.")]
	InvalidUrl {
		/// Variable name.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// `TARGET_URLS` is not a JSON object of strings.
	#[error("`TARGET_URLS` is malformed.")]
	InvalidRouteTable {
		/// Structured parsing failure pointing at the offending entry.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A statically configured route was rejected by the registry.
	#[error("Static route table is invalid.")]
	InvalidRoute(#[source] RegistryError),
	/// Provider descriptor failed validation.
	#[error("Provider descriptor is invalid.")]
	InvalidDescriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Configured scopes could not be normalized.
	#[error("Configured scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while driving a visitor through the OAuth login.
#[derive(Debug, ThisError)]
pub enum LoginError {
	/// The session named by the cookie no longer exists.
	#[error("Session is unknown or expired.")]
	UnknownSession,
	/// A callback arrived for a session that never started a login.
	#[error("No login is in progress for this session.")]
	NoLoginInProgress,
	/// Presented state does not match the one issued for the session.
	#[error("Authorization state does not match.")]
	StateMismatch,
	/// The issued state outlived its validity window.
	#[error("Authorization state has expired.")]
	StateExpired,
	/// The issued state was already used by an earlier callback.
	#[error("Authorization state was already consumed.")]
	StateConsumed,
	/// The callback omitted a required query parameter.
	#[error("Callback is missing the `{name}` parameter.")]
	MissingParameter {
		/// Parameter name.
		name: &'static str,
	},
	/// The provider redirected back with an OAuth error.
	#[error("Provider denied the authorization request: {error}.")]
	ProviderDenied {
		/// OAuth `error` value.
		error: String,
		/// Optional OAuth `error_description` value.
		description: Option<String>,
	},
	/// Provider rejected the authorization code.
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider answered with an unexpected or temporary failure.
	#[error("Provider is unavailable: {reason}.")]
	ProviderUnavailable {
		/// Summary of the failure.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Network failure while talking to the provider.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Profile endpoint answered with a non-success status.
	#[error("Profile endpoint returned HTTP {status}.")]
	ProfileRejected {
		/// HTTP status code.
		status: u16,
	},
	/// Profile endpoint returned a body that is not JSON.
	#[error("Profile endpoint returned malformed JSON.")]
	ProfileParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Profile document lacks a usable identity field.
	#[error("Profile is missing the `{field}` field.")]
	ProfileField {
		/// Field name looked up in the profile.
		field: String,
	},
}
impl LoginError {
	/// Returns true for failures that may indicate a forged or replayed callback.
	pub fn is_forgery_suspect(&self) -> bool {
		matches!(
			self,
			Self::NoLoginInProgress | Self::StateMismatch | Self::StateExpired | Self::StateConsumed
		)
	}
}

/// Failures raised while forwarding a request to a backend.
#[derive(Debug, ThisError)]
pub enum ProxyError {
	/// No backend is registered under the route key.
	#[error("Route `{route}` is not registered.")]
	UnknownRoute {
		/// Requested route key.
		route: String,
	},
	/// Backend could not be reached (connect, DNS, protocol).
	#[error("Backend `{backend}` for route `{route}` is unreachable.")]
	BackendUnreachable {
		/// Route key being forwarded.
		route: String,
		/// Backend origin.
		backend: String,
		/// Transport failure.
		#[source]
		source: BoxError,
	},
	/// Backend did not answer within the configured timeout.
	#[error("Backend `{backend}` for route `{route}` timed out after {timeout:?}.")]
	BackendTimeout {
		/// Route key being forwarded.
		route: String,
		/// Backend origin.
		backend: String,
		/// Timeout that elapsed.
		timeout: StdDuration,
	},
	/// Backend exceeded the redirect-following limit.
	#[error("Backend `{backend}` for route `{route}` exceeded {max} redirects.")]
	TooManyRedirects {
		/// Route key being forwarded.
		route: String,
		/// Backend origin.
		backend: String,
		/// Configured redirect limit.
		max: usize,
	},
	/// The forwarded path holds dot segments that would leave the backend base path.
	#[error("Path for route `{route}` leaves the backend base path.")]
	PathEscapesBase {
		/// Route key being forwarded.
		route: String,
	},
	/// The outbound target or response could not be assembled.
	#[error("Request for route `{route}` could not be forwarded: {reason}.")]
	InvalidTarget {
		/// Route key being forwarded.
		route: String,
		/// Human-readable reason.
		reason: String,
	},
}

/// Failures raised by the route registry.
#[derive(Debug, ThisError)]
pub enum RegistryError {
	/// The route key is already registered; the first writer wins.
	#[error("Route `{route}` is already registered.")]
	Conflict {
		/// Conflicting route key.
		route: String,
	},
	/// The route key is not registered.
	#[error("Route `{route}` is not registered.")]
	UnknownRoute {
		/// Requested route key.
		route: String,
	},
	/// The route key failed validation.
	#[error(transparent)]
	InvalidRouteKey(#[from] crate::auth::IdentifierError),
	/// The backend base URL is malformed or unsupported.
	#[error("Backend URL `{url}` is invalid: {reason}.")]
	InvalidBackend {
		/// Offending URL text.
		url: String,
		/// Human-readable reason.
		reason: String,
	},
	/// Durable route log could not be written or read.
	#[error("Route log failure: {0}")]
	Log(#[source] crate::session::StoreError),
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn state_failures_are_forgery_suspects() {
		assert!(LoginError::StateMismatch.is_forgery_suspect());
		assert!(LoginError::StateConsumed.is_forgery_suspect());
		assert!(LoginError::StateExpired.is_forgery_suspect());
		assert!(!LoginError::ProfileRejected { status: 500 }.is_forgery_suspect());
		assert!(
			!LoginError::ProviderDenied { error: "access_denied".into(), description: None }
				.is_forgery_suspect()
		);
	}

	#[test]
	fn proxy_messages_name_backend_for_operators() {
		let err = ProxyError::BackendTimeout {
			route: "gamma".into(),
			backend: "http://backend.internal:8080".into(),
			timeout: StdDuration::from_secs(30),
		};

		assert_eq!(
			err.to_string(),
			"Backend `http://backend.internal:8080` for route `gamma` timed out after 30s."
		);
	}
}
