//! HTTP surface: binds the login, routing, and proxy paths to the gateway components.
//!
//! [`Gateway::new`] assembles the session store, identity broker, access policy, route
//! registry, and proxy engine from a [`GatewayConfig`]. [`Gateway::router`] exposes the axum
//! [`Router`] (useful for in-process tests) and [`Gateway::serve`] runs it until shutdown
//! alongside a session sweeper.

pub mod cookies;
pub mod handlers;
pub mod pages;

// crates.io
use axum::{
	Json, Router,
	extract::FromRef,
	http::StatusCode,
	response::{Html, IntoResponse, Response},
	routing::{any, delete, get},
};
use axum_extra::extract::cookie::Key;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
// self
use crate::{
	_prelude::*,
	config::GatewayConfig,
	error::{ConfigError, LoginError, ProxyError, RegistryError},
	http::ReqwestHttpClient,
	login::IdentityBroker,
	policy::AccessPolicy,
	provider::DefaultProviderStrategy,
	proxy::ProxyEngine,
	registry::RouteRegistry,
	session::{MemorySessionStore, SessionStore, StoreError},
};

const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct GatewayState {
	/// Visitor sessions.
	pub store: Arc<dyn SessionStore>,
	/// OAuth login driver.
	pub broker: Arc<IdentityBroker>,
	/// Allow-list policy.
	pub policy: Arc<AccessPolicy>,
	/// Route registry.
	pub registry: Arc<RouteRegistry>,
	/// Reverse-proxy engine.
	pub proxy: Arc<ProxyEngine>,
	/// Whether the gateway is served over TLS.
	pub public_tls: bool,
	key: Key,
}
impl FromRef<GatewayState> for Key {
	fn from_ref(state: &GatewayState) -> Self {
		state.key.clone()
	}
}
impl Debug for GatewayState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GatewayState")
			.field("broker", &self.broker)
			.field("policy", &self.policy)
			.field("registry", &self.registry)
			.field("public_tls", &self.public_tls)
			.finish()
	}
}

/// Assembled gateway.
#[derive(Clone, Debug)]
pub struct Gateway {
	state: GatewayState,
}
impl Gateway {
	/// Wires every component from `config`; route-table, descriptor, and client problems are
	/// reported as [`ConfigError`].
	pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
		let store: Arc<dyn SessionStore> = Arc::new(
			MemorySessionStore::default()
				.with_ttl(config.session.ttl)
				.with_max_sessions(config.session.max_sessions),
		);
		let http_client = ReqwestHttpClient::with_timeout(ReqwestHttpClient::DEFAULT_TIMEOUT)?;
		let broker = IdentityBroker::new(
			Arc::clone(&store),
			config.oauth.descriptor,
			Arc::new(DefaultProviderStrategy),
			config.oauth.client,
			config.oauth.scope,
			http_client,
		)?;
		let registry = Arc::new(
			RouteRegistry::seeded(config.static_routes, config.routes_log.as_deref())
				.map_err(ConfigError::InvalidRoute)?,
		);
		let proxy = ProxyEngine::new(Arc::clone(&registry), config.proxy.clone())?;
		let policy = AccessPolicy::from_allow_list(&config.allowed_users);

		if policy.is_empty() {
			tracing::warn!("allow-list is empty; no visitor will be authorized");
		}

		let state = GatewayState {
			store,
			broker: Arc::new(broker),
			policy: Arc::new(policy),
			registry,
			proxy: Arc::new(proxy),
			public_tls: config.proxy.public_tls,
			key: cookies::signing_key(&config.session.secret),
		};

		Ok(Self { state })
	}

	/// Shared handler state.
	pub fn state(&self) -> &GatewayState {
		&self.state
	}

	/// Builds the axum router.
	pub fn router(&self) -> Router {
		Router::new()
			.route("/", get(handlers::index))
			.route("/login", get(handlers::login))
			.route("/callback", get(handlers::callback))
			.route("/logout", get(handlers::logout_and_redirect).post(handlers::logout))
			.route("/cookie-sync", get(handlers::cookie_sync))
			.route("/healthz", get(handlers::healthz))
			.route("/routes", get(handlers::list_routes).post(handlers::register_route))
			.route("/routes/{route}", delete(handlers::remove_route))
			.route("/proxy/{route}", any(handlers::proxy))
			.route("/proxy/{route}/", any(handlers::proxy))
			.route("/proxy/{route}/{*rest}", any(handlers::proxy))
			.route("/{route}", get(handlers::route_shortcut))
			.layer(TraceLayer::new_for_http())
			.with_state(self.state.clone())
	}

	/// Serves the router on `listener` until `shutdown` resolves.
	pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
	where
		F: 'static + Send + Future<Output = ()>,
	{
		let store = Arc::clone(&self.state.store);
		let sweeper = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(SWEEP_INTERVAL);

			loop {
				ticker.tick().await;

				let removed = store.sweep_expired(OffsetDateTime::now_utc());

				if removed > 0 {
					tracing::debug!(removed, "expired sessions swept");
				}
			}
		});
		let addr = listener.local_addr()?;

		tracing::info!(%addr, routes = self.state.registry.len(), "gateway listening");

		let served = axum::serve(listener, self.router()).with_graceful_shutdown(shutdown).await;

		sweeper.abort();

		served?;

		Ok(())
	}
}

/// Failure surfaced by a gateway handler.
#[derive(Debug, ThisError)]
pub enum GatewayError {
	/// No authenticated identity.
	#[error("Authentication is required.")]
	Unauthenticated,
	/// Identity is not on the allow-list.
	#[error("Access is forbidden.")]
	Forbidden,
	/// Request is malformed.
	#[error("Bad request: {0}.")]
	BadRequest(String),
	/// Component failure.
	#[error(transparent)]
	Gateway(#[from] Error),
}
impl GatewayError {
	/// HTTP status the failure maps to.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::Unauthenticated => StatusCode::UNAUTHORIZED,
			Self::Forbidden => StatusCode::FORBIDDEN,
			Self::BadRequest(_) => StatusCode::BAD_REQUEST,
			Self::Gateway(Error::Proxy(e)) => match e {
				ProxyError::UnknownRoute { .. } => StatusCode::NOT_FOUND,
				ProxyError::PathEscapesBase { .. } => StatusCode::BAD_REQUEST,
				ProxyError::BackendUnreachable { .. } | ProxyError::TooManyRedirects { .. } =>
					StatusCode::BAD_GATEWAY,
				ProxyError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
				ProxyError::InvalidTarget { .. } => StatusCode::INTERNAL_SERVER_ERROR,
			},
			Self::Gateway(Error::Registry(e)) => match e {
				RegistryError::Conflict { .. } => StatusCode::CONFLICT,
				RegistryError::UnknownRoute { .. } => StatusCode::NOT_FOUND,
				RegistryError::InvalidRouteKey(_) | RegistryError::InvalidBackend { .. } =>
					StatusCode::BAD_REQUEST,
				RegistryError::Log(_) => StatusCode::INTERNAL_SERVER_ERROR,
			},
			Self::Gateway(Error::Storage(StoreError::Capacity { .. })) =>
				StatusCode::SERVICE_UNAVAILABLE,
			Self::Gateway(Error::Login(LoginError::UnknownSession)) => StatusCode::UNAUTHORIZED,
			Self::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	// Text safe to show visitors: registry errors echo the caller's own input, everything
	// else stays generic.
	fn public_message(&self) -> String {
		match self {
			Self::BadRequest(_) | Self::Gateway(Error::Registry(_)) => self.to_string(),
			_ => self.status().canonical_reason().unwrap_or("Error").to_owned(),
		}
	}

	fn log(&self) {
		let status = self.status();

		if status.is_server_error() {
			tracing::error!(status = status.as_u16(), error = %self, "request failed");
		} else {
			tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
		}
	}
}
impl IntoResponse for GatewayError {
	fn into_response(self) -> Response {
		self.log();

		let status = self.status();
		let title = format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("Error"));

		(status, Html(pages::error_page(&title, &self.public_message()))).into_response()
	}
}
impl From<ProxyError> for GatewayError {
	fn from(e: ProxyError) -> Self {
		Self::Gateway(e.into())
	}
}
impl From<RegistryError> for GatewayError {
	fn from(e: RegistryError) -> Self {
		Self::Gateway(e.into())
	}
}
impl From<LoginError> for GatewayError {
	fn from(e: LoginError) -> Self {
		Self::Gateway(e.into())
	}
}
impl From<StoreError> for GatewayError {
	fn from(e: StoreError) -> Self {
		Self::Gateway(e.into())
	}
}

/// [`GatewayError`] rendered as JSON for the route-management API.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);
impl<E> From<E> for ApiError
where
	E: Into<GatewayError>,
{
	fn from(e: E) -> Self {
		Self(e.into())
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		self.0.log();

		(self.0.status(), Json(json!({ "error": self.0.public_message() }))).into_response()
	}
}
