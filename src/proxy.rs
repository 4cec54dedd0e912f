//! Reverse-proxy engine: forwards authorized requests to the backend selected by a route key.
//!
//! Requests keep their method, query, and body; hop-by-hop headers, `Host`, the gateway
//! session cookie, and spoofed identity headers are dropped before the gateway's own identity
//! headers are added. Responses are streamed back with `Set-Cookie` and `Location` rewritten
//! onto the gateway origin.

pub mod cookies;
pub mod headers;

// crates.io
use axum::{
	body::{Body, HttpBody},
	http::{
		HeaderMap, HeaderValue, Request, Response,
		header::LOCATION,
	},
};
use reqwest::redirect::Policy;
// self
use crate::{
	_prelude::*,
	auth::Identity,
	error::{ConfigError, ProxyError},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	registry::{RouteEntry, RouteRegistry},
	session::SESSION_COOKIE_NAME,
};

/// Knobs for outbound calls and response rewriting.
#[derive(Clone, Debug)]
pub struct ProxySettings {
	/// Bound on the time to receive the backend response head, and on every idle gap while
	/// the body streams.
	pub timeout: StdDuration,
	/// Follow up to this many backend redirects; `None` relays them to the visitor.
	pub follow_redirects: Option<usize>,
	/// Value of the `X-Gateway-Environment` header.
	pub environment: String,
	/// Whether the gateway itself is served over TLS.
	pub public_tls: bool,
	/// Name of the gateway session cookie to hide from backends.
	pub session_cookie_name: String,
}
impl ProxySettings {
	/// Default backend timeout.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);
	/// Default environment tag.
	pub const DEFAULT_ENVIRONMENT: &str = "production";
	const MAX_CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
}
impl Default for ProxySettings {
	fn default() -> Self {
		Self {
			timeout: Self::DEFAULT_TIMEOUT,
			follow_redirects: None,
			environment: Self::DEFAULT_ENVIRONMENT.into(),
			public_tls: false,
			session_cookie_name: SESSION_COOKIE_NAME.into(),
		}
	}
}

/// Forwards requests for registered routes.
#[derive(Clone, Debug)]
pub struct ProxyEngine {
	registry: Arc<RouteRegistry>,
	client: ReqwestClient,
	settings: ProxySettings,
}
impl ProxyEngine {
	/// Builds the engine and its outbound client.
	pub fn new(registry: Arc<RouteRegistry>, settings: ProxySettings) -> Result<Self, ConfigError> {
		let redirect = match settings.follow_redirects {
			Some(max) => Policy::limited(max),
			None => Policy::none(),
		};
		let client = ReqwestClient::builder()
			.connect_timeout(settings.timeout.min(ProxySettings::MAX_CONNECT_TIMEOUT))
			.read_timeout(settings.timeout)
			.redirect(redirect)
			.build()?;

		Ok(Self { registry, client, settings })
	}

	/// Route registry consulted for every request.
	pub fn registry(&self) -> &Arc<RouteRegistry> {
		&self.registry
	}

	/// Active settings.
	pub fn settings(&self) -> &ProxySettings {
		&self.settings
	}

	/// Forwards `request` to the backend registered under `route`.
	///
	/// `remainder` is the raw path after `/proxy/<route>` (empty or starting with `/`).
	/// Unknown routes fail before any outbound call. Dropping the returned future cancels the
	/// backend call.
	pub async fn forward(
		&self,
		route: &str,
		remainder: &str,
		identity: &Identity,
		request: Request<Body>,
	) -> Result<Response<Body>, ProxyError> {
		let span = FlowSpan::new(FlowKind::Proxy, "forward");

		obs::record_flow_outcome(FlowKind::Proxy, FlowOutcome::Attempt);

		let result = span.instrument(self.forward_inner(route, remainder, identity, request)).await;

		match &result {
			Ok(response) => tracing::debug!(route, status = response.status().as_u16(), "forwarded"),
			Err(ProxyError::UnknownRoute { .. }) => tracing::debug!(route, "unknown route"),
			Err(ProxyError::PathEscapesBase { .. }) =>
				tracing::info!(route, "rejected path with dot segments"),
			Err(e) => tracing::warn!(route, error = %e, "forwarding failed"),
		}

		obs::record_result(FlowKind::Proxy, result)
	}

	async fn forward_inner(
		&self,
		route: &str,
		remainder: &str,
		identity: &Identity,
		request: Request<Body>,
	) -> Result<Response<Body>, ProxyError> {
		let entry = self
			.registry
			.lookup(route)
			.ok_or_else(|| ProxyError::UnknownRoute { route: route.to_owned() })?;
		let (parts, body) = request.into_parts();
		let target = target_url(&entry.backend, remainder, parts.uri.query())
			.ok_or_else(|| ProxyError::PathEscapesBase { route: route.to_owned() })?;
		let prefix = format!("/proxy/{}", entry.route);
		let mut outbound =
			headers::outbound_request_headers(&parts.headers, &self.settings.session_cookie_name);

		headers::inject_identity(&mut outbound, identity, &self.settings.environment, &prefix)
			.map_err(|reason| ProxyError::InvalidTarget { route: route.to_owned(), reason })?;

		let mut builder = self.client.request(parts.method, target.clone()).headers(outbound);

		if !body.is_end_stream() {
			builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
		}

		let response = match tokio::time::timeout(self.settings.timeout, builder.send()).await {
			Err(_) => return Err(self.timeout_error(&entry)),
			Ok(Err(e)) if e.is_redirect() =>
				return Err(ProxyError::TooManyRedirects {
					route: entry.route.to_string(),
					backend: entry.origin(),
					max: self.settings.follow_redirects.unwrap_or_default(),
				}),
			Ok(Err(e)) if e.is_timeout() => return Err(self.timeout_error(&entry)),
			Ok(Err(e)) =>
				return Err(ProxyError::BackendUnreachable {
					route: entry.route.to_string(),
					backend: entry.origin(),
					source: Box::new(e),
				}),
			Ok(Ok(response)) => response,
		};
		let status = response.status();
		let mut relayed = response.headers().clone();

		headers::strip_hop_by_hop(&mut relayed);
		cookies::rewrite_all(
			&mut relayed,
			self.settings.public_tls,
			&self.settings.session_cookie_name,
			route,
		);
		rewrite_location(&mut relayed, &entry, response.url());

		let mut out = Response::new(Body::from_stream(response.bytes_stream()));

		*out.status_mut() = status;
		*out.headers_mut() = relayed;

		Ok(out)
	}

	fn timeout_error(&self, entry: &RouteEntry) -> ProxyError {
		ProxyError::BackendTimeout {
			route: entry.route.to_string(),
			backend: entry.origin(),
			timeout: self.settings.timeout,
		}
	}
}

/// Joins the backend base path with the forwarded remainder and keeps the inbound query.
///
/// Returns `None` when the remainder holds `.` or `..` segments, plain or percent-encoded,
/// since URL normalization would resolve them outside the base path.
pub fn target_url(backend: &Url, remainder: &str, query: Option<&str>) -> Option<Url> {
	if remainder.split(['/', '\\']).any(is_dot_segment) {
		return None;
	}

	let mut url = backend.clone();
	let base = backend.path().trim_end_matches('/');
	let path = if remainder.is_empty() { format!("{base}/") } else { format!("{base}{remainder}") };

	url.set_path(&path);
	url.set_query(query);

	Some(url)
}

fn is_dot_segment(segment: &str) -> bool {
	let decoded = segment.to_ascii_lowercase().replace("%2e", ".");

	decoded == "." || decoded == ".."
}

/// Maps a backend URL back onto the gateway when it lies inside the backend base.
pub fn gateway_path(entry: &RouteEntry, location: &Url) -> Option<String> {
	if location.origin() != entry.backend.origin() {
		return None;
	}

	let base = entry.backend.path().trim_end_matches('/');
	let rest = location.path().strip_prefix(base)?;

	if !(rest.is_empty() || rest.starts_with('/')) {
		return None;
	}

	let mut path = format!("/proxy/{}{}", entry.route, if rest.is_empty() { "/" } else { rest });

	if let Some(query) = location.query() {
		path.push('?');
		path.push_str(query);
	}
	if let Some(fragment) = location.fragment() {
		path.push('#');
		path.push_str(fragment);
	}

	Some(path)
}

fn rewrite_location(headers: &mut HeaderMap, entry: &RouteEntry, request_url: &Url) {
	let rewritten = headers
		.get(LOCATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|raw| request_url.join(raw).ok())
		.and_then(|resolved| gateway_path(entry, &resolved))
		.and_then(|path| HeaderValue::from_str(&path).ok());

	if let Some(value) = rewritten {
		headers.insert(LOCATION, value);
	}
}
