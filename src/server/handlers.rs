//! Request handlers behind [`Gateway::router`](super::Gateway::router).

// crates.io
use axum::{
	Json,
	extract::{Path, Query, Request, State, rejection::JsonRejection},
	http::StatusCode,
	response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
// self
use super::{ApiError, GatewayError, GatewayState, cookies, pages};
use crate::{
	_prelude::*,
	auth::{Identity, RouteKey},
	error::ProxyError,
	login::AuthorizationCallback,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	policy::Access,
	registry::RouteEntry,
	session::{PendingRoute, SessionId, StoreError},
};

const PROXY_PREFIX: &str = "/proxy/";

/// Query accepted by `GET /login`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginQuery {
	/// Route whose landing page becomes the post-login destination.
	pub route: Option<String>,
}

/// Body accepted by `POST /routes`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRoute {
	/// Route key to claim.
	pub route_key: String,
	/// Backend base URL the key forwards to.
	pub backend_base_url: String,
}

/// Body returned by the route-management API.
#[derive(Clone, Debug, Serialize)]
pub struct RouteList {
	/// Registered route keys in registration order.
	pub routes: Vec<RouteKey>,
}

/// `GET /`.
pub async fn index(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
) -> Result<Html<String>, GatewayError> {
	let Some(identity) = identity_of(&state, &jar) else {
		return Ok(Html(pages::login_prompt()));
	};

	authorize(&state, &identity)?;

	Ok(Html(pages::route_index(&identity, &state.registry.keys())))
}

/// `GET /login`.
pub async fn login(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
	Query(query): Query<LoginQuery>,
) -> Result<Response, GatewayError> {
	let (jar, session) = cookies::ensure(jar, state.store.as_ref(), state.public_tls)?;
	let desired = query
		.route
		.as_deref()
		.and_then(|route| state.registry.lookup(route))
		.map(|entry| PendingRoute::landing(entry.route.clone()));
	let redirect = state.broker.begin_login(&session.id, desired)?;

	Ok((jar, Redirect::to(redirect.authorize_url.as_str())).into_response())
}

/// `GET /callback`.
pub async fn callback(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
	Query(callback): Query<AuthorizationCallback>,
) -> Response {
	let Some(session) = cookies::current(&jar, state.store.as_ref()) else {
		tracing::warn!(phase = "failed", "callback without a live session");

		return (jar, Redirect::to("/")).into_response();
	};

	match state.broker.complete_login(&session.id, callback).await {
		Ok(outcome) => {
			let target = outcome.destination.map(|pending| pending.target);
			let jar = match rotate(&state, &jar, &session.id, outcome.identity) {
				Ok(rotated) => rotated,
				Err(e) => {
					tracing::warn!(error = %e, "session rotation failed; keeping the login session");

					jar
				},
			};

			(jar, Redirect::to(target.as_deref().unwrap_or("/"))).into_response()
		},
		Err(_) => (jar, Redirect::to("/")).into_response(),
	}
}

/// `POST /logout`.
pub async fn logout(State(state): State<GatewayState>, jar: SignedCookieJar) -> Response {
	(end_session(&state, jar), StatusCode::OK).into_response()
}

/// `GET /logout`.
pub async fn logout_and_redirect(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
) -> Response {
	(end_session(&state, jar), Redirect::to("/")).into_response()
}

/// `GET /cookie-sync`.
pub async fn cookie_sync() -> StatusCode {
	StatusCode::NO_CONTENT
}

/// `GET /healthz`.
pub async fn healthz() -> &'static str {
	"ok"
}

/// `GET /{route}`: shortcut onto the route's proxy landing page.
pub async fn route_shortcut(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
	Path(route): Path<String>,
) -> Result<Response, GatewayError> {
	let entry = known_route(&state, &route)?;
	let landing = PendingRoute::landing(entry.route.clone());

	let Some(identity) = identity_of(&state, &jar) else {
		return send_to_login(&state, jar, landing);
	};

	authorize(&state, &identity)?;

	Ok(Redirect::to(&landing.target).into_response())
}

/// `ANY /proxy/{route}[/{*rest}]`.
pub async fn proxy(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
	request: Request,
) -> Result<Response, GatewayError> {
	let path = request.uri().path().to_owned();
	let (route, remainder) = split_proxy_path(&path);
	let entry = known_route(&state, route)?;

	let Some(identity) = identity_of(&state, &jar) else {
		let target = request.uri().path_and_query().map_or(path.as_str(), |pq| pq.as_str());
		let pending = PendingRoute::new(entry.route.clone(), target)
			.unwrap_or_else(|| PendingRoute::landing(entry.route.clone()));

		return send_to_login(&state, jar, pending);
	};

	authorize(&state, &identity)?;

	Ok(state.proxy.forward(route, remainder, &identity, request).await?)
}

/// `GET /routes`.
pub async fn list_routes(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
) -> Result<Json<RouteList>, ApiError> {
	api_identity(&state, &jar)?;

	Ok(Json(route_list(&state)))
}

/// `POST /routes`.
pub async fn register_route(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
	payload: Result<Json<RegisterRoute>, JsonRejection>,
) -> Result<Json<RouteList>, ApiError> {
	let identity = api_identity(&state, &jar)?;
	let Json(body) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
	let span = FlowSpan::new(FlowKind::Registration, "register");

	obs::record_flow_outcome(FlowKind::Registration, FlowOutcome::Attempt);

	let result = span.in_scope(|| state.registry.register(&body.route_key, &body.backend_base_url));

	match &result {
		Ok(entry) => tracing::info!(
			route = %entry.route,
			backend = %entry.origin(),
			user = %identity,
			"route registered"
		),
		Err(e) => tracing::debug!(route = %body.route_key, error = %e, "route registration rejected"),
	}

	obs::record_result(FlowKind::Registration, result)?;

	Ok(Json(route_list(&state)))
}

/// `DELETE /routes/{route}`.
pub async fn remove_route(
	State(state): State<GatewayState>,
	jar: SignedCookieJar,
	Path(route): Path<String>,
) -> Result<Json<RouteList>, ApiError> {
	let identity = api_identity(&state, &jar)?;
	let span = FlowSpan::new(FlowKind::Registration, "remove");

	obs::record_flow_outcome(FlowKind::Registration, FlowOutcome::Attempt);

	let removed = obs::record_result(
		FlowKind::Registration,
		span.in_scope(|| state.registry.remove(&route)),
	)?;

	tracing::info!(route = %removed.route, user = %identity, "route removed");

	Ok(Json(route_list(&state)))
}

/// Splits a raw `/proxy/<route><remainder>` path; the remainder is empty or starts with `/`.
pub fn split_proxy_path(path: &str) -> (&str, &str) {
	let rest = path.strip_prefix(PROXY_PREFIX).unwrap_or(path);

	match rest.find('/') {
		Some(at) => rest.split_at(at),
		None => (rest, ""),
	}
}

fn identity_of(state: &GatewayState, jar: &SignedCookieJar) -> Option<Identity> {
	cookies::current(jar, state.store.as_ref()).and_then(|session| session.identity)
}

fn authorize(state: &GatewayState, identity: &Identity) -> Result<(), GatewayError> {
	match state.policy.decide(identity) {
		Access::Authorized => Ok(()),
		Access::Forbidden => {
			tracing::info!(user = %identity, "identity is not on the allow-list");

			Err(GatewayError::Forbidden)
		},
	}
}

fn api_identity(state: &GatewayState, jar: &SignedCookieJar) -> Result<Identity, ApiError> {
	let identity = identity_of(state, jar).ok_or(GatewayError::Unauthenticated)?;

	authorize(state, &identity)?;

	Ok(identity)
}

fn known_route(state: &GatewayState, route: &str) -> Result<Arc<RouteEntry>, ProxyError> {
	state.registry.lookup(route).ok_or_else(|| ProxyError::UnknownRoute { route: route.to_owned() })
}

fn route_list(state: &GatewayState) -> RouteList {
	RouteList { routes: state.registry.keys() }
}

fn send_to_login(
	state: &GatewayState,
	jar: SignedCookieJar,
	pending: PendingRoute,
) -> Result<Response, GatewayError> {
	let (jar, session) = cookies::ensure(jar, state.store.as_ref(), state.public_tls)?;

	tracing::debug!(route = %pending.route, "anonymous visitor sent to login");
	state.store.set_pending_route(&session.id, pending);

	Ok((jar, Redirect::to("/login")).into_response())
}

fn end_session(state: &GatewayState, jar: SignedCookieJar) -> SignedCookieJar {
	if let Some(session) = cookies::current(&jar, state.store.as_ref()) {
		state.broker.logout(&session.id);
	}

	cookies::clear(jar)
}

// Moves a freshly authenticated identity onto a new session id so the pre-login cookie
// cannot be replayed.
fn rotate(
	state: &GatewayState,
	jar: &SignedCookieJar,
	old: &SessionId,
	identity: Identity,
) -> Result<SignedCookieJar, StoreError> {
	let fresh = state.store.rotate(old, identity)?;

	Ok(jar.clone().add(cookies::session_cookie(&fresh.id, state.public_tls)))
}
