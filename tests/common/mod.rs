#![allow(dead_code)]

// std
use std::collections::HashMap;
// crates.io
use axum::{
	Router,
	body::{Body, to_bytes},
	http::{
		Request, Response, StatusCode,
		header::{COOKIE, LOCATION, SET_COOKIE},
	},
};
use httpmock::{Mock, prelude::*};
use serde_json::json;
use tower::ServiceExt;
// self
use oauth2_gateway::{config::GatewayConfig, server::Gateway, session::SESSION_COOKIE_NAME, url::Url};

pub const SECRET: &str = "integration-secret-0123456789abcdef";
pub const ALICE: (&str, &str) = ("1001", "alice");
pub const BOB: (&str, &str) = ("2002", "bob");

/// Gateway wired to an httpmock identity provider; requests go through the router in-process.
pub struct Harness {
	pub provider: MockServer,
	pub gateway: Gateway,
	router: Router,
}
impl Harness {
	/// Starts a provider mock and a gateway; `vars` override the defaults.
	pub async fn start(vars: Vec<(&'static str, String)>) -> Self {
		let provider = MockServer::start_async().await;
		let mut env = HashMap::from([
			("SESSION_SECRET", SECRET.to_owned()),
			("OAUTH_PROVIDER", "custom".to_owned()),
			("OAUTH_CLIENT_ID", "gateway-client".to_owned()),
			("OAUTH_CLIENT_SECRET", "gateway-secret".to_owned()),
			("OAUTH_CALLBACK_URL", "http://localhost:3000/callback".to_owned()),
			("OAUTH_AUTHORIZE_URL", provider.url("/authorize")),
			("OAUTH_TOKEN_URL", provider.url("/token")),
			("OAUTH_PROFILE_URL", provider.url("/me")),
			("OAUTH_SCOPES", "identify".to_owned()),
			("ALLOWED_USERS", ALICE.0.to_owned()),
		]);

		env.extend(vars);

		let config = GatewayConfig::from_lookup(|name| env.get(name).cloned())
			.expect("Harness configuration should load.");
		let gateway = Gateway::new(config).expect("Gateway should assemble.");
		let router = gateway.router();

		Self { provider, gateway, router }
	}

	pub async fn send(&self, request: Request<Body>) -> Response<Body> {
		self.router.clone().oneshot(request).await.expect("Router should answer every request.")
	}

	pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
		self.send(request("GET", uri, cookie, Body::empty())).await
	}

	/// Runs `/login` and `/callback` for the given account; returns the rotated session cookie
	/// and the callback response.
	pub async fn complete_login(
		&self,
		cookie: Option<String>,
		account: (&str, &str),
	) -> (String, Response<Body>) {
		let login = self.get("/login", cookie.as_deref()).await;

		assert_eq!(login.status(), StatusCode::SEE_OTHER);

		let cookie = session_cookie(&login).or(cookie).expect("Login should carry a session.");
		let state = authorize_state(&login);
		let token = self.provider_accepts(account).await;
		let callback = self.get(&callback_uri(account.1, &state), Some(&cookie)).await;

		token.delete_async().await;

		let rotated = session_cookie(&callback).expect("Successful login should rotate the session.");

		(rotated, callback)
	}

	/// Makes the provider accept the next code exchange and serve `account`'s profile; delete
	/// the returned token mock once the callback ran.
	pub async fn provider_accepts(&self, account: (&str, &str)) -> Mock<'_> {
		let (id, username) = account;
		let access_token = format!("{username}-token");

		self.provider
			.mock_async(|when, then| {
				when.method(GET).path("/me").header("authorization", format!("Bearer {access_token}"));
				then.status(200)
					.header("content-type", "application/json")
					.json_body(json!({ "id": id, "username": username }));
			})
			.await;
		self.provider
			.mock_async(|when, then| {
				when.method(POST).path("/token");
				then.status(200).header("content-type", "application/json").json_body(json!({
					"access_token": access_token,
					"token_type": "bearer",
					"expires_in": 3600
				}));
			})
			.await
	}

	/// Logs `account` in from a fresh browser.
	pub async fn login_as(&self, account: (&str, &str)) -> String {
		self.complete_login(None, account).await.0
	}
}

pub fn callback_uri(username: &str, state: &str) -> String {
	format!("/callback?code=code-{username}&state={state}")
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>, body: Body) -> Request<Body> {
	let mut builder = Request::builder().method(method).uri(uri);

	if let Some(cookie) = cookie {
		builder = builder.header(COOKIE, cookie);
	}

	builder.body(body).expect("Request fixture should build.")
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
	let mut request = request(method, uri, cookie, Body::from(body.to_owned()));

	request
		.headers_mut()
		.insert("content-type", "application/json".parse().expect("Header value should parse."));

	request
}

/// Returns the `gateway.sid=<value>` pair set by `response`, ignoring removals.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
	let prefix = format!("{SESSION_COOKIE_NAME}=");

	response
		.headers()
		.get_all(SET_COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.filter_map(|raw| raw.split(';').next())
		.find(|pair| pair.starts_with(&prefix) && pair.len() > prefix.len())
		.map(str::to_owned)
}

pub fn location(response: &Response<Body>) -> String {
	response
		.headers()
		.get(LOCATION)
		.expect("Response should carry a Location header.")
		.to_str()
		.expect("Location should be ASCII.")
		.to_owned()
}

pub fn authorize_state(response: &Response<Body>) -> String {
	let url = Url::parse(&location(response)).expect("Authorize URL should be absolute.");

	url.query_pairs()
		.find(|(key, _)| key == "state")
		.map(|(_, value)| value.into_owned())
		.expect("Authorize URL should carry a state.")
}

pub async fn body_text(response: Response<Body>) -> String {
	let bytes =
		to_bytes(response.into_body(), usize::MAX).await.expect("Response body should be readable.");

	String::from_utf8(bytes.to_vec()).expect("Response body should be UTF-8.")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
	serde_json::from_str(&body_text(response).await).expect("Response body should be JSON.")
}
