mod common;

// std
use std::{
	io::{BufRead, BufReader, Write},
	net::TcpListener,
	thread,
	time::Duration,
};
// crates.io
use axum::{
	body::{Body, to_bytes},
	http::{
		StatusCode,
		header::{LOCATION, SET_COOKIE},
	},
};
use httpmock::prelude::*;
use serde_json::json;
// self
use common::*;

async fn signed_in(routes: serde_json::Value, extra: Vec<(&'static str, String)>) -> (Harness, String) {
	let mut vars = vec![
		("TARGET_URLS", routes.to_string()),
		("GATEWAY_ENVIRONMENT", "staging".to_owned()),
	];

	vars.extend(extra);

	let harness = Harness::start(vars).await;
	let cookie = harness.login_as(ALICE).await;

	(harness, cookie)
}

#[tokio::test]
async fn identity_headers_replace_spoofed_ones() {
	let backend = MockServer::start_async().await;
	let (harness, cookie) = signed_in(json!({ "alpha": backend.base_url() }), Vec::new()).await;
	let items = backend
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/items")
				.query_param("page", "2")
				.header("x-authenticated-user", "alice")
				.header("x-authenticated-user-id", "1001")
				.header("x-gateway-environment", "staging")
				.header("x-forwarded-prefix", "/proxy/alpha")
				.header("x-trace", "keep-me");
			then.status(200).header("content-type", "application/json").body("[1,2]");
		})
		.await;
	let mut request = request("GET", "/proxy/alpha/api/items?page=2", Some(&cookie), Body::empty());

	request.headers_mut().insert("x-authenticated-user", "mallory".parse().expect("Header should parse."));
	request.headers_mut().insert("x-trace", "keep-me".parse().expect("Header should parse."));

	let response = harness.send(request).await;

	items.assert_async().await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_text(response).await, "[1,2]");
}

#[tokio::test]
async fn methods_and_bodies_are_forwarded_under_the_base_path() {
	let backend = MockServer::start_async().await;
	let (harness, cookie) =
		signed_in(json!({ "alpha": backend.url("/app/") }), Vec::new()).await;
	let submit = backend
		.mock_async(|when, then| {
			when.method(POST).path("/app/submit").body("name=value");
			then.status(201).body("created");
		})
		.await;
	let landing = backend
		.mock_async(|when, then| {
			when.method(GET).path("/app/");
			then.status(200).body("home");
		})
		.await;
	let created = harness
		.send(request("POST", "/proxy/alpha/submit", Some(&cookie), Body::from("name=value")))
		.await;

	submit.assert_async().await;

	assert_eq!(created.status(), StatusCode::CREATED);
	assert_eq!(body_text(created).await, "created");

	let home = harness.get("/proxy/alpha", Some(&cookie)).await;

	landing.assert_async().await;

	assert_eq!(body_text(home).await, "home");
}

#[tokio::test]
async fn redirects_and_cookies_are_rewritten_onto_the_gateway() {
	let backend = MockServer::start_async().await;
	let (harness, cookie) = signed_in(json!({ "alpha": backend.base_url() }), Vec::new()).await;
	let external = "https://id.example.com/authorize";
	let login = backend
		.mock_async(|when, then| {
			when.method(GET).path("/login");
			then.status(302)
				.header("location", backend.url("/dashboard?tab=1"))
				.header("set-cookie", "backend_session=abc; Domain=backend.internal; Secure; Path=/");
		})
		.await;
	let sso = backend
		.mock_async(|when, then| {
			when.method(GET).path("/sso");
			then.status(302).header("location", external);
		})
		.await;
	let response = harness.get("/proxy/alpha/login", Some(&cookie)).await;

	login.assert_async().await;

	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/proxy/alpha/dashboard?tab=1");

	let set_cookie = response
		.headers()
		.get(SET_COOKIE)
		.and_then(|value| value.to_str().ok())
		.expect("Backend cookie should be relayed.");

	assert!(set_cookie.starts_with("backend_session=abc"));
	assert!(!set_cookie.contains("Domain"));
	assert!(!set_cookie.contains("Secure"));
	assert!(set_cookie.contains("SameSite=Lax"));

	let response = harness.get("/proxy/alpha/sso", Some(&cookie)).await;

	sso.assert_async().await;

	assert_eq!(response.headers().get(LOCATION).and_then(|v| v.to_str().ok()), Some(external));
}

#[tokio::test]
async fn slow_backends_time_out() {
	let backend = MockServer::start_async().await;
	let (harness, cookie) = signed_in(
		json!({ "alpha": backend.base_url() }),
		vec![("PROXY_TIMEOUT_SECS", "1".to_owned())],
	)
	.await;

	backend
		.mock_async(|when, then| {
			when.method(GET).path("/slow");
			then.status(200).delay(Duration::from_secs(3)).body("late");
		})
		.await;

	let response = harness.get("/proxy/alpha/slow", Some(&cookie)).await;

	assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
	assert!(!body_text(response).await.contains(&backend.base_url()));
}

#[tokio::test]
async fn stalled_bodies_are_cut_off_after_the_timeout() {
	let listener = TcpListener::bind("127.0.0.1:0").expect("Ephemeral port should bind.");
	let addr = listener.local_addr().expect("Listener should have an address.");

	thread::spawn(move || {
		if let Ok((mut stream, _)) = listener.accept() {
			let mut reader = BufReader::new(&stream);
			let mut line = String::new();

			while reader.read_line(&mut line).is_ok_and(|read| read > 2) {
				line.clear();
			}

			stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nhalf").ok();

			thread::sleep(Duration::from_secs(10));
		}
	});

	let (harness, cookie) = signed_in(
		json!({ "gamma": format!("http://{addr}") }),
		vec![("PROXY_TIMEOUT_SECS", "1".to_owned())],
	)
	.await;
	let response = harness.get("/proxy/gamma/stream", Some(&cookie)).await;

	assert_eq!(response.status(), StatusCode::OK);

	let body = tokio::time::timeout(
		Duration::from_secs(5),
		to_bytes(response.into_body(), usize::MAX),
	)
	.await
	.expect("Stalled body should end well before the backend resumes.");

	assert!(body.is_err());
}

#[tokio::test]
async fn dot_segments_cannot_escape_the_backend_base() {
	let backend = MockServer::start_async().await;
	let (harness, cookie) =
		signed_in(json!({ "alpha": backend.url("/app/") }), Vec::new()).await;
	let catch_all = backend
		.mock_async(|when, then| {
			when.any_request();
			then.status(200).body("exposed");
		})
		.await;

	for path in
		["/proxy/alpha/../admin", "/proxy/alpha/%2e%2e/admin", "/proxy/alpha/x/%2E./../admin"]
	{
		let response = harness.get(path, Some(&cookie)).await;

		assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path} should be rejected");
	}

	assert_eq!(catch_all.hits_async().await, 0);
}

#[tokio::test]
async fn unreachable_backends_are_bad_gateways() {
	let closed = TcpListener::bind("127.0.0.1:0").expect("Ephemeral port should bind.");
	let addr = closed.local_addr().expect("Listener should have an address.");

	drop(closed);

	let (harness, cookie) =
		signed_in(json!({ "gamma": format!("http://{addr}") }), Vec::new()).await;
	let response = harness.get("/proxy/gamma/", Some(&cookie)).await;

	assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

	let body = body_text(response).await;

	assert!(body.contains("Bad Gateway"));
	assert!(!body.contains(&addr.to_string()));
}
