mod common;

// crates.io
use axum::{body::Body, http::StatusCode};
use httpmock::prelude::*;
use serde_json::json;
// self
use common::*;

async fn with_alpha(backend: &MockServer) -> Harness {
	Harness::start(vec![("TARGET_URLS", json!({ "alpha": backend.base_url() }).to_string())]).await
}

#[tokio::test]
async fn anonymous_visitors_resume_their_original_url_after_login() {
	let backend = MockServer::start_async().await;
	let harness = with_alpha(&backend).await;
	let first = harness.get("/proxy/alpha/resource?x=1", None).await;

	assert_eq!(first.status(), StatusCode::SEE_OTHER);
	assert_eq!(location(&first), "/login");

	let cookie = session_cookie(&first).expect("Protected path should create a session.");
	let (cookie, callback) = harness.complete_login(Some(cookie), ALICE).await;

	assert_eq!(location(&callback), "/proxy/alpha/resource?x=1");

	let resource = backend
		.mock_async(|when, then| {
			when.method(GET).path("/resource").query_param("x", "1");
			then.status(200).body("resource");
		})
		.await;
	let response = harness.get("/proxy/alpha/resource?x=1", Some(&cookie)).await;

	resource.assert_async().await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_text(response).await, "resource");
}

#[tokio::test]
async fn login_route_parameter_records_the_landing_page() {
	let backend = MockServer::start_async().await;
	let harness = with_alpha(&backend).await;
	let login = harness.get("/login?route=alpha", None).await;
	let cookie = session_cookie(&login).expect("Login should create a session.");
	let (_, callback) = harness.complete_login(Some(cookie), ALICE).await;

	assert_eq!(location(&callback), "/proxy/alpha/");
}

#[tokio::test]
async fn identities_outside_the_allow_list_are_forbidden() {
	let backend = MockServer::start_async().await;
	let harness = with_alpha(&backend).await;
	let cookie = harness.login_as(BOB).await;

	assert_eq!(harness.get("/", Some(&cookie)).await.status(), StatusCode::FORBIDDEN);
	assert_eq!(harness.get("/proxy/alpha/", Some(&cookie)).await.status(), StatusCode::FORBIDDEN);
	assert_eq!(harness.get("/alpha", Some(&cookie)).await.status(), StatusCode::FORBIDDEN);
	assert_eq!(harness.get("/routes", Some(&cookie)).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_routes_are_not_found_for_everyone() {
	let backend = MockServer::start_async().await;
	let harness = with_alpha(&backend).await;
	let catch_all = backend
		.mock_async(|when, then| {
			when.any_request();
			then.status(200);
		})
		.await;
	let anonymous = harness.get("/proxy/nope/anything", None).await;

	assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);
	assert!(session_cookie(&anonymous).is_none());

	let cookie = harness.login_as(ALICE).await;

	assert_eq!(harness.get("/proxy/nope/", Some(&cookie)).await.status(), StatusCode::NOT_FOUND);
	assert_eq!(harness.get("/nope", Some(&cookie)).await.status(), StatusCode::NOT_FOUND);
	assert_eq!(catch_all.hits_async().await, 0);
}

#[tokio::test]
async fn index_and_shortcut_serve_authorized_visitors() {
	let backend = MockServer::start_async().await;
	let harness = with_alpha(&backend).await;
	let anonymous = harness.get("/alpha", None).await;

	assert_eq!(anonymous.status(), StatusCode::SEE_OTHER);
	assert_eq!(location(&anonymous), "/login");

	let cookie = harness.login_as(ALICE).await;
	let index = harness.get("/", Some(&cookie)).await;

	assert_eq!(index.status(), StatusCode::OK);
	assert!(body_text(index).await.contains(r#"<a href="/proxy/alpha/">alpha</a>"#));

	let shortcut = harness.get("/alpha", Some(&cookie)).await;

	assert_eq!(shortcut.status(), StatusCode::SEE_OTHER);
	assert_eq!(location(&shortcut), "/proxy/alpha/");
}

#[tokio::test]
async fn route_api_registers_and_removes_routes() {
	let backend = MockServer::start_async().await;
	let harness = with_alpha(&backend).await;
	let anonymous = harness.get("/routes", None).await;

	assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
	assert!(body_json(anonymous).await["error"].is_string());

	let cookie = harness.login_as(ALICE).await;
	let cookie = Some(cookie.as_str());
	let malformed = harness.send(json_request("POST", "/routes", cookie, "{not json")).await;

	assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

	let missing =
		harness.send(json_request("POST", "/routes", cookie, r#"{"routeKey":"beta"}"#)).await;

	assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

	let reserved = harness
		.send(json_request(
			"POST",
			"/routes",
			cookie,
			r#"{"routeKey":"login","backendBaseUrl":"http://127.0.0.1:9000"}"#,
		))
		.await;

	assert_eq!(reserved.status(), StatusCode::BAD_REQUEST);

	let bad_scheme = harness
		.send(json_request(
			"POST",
			"/routes",
			cookie,
			r#"{"routeKey":"beta","backendBaseUrl":"ftp://127.0.0.1/files"}"#,
		))
		.await;

	assert_eq!(bad_scheme.status(), StatusCode::BAD_REQUEST);

	let body = json!({ "routeKey": "beta", "backendBaseUrl": backend.url("/beta") }).to_string();
	let registered = harness.send(json_request("POST", "/routes", cookie, &body)).await;

	assert_eq!(registered.status(), StatusCode::OK);
	assert_eq!(body_json(registered).await, json!({ "routes": ["alpha", "beta"] }));

	let duplicate = harness.send(json_request("POST", "/routes", cookie, &body)).await;

	assert_eq!(duplicate.status(), StatusCode::CONFLICT);

	let removed = harness.send(request("DELETE", "/routes/beta", cookie, Body::empty())).await;

	assert_eq!(removed.status(), StatusCode::OK);
	assert_eq!(body_json(removed).await, json!({ "routes": ["alpha"] }));

	let gone = harness.send(request("DELETE", "/routes/beta", cookie, Body::empty())).await;

	assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_cookie_sync_need_no_session() {
	let harness = Harness::start(Vec::new()).await;
	let health = harness.get("/healthz", None).await;

	assert_eq!(health.status(), StatusCode::OK);
	assert_eq!(body_text(health).await, "ok");
	assert_eq!(harness.get("/cookie-sync", None).await.status(), StatusCode::NO_CONTENT);
}
