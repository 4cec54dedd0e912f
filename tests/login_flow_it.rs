mod common;

// crates.io
use axum::{
	body::Body,
	http::{StatusCode, header::SET_COOKIE},
};
// self
use common::*;
use oauth2_gateway::{error::LoginError, login::AuthorizationCallback, session::SessionStore};

#[tokio::test]
async fn login_attaches_identity_and_rotates_the_session() {
	let harness = Harness::start(Vec::new()).await;
	let first = harness.get("/login", None).await;
	let pre_login = session_cookie(&first).expect("Login should create a session.");
	let (cookie, callback) = harness.complete_login(Some(pre_login.clone()), ALICE).await;

	assert_eq!(callback.status(), StatusCode::SEE_OTHER);
	assert_eq!(location(&callback), "/");
	assert_ne!(cookie, pre_login);

	let index = harness.get("/", Some(&cookie)).await;

	assert_eq!(index.status(), StatusCode::OK);
	assert!(body_text(index).await.contains("Signed in as alice."));

	let stale = harness.get("/", Some(&pre_login)).await;

	assert!(body_text(stale).await.contains("You are not signed in."));
}

#[tokio::test]
async fn authorize_redirect_carries_oauth_parameters() {
	let harness = Harness::start(Vec::new()).await;
	let login = harness.get("/login", None).await;
	let url = oauth2_gateway::url::Url::parse(&location(&login))
		.expect("Authorize URL should be absolute.");
	let pairs = url.query_pairs().into_owned().collect::<std::collections::HashMap<_, _>>();

	assert_eq!(url.path(), "/authorize");
	assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
	assert_eq!(pairs.get("client_id").map(String::as_str), Some("gateway-client"));
	assert_eq!(
		pairs.get("redirect_uri").map(String::as_str),
		Some("http://localhost:3000/callback")
	);
	assert_eq!(pairs.get("scope").map(String::as_str), Some("identify"));
	assert_eq!(pairs.get("state").map(String::len), Some(32));
	assert_eq!(pairs.get("code_challenge_method").map(String::as_str), Some("S256"));

	let cookie = login
		.headers()
		.get(SET_COOKIE)
		.and_then(|value| value.to_str().ok())
		.expect("Login should set the session cookie.");

	assert!(cookie.contains("HttpOnly"));
	assert!(cookie.contains("SameSite=Lax"));
	assert!(cookie.contains("Path=/"));
	assert!(!cookie.contains("Secure"));
}

#[tokio::test]
async fn forged_state_does_not_cancel_the_real_login() {
	let harness = Harness::start(Vec::new()).await;
	let login = harness.get("/login", None).await;
	let cookie = session_cookie(&login).expect("Login should create a session.");
	let state = authorize_state(&login);
	let forged = harness.get("/callback?code=stolen&state=forged-state", Some(&cookie)).await;

	assert_eq!(forged.status(), StatusCode::SEE_OTHER);
	assert_eq!(location(&forged), "/");
	assert!(session_cookie(&forged).is_none());

	let token = harness.provider_accepts(ALICE).await;
	let callback = harness.get(&callback_uri(ALICE.1, &state), Some(&cookie)).await;

	token.delete_async().await;

	let cookie = session_cookie(&callback).expect("Genuine callback should still succeed.");

	assert_eq!(location(&callback), "/");
	assert!(body_text(harness.get("/", Some(&cookie)).await).await.contains("alice"));

	let replay = harness.get(&callback_uri(ALICE.1, &state), Some(&cookie)).await;

	assert_eq!(location(&replay), "/");
	assert!(session_cookie(&replay).is_none());
}

#[tokio::test]
async fn replayed_callback_after_rotation_is_reported_as_consumed() {
	let harness = Harness::start(Vec::new()).await;
	let state = harness.gateway.state();
	let session = state.store.create().expect("Session should be created.");
	let redirect = state.broker.begin_login(&session.id, None).expect("Login should begin.");
	let callback = AuthorizationCallback {
		code: Some(format!("code-{}", ALICE.1)),
		state: Some(redirect.state.expose().to_owned()),
		..Default::default()
	};
	let token = harness.provider_accepts(ALICE).await;
	let outcome = state
		.broker
		.complete_login(&session.id, callback.clone())
		.await
		.expect("Genuine callback should complete.");

	token.delete_async().await;

	let rotated =
		state.store.rotate(&session.id, outcome.identity).expect("Rotation should succeed.");
	let replay = state
		.broker
		.complete_login(&rotated.id, callback.clone())
		.await
		.expect_err("Replayed callback should fail.");

	assert!(matches!(replay, LoginError::StateConsumed));
	assert!(state.store.get(&rotated.id).is_some_and(|s| s.identity.is_some()));

	let stale = state
		.broker
		.complete_login(&session.id, callback)
		.await
		.expect_err("Pre-login session should be gone.");

	assert!(matches!(stale, LoginError::NoLoginInProgress));
}

#[tokio::test]
async fn provider_denial_lands_on_the_index() {
	let harness = Harness::start(Vec::new()).await;
	let login = harness.get("/login", None).await;
	let cookie = session_cookie(&login).expect("Login should create a session.");
	let denied = harness.get("/callback?error=access_denied", Some(&cookie)).await;

	assert_eq!(denied.status(), StatusCode::SEE_OTHER);
	assert_eq!(location(&denied), "/");
	assert!(body_text(harness.get("/", Some(&cookie)).await).await.contains("You are not signed in."));
}

#[tokio::test]
async fn rejected_code_exchange_fails_the_login() {
	let harness = Harness::start(Vec::new()).await;
	let login = harness.get("/login", None).await;
	let cookie = session_cookie(&login).expect("Login should create a session.");
	let state = authorize_state(&login);
	let token = harness
		.provider
		.mock_async(|when, then| {
			when.method(httpmock::Method::POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"code expired\"}");
		})
		.await;
	let callback = harness.get(&callback_uri(ALICE.1, &state), Some(&cookie)).await;

	token.assert_async().await;

	assert_eq!(location(&callback), "/");
	assert!(session_cookie(&callback).is_none());
	assert!(body_text(harness.get("/", Some(&cookie)).await).await.contains("You are not signed in."));
}

#[tokio::test]
async fn callback_without_a_session_is_ignored() {
	let harness = Harness::start(Vec::new()).await;
	let response = harness.get("/callback?code=code&state=state", None).await;

	assert_eq!(response.status(), StatusCode::SEE_OTHER);
	assert_eq!(location(&response), "/");
	assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn logout_destroys_the_session() {
	let harness = Harness::start(Vec::new()).await;
	let cookie = harness.login_as(ALICE).await;
	let logout = harness.send(request("POST", "/logout", Some(&cookie), Body::empty())).await;

	assert_eq!(logout.status(), StatusCode::OK);

	let again = harness.send(request("POST", "/logout", Some(&cookie), Body::empty())).await;

	assert_eq!(again.status(), StatusCode::OK);
	assert!(body_text(harness.get("/", Some(&cookie)).await).await.contains("You are not signed in."));

	let link = harness.get("/logout", None).await;

	assert_eq!(link.status(), StatusCode::SEE_OTHER);
	assert_eq!(location(&link), "/");
}
