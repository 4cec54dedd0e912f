//! Signed session cookie handling.

// crates.io
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use sha2::{Digest, Sha512};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	session::{SESSION_COOKIE_NAME, Session, SessionId, SessionStore, StoreError},
};

/// Derives the 64-byte cookie signing key from the configured secret.
pub fn signing_key(secret: &TokenSecret) -> Key {
	Key::from(&Sha512::digest(secret.expose().as_bytes()))
}

/// Builds the session cookie: `HttpOnly`, `SameSite=Lax`, `Path=/`, and `Secure` over TLS.
pub fn session_cookie(id: &SessionId, public_tls: bool) -> Cookie<'static> {
	Cookie::build((SESSION_COOKIE_NAME, id.expose().to_owned()))
		.http_only(true)
		.same_site(SameSite::Lax)
		.path("/")
		.secure(public_tls)
		.build()
}

/// Returns the live session named by a correctly signed cookie.
pub fn current(jar: &SignedCookieJar, store: &dyn SessionStore) -> Option<Session> {
	let cookie = jar.get(SESSION_COOKIE_NAME)?;
	let id = SessionId::parse(cookie.value())?;

	store.get(&id)
}

/// Returns the current session, creating one (and its cookie) when there is none.
pub fn ensure(
	jar: SignedCookieJar,
	store: &dyn SessionStore,
	public_tls: bool,
) -> Result<(SignedCookieJar, Session), StoreError> {
	if let Some(session) = current(&jar, store) {
		return Ok((jar, session));
	}

	let session = store.create()?;
	let jar = jar.add(session_cookie(&session.id, public_tls));

	Ok((jar, session))
}

/// Drops the session cookie from the browser.
pub fn clear(jar: SignedCookieJar) -> SignedCookieJar {
	jar.remove(Cookie::build((SESSION_COOKIE_NAME, "")).path("/"))
}
