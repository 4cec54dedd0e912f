//! `Set-Cookie` rewriting so backend cookies land on the gateway origin.

// crates.io
use axum::http::{HeaderMap, HeaderValue, header::SET_COOKIE};
use axum_extra::extract::cookie::{Cookie, SameSite};

/// Rewrites a single `Set-Cookie` value: drops `Domain`, forces `SameSite=Lax`, and drops
/// `Secure` unless the gateway is served over TLS. Returns `None` when the value cannot be
/// parsed.
pub fn rewrite_set_cookie(raw: &str, public_tls: bool) -> Option<String> {
	let mut cookie = Cookie::parse(raw).ok()?;

	cookie.unset_domain();
	cookie.set_same_site(SameSite::Lax);

	if !public_tls {
		cookie.set_secure(None::<bool>);
	}

	Some(cookie.to_string())
}

/// Applies [`rewrite_set_cookie`] to every `Set-Cookie` header; unparseable values pass
/// through unchanged. Cookies named `session_cookie` are dropped so a backend can never
/// replace the gateway session.
pub fn rewrite_all(
	headers: &mut HeaderMap,
	public_tls: bool,
	session_cookie: &str,
	route: &str,
) {
	let originals = headers.get_all(SET_COOKIE).iter().cloned().collect::<Vec<_>>();

	if originals.is_empty() {
		return;
	}

	headers.remove(SET_COOKIE);

	for original in originals {
		let raw = original.to_str().ok();

		if raw.and_then(cookie_name) == Some(session_cookie) {
			tracing::warn!(route, "dropping backend Set-Cookie for the gateway session cookie");

			continue;
		}

		let rewritten = raw
			.and_then(|raw| rewrite_set_cookie(raw, public_tls))
			.and_then(|value| HeaderValue::from_str(&value).ok());
		let value = match rewritten {
			Some(value) => value,
			None => {
				tracing::warn!(route, "passing through unparseable Set-Cookie");

				original
			},
		};

		headers.append(SET_COOKIE, value);
	}
}

fn cookie_name(raw: &str) -> Option<&str> {
	raw.split_once('=').map(|(name, _)| name.trim())
}
