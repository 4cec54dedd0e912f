//! Header hygiene for forwarded requests and relayed responses.

// crates.io
use axum::http::{
	HeaderMap, HeaderName, HeaderValue,
	header::{
		CONNECTION, COOKIE, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER,
		TRANSFER_ENCODING, UPGRADE,
	},
};
// self
use crate::{_prelude::*, auth::Identity};

/// Username of the authenticated visitor.
pub const X_AUTHENTICATED_USER: &str = "x-authenticated-user";
/// Provider account id of the authenticated visitor.
pub const X_AUTHENTICATED_USER_ID: &str = "x-authenticated-user-id";
/// Deployment environment tag.
pub const X_GATEWAY_ENVIRONMENT: &str = "x-gateway-environment";
/// Public path prefix the backend is mounted under.
pub const X_FORWARDED_PREFIX: &str = "x-forwarded-prefix";

/// Removes hop-by-hop headers, including every header named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
	let listed = headers
		.get_all(CONNECTION)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|value| value.split(','))
		.filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
		.collect::<Vec<_>>();

	for name in listed {
		headers.remove(name);
	}
	for name in
		[CONNECTION, TRANSFER_ENCODING, UPGRADE, TE, TRAILER, PROXY_AUTHORIZATION, PROXY_AUTHENTICATE]
	{
		headers.remove(name);
	}

	headers.remove("keep-alive");
	headers.remove("proxy-connection");
}

/// Copies inbound headers for the backend: drops hop-by-hop headers, `Host`, and the
/// gateway's own session cookie.
pub fn outbound_request_headers(inbound: &HeaderMap, session_cookie: &str) -> HeaderMap {
	let mut headers = inbound.clone();

	strip_hop_by_hop(&mut headers);
	headers.remove(HOST);

	let cookies = headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|value| value.split(';'))
		.map(str::trim)
		.filter(|pair| !pair.is_empty() && cookie_name(pair) != session_cookie)
		.collect::<Vec<_>>()
		.join("; ");

	let rebuilt = (!cookies.is_empty()).then(|| HeaderValue::from_str(&cookies).ok()).flatten();

	headers.remove(COOKIE);

	if let Some(value) = rebuilt {
		headers.insert(COOKIE, value);
	}

	headers
}

/// Replaces any inbound identity headers with the gateway's own.
pub fn inject_identity(
	headers: &mut HeaderMap,
	identity: &Identity,
	environment: &str,
	prefix: &str,
) -> Result<(), String> {
	for (name, raw) in [
		(X_AUTHENTICATED_USER, identity.username.as_str()),
		(X_AUTHENTICATED_USER_ID, identity.provider_id.as_str()),
		(X_GATEWAY_ENVIRONMENT, environment),
		(X_FORWARDED_PREFIX, prefix),
	] {
		let value = HeaderValue::from_bytes(raw.as_bytes())
			.map_err(|_| format!("`{name}` value is not valid"))?;

		headers.insert(name, value);
	}

	Ok(())
}

fn cookie_name(pair: &str) -> &str {
	pair.split_once('=').map_or(pair, |(name, _)| name).trim()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
		let mut headers = HeaderMap::new();

		for (name, value) in pairs {
			headers.append(*name, HeaderValue::from_static(*value));
		}

		headers
	}

	#[test]
	fn drops_hop_by_hop_and_connection_listed_headers() {
		let mut headers = map(&[
			("connection", "keep-alive, x-private-hop"),
			("keep-alive", "timeout=5"),
			("x-private-hop", "1"),
			("transfer-encoding", "chunked"),
			("upgrade", "websocket"),
			("accept", "text/html"),
		]);

		strip_hop_by_hop(&mut headers);

		assert_eq!(headers.len(), 1);
		assert!(headers.contains_key("accept"));
	}

	#[test]
	fn outbound_copy_removes_host_and_session_cookie() {
		let inbound = map(&[
			("host", "gateway.example.com"),
			("cookie", "theme=dark; gateway.sid=signed-value"),
			("cookie", "app=1"),
			("x-request-id", "abc"),
		]);
		let headers = outbound_request_headers(&inbound, "gateway.sid");

		assert!(!headers.contains_key(HOST));
		assert_eq!(
			headers.get(COOKIE).and_then(|value| value.to_str().ok()),
			Some("theme=dark; app=1")
		);
		assert_eq!(headers.get("x-request-id").map(HeaderValue::as_bytes), Some(&b"abc"[..]));

		let only_session = outbound_request_headers(&map(&[("cookie", "gateway.sid=v")]), "gateway.sid");

		assert!(!only_session.contains_key(COOKIE));
	}

	#[test]
	fn identity_headers_override_spoofed_values() {
		let mut headers = map(&[
			("x-authenticated-user", "mallory"),
			("x-authenticated-user", "root"),
			("x-authenticated-user-id", "0"),
		]);

		inject_identity(&mut headers, &Identity::new("1001", "alice"), "staging", "/proxy/alpha")
			.expect("Identity headers should be valid.");

		let users = headers.get_all(X_AUTHENTICATED_USER).iter().collect::<Vec<_>>();

		assert_eq!(users, [&HeaderValue::from_static("alice")]);
		assert_eq!(headers.get(X_AUTHENTICATED_USER_ID), Some(&HeaderValue::from_static("1001")));
		assert_eq!(headers.get(X_GATEWAY_ENVIRONMENT), Some(&HeaderValue::from_static("staging")));
		assert_eq!(headers.get(X_FORWARDED_PREFIX), Some(&HeaderValue::from_static("/proxy/alpha")));
		assert!(
			inject_identity(&mut headers, &Identity::new("1", "bad\nname"), "prod", "/proxy/a")
				.is_err()
		);
	}
}
