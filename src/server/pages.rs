//! Minimal HTML pages served by the gateway itself.

// self
use crate::{_prelude::*, auth::{Identity, RouteKey}};

/// Escapes text for safe inclusion in HTML element content and attribute values.
pub fn escape(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		match ch {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(ch),
		}
	}

	out
}

/// Landing page for anonymous visitors.
pub fn login_prompt() -> String {
	layout("Sign in", r#"<p>You are not signed in.</p><p><a href="/login">Sign in</a></p>"#)
}

/// Route index for authorized visitors.
pub fn route_index(identity: &Identity, routes: &[RouteKey]) -> String {
	let items = if routes.is_empty() {
		"<li>No routes are registered.</li>".to_owned()
	} else {
		routes
			.iter()
			.map(|route| {
				let route = escape(route);

				format!(r#"<li><a href="/proxy/{route}/">{route}</a></li>"#)
			})
			.collect::<String>()
	};
	let body = format!(
		r#"<p>Signed in as {}.</p><ul>{items}</ul><p><a href="/logout">Sign out</a></p>"#,
		escape(&identity.username),
	);

	layout("Routes", &body)
}

/// Generic error page; never carries backend detail.
pub fn error_page(title: &str, message: &str) -> String {
	layout(title, &format!("<p>{}</p>", escape(message)))
}

fn layout(title: &str, body: &str) -> String {
	format!(
		"<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body><h1>{}</h1>{body}</body></html>",
		escape(title),
		escape(title),
	)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn usernames_are_escaped() {
		let identity = Identity::new("1", "<script>alert('x')</script>");
		let page = route_index(&identity, &[]);

		assert!(!page.contains("<script>"));
		assert!(page.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
		assert!(page.contains("No routes are registered."));
	}

	#[test]
	fn routes_link_to_their_proxy_paths() {
		let routes = [RouteKey::new("alpha").expect("Route fixture should be valid.")];
		let page = route_index(&Identity::new("1", "alice"), &routes);

		assert!(page.contains(r#"<a href="/proxy/alpha/">alpha</a>"#));
	}
}
