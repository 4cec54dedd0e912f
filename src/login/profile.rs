//! Profile fetch with the freshly issued access token.

// crates.io
use reqwest::header::ACCEPT;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{LoginError, TransportError},
	http::ReqwestHttpClient,
};

/// Fetches the provider profile document as untyped JSON.
pub(super) async fn fetch_profile(
	http_client: &ReqwestHttpClient,
	endpoint: &Url,
	access_token: &TokenSecret,
) -> Result<Value, LoginError> {
	let response = http_client
		.get(endpoint.clone())
		.bearer_auth(access_token.expose())
		.header(ACCEPT, "application/json")
		.send()
		.await
		.map_err(map_send_error)?;
	let status = response.status();

	if !status.is_success() {
		return Err(LoginError::ProfileRejected { status: status.as_u16() });
	}

	let body = response.bytes().await.map_err(map_send_error)?;
	let mut deserializer = serde_json::Deserializer::from_slice(&body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| LoginError::ProfileParse { source })
}

fn map_send_error(err: ReqwestError) -> LoginError {
	if err.is_timeout() {
		LoginError::ProviderUnavailable {
			reason: "Request timed out while calling the profile endpoint".into(),
			status: err.status().map(|code| code.as_u16()),
		}
	} else {
		TransportError::from(err).into()
	}
}
