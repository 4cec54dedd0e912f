//! OAuth client facade over the `oauth2` crate.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{LoginError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	provider::{
		ClientAuthMethod, ProviderDescriptor, ProviderDescriptorError, ProviderErrorContext,
		ProviderErrorKind, ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Authorization-code exchange bound to one provider descriptor and client registration.
pub(crate) struct BasicFacade {
	oauth_client: ConfiguredBasicClient,
	http_client: ReqwestHttpClient,
}
impl BasicFacade {
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		redirect_uri: &Url,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ProviderDescriptorError> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string()).map_err(|_| {
			ProviderDescriptorError::InvalidEndpoint {
				endpoint: "authorization",
				url: descriptor.endpoints.authorization.to_string(),
			}
		})?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string()).map_err(|_| {
			ProviderDescriptorError::InvalidEndpoint {
				endpoint: "token",
				url: descriptor.endpoints.token.to_string(),
			}
		})?;
		let redirect_url = RedirectUrl::new(redirect_uri.to_string()).map_err(|_| {
			ProviderDescriptorError::InvalidEndpoint {
				endpoint: "redirect",
				url: redirect_uri.to_string(),
			}
		})?;
		let secret =
			if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::NoneWithPkce) {
				None
			} else {
				client_secret.map(|value| ClientSecret::new(value.to_owned()))
			};
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if let Some(secret) = secret {
			oauth_client = oauth_client.set_client_secret(secret);
		}
		if !matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretBasic)
		{
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client })
	}

	/// Exchanges an authorization code for the provider's access token.
	pub(crate) async fn exchange_authorization_code(
		&self,
		strategy: &dyn ProviderStrategy,
		code: &str,
		pkce_verifier: Option<&str>,
	) -> Result<TokenSecret, LoginError> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let mut request = self.oauth_client.exchange_code(AuthorizationCode::new(code.to_owned()));

		if let Some(verifier) = pkce_verifier {
			request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
		}

		let mut extra = Vec::new();

		strategy.augment_token_request(&mut extra);

		for (key, value) in extra {
			request = request.add_extra_param(key, value);
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(strategy, meta.take(), err))?;

		Ok(TokenSecret::new(response.access_token().secret().to_owned()))
	}
}

fn map_request_error(
	strategy: &dyn ProviderStrategy,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> LoginError {
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, response, status),
		RequestTokenError::Request(error) => map_transport_error(status, error),
		RequestTokenError::Parse(_, body) => {
			let mut ctx = ProviderErrorContext::default()
				.with_body_preview(String::from_utf8_lossy(&body).into_owned());

			if let Some(status) = status {
				ctx = ctx.with_http_status(status);
			}

			classify(
				strategy,
				&ctx,
				"Token endpoint returned a response that could not be parsed".into(),
				status,
			)
		},
		RequestTokenError::Other(message) => LoginError::ProviderUnavailable {
			reason: format!("Token endpoint returned an unexpected response: {message}"),
			status,
		},
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	response: BasicErrorResponse,
	status: Option<u16>,
) -> LoginError {
	let mut ctx =
		ProviderErrorContext::default().with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = status {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("Token endpoint returned an OAuth error: {description}"),
		None => format!("Token endpoint returned an OAuth error: {}", response.error().as_ref()),
	};

	classify(strategy, &ctx, message, status)
}

// Network failures never reach the strategy; they are transient by definition.
fn map_transport_error(status: Option<u16>, err: HttpClientError<ReqwestError>) -> LoginError {
	match err {
		HttpClientError::Reqwest(inner) if inner.is_timeout() => LoginError::ProviderUnavailable {
			reason: "Request timed out while calling the token endpoint".into(),
			status: status.or_else(|| inner.status().map(|code| code.as_u16())),
		},
		HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Http(inner) => TransportError::network(inner).into(),
		HttpClientError::Other(message) => LoginError::ProviderUnavailable {
			reason: format!("HTTP client error occurred while calling the token endpoint: {message}"),
			status,
		},
		_ => LoginError::ProviderUnavailable {
			reason: "HTTP client error occurred while calling the token endpoint".into(),
			status,
		},
	}
}

fn classify(
	strategy: &dyn ProviderStrategy,
	ctx: &ProviderErrorContext,
	reason: String,
	status: Option<u16>,
) -> LoginError {
	match strategy.classify_token_error(ctx) {
		ProviderErrorKind::InvalidGrant => LoginError::InvalidGrant { reason },
		ProviderErrorKind::InvalidClient => LoginError::InvalidClient { reason },
		ProviderErrorKind::Transient => LoginError::ProviderUnavailable { reason, status },
	}
}
