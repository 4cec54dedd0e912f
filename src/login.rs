//! OAuth login: authorization redirect, callback verification, and identity resolution.
//!
//! [`IdentityBroker`] binds one provider descriptor and client registration to the session
//! store. [`begin_login`](IdentityBroker::begin_login) never touches the network; every
//! provider call happens in [`complete_login`](IdentityBroker::complete_login) after the state
//! token was consumed, so a forged or replayed callback never reaches the token endpoint.

pub mod state;

mod profile;

pub use state::{PkceCodeChallengeMethod, generate_state};

// self
use crate::{
	_prelude::*,
	auth::{Identity, ScopeSet, TokenSecret},
	error::{ConfigError, LoginError},
	http::ReqwestHttpClient,
	oauth::BasicFacade,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{ProviderDescriptor, ProviderStrategy},
	session::{ConsumeOutcome, PendingLogin, PendingRoute, SessionId, SessionStore},
};
use state::PkcePair;

/// OAuth client registration at the provider.
#[derive(Clone)]
pub struct ClientRegistration {
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret for confidential clients.
	pub client_secret: Option<TokenSecret>,
	/// Callback URL registered with the provider.
	pub redirect_uri: Url,
}
impl Debug for ClientRegistration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientRegistration")
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("redirect_uri", &self.redirect_uri.as_str())
			.finish()
	}
}

/// Redirect the visitor must follow to start the login.
#[derive(Clone, Debug)]
pub struct LoginRedirect {
	/// Fully-formed provider authorization URL.
	pub authorize_url: Url,
	/// State token bound to the session.
	pub state: TokenSecret,
}

/// Query parameters the provider sends back to the callback.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthorizationCallback {
	/// Authorization code.
	pub code: Option<String>,
	/// State token echoed back by the provider.
	pub state: Option<String>,
	/// OAuth error code when the visitor or provider refused the request.
	pub error: Option<String>,
	/// Optional human-readable error detail.
	pub error_description: Option<String>,
}

/// Result of a completed login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginOutcome {
	/// Identity now attached to the session.
	pub identity: Identity,
	/// Destination recorded before the login started.
	pub destination: Option<PendingRoute>,
}

/// Drives visitors through the authorization-code flow against one provider.
pub struct IdentityBroker {
	/// Session store the login state lives in.
	pub store: Arc<dyn SessionStore>,
	/// Provider descriptor that defines endpoints and quirks.
	pub descriptor: ProviderDescriptor,
	/// Strategy used for error classification and profile mapping.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Requested scopes.
	pub scope: ScopeSet,
	client: ClientRegistration,
	facade: BasicFacade,
	http_client: ReqwestHttpClient,
}
impl IdentityBroker {
	/// Assembles a broker; fails when the descriptor endpoints or callback URL are unusable.
	pub fn new(
		store: Arc<dyn SessionStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client: ClientRegistration,
		scope: ScopeSet,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let facade = BasicFacade::from_descriptor(
			&descriptor,
			&client.client_id,
			client.client_secret.as_ref().map(TokenSecret::expose),
			&client.redirect_uri,
			http_client.clone(),
		)?;

		Ok(Self { store, descriptor, strategy, scope, client, facade, http_client })
	}

	/// Client registration in use.
	pub fn client(&self) -> &ClientRegistration {
		&self.client
	}

	/// Records a login attempt (and optionally the destination) in the session and returns
	/// the provider redirect.
	pub fn begin_login(
		&self,
		session: &SessionId,
		desired: Option<PendingRoute>,
	) -> Result<LoginRedirect, LoginError> {
		let span = FlowSpan::new(FlowKind::Login, "begin_login");

		obs::record_flow_outcome(FlowKind::Login, FlowOutcome::Attempt);

		let result = span.in_scope(|| {
			let state = generate_state();
			let pkce = self.descriptor.quirks.use_pkce.then(PkcePair::generate);
			let pending = PendingLogin::new(
				state.clone(),
				pkce.as_ref().map(|pair| pair.verifier.clone()),
				OffsetDateTime::now_utc(),
			);

			if !self.store.begin_login(session, pending) {
				return Err(LoginError::UnknownSession);
			}
			if let Some(desired) = desired {
				self.store.set_pending_route(session, desired);
			}

			let authorize_url = state::build_authorize_url(
				&self.descriptor,
				&self.client.client_id,
				&self.client.redirect_uri,
				&self.scope,
				&state,
				pkce.as_ref(),
			);

			tracing::debug!(phase = "login_initiated", "authorization redirect issued");

			Ok(LoginRedirect { authorize_url, state })
		});

		obs::record_result(FlowKind::Login, result)
	}

	/// Verifies the callback, exchanges the code, and attaches the resolved identity to the
	/// session. Nothing is retried.
	pub async fn complete_login(
		&self,
		session: &SessionId,
		callback: AuthorizationCallback,
	) -> Result<LoginOutcome, LoginError> {
		let span = FlowSpan::new(FlowKind::Callback, "complete_login");

		obs::record_flow_outcome(FlowKind::Callback, FlowOutcome::Attempt);

		let result = span.instrument(self.complete_login_inner(session, callback)).await;

		match &result {
			Ok(outcome) =>
				tracing::info!(phase = "authenticated", user = %outcome.identity, "login completed"),
			Err(e) if e.is_forgery_suspect() =>
				tracing::warn!(phase = "failed", error = %e, "possible forged or replayed callback"),
			Err(e) => tracing::warn!(phase = "failed", error = %e, "login failed"),
		}

		obs::record_result(FlowKind::Callback, result)
	}

	/// Destroys the session; idempotent.
	pub fn logout(&self, session: &SessionId) {
		self.store.destroy(session);
	}

	async fn complete_login_inner(
		&self,
		session: &SessionId,
		callback: AuthorizationCallback,
	) -> Result<LoginOutcome, LoginError> {
		let AuthorizationCallback { code, state, error, error_description } = callback;

		if let Some(error) = error {
			return Err(LoginError::ProviderDenied { error, description: error_description });
		}

		let state = non_empty(state).ok_or(LoginError::MissingParameter { name: "state" })?;
		let code = non_empty(code).ok_or(LoginError::MissingParameter { name: "code" })?;
		let pending = match self.store.consume_login(session, &state, OffsetDateTime::now_utc()) {
			ConsumeOutcome::Consumed(pending) => pending,
			ConsumeOutcome::Mismatch => return Err(LoginError::StateMismatch),
			ConsumeOutcome::AlreadyConsumed => return Err(LoginError::StateConsumed),
			ConsumeOutcome::Expired => return Err(LoginError::StateExpired),
			ConsumeOutcome::NoLoginInProgress => return Err(LoginError::NoLoginInProgress),
		};

		tracing::debug!(phase = "callback_pending", "state verified");

		let access_token = self
			.facade
			.exchange_authorization_code(
				self.strategy.as_ref(),
				&code,
				pending.pkce_verifier.as_ref().map(TokenSecret::expose),
			)
			.await?;
		let profile =
			profile::fetch_profile(&self.http_client, &self.descriptor.endpoints.profile, &access_token)
				.await?;
		let identity = self.strategy.resolve_identity(&profile, &self.descriptor.quirks)?;

		self.store.set_identity(session, identity.clone());

		let destination = self.store.take_pending_route(session);

		Ok(LoginOutcome { identity, destination })
	}
}
impl Debug for IdentityBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityBroker")
			.field("descriptor", &self.descriptor.id)
			.field("client", &self.client)
			.field("scope", &self.scope)
			.finish()
	}
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|value| !value.is_empty())
}
