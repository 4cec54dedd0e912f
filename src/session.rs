//! Per-visitor server-side state and the storage contract behind it.
//!
//! A [`Session`] carries the visitor's [`Identity`] once a login completes, the destination
//! recorded before the login started, and the in-flight login attempt. Stores hand out owned
//! snapshots; mutation happens only through [`SessionStore`] operations keyed by
//! [`SessionId`].

pub mod memory;

pub use memory::MemorySessionStore;

// crates.io
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	auth::{Identity, RouteKey, TokenSecret},
};

/// Name of the signed cookie carrying the [`SessionId`].
pub const SESSION_COOKIE_NAME: &str = "gateway.sid";

const SESSION_ID_BYTES: usize = 32;

/// Error type produced by [`SessionStore`] implementations and the route log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The store refuses new sessions until expired ones are swept.
	#[error("Session capacity of {limit} reached.")]
	Capacity {
		/// Configured session limit.
		limit: usize,
	},
	/// Serialization failures surfaced by a durable backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Opaque, unguessable session identifier carried in the signed session cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);
impl SessionId {
	/// Generates a fresh identifier from 32 random bytes.
	pub fn generate() -> Self {
		Self(TokenSecret::generate(SESSION_ID_BYTES).expose().to_owned())
	}

	/// Parses an identifier read back from a cookie; rejects values that could not have been
	/// generated by [`SessionId::generate`].
	pub fn parse(value: &str) -> Option<Self> {
		let well_formed = !value.is_empty()
			&& value.len() <= 64
			&& value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

		well_formed.then(|| Self(value.to_owned()))
	}

	/// Returns the raw identifier. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SessionId").field(&"<redacted>").finish()
	}
}

/// Destination recorded for a visitor who hit a protected path before logging in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRoute {
	/// Route key the visitor asked for.
	pub route: RouteKey,
	/// Gateway-local path and query to return to (always starts with a single `/`).
	pub target: String,
}
impl PendingRoute {
	/// Records a specific gateway-local path; returns `None` for anything that is not a
	/// same-origin absolute path.
	pub fn new(route: RouteKey, target: impl Into<String>) -> Option<Self> {
		let target = target.into();
		let local = target.starts_with('/') && !target.starts_with("//") && !target.contains('\\');

		local.then_some(Self { route, target })
	}

	/// Destination pointing at the root of the route's proxy path.
	pub fn landing(route: RouteKey) -> Self {
		let target = format!("/proxy/{route}/");

		Self { route, target }
	}
}

/// Login attempt recorded in the session between the authorize redirect and the callback.
#[derive(Clone)]
pub struct PendingLogin {
	state: TokenSecret,
	/// PKCE verifier, when the provider is configured for PKCE.
	pub pkce_verifier: Option<TokenSecret>,
	/// When the attempt started.
	pub issued_at: OffsetDateTime,
}
impl PendingLogin {
	/// Creates a pending login for the issued state token.
	pub fn new(
		state: TokenSecret,
		pkce_verifier: Option<TokenSecret>,
		issued_at: OffsetDateTime,
	) -> Self {
		Self { state, pkce_verifier, issued_at }
	}

	/// Returns true while the attempt is younger than `ttl`.
	pub fn is_live(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		now - self.issued_at <= ttl
	}

	/// Constant-time comparison of the issued state with the presented one.
	pub fn state_matches(&self, presented: &str) -> bool {
		StateDigest::of(self.state.expose()).matches(presented)
	}

	pub(crate) fn digest(&self) -> StateDigest {
		StateDigest::of(self.state.expose())
	}
}
impl Debug for PendingLogin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingLogin")
			.field("state", &self.state)
			.field("pkce", &self.pkce_verifier.is_some())
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// SHA-256 digest of a state token; kept after consumption to recognize replays.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StateDigest([u8; 32]);
impl StateDigest {
	fn of(value: &str) -> Self {
		let mut digest = [0_u8; 32];

		digest.copy_from_slice(&Sha256::digest(value.as_bytes()));

		Self(digest)
	}

	/// Constant-time comparison against the digest of `presented`.
	pub fn matches(&self, presented: &str) -> bool {
		self.0[..].ct_eq(&Self::of(presented).0[..]).into()
	}
}
impl Debug for StateDigest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("StateDigest(..)")
	}
}

/// Server-side visitor state.
#[derive(Clone, Debug)]
pub struct Session {
	/// Session identifier.
	pub id: SessionId,
	/// Identity established by a completed login.
	pub identity: Option<Identity>,
	/// Destination to resume after login.
	pub pending_route: Option<PendingRoute>,
	/// In-flight login attempt.
	pub pending_login: Option<PendingLogin>,
	/// Digest of the most recently consumed state token.
	pub consumed_state: Option<StateDigest>,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Last time the session was read; drives the sliding expiry.
	pub last_seen_at: OffsetDateTime,
}
impl Session {
	/// Creates an anonymous session.
	pub fn new(id: SessionId, now: OffsetDateTime) -> Self {
		Self {
			id,
			identity: None,
			pending_route: None,
			pending_login: None,
			consumed_state: None,
			created_at: now,
			last_seen_at: now,
		}
	}

	/// Returns true when the session was idle for longer than `ttl`.
	pub fn is_expired(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		now - self.last_seen_at > ttl
	}

	/// Login phase derived from the stored state.
	pub fn login_phase(&self) -> LoginPhase {
		if self.identity.is_some() {
			LoginPhase::Authenticated
		} else if self.pending_login.is_some() {
			LoginPhase::LoginInitiated
		} else {
			LoginPhase::Anonymous
		}
	}
}

/// States of a login attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoginPhase {
	/// No identity and no login in flight.
	Anonymous,
	/// Visitor was sent to the provider.
	LoginInitiated,
	/// Callback received; exchange in progress.
	CallbackPending,
	/// Identity established.
	Authenticated,
	/// Attempt failed; the visitor must start over.
	Failed,
}
impl LoginPhase {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LoginPhase::Anonymous => "anonymous",
			LoginPhase::LoginInitiated => "login_initiated",
			LoginPhase::CallbackPending => "callback_pending",
			LoginPhase::Authenticated => "authenticated",
			LoginPhase::Failed => "failed",
		}
	}
}

/// Result of presenting a state token to [`SessionStore::consume_login`].
#[derive(Debug)]
pub enum ConsumeOutcome {
	/// State matched; the attempt was removed from the session and is returned.
	Consumed(PendingLogin),
	/// State does not match the in-flight attempt (which stays in place).
	Mismatch,
	/// State matches an attempt that was already consumed.
	AlreadyConsumed,
	/// The attempt outlived its validity window and was discarded.
	Expired,
	/// Session is unknown or has no attempt in flight.
	NoLoginInProgress,
}

/// Storage contract for visitor sessions.
///
/// Every operation is synchronous and never waits on I/O. Unknown or expired sessions are
/// treated as absent; only [`create`](SessionStore::create) and
/// [`rotate`](SessionStore::rotate) can fail.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Creates an anonymous session with a fresh identifier.
	fn create(&self) -> Result<Session, StoreError>;

	/// Returns a snapshot of the session and refreshes its idle timer.
	fn get(&self, id: &SessionId) -> Option<Session>;

	/// Records the identity established by a completed login.
	fn set_identity(&self, id: &SessionId, identity: Identity);

	/// Records the destination to resume after login, replacing any earlier one.
	fn set_pending_route(&self, id: &SessionId, pending: PendingRoute);

	/// Reads and clears the recorded destination.
	fn take_pending_route(&self, id: &SessionId) -> Option<PendingRoute>;

	/// Records a new login attempt, replacing any earlier one. Returns false for unknown
	/// sessions.
	fn begin_login(&self, id: &SessionId, pending: PendingLogin) -> bool;

	/// Atomically checks `presented_state` against the in-flight attempt and consumes it.
	fn consume_login(
		&self,
		id: &SessionId,
		presented_state: &str,
		now: OffsetDateTime,
	) -> ConsumeOutcome;

	/// Moves a freshly established identity onto a new session id and removes `old`.
	///
	/// The digest of the consumed state travels with it, so a replayed callback presented with
	/// the new cookie is still recognized as already consumed.
	fn rotate(&self, old: &SessionId, identity: Identity) -> Result<Session, StoreError>;

	/// Removes the session; idempotent.
	fn destroy(&self, id: &SessionId);

	/// Drops sessions idle for longer than the configured TTL; returns how many were removed.
	fn sweep_expired(&self, now: OffsetDateTime) -> usize;
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn session_ids_are_redacted_and_parse_back() {
		let id = SessionId::generate();

		assert_eq!(format!("{id:?}"), "SessionId(\"<redacted>\")");
		assert_eq!(SessionId::parse(id.expose()), Some(id.clone()));
		assert!(SessionId::parse("").is_none());
		assert!(SessionId::parse("has space").is_none());
		assert!(SessionId::parse(&"a".repeat(65)).is_none());
	}

	#[test]
	fn pending_routes_stay_on_the_gateway() {
		let route = RouteKey::new("alpha").expect("Route fixture should be valid.");

		assert!(PendingRoute::new(route.clone(), "/proxy/alpha/resource?x=1").is_some());
		assert!(PendingRoute::new(route.clone(), "//evil.example.com/").is_none());
		assert!(PendingRoute::new(route.clone(), "https://evil.example.com/").is_none());
		assert!(PendingRoute::new(route.clone(), "/\\evil.example.com").is_none());
		assert_eq!(PendingRoute::landing(route).target, "/proxy/alpha/");
	}

	#[test]
	fn state_comparison_uses_digests() {
		let now = OffsetDateTime::now_utc();
		let pending = PendingLogin::new(TokenSecret::new("issued-state"), None, now);

		assert!(pending.state_matches("issued-state"));
		assert!(!pending.state_matches("issued-statf"));
		assert!(pending.digest().matches("issued-state"));
		assert!(pending.is_live(now + Duration::minutes(5), Duration::minutes(10)));
		assert!(!pending.is_live(now + Duration::minutes(11), Duration::minutes(10)));
	}

	#[test]
	fn login_phase_follows_session_state() {
		let now = OffsetDateTime::now_utc();
		let mut session = Session::new(SessionId::generate(), now);

		assert_eq!(session.login_phase(), LoginPhase::Anonymous);

		session.pending_login = Some(PendingLogin::new(TokenSecret::new("s"), None, now));

		assert_eq!(session.login_phase(), LoginPhase::LoginInitiated);

		session.identity = Some(Identity::new("1", "alice"));

		assert_eq!(session.login_phase(), LoginPhase::Authenticated);
		assert!(session.is_expired(now + Duration::hours(25), Duration::hours(24)));
	}
}
