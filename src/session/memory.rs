//! Concurrent in-memory [`SessionStore`] with sliding expiry.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use dashmap::DashMap;
// self
use crate::{
	_prelude::*,
	auth::Identity,
	session::{
		ConsumeOutcome, PendingLogin, PendingRoute, Session, SessionId, SessionStore, StoreError,
	},
};

/// Session store keyed per visitor; each entry is guarded by its own shard lock so sessions
/// never contend with one another.
#[derive(Debug)]
pub struct MemorySessionStore {
	sessions: DashMap<SessionId, Session>,
	ttl: Duration,
	login_ttl: Duration,
	max_sessions: usize,
}
impl MemorySessionStore {
	/// Idle time after which a session is dropped.
	pub const DEFAULT_TTL: Duration = Duration::hours(24);
	/// Validity window of an issued login state.
	pub const DEFAULT_LOGIN_TTL: Duration = Duration::minutes(10);
	/// Upper bound on concurrently stored sessions.
	pub const DEFAULT_MAX_SESSIONS: usize = 100_000;

	/// Overrides the sliding session TTL.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Overrides how long an issued login state stays valid.
	pub fn with_login_ttl(mut self, ttl: Duration) -> Self {
		self.login_ttl = ttl;

		self
	}

	/// Overrides the session capacity.
	pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
		self.max_sessions = max_sessions;

		self
	}

	/// Number of stored sessions, expired ones included until swept.
	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	/// Returns true when no sessions are stored.
	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	fn ensure_capacity(&self, now: OffsetDateTime) -> Result<(), StoreError> {
		if self.sessions.len() >= self.max_sessions {
			self.sweep_expired(now);
		}
		if self.sessions.len() >= self.max_sessions {
			return Err(StoreError::Capacity { limit: self.max_sessions });
		}

		Ok(())
	}

	// Runs `f` against a live session; an expired one is removed instead.
	fn with_live<R>(
		&self,
		id: &SessionId,
		now: OffsetDateTime,
		f: impl FnOnce(&mut Session) -> R,
	) -> Option<R> {
		let expired = {
			let mut entry = self.sessions.get_mut(id)?;

			if entry.is_expired(now, self.ttl) {
				true
			} else {
				entry.last_seen_at = now;

				return Some(f(&mut entry));
			}
		};

		if expired {
			self.sessions.remove_if(id, |_, session| session.is_expired(now, self.ttl));
		}

		None
	}
}
impl Default for MemorySessionStore {
	fn default() -> Self {
		Self {
			sessions: DashMap::new(),
			ttl: Self::DEFAULT_TTL,
			login_ttl: Self::DEFAULT_LOGIN_TTL,
			max_sessions: Self::DEFAULT_MAX_SESSIONS,
		}
	}
}
impl SessionStore for MemorySessionStore {
	fn create(&self) -> Result<Session, StoreError> {
		let now = OffsetDateTime::now_utc();

		self.ensure_capacity(now)?;

		let session = Session::new(SessionId::generate(), now);

		self.sessions.insert(session.id.clone(), session.clone());

		Ok(session)
	}

	fn get(&self, id: &SessionId) -> Option<Session> {
		self.with_live(id, OffsetDateTime::now_utc(), |session| session.clone())
	}

	fn set_identity(&self, id: &SessionId, identity: Identity) {
		self.with_live(id, OffsetDateTime::now_utc(), |session| session.identity = Some(identity));
	}

	fn set_pending_route(&self, id: &SessionId, pending: PendingRoute) {
		self.with_live(id, OffsetDateTime::now_utc(), |session| {
			session.pending_route = Some(pending)
		});
	}

	fn take_pending_route(&self, id: &SessionId) -> Option<PendingRoute> {
		self.with_live(id, OffsetDateTime::now_utc(), |session| session.pending_route.take())
			.flatten()
	}

	fn begin_login(&self, id: &SessionId, pending: PendingLogin) -> bool {
		self.with_live(id, OffsetDateTime::now_utc(), |session| session.pending_login = Some(pending))
			.is_some()
	}

	fn consume_login(
		&self,
		id: &SessionId,
		presented_state: &str,
		now: OffsetDateTime,
	) -> ConsumeOutcome {
		let login_ttl = self.login_ttl;

		self.with_live(id, now, |session| {
			let replayed =
				session.consumed_state.is_some_and(|digest| digest.matches(presented_state));
			let Some(pending) = session.pending_login.take() else {
				return if replayed {
					ConsumeOutcome::AlreadyConsumed
				} else {
					ConsumeOutcome::NoLoginInProgress
				};
			};

			if !pending.state_matches(presented_state) {
				session.pending_login = Some(pending);

				return if replayed { ConsumeOutcome::AlreadyConsumed } else { ConsumeOutcome::Mismatch };
			}
			if !pending.is_live(now, login_ttl) {
				return ConsumeOutcome::Expired;
			}

			session.consumed_state = Some(pending.digest());

			ConsumeOutcome::Consumed(pending)
		})
		.unwrap_or(ConsumeOutcome::NoLoginInProgress)
	}

	fn rotate(&self, old: &SessionId, identity: Identity) -> Result<Session, StoreError> {
		let now = OffsetDateTime::now_utc();

		self.ensure_capacity(now)?;

		let mut session = Session::new(SessionId::generate(), now);

		session.identity = Some(identity);
		session.consumed_state =
			self.sessions.remove(old).and_then(|(_, previous)| previous.consumed_state);

		self.sessions.insert(session.id.clone(), session.clone());

		Ok(session)
	}

	fn destroy(&self, id: &SessionId) {
		self.sessions.remove(id);
	}

	fn sweep_expired(&self, now: OffsetDateTime) -> usize {
		let removed = AtomicUsize::new(0);

		self.sessions.retain(|_, session| {
			let keep = !session.is_expired(now, self.ttl);

			if !keep {
				removed.fetch_add(1, Ordering::Relaxed);
			}

			keep
		});

		removed.into_inner()
	}
}
