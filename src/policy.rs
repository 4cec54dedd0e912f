//! Allow-list authorization for authenticated identities.

// std
use std::collections::HashSet;
// self
use crate::{_prelude::*, auth::Identity};

/// Identity field the allow-list is matched against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AllowListField {
	/// Immutable provider account id.
	#[default]
	ProviderId,
}

/// Authorization decision for an identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
	/// Identity is on the allow-list.
	Authorized,
	/// Identity is authenticated but not allowed.
	Forbidden,
}

/// Pure allow-list policy; an empty list authorizes nobody.
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
	field: AllowListField,
	allowed: HashSet<String>,
}
impl AccessPolicy {
	/// Builds a policy from allow-list entries; entries are trimmed and blanks dropped.
	pub fn from_allow_list<I, S>(entries: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let allowed = entries
			.into_iter()
			.map(|entry| entry.as_ref().trim().to_owned())
			.filter(|entry| !entry.is_empty())
			.collect();

		Self { field: AllowListField::ProviderId, allowed }
	}

	/// Field used for matching.
	pub fn field(&self) -> AllowListField {
		self.field
	}

	/// Number of distinct allow-list entries.
	pub fn len(&self) -> usize {
		self.allowed.len()
	}

	/// Returns true when nobody can be authorized.
	pub fn is_empty(&self) -> bool {
		self.allowed.is_empty()
	}

	/// Decides whether `identity` may use protected routes.
	pub fn decide(&self, identity: &Identity) -> Access {
		let key = match self.field {
			AllowListField::ProviderId => identity.provider_id.as_str(),
		};

		if self.allowed.contains(key) { Access::Authorized } else { Access::Forbidden }
	}

	/// Shorthand for `decide(identity) == Access::Authorized`.
	pub fn is_authorized(&self, identity: &Identity) -> bool {
		self.decide(identity) == Access::Authorized
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn matches_provider_id_only() {
		let policy = AccessPolicy::from_allow_list(" 1001 ,".split(','));
		let alice = Identity::new("1001", "alice");
		let impostor = Identity::new("2002", "1001");

		assert_eq!(policy.len(), 1);
		assert_eq!(policy.decide(&alice), Access::Authorized);
		assert_eq!(policy.decide(&impostor), Access::Forbidden);
	}

	#[test]
	fn empty_list_denies_everyone() {
		let policy = AccessPolicy::from_allow_list(Vec::<String>::new());

		assert!(policy.is_empty());
		assert!(!policy.is_authorized(&Identity::new("1001", "alice")));
	}
}
