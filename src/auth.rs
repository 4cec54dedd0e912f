//! Auth-domain identifiers, identities, scope sets, and redacted secrets.

pub mod id;
pub mod identity;
pub mod scope;
pub mod secret;

pub use id::*;
pub use identity::*;
pub use scope::*;
pub use secret::*;
