//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering the authorization,
//! token, and profile endpoints, client authentication preferences, and provider quirks
//! (PKCE, scope delimiter, profile field names). `strategy` defines [`ProviderStrategy`], the
//! hook used by the login flow to classify token errors and turn a profile into an identity.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
