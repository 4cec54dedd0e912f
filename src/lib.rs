//! Single-entry OAuth 2.0 gateway: log visitors in with a third-party identity provider, gate
//! them on an allow-list, and reverse-proxy them to backends selected by a short route key.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod login;
pub mod oauth;
pub mod obs;
pub mod policy;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod session;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
// Used by the binary target only.
use color_eyre as _;
#[cfg(test)] use {httpmock as _, tower as _};
