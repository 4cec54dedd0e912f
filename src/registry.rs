//! Route key to backend mapping shared by the proxy and the registration API.
//!
//! Readers load an immutable [`ArcSwap`] snapshot and never block. Writers are serialized by
//! a mutex that also owns the optional [`RouteLog`]; a change is appended to the log before
//! the new snapshot is published, so a failed write is never visible to readers.

pub mod log;

pub use log::{RouteLog, RouteLogRecord};

// std
use std::path::Path;
// crates.io
use arc_swap::ArcSwap;
// self
use crate::{_prelude::*, auth::RouteKey, error::RegistryError};

/// Where a route came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteSource {
	/// Loaded from `TARGET_URLS` at startup.
	Static,
	/// Registered at runtime (possibly replayed from the route log).
	Dynamic,
}

/// A published route; never mutated after insertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
	/// Route key.
	pub route: RouteKey,
	/// Backend base URL requests are forwarded to.
	pub backend: Url,
	/// Origin of the entry.
	pub source: RouteSource,
	/// Registration instant.
	pub registered_at: OffsetDateTime,
}
impl RouteEntry {
	/// Backend origin (`scheme://host[:port]`) used in logs and errors.
	pub fn origin(&self) -> String {
		self.backend.origin().ascii_serialization()
	}
}

#[derive(Clone, Debug, Default)]
struct RouteTable {
	order: Vec<RouteKey>,
	entries: HashMap<RouteKey, Arc<RouteEntry>>,
}

/// Concurrent route registry.
#[derive(Debug, Default)]
pub struct RouteRegistry {
	table: ArcSwap<RouteTable>,
	writer: Mutex<Option<RouteLog>>,
}
impl RouteRegistry {
	/// Creates an empty registry without a durable log.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds the startup registry: static routes in document order, then the route log
	/// replayed on top. Invalid static routes are fatal; replay conflicts are skipped.
	pub fn seeded<I, K, B>(static_routes: I, log_path: Option<&Path>) -> Result<Self, RegistryError>
	where
		I: IntoIterator<Item = (K, B)>,
		K: AsRef<str>,
		B: AsRef<str>,
	{
		let registry = Self::new();

		for (route, backend) in static_routes {
			registry.insert(route.as_ref(), backend.as_ref(), RouteSource::Static)?;
		}

		if let Some(path) = log_path {
			let (log, records) = RouteLog::open(path).map_err(RegistryError::Log)?;

			for record in records {
				registry.replay(record);
			}

			*registry.writer.lock() = Some(log);

			tracing::info!(path = %path.display(), routes = registry.len(), "route log replayed");
		}

		Ok(registry)
	}

	/// Resolves a route key against the current snapshot.
	pub fn lookup(&self, route: &str) -> Option<Arc<RouteEntry>> {
		self.table.load().entries.get(route).cloned()
	}

	/// Registers a dynamic route; the first writer for a key wins.
	pub fn register(&self, route: &str, backend: &str) -> Result<Arc<RouteEntry>, RegistryError> {
		self.insert(route, backend, RouteSource::Dynamic)
	}

	/// Removes a route and returns the entry that was published.
	pub fn remove(&self, route: &str) -> Result<Arc<RouteEntry>, RegistryError> {
		let mut writer = self.writer.lock();
		let current = self.table.load_full();
		let Some(entry) = current.entries.get(route).cloned() else {
			return Err(RegistryError::UnknownRoute { route: route.to_owned() });
		};

		if let Some(log) = writer.as_mut() {
			log.append(&RouteLogRecord::Remove { route: route.to_owned() })
				.map_err(RegistryError::Log)?;
		}

		let mut next = RouteTable::clone(&current);

		next.entries.remove(route);
		next.order.retain(|key| key.as_str() != route);
		self.table.store(Arc::new(next));

		Ok(entry)
	}

	/// Route keys in registration order.
	pub fn keys(&self) -> Vec<RouteKey> {
		self.table.load().order.clone()
	}

	/// Number of published routes.
	pub fn len(&self) -> usize {
		self.table.load().order.len()
	}

	/// Returns true when no routes are published.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn insert(
		&self,
		route: &str,
		backend: &str,
		source: RouteSource,
	) -> Result<Arc<RouteEntry>, RegistryError> {
		let route = RouteKey::new(route)?;
		let backend = validate_backend(backend)?;
		let mut writer = self.writer.lock();
		let current = self.table.load_full();

		if current.entries.contains_key(&route) {
			return Err(RegistryError::Conflict { route: route.into() });
		}
		if let Some(log) = writer.as_mut() {
			log.append(&RouteLogRecord::Register {
				route: route.to_string(),
				backend: backend.to_string(),
			})
			.map_err(RegistryError::Log)?;
		}

		let entry = Arc::new(RouteEntry {
			route: route.clone(),
			backend,
			source,
			registered_at: OffsetDateTime::now_utc(),
		});
		let mut next = RouteTable::clone(&current);

		next.order.push(route.clone());
		next.entries.insert(route, Arc::clone(&entry));
		self.table.store(Arc::new(next));

		Ok(entry)
	}

	// Called before the log is attached, so replay never re-appends.
	fn replay(&self, record: RouteLogRecord) {
		let result = match &record {
			RouteLogRecord::Register { route, backend } =>
				self.insert(route, backend, RouteSource::Dynamic).map(|_| ()),
			RouteLogRecord::Remove { route } => self.remove(route).map(|_| ()),
		};

		if let Err(e) = result {
			tracing::warn!(?record, error = %e, "skipping route log record");
		}
	}
}

/// Validates a backend base URL: absolute `http`/`https` with a host, and no query,
/// fragment, or credentials.
pub fn validate_backend(raw: &str) -> Result<Url, RegistryError> {
	let invalid =
		|reason: &str| RegistryError::InvalidBackend { url: raw.to_owned(), reason: reason.into() };
	let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(invalid("scheme must be http or https"));
	}
	if url.host_str().is_none_or(str::is_empty) {
		return Err(invalid("host is required"));
	}
	if url.query().is_some() || url.fragment().is_some() {
		return Err(invalid("query and fragment are not allowed"));
	}
	if !url.username().is_empty() || url.password().is_some() {
		return Err(invalid("credentials are not allowed"));
	}

	Ok(url)
}
