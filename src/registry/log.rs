//! Append-only JSON-lines log that makes dynamic route changes survive restarts.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{_prelude::*, session::StoreError};

/// One line of the route log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum RouteLogRecord {
	/// A route was registered.
	Register {
		/// Route key, as registered.
		route: String,
		/// Backend base URL.
		backend: String,
	},
	/// A route was removed.
	Remove {
		/// Route key, as removed.
		route: String,
	},
}

#[derive(Default)]
struct Replay {
	records: Vec<RouteLogRecord>,
	torn_at: Option<u64>,
}

/// Open handle on the route log; writes are flushed to disk before returning.
#[derive(Debug)]
pub struct RouteLog {
	path: PathBuf,
	file: File,
}
impl RouteLog {
	/// Opens (or creates) the log at `path` and returns the records already written.
	///
	/// An unterminated last line is what an interrupted append leaves behind. Its write was
	/// reported as failed, so it is dropped and cut off before later appends.
	pub fn open(path: impl Into<PathBuf>) -> Result<(Self, Vec<RouteLogRecord>), StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let replay = if path.exists() { Self::read_records(&path)? } else { Replay::default() };
		let file = OpenOptions::new().create(true).append(true).open(&path).map_err(|e| {
			StoreError::Backend { message: format!("Failed to open {}: {e}", path.display()) }
		})?;
		let log = Self { path, file };

		if let Some(valid_len) = replay.torn_at {
			tracing::warn!(path = %log.path.display(), "discarding unterminated route log line");
			log.truncate(valid_len)?;
		}

		Ok((log, replay.records))
	}

	/// Location of the log file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Appends one record and syncs it to disk; a failed write is rolled back.
	pub fn append(&mut self, record: &RouteLogRecord) -> Result<(), StoreError> {
		let mut line = serde_json::to_vec(record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize route record: {e}"),
		})?;

		line.push(b'\n');

		let len = self.file.metadata().map(|meta| meta.len()).map_err(|e| StoreError::Backend {
			message: format!("Failed to stat {}: {e}", self.path.display()),
		})?;

		if let Err(e) = self.file.write_all(&line) {
			if let Err(rollback) = self.truncate(len) {
				tracing::error!(error = %rollback, "failed to roll back partial route log write");
			}

			return Err(StoreError::Backend {
				message: format!("Failed to write {}: {e}", self.path.display()),
			});
		}

		self.file.sync_data().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", self.path.display()),
		})
	}

	fn truncate(&self, len: u64) -> Result<(), StoreError> {
		self.file.set_len(len).map_err(|e| StoreError::Backend {
			message: format!("Failed to truncate {}: {e}", self.path.display()),
		})
	}

	fn read_records(path: &Path) -> Result<Replay, StoreError> {
		let contents = fs::read_to_string(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let mut replay = Replay::default();
		let mut offset = 0;

		for (index, line) in contents.split_inclusive('\n').enumerate() {
			let start = offset;

			offset += line.len();

			if line.trim().is_empty() {
				continue;
			}
			if !line.ends_with('\n') {
				replay.torn_at = Some(start as u64);

				break;
			}

			let record = serde_json::from_str(line).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {} line {}: {e}", path.display(), index + 1),
			})?;

			replay.records.push(record);
		}

		Ok(replay)
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create log directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}
}
