//! File-backed [`KeyValueStore`] so a desktop or kiosk session survives restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError},
};

/// Persists entries to a JSON object file after each mutation.
///
/// Every mutation rewrites a temporary sibling and renames it over the snapshot, so a reader in
/// another process sees either the previous or the next snapshot, never a partial one.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, String>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, String>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, String>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl KeyValueStore for FileStore {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.inner.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let previous = guard.insert(key.to_owned(), value);

		if let Err(e) = self.persist_locked(&guard) {
			// Keep memory in step with disk.
			match previous {
				Some(previous) => guard.insert(key.to_owned(), previous),
				None => guard.remove(key),
			};

			return Err(e);
		}

		Ok(())
	}

	fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let removed: Vec<(String, String)> =
			keys.iter().filter_map(|key| guard.remove_entry(*key)).collect();

		if removed.is_empty() {
			return Ok(());
		}
		if let Err(e) = self.persist_locked(&guard) {
			guard.extend(removed);

			return Err(e);
		}

		Ok(())
	}

	fn compare_and_set(&self, key: &str, expected: &str, value: String) -> Result<bool, StoreError> {
		let mut guard = self.inner.write();

		if guard.get(key).map(String::as_str) != Some(expected) {
			return Ok(false);
		}

		let previous = guard.insert(key.to_owned(), value);

		if let Err(e) = self.persist_locked(&guard) {
			if let Some(previous) = previous {
				guard.insert(key.to_owned(), previous);
			}

			return Err(e);
		}

		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::{auth::Credential, store::CredentialStore};

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"plantgate_file_store_{label}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn credential_survives_reopen() {
		let path = temp_path("reopen");
		let backend = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let credential = Credential::new("access-token", "refresh-token", 1_900_000_000);

		CredentialStore::new(Arc::new(backend))
			.write(&credential)
			.expect("Failed to write credential to file store.");

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = CredentialStore::new(Arc::new(reopened))
			.read()
			.expect("File store lost the credential after reopen.");

		assert_eq!(fetched, credential);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn remove_persists_and_ignores_missing_keys() {
		let path = temp_path("remove");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");

		store.set("a", "1".into()).expect("Failed to write first key.");
		store.set("b", "2".into()).expect("Failed to write second key.");
		store.remove(&["a", "nope"]).expect("Failed to remove keys.");

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		assert_eq!(reopened.get("a"), Ok(None));
		assert_eq!(reopened.get("b"), Ok(Some("2".into())));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn compare_and_set_persists_only_on_match() {
		let path = temp_path("cas");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");

		store.set("k", "v1".into()).expect("Failed to write key.");

		assert_eq!(store.compare_and_set("k", "stale", "v2".into()), Ok(false));
		assert_eq!(store.compare_and_set("k", "v1", "v2".into()), Ok(true));
		assert_eq!(store.compare_and_set("gone", "v1", "v2".into()), Ok(false));

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		assert_eq!(reopened.get("k"), Ok(Some("v2".into())));
		assert_eq!(reopened.get("gone"), Ok(None));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn corrupt_snapshot_is_reported() {
		let path = temp_path("corrupt");

		fs::write(&path, b"not json").expect("Failed to seed corrupt snapshot.");

		let err = FileStore::open(&path).expect_err("Corrupt snapshots should fail to open.");

		assert!(matches!(err, StoreError::Serialization { .. }));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
