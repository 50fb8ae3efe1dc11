//! Persistent key-value contracts and the credential view layered on top of them.
//!
//! [`KeyValueStore`] models the client-side storage the dashboard persists its session in;
//! [`CredentialStore`] owns the single canonical key that holds the whole [`Credential`] and the
//! legacy keys older releases wrote. Neither touches the network.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::PipelineConfig,
	obs::{self, Stage},
};

/// Storage backend contract for string keys and values.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Returns the value stored under `key`, if any.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores `value` under `key`, replacing any existing value in one operation.
	fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

	/// Removes every key in `keys`; missing keys are ignored.
	fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;

	/// Stores `value` under `key` only when the current value equals `expected`, in one operation.
	///
	/// Returns `false`, leaving the entry untouched, when the key is missing or holds anything
	/// else.
	fn compare_and_set(&self, key: &str, expected: &str, value: String) -> Result<bool, StoreError>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The stored refresh token matched and the credential was replaced.
	Updated,
	/// A credential is stored, but with a different refresh token.
	RefreshMismatch,
	/// No readable credential is stored.
	Missing,
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend or the credential codec.
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

/// Reads, replaces, and clears the persisted [`Credential`].
#[derive(Clone)]
pub struct CredentialStore {
	backend: Arc<dyn KeyValueStore>,
	key: String,
	legacy_keys: Vec<String>,
}
impl CredentialStore {
	/// Canonical key holding the serialized credential.
	pub const DEFAULT_KEY: &'static str = "supabase.auth.token";
	/// Keys written by earlier releases that kept the tokens split across entries.
	pub const DEFAULT_LEGACY_KEYS: [&'static str; 2] = ["jwt_token", "refresh_token"];

	/// Creates a store over `backend` using the default canonical and legacy keys.
	pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
		Self {
			backend,
			key: Self::DEFAULT_KEY.into(),
			legacy_keys: Self::DEFAULT_LEGACY_KEYS.iter().map(|key| (*key).to_owned()).collect(),
		}
	}

	/// Creates a store over `backend` using the keys named in `config`.
	pub fn from_config(backend: Arc<dyn KeyValueStore>, config: &PipelineConfig) -> Self {
		Self {
			backend,
			key: config.credential_key.clone(),
			legacy_keys: config.legacy_keys.clone(),
		}
	}

	/// Overrides the canonical key.
	pub fn with_key(mut self, key: impl Into<String>) -> Self {
		self.key = key.into();

		self
	}

	/// Overrides the legacy keys removed by [`CredentialStore::clear`].
	pub fn with_legacy_keys<I, S>(mut self, keys: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.legacy_keys = keys.into_iter().map(Into::into).collect();

		self
	}

	/// Canonical key this store reads and writes.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Returns the stored credential.
	///
	/// Missing, unreadable, or malformed data all yield `None`; the failure is logged and never
	/// propagated.
	pub fn read(&self) -> Option<Credential> {
		let raw = match self.backend.get(&self.key) {
			Ok(raw) => raw?,
			Err(e) => {
				obs::warn(Stage::Store, "Credential store could not be read.", &e);

				return None;
			},
		};

		match serde_json::from_str::<Credential>(&raw) {
			Ok(credential) => Some(credential),
			Err(e) => {
				obs::warn(Stage::Store, "Stored credential is malformed; ignoring it.", &e);

				None
			},
		}
	}

	/// Replaces the stored credential with `credential` in a single backend write.
	pub fn write(&self, credential: &Credential) -> Result<(), StoreError> {
		self.backend.set(&self.key, serialize(credential)?)
	}

	/// Replaces the stored credential with `replacement` only if it still carries
	/// `expected_refresh`.
	///
	/// The check and the write are one backend operation, so a concurrent
	/// [`CredentialStore::clear`] either happens first (yielding
	/// [`CompareAndSwapOutcome::Missing`]) or removes the replacement afterwards.
	pub fn compare_and_swap(
		&self,
		expected_refresh: &str,
		replacement: &Credential,
	) -> Result<CompareAndSwapOutcome, StoreError> {
		let Some(raw) = self.backend.get(&self.key)? else {
			return Ok(CompareAndSwapOutcome::Missing);
		};

		match serde_json::from_str::<Credential>(&raw) {
			Ok(current) if current.refresh_token.expose() == expected_refresh => (),
			Ok(_) => return Ok(CompareAndSwapOutcome::RefreshMismatch),
			Err(_) => return Ok(CompareAndSwapOutcome::Missing),
		}

		if self.backend.compare_and_set(&self.key, &raw, serialize(replacement)?)? {
			return Ok(CompareAndSwapOutcome::Updated);
		}

		// Lost a race with another writer.
		match self.backend.get(&self.key)? {
			Some(_) => Ok(CompareAndSwapOutcome::RefreshMismatch),
			None => Ok(CompareAndSwapOutcome::Missing),
		}
	}

	/// Removes the credential and every legacy key.
	pub fn clear(&self) -> Result<(), StoreError> {
		let mut keys = Vec::with_capacity(self.legacy_keys.len() + 1);

		keys.push(self.key.as_str());
		keys.extend(self.legacy_keys.iter().map(String::as_str));

		self.backend.remove(&keys)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore")
			.field("key", &self.key)
			.field("legacy_keys", &self.legacy_keys)
			.finish()
	}
}

fn serialize(credential: &Credential) -> Result<String, StoreError> {
	serde_json::to_string(credential).map_err(|e| StoreError::Serialization {
		message: format!("Failed to serialize credential: {e}"),
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	fn store() -> (CredentialStore, Arc<MemoryStore>) {
		let backend = Arc::new(MemoryStore::default());

		(CredentialStore::new(backend.clone()), backend)
	}

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "quota exceeded".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("quota exceeded"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn write_then_read_returns_the_whole_pair() {
		let (store, backend) = store();
		let credential = Credential::new("access-1", "refresh-1", 1_800_000_000);

		store.write(&credential).expect("Writing a credential should succeed.");

		assert_eq!(store.read(), Some(credential));
		assert_eq!(backend.len(), 1);
	}

	#[test]
	fn read_fails_soft_on_malformed_data() {
		let (store, backend) = store();

		backend
			.set(CredentialStore::DEFAULT_KEY, "{\"access_token\":\"only-half\"".into())
			.expect("Seeding raw data should succeed.");

		assert_eq!(store.read(), None);

		backend
			.set(CredentialStore::DEFAULT_KEY, "{\"access_token\":\"a\"}".into())
			.expect("Seeding raw data should succeed.");

		assert_eq!(store.read(), None);
	}

	#[test]
	fn clear_removes_canonical_and_legacy_keys() {
		let (store, backend) = store();

		store
			.write(&Credential::new("a", "r", 10))
			.expect("Writing a credential should succeed.");
		backend.set("jwt_token", "stale-access".into()).expect("Seeding legacy key should succeed.");
		backend
			.set("refresh_token", "stale-refresh".into())
			.expect("Seeding legacy key should succeed.");
		backend.set("theme", "dark".into()).expect("Seeding unrelated key should succeed.");

		store.clear().expect("Clearing the store should succeed.");

		assert_eq!(store.read(), None);
		assert_eq!(backend.get("jwt_token"), Ok(None));
		assert_eq!(backend.get("refresh_token"), Ok(None));
		assert_eq!(backend.get("theme"), Ok(Some("dark".into())));
	}

	#[test]
	fn compare_and_swap_requires_the_expected_refresh_token() {
		let (store, _) = store();
		let next = Credential::new("access-2", "refresh-2", 20);

		assert_eq!(store.compare_and_swap("refresh-1", &next), Ok(CompareAndSwapOutcome::Missing));
		assert_eq!(store.read(), None);

		store
			.write(&Credential::new("access-1", "refresh-1", 10))
			.expect("Writing a credential should succeed.");

		assert_eq!(
			store.compare_and_swap("refresh-0", &next),
			Ok(CompareAndSwapOutcome::RefreshMismatch),
		);
		assert_eq!(store.compare_and_swap("refresh-1", &next), Ok(CompareAndSwapOutcome::Updated));
		assert_eq!(store.read(), Some(next));
	}

	#[test]
	fn compare_and_swap_after_clear_writes_nothing() {
		let (store, backend) = store();

		store
			.write(&Credential::new("access-1", "refresh-1", 10))
			.expect("Writing a credential should succeed.");
		store.clear().expect("Clearing the store should succeed.");

		assert_eq!(
			store.compare_and_swap("refresh-1", &Credential::new("access-2", "refresh-2", 20)),
			Ok(CompareAndSwapOutcome::Missing),
		);
		assert!(backend.is_empty());
	}

	#[test]
	fn custom_keys_are_honored() {
		let backend = Arc::new(MemoryStore::default());
		let store = CredentialStore::new(backend.clone())
			.with_key("plant.session")
			.with_legacy_keys(["old.session"]);

		store.write(&Credential::new("a", "r", 10)).expect("Writing a credential should succeed.");
		backend.set("old.session", "x".into()).expect("Seeding legacy key should succeed.");

		assert!(backend.get("plant.session").expect("Backend read should succeed.").is_some());

		store.clear().expect("Clearing the store should succeed.");

		assert!(backend.is_empty());
	}
}
