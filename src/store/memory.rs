//! Thread-safe in-memory [`KeyValueStore`] for tests and short-lived sessions.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps entries in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value);

		Ok(())
	}

	fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
		let mut guard = self.0.write();

		for key in keys {
			guard.remove(*key);
		}

		Ok(())
	}

	fn compare_and_set(&self, key: &str, expected: &str, value: String) -> Result<bool, StoreError> {
		let mut guard = self.0.write();

		match guard.get_mut(key) {
			Some(current) if *current == *expected => {
				*current = value;

				Ok(true)
			},
			_ => Ok(false),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn clones_share_entries() {
		let store = MemoryStore::default();
		let clone = store.clone();

		store.set("k", "v".into()).expect("Memory store writes should succeed.");

		assert_eq!(clone.get("k"), Ok(Some("v".into())));

		clone.remove(&["k", "missing"]).expect("Memory store removals should succeed.");

		assert!(store.is_empty());
	}

	#[test]
	fn compare_and_set_only_replaces_the_expected_value() {
		let store = MemoryStore::default();

		assert_eq!(store.compare_and_set("k", "v", "w".into()), Ok(false));
		assert!(store.is_empty());

		store.set("k", "v".into()).expect("Memory store writes should succeed.");

		assert_eq!(store.compare_and_set("k", "x", "w".into()), Ok(false));
		assert_eq!(store.compare_and_set("k", "v", "w".into()), Ok(true));
		assert_eq!(store.get("k"), Ok(Some("w".into())));
	}
}
