use std::collections::BTreeMap;

use crate::key::CacheKey;
use crate::value::CacheValue;

/// Captured state of one key. `value` is `None` when the key was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
	pub value: Option<CacheValue>,
	pub version: Option<u64>,
}

/// Point-in-time copy of a set of keys, used to undo predictions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
	entries: BTreeMap<CacheKey, SnapshotEntry>,
}

impl Snapshot {
	pub(crate) fn insert(&mut self, key: CacheKey, entry: SnapshotEntry) {
		self.entries.insert(key, entry);
	}

	pub fn get(&self, key: &CacheKey) -> Option<&SnapshotEntry> {
		self.entries.get(key)
	}

	/// Captured value of `key`, `None` if the key was absent or not captured.
	pub fn value(&self, key: &CacheKey) -> Option<&CacheValue> {
		self.entries.get(key).and_then(|entry| entry.value.as_ref())
	}

	pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
		self.entries.keys()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &SnapshotEntry)> {
		self.entries.iter()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
