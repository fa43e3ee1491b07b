//! The keyed, versioned cache store.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::collection::{Collection, CollectionItem};
use crate::key::CacheKey;
use crate::model::{FeedId, FeedItem, Profile, UserId};
use crate::snapshot::{Snapshot, SnapshotEntry};
use crate::thread::CommentThread;
use crate::value::CacheValue;

/// One owned cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
	key: CacheKey,
	value: CacheValue,
	version: u64,
}

impl CacheEntry {
	pub fn key(&self) -> &CacheKey {
		&self.key
	}

	pub fn value(&self) -> &CacheValue {
		&self.value
	}

	/// Store-wide monotonic write number of the last write to this key.
	pub fn version(&self) -> u64 {
		self.version
	}
}

/// Delivered to listeners after a transaction that wrote `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
	pub key: CacheKey,
	/// New version, or `None` when the key was removed.
	pub version: Option<u64>,
}

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Default)]
struct StoreInner {
	entries: HashMap<CacheKey, CacheEntry>,
	listeners: HashMap<CacheKey, Vec<(u64, Listener)>>,
	next_version: u64,
	next_listener: u64,
}

/// Mutable view of the store for the duration of one transaction.
///
/// All operations inside one transaction are observed atomically by other
/// readers. Listener callbacks run after the transaction ends.
pub struct StoreTxn<'a> {
	inner: &'a mut StoreInner,
	events: Vec<CacheEvent>,
}

impl StoreTxn<'_> {
	pub fn get(&self, key: &CacheKey) -> Option<&CacheValue> {
		self.inner.entries.get(key).map(|entry| &entry.value)
	}

	pub fn entry(&self, key: &CacheKey) -> Option<&CacheEntry> {
		self.inner.entries.get(key)
	}

	pub fn version(&self, key: &CacheKey) -> Option<u64> {
		self.inner.entries.get(key).map(|entry| entry.version)
	}

	pub fn contains(&self, key: &CacheKey) -> bool {
		self.inner.entries.contains_key(key)
	}

	fn bump(&mut self) -> u64 {
		self.inner.next_version += 1;
		self.inner.next_version
	}

	/// Replaces the entry and returns its new version.
	pub fn put(&mut self, key: CacheKey, value: CacheValue) -> u64 {
		let version = self.bump();
		debug!(key = %key, kind = value.kind(), version, "cache.put");
		self.events.push(CacheEvent {
			key: key.clone(),
			version: Some(version),
		});
		self.inner.entries.insert(key.clone(), CacheEntry { key, value, version });
		version
	}

	/// Read-modify-write of an existing entry. Absent keys are left absent
	/// and `None` is returned.
	pub fn patch(&mut self, key: &CacheKey, f: impl FnOnce(&mut CacheValue)) -> Option<u64> {
		if !self.inner.entries.contains_key(key) {
			trace!(key = %key, "cache.patch.absent");
			return None;
		}
		let version = self.bump();
		let entry = self.inner.entries.get_mut(key)?;
		f(&mut entry.value);
		entry.version = version;
		debug!(key = %key, version, "cache.patch");
		self.events.push(CacheEvent {
			key: key.clone(),
			version: Some(version),
		});
		Some(version)
	}

	pub fn remove(&mut self, key: &CacheKey) -> Option<CacheValue> {
		let entry = self.inner.entries.remove(key)?;
		debug!(key = %key, "cache.remove");
		self.events.push(CacheEvent { key: key.clone(), version: None });
		Some(entry.value)
	}

	pub fn snapshot<'k>(&self, keys: impl IntoIterator<Item = &'k CacheKey>) -> Snapshot {
		let mut snapshot = Snapshot::default();
		for key in keys {
			let entry = self.inner.entries.get(key);
			snapshot.insert(
				key.clone(),
				SnapshotEntry {
					value: entry.map(|e| e.value.clone()),
					version: entry.map(|e| e.version),
				},
			);
		}
		snapshot
	}

	/// Writes every captured value back; keys captured as absent are removed.
	pub fn restore(&mut self, snapshot: &Snapshot) {
		for (key, entry) in snapshot.iter() {
			match &entry.value {
				Some(value) => {
					self.put(key.clone(), value.clone());
				}
				None => {
					self.remove(key);
				}
			}
		}
	}

	/// Every key whose value currently holds a copy of feed `id`, in key order.
	pub fn keys_holding_feed(&self, id: FeedId) -> Vec<CacheKey> {
		let mut keys: Vec<_> = self
			.inner
			.entries
			.values()
			.filter(|entry| entry.value.holds_feed(id))
			.map(|entry| entry.key.clone())
			.collect();
		keys.sort();
		keys
	}

	pub fn keys(&self) -> Vec<CacheKey> {
		let mut keys: Vec<_> = self.inner.entries.keys().cloned().collect();
		keys.sort();
		keys
	}
}

/// Shared handle to one cache instance.
///
/// Cloning shares the store. Do not call methods of the same store from
/// inside a [`CacheStore::transaction`] closure; use the [`StoreTxn`] instead.
#[derive(Clone, Default)]
pub struct CacheStore {
	inner: Arc<Mutex<StoreInner>>,
}

impl fmt::Debug for CacheStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("CacheStore")
			.field("entries", &inner.entries.len())
			.field("version", &inner.next_version)
			.finish_non_exhaustive()
	}
}

impl CacheStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs `f` under the store lock, then notifies listeners of every key
	/// it wrote, in write order.
	pub fn transaction<R>(&self, f: impl FnOnce(&mut StoreTxn<'_>) -> R) -> R {
		let (result, calls) = {
			let mut guard = self.inner.lock();
			let mut txn = StoreTxn {
				inner: &mut *guard,
				events: Vec::new(),
			};
			let result = f(&mut txn);
			let events = std::mem::take(&mut txn.events);
			let mut calls: Vec<(Listener, CacheEvent)> = Vec::new();
			for event in events {
				if let Some(listeners) = guard.listeners.get(&event.key) {
					calls.extend(listeners.iter().map(|(_, l)| (Arc::clone(l), event.clone())));
				}
			}
			(result, calls)
		};
		for (listener, event) in calls {
			listener(&event);
		}
		result
	}

	/// Read-only access without cloning the value.
	pub fn read<R>(&self, key: &CacheKey, f: impl FnOnce(Option<&CacheValue>) -> R) -> R {
		let guard = self.inner.lock();
		f(guard.entries.get(key).map(|entry| &entry.value))
	}

	pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
		self.read(key, |value| value.cloned())
	}

	pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
		self.inner.lock().entries.get(key).cloned()
	}

	pub fn version(&self, key: &CacheKey) -> Option<u64> {
		self.inner.lock().entries.get(key).map(|entry| entry.version)
	}

	pub fn contains(&self, key: &CacheKey) -> bool {
		self.inner.lock().entries.contains_key(key)
	}

	pub fn put(&self, key: CacheKey, value: impl Into<CacheValue>) -> u64 {
		let value = value.into();
		self.transaction(|txn| txn.put(key, value))
	}

	pub fn patch(&self, key: &CacheKey, f: impl FnOnce(&mut CacheValue)) -> Option<u64> {
		self.transaction(|txn| txn.patch(key, f))
	}

	pub fn remove(&self, key: &CacheKey) -> Option<CacheValue> {
		self.transaction(|txn| txn.remove(key))
	}

	pub fn snapshot(&self, keys: &[CacheKey]) -> Snapshot {
		self.transaction(|txn| txn.snapshot(keys))
	}

	pub fn restore(&self, snapshot: &Snapshot) {
		self.transaction(|txn| txn.restore(snapshot));
	}

	pub fn keys_holding_feed(&self, id: FeedId) -> Vec<CacheKey> {
		self.transaction(|txn| txn.keys_holding_feed(id))
	}

	pub fn feed(&self, id: FeedId) -> Option<FeedItem> {
		self.read(&CacheKey::Feed(id), |value| value.and_then(CacheValue::as_feed).cloned())
	}

	pub fn thread(&self, id: FeedId) -> Option<CommentThread> {
		self.read(&CacheKey::Comments(id), |value| value.and_then(CacheValue::as_thread).cloned())
	}

	pub fn profile(&self, id: UserId) -> Option<Profile> {
		self.read(&CacheKey::Profile(id), |value| value.and_then(CacheValue::as_profile).cloned())
	}

	pub fn collection<T: CollectionItem>(&self, key: &CacheKey) -> Option<Collection<T>> {
		self.read(key, |value| value.and_then(T::unwrap).cloned())
	}

	/// Registers `listener` for writes to `key`. The listener stays
	/// registered until the returned [`Subscription`] is dropped.
	pub fn subscribe(&self, key: CacheKey, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> Subscription {
		let mut inner = self.inner.lock();
		inner.next_listener += 1;
		let id = inner.next_listener;
		inner.listeners.entry(key.clone()).or_default().push((id, Arc::new(listener)));
		trace!(key = %key, id, "cache.subscribe");
		Subscription {
			id,
			key,
			store: Arc::downgrade(&self.inner),
		}
	}
}

/// Listener registration guard.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
	id: u64,
	key: CacheKey,
	store: Weak<Mutex<StoreInner>>,
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("id", &self.id).field("key", &self.key).finish()
	}
}

impl Subscription {
	pub fn key(&self) -> &CacheKey {
		&self.key
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		let Some(store) = self.store.upgrade() else {
			return;
		};
		let mut inner = store.lock();
		if let Some(listeners) = inner.listeners.get_mut(&self.key) {
			listeners.retain(|(id, _)| *id != self.id);
			if listeners.is_empty() {
				inner.listeners.remove(&self.key);
			}
		}
	}
}
