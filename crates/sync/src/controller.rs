//! Cursor-paged loading of cached collections.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plume_cache::{CacheKey, CacheStore, Collection, CollectionItem, FeedItem, Notification, Page};
use plume_net::{ClientError, FeedBackend};
use plume_worker::GenerationClock;
use tracing::{debug, warn};

/// Fetches one page of the collection stored under a key.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
	/// `page` is 1-based.
	async fn fetch(&self, key: &CacheKey, page: u32, size: u32) -> Result<Page<T>, ClientError>;
}

/// [`PageSource`] over a [`FeedBackend`] for feed and notification keys.
#[derive(Clone)]
pub struct BackendPages(pub Arc<dyn FeedBackend>);

fn not_paged(key: &CacheKey, kind: &str) -> ClientError {
	ClientError::Decode(format!("{key} is not a paged {kind} collection"))
}

#[async_trait]
impl PageSource<FeedItem> for BackendPages {
	async fn fetch(&self, key: &CacheKey, page: u32, size: u32) -> Result<Page<FeedItem>, ClientError> {
		match key {
			CacheKey::Feeds(query) => self.0.feeds(query, page, size).await,
			_ => Err(not_paged(key, "feed")),
		}
	}
}

#[async_trait]
impl PageSource<Notification> for BackendPages {
	async fn fetch(&self, key: &CacheKey, page: u32, size: u32) -> Result<Page<Notification>, ClientError> {
		match key {
			CacheKey::Notifications => self.0.notifications(page, size).await,
			_ => Err(not_paged(key, "notification")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	/// A load for the key is already in flight.
	InFlight,
	/// The last merged page reported no successor.
	Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
	Loaded { page: u32, added: usize, has_next: bool },
	Skipped(SkipReason),
}

#[derive(Debug, Default)]
struct LoadState {
	/// Generation of the outstanding request.
	in_flight: Option<u64>,
	error: Option<ClientError>,
}

/// Loads collections of `T` page by page into the cache.
///
/// Each request is tagged with a generation at dispatch. [`Self::reset`]
/// forgets the tag, so a response arriving afterwards is discarded as
/// [`ClientError::StaleResponse`] and never reaches the store.
pub struct CollectionController<T> {
	store: CacheStore,
	source: Arc<dyn PageSource<T>>,
	page_size: u32,
	clock: GenerationClock,
	loads: Arc<Mutex<HashMap<CacheKey, LoadState>>>,
	_item: PhantomData<fn() -> T>,
}

impl<T> Clone for CollectionController<T> {
	fn clone(&self) -> Self {
		Self {
			store: self.store.clone(),
			source: Arc::clone(&self.source),
			page_size: self.page_size,
			clock: self.clock.clone(),
			loads: Arc::clone(&self.loads),
			_item: PhantomData,
		}
	}
}

impl<T> fmt::Debug for CollectionController<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CollectionController")
			.field("page_size", &self.page_size)
			.field("generation", &self.clock.current())
			.finish_non_exhaustive()
	}
}

impl<T: CollectionItem> CollectionController<T> {
	pub fn new(store: CacheStore, source: Arc<dyn PageSource<T>>, page_size: u32) -> Self {
		Self {
			store,
			source,
			page_size: page_size.max(1),
			clock: GenerationClock::new(),
			loads: Arc::new(Mutex::new(HashMap::new())),
			_item: PhantomData,
		}
	}

	pub fn store(&self) -> &CacheStore {
		&self.store
	}

	/// Loads the page after the highest one merged for `key`.
	///
	/// At most one request per key is in flight; further calls return
	/// [`LoadOutcome::Skipped`] without a request. On failure the collection
	/// is left as it was, the error is remembered for [`Self::error`] and the
	/// next call requests the same page again.
	pub async fn load_next(&self, key: &CacheKey) -> Result<LoadOutcome, ClientError> {
		// Store lock before load-state lock, everywhere.
		let dispatched = self.store.transaction(|txn| {
			let mut loads = self.loads.lock();
			let state = loads.entry(key.clone()).or_default();
			if state.in_flight.is_some() {
				return Err(SkipReason::InFlight);
			}
			let collection = txn.get(key).and_then(T::unwrap);
			if collection.is_some_and(|c| !c.has_next()) {
				return Err(SkipReason::Exhausted);
			}
			let page = collection.map_or(1, Collection::next_page);
			let generation = self.clock.next();
			state.in_flight = Some(generation);
			state.error = None;
			Ok((page, generation))
		});
		let (page, generation) = match dispatched {
			Ok(dispatched) => dispatched,
			Err(reason) => {
				debug!(key = %key, ?reason, "collection.load.skipped");
				return Ok(LoadOutcome::Skipped(reason));
			}
		};
		debug!(key = %key, page, generation, "collection.load");

		let result = self.source.fetch(key, page, self.page_size).await;

		self.store.transaction(|txn| {
			let mut loads = self.loads.lock();
			let Some(state) = loads.get_mut(key).filter(|state| state.in_flight == Some(generation)) else {
				debug!(key = %key, page, generation, "collection.load.stale");
				return Err(ClientError::StaleResponse);
			};
			state.in_flight = None;
			let fetched = match result {
				Ok(fetched) => fetched,
				Err(err) => {
					warn!(key = %key, page, error = %err, "collection.load.failed");
					state.error = Some(err.clone());
					return Err(err);
				}
			};
			let fetched_page = fetched.cursor.page;
			let mut added = 0;
			let mut has_next = fetched.cursor.has_next;
			let merged = txn.patch(key, |value| {
				if let Some(collection) = T::unwrap_mut(value) {
					added = collection.merge_page(fetched.clone());
					has_next = collection.has_next();
				}
			});
			if merged.is_none() {
				added = fetched.items.len();
				txn.put(key.clone(), T::wrap(Collection::from_page(fetched)));
			}
			Ok(LoadOutcome::Loaded {
				page: fetched_page,
				added,
				has_next,
			})
		})
	}

	/// Discards the collection and any in-flight load for `key`.
	///
	/// Called when the query identity changes (a new search keyword) or for
	/// a pull-to-refresh; the next [`Self::load_next`] starts from page 1.
	pub fn reset(&self, key: &CacheKey) {
		self.store.transaction(|txn| {
			let mut loads = self.loads.lock();
			if let Some(state) = loads.remove(key)
				&& let Some(generation) = state.in_flight
			{
				debug!(key = %key, generation, "collection.load.abandoned");
			}
			txn.remove(key);
		});
	}

	/// Switches from `old` to `new`: resets `old`, then loads the next page
	/// of `new`.
	pub async fn set_query(&self, old: &CacheKey, new: &CacheKey) -> Result<LoadOutcome, ClientError> {
		if old != new {
			self.reset(old);
		}
		self.load_next(new).await
	}

	pub fn is_loading(&self, key: &CacheKey) -> bool {
		self.loads.lock().get(key).is_some_and(|state| state.in_flight.is_some())
	}

	/// Error of the most recent failed load, cleared when the next starts.
	pub fn error(&self, key: &CacheKey) -> Option<ClientError> {
		self.loads.lock().get(key).and_then(|state| state.error.clone())
	}

	/// True until a merged page reports `has_next = false`.
	pub fn has_more(&self, key: &CacheKey) -> bool {
		self.store.read(key, |value| value.and_then(T::unwrap).is_none_or(Collection::has_next))
	}

	pub fn items(&self, key: &CacheKey) -> Vec<T> {
		self.store.read(key, |value| value.and_then(T::unwrap).map(Collection::to_vec).unwrap_or_default())
	}
}
