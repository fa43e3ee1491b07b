//! Paged collection accessors.

use plume_cache::{CacheEvent, CacheKey, CollectionItem, FeedItem, FeedQuery, Notification, Subscription};
use plume_net::ClientError;
use plume_sync::{CollectionController, LoadOutcome};
use tracing::trace;

/// Point-in-time read of a paged collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView<T> {
	pub items: Vec<T>,
	pub has_more: bool,
	pub is_loading: bool,
	pub error: Option<ClientError>,
}

pub type FeedListView = ListView<FeedItem>;
pub type NotificationListView = ListView<Notification>;

/// Handle to the collection stored under one key.
#[derive(Debug)]
pub struct PagedList<T> {
	controller: CollectionController<T>,
	key: CacheKey,
}

impl<T> Clone for PagedList<T> {
	fn clone(&self) -> Self {
		Self {
			controller: self.controller.clone(),
			key: self.key.clone(),
		}
	}
}

pub type FeedList = PagedList<FeedItem>;
pub type NotificationList = PagedList<Notification>;

/// A response made obsolete by a query change or refresh is not an error
/// for the caller; it reports `None`.
fn discard_stale(result: Result<LoadOutcome, ClientError>, key: &CacheKey) -> Result<Option<LoadOutcome>, ClientError> {
	match result {
		Ok(outcome) => Ok(Some(outcome)),
		Err(ClientError::StaleResponse) => {
			trace!(key = %key, "list.stale_discarded");
			Ok(None)
		}
		Err(err) => Err(err),
	}
}

impl<T: CollectionItem> PagedList<T> {
	pub(crate) fn new(controller: CollectionController<T>, key: CacheKey) -> Self {
		Self { controller, key }
	}

	pub fn key(&self) -> &CacheKey {
		&self.key
	}

	pub fn items(&self) -> Vec<T> {
		self.controller.items(&self.key)
	}

	pub fn has_more(&self) -> bool {
		self.controller.has_more(&self.key)
	}

	pub fn is_loading(&self) -> bool {
		self.controller.is_loading(&self.key)
	}

	pub fn error(&self) -> Option<ClientError> {
		self.controller.error(&self.key)
	}

	pub fn view(&self) -> ListView<T> {
		ListView {
			items: self.items(),
			has_more: self.has_more(),
			is_loading: self.is_loading(),
			error: self.error(),
		}
	}

	/// Loads the next page.
	///
	/// `Ok(None)` means the response arrived after the list was reset and
	/// was dropped.
	pub async fn load_more(&self) -> Result<Option<LoadOutcome>, ClientError> {
		discard_stale(self.controller.load_next(&self.key).await, &self.key)
	}

	/// Drops every loaded page and loads page 1 again.
	pub async fn refresh(&self) -> Result<Option<LoadOutcome>, ClientError> {
		self.controller.reset(&self.key);
		self.load_more().await
	}

	/// Calls `listener` after every write to this list's key.
	pub fn subscribe(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> Subscription {
		self.controller.store().subscribe(self.key.clone(), listener)
	}
}

impl PagedList<FeedItem> {
	/// Points the list at another query. The old query's pages and any of
	/// its loads still in flight are discarded before page 1 of `query` is
	/// requested.
	pub async fn set_query(&mut self, query: FeedQuery) -> Result<Option<LoadOutcome>, ClientError> {
		let new = CacheKey::Feeds(query);
		let old = std::mem::replace(&mut self.key, new.clone());
		discard_stale(self.controller.set_query(&old, &new).await, &new)
	}
}
