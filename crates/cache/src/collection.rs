//! Ordered, identity-deduplicated concatenation of pages.

use std::fmt::Debug;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::model::{FeedId, FeedItem, Notification, NotificationId, Page};
use crate::value::{CacheValue, Revert};

/// Objects with a stable server identity.
pub trait Identified {
	type Id: Copy + Eq + Hash + Debug + Send + Sync;

	fn id(&self) -> Self::Id;
}

impl Identified for FeedItem {
	type Id = FeedId;

	fn id(&self) -> FeedId {
		self.id
	}
}

impl Identified for Notification {
	type Id = NotificationId;

	fn id(&self) -> NotificationId {
		self.id
	}
}

/// Item types that can be stored as a paged collection in the cache.
pub trait CollectionItem: Identified + Clone + Revert + Send + Sync + 'static {
	fn wrap(collection: Collection<Self>) -> CacheValue;

	fn unwrap(value: &CacheValue) -> Option<&Collection<Self>>;

	fn unwrap_mut(value: &mut CacheValue) -> Option<&mut Collection<Self>>;
}

/// Items of one query identity in first-seen order.
///
/// A duplicate id arriving in a later page never replaces or moves the
/// earlier item, so merging the same page twice leaves the collection
/// unchanged.
#[derive(Debug, Clone)]
pub struct Collection<T: Identified> {
	items: IndexMap<T::Id, T>,
	highest_page: u32,
	has_next: bool,
}

impl<T: Identified> Default for Collection<T> {
	fn default() -> Self {
		Self {
			items: IndexMap::new(),
			highest_page: 0,
			has_next: true,
		}
	}
}

impl<T: Identified + PartialEq> PartialEq for Collection<T> {
	fn eq(&self, other: &Self) -> bool {
		self.highest_page == other.highest_page && self.has_next == other.has_next && self.items.iter().eq(other.items.iter())
	}
}

impl<T: Identified> Collection<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a collection holding exactly one merged page.
	pub fn from_page(page: Page<T>) -> Self {
		let mut collection = Self::new();
		collection.merge_page(page);
		collection
	}

	/// Appends the page's items that are not already present and updates the
	/// pagination state. Returns how many items were added.
	pub fn merge_page(&mut self, page: Page<T>) -> usize {
		let before = self.items.len();
		for item in page.items {
			self.items.entry(item.id()).or_insert(item);
		}
		if page.cursor.page >= self.highest_page {
			self.highest_page = page.cursor.page;
			self.has_next = page.cursor.has_next;
		}
		self.items.len() - before
	}

	/// Highest page index merged so far (0 when nothing is loaded).
	pub fn highest_page(&self) -> u32 {
		self.highest_page
	}

	/// Page index the next load should request.
	pub fn next_page(&self) -> u32 {
		self.highest_page.saturating_add(1)
	}

	pub fn has_next(&self) -> bool {
		self.has_next
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn contains(&self, id: T::Id) -> bool {
		self.items.contains_key(&id)
	}

	pub fn get(&self, id: T::Id) -> Option<&T> {
		self.items.get(&id)
	}

	pub fn get_mut(&mut self, id: T::Id) -> Option<&mut T> {
		self.items.get_mut(&id)
	}

	/// Removes an item, keeping the order of the rest.
	pub fn remove(&mut self, id: T::Id) -> Option<T> {
		self.items.shift_remove(&id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.items.values()
	}

	pub fn ids(&self) -> Vec<T::Id> {
		self.items.keys().copied().collect()
	}

	pub(crate) fn items_mut(&mut self) -> &mut IndexMap<T::Id, T> {
		&mut self.items
	}

	pub(crate) fn items_map(&self) -> &IndexMap<T::Id, T> {
		&self.items
	}
}

impl<T: Identified + Clone> Collection<T> {
	pub fn to_vec(&self) -> Vec<T> {
		self.items.values().cloned().collect()
	}
}
