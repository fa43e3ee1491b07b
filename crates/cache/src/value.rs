use std::hash::Hash;

use indexmap::IndexMap;

use crate::collection::{Collection, CollectionItem, Identified};
use crate::model::{Comment, FeedId, FeedItem, Notification, Profile};
use crate::thread::CommentThread;

/// Three-way undo of an optimistic prediction.
///
/// `predicted` is the value right after the prediction was applied and
/// `original` the value right before it. Every part of `self` that still
/// equals `predicted` goes back to `original`; parts that someone else wrote
/// in the meantime are kept.
pub trait Revert {
	fn revert(&mut self, predicted: &Self, original: &Self);
}

fn revert_field<T: PartialEq + Clone>(current: &mut T, predicted: &T, original: &T) {
	if predicted != original && current == predicted {
		*current = original.clone();
	}
}

fn revert_keyed<K, V>(current: &mut IndexMap<K, V>, predicted: &IndexMap<K, V>, original: &IndexMap<K, V>)
where
	K: Copy + Eq + Hash,
	V: Revert + Clone,
{
	// Entries the prediction introduced.
	for key in predicted.keys() {
		if !original.contains_key(key) {
			current.shift_remove(key);
		}
	}
	// Entries the prediction removed, reinserted near their old position.
	for (index, (key, value)) in original.iter().enumerate() {
		if !predicted.contains_key(key) && !current.contains_key(key) {
			let at = index.min(current.len());
			current.shift_insert(at, *key, value.clone());
		}
	}
	for (key, value) in current.iter_mut() {
		if let (Some(predicted), Some(original)) = (predicted.get(key), original.get(key)) {
			value.revert(predicted, original);
		}
	}
}

impl Revert for FeedItem {
	fn revert(&mut self, predicted: &Self, original: &Self) {
		revert_field(&mut self.liked, &predicted.liked, &original.liked);
		revert_field(&mut self.like_count, &predicted.like_count, &original.like_count);
		revert_field(&mut self.comment_count, &predicted.comment_count, &original.comment_count);
		revert_field(&mut self.content, &predicted.content, &original.content);
		revert_field(&mut self.image_refs, &predicted.image_refs, &original.image_refs);
	}
}

impl Revert for Profile {
	fn revert(&mut self, predicted: &Self, original: &Self) {
		revert_field(&mut self.following, &predicted.following, &original.following);
		revert_field(&mut self.follower_count, &predicted.follower_count, &original.follower_count);
		revert_field(&mut self.following_count, &predicted.following_count, &original.following_count);
		revert_field(&mut self.nickname, &predicted.nickname, &original.nickname);
	}
}

impl Revert for Notification {
	fn revert(&mut self, predicted: &Self, original: &Self) {
		revert_field(&mut self.read, &predicted.read, &original.read);
		revert_field(&mut self.message, &predicted.message, &original.message);
	}
}

impl Revert for Comment {
	fn revert(&mut self, predicted: &Self, original: &Self) {
		revert_field(self, predicted, original);
	}
}

impl<T> Revert for Collection<T>
where
	T: Identified + Revert + Clone,
{
	fn revert(&mut self, predicted: &Self, original: &Self) {
		revert_keyed(self.items_mut(), predicted.items_map(), original.items_map());
	}
}

impl Revert for CommentThread {
	fn revert(&mut self, predicted: &Self, original: &Self) {
		revert_keyed(self.comments_mut(), predicted.comments_map(), original.comments_map());
	}
}

/// Every value kind the cache holds.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
	Feed(FeedItem),
	Feeds(Collection<FeedItem>),
	Comments(CommentThread),
	Profile(Profile),
	Notifications(Collection<Notification>),
}

impl CacheValue {
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Feed(_) => "feed",
			Self::Feeds(_) => "feeds",
			Self::Comments(_) => "comments",
			Self::Profile(_) => "profile",
			Self::Notifications(_) => "notifications",
		}
	}

	pub fn as_feed(&self) -> Option<&FeedItem> {
		match self {
			Self::Feed(item) => Some(item),
			_ => None,
		}
	}

	pub fn as_thread(&self) -> Option<&CommentThread> {
		match self {
			Self::Comments(thread) => Some(thread),
			_ => None,
		}
	}

	pub fn as_thread_mut(&mut self) -> Option<&mut CommentThread> {
		match self {
			Self::Comments(thread) => Some(thread),
			_ => None,
		}
	}

	pub fn as_profile(&self) -> Option<&Profile> {
		match self {
			Self::Profile(profile) => Some(profile),
			_ => None,
		}
	}

	pub fn as_profile_mut(&mut self) -> Option<&mut Profile> {
		match self {
			Self::Profile(profile) => Some(profile),
			_ => None,
		}
	}

	/// Returns the copy of feed `id` held by this value, whether it is the
	/// single-item entry or one row of a feed collection.
	pub fn feed(&self, id: FeedId) -> Option<&FeedItem> {
		match self {
			Self::Feed(item) if item.id == id => Some(item),
			Self::Feeds(collection) => collection.get(id),
			_ => None,
		}
	}

	pub fn feed_mut(&mut self, id: FeedId) -> Option<&mut FeedItem> {
		match self {
			Self::Feed(item) if item.id == id => Some(item),
			Self::Feeds(collection) => collection.get_mut(id),
			_ => None,
		}
	}

	pub fn holds_feed(&self, id: FeedId) -> bool {
		self.feed(id).is_some()
	}
}

impl Revert for CacheValue {
	fn revert(&mut self, predicted: &Self, original: &Self) {
		match (self, predicted, original) {
			(Self::Feed(cur), Self::Feed(pred), Self::Feed(orig)) => cur.revert(pred, orig),
			(Self::Feeds(cur), Self::Feeds(pred), Self::Feeds(orig)) => cur.revert(pred, orig),
			(Self::Comments(cur), Self::Comments(pred), Self::Comments(orig)) => cur.revert(pred, orig),
			(Self::Profile(cur), Self::Profile(pred), Self::Profile(orig)) => cur.revert(pred, orig),
			(Self::Notifications(cur), Self::Notifications(pred), Self::Notifications(orig)) => cur.revert(pred, orig),
			(cur, pred, orig) => revert_field(cur, pred, orig),
		}
	}
}

impl From<FeedItem> for CacheValue {
	fn from(item: FeedItem) -> Self {
		Self::Feed(item)
	}
}

impl From<CommentThread> for CacheValue {
	fn from(thread: CommentThread) -> Self {
		Self::Comments(thread)
	}
}

impl From<Profile> for CacheValue {
	fn from(profile: Profile) -> Self {
		Self::Profile(profile)
	}
}

impl CollectionItem for FeedItem {
	fn wrap(collection: Collection<Self>) -> CacheValue {
		CacheValue::Feeds(collection)
	}

	fn unwrap(value: &CacheValue) -> Option<&Collection<Self>> {
		match value {
			CacheValue::Feeds(collection) => Some(collection),
			_ => None,
		}
	}

	fn unwrap_mut(value: &mut CacheValue) -> Option<&mut Collection<Self>> {
		match value {
			CacheValue::Feeds(collection) => Some(collection),
			_ => None,
		}
	}
}

impl CollectionItem for Notification {
	fn wrap(collection: Collection<Self>) -> CacheValue {
		CacheValue::Notifications(collection)
	}

	fn unwrap(value: &CacheValue) -> Option<&Collection<Self>> {
		match value {
			CacheValue::Notifications(collection) => Some(collection),
			_ => None,
		}
	}

	fn unwrap_mut(value: &mut CacheValue) -> Option<&mut Collection<Self>> {
		match value {
			CacheValue::Notifications(collection) => Some(collection),
			_ => None,
		}
	}
}
