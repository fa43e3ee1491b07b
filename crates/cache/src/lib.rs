//! Versioned in-memory cache for server-derived feed state.
//!
//! The [`CacheStore`] owns every [`CacheEntry`]. Consumers read cloned values
//! by [`CacheKey`] and register per-key listeners to learn about writes; they
//! never hold references into the store.
//!
//! Writes happen inside [`CacheStore::transaction`], which runs a closure
//! under one lock acquisition and notifies listeners after the lock is
//! released. Multi-key steps such as "snapshot then predict" are therefore
//! observed atomically by readers.

mod collection;
mod key;
mod model;
mod snapshot;
mod store;
mod thread;
mod value;

pub use collection::{Collection, CollectionItem, Identified};
pub use key::{CacheKey, FeedQuery};
pub use model::{Comment, CommentId, Cursor, FeedId, FeedItem, FollowStatus, LikeStatus, Notification, NotificationId, Page, Profile, UserId};
pub use snapshot::{Snapshot, SnapshotEntry};
pub use store::{CacheEntry, CacheEvent, CacheStore, StoreTxn, Subscription};
pub use thread::{CommentThread, ThreadError};
pub use value::{CacheValue, Revert};
