//! UI-facing surface of the plume client core.
//!
//! [`Client`] wires the cache, the mutation engine, the collection
//! controllers and the notification hub together and hands out accessor
//! handles:
//!
//! * [`FeedList`] / [`NotificationList`]: paged collections with
//!   `load_more`, `has_more`, `is_loading` and the last error.
//! * [`LikeToggle`] / [`FollowToggle`]: gated optimistic toggles.
//! * [`CommentThreadHandle`]: a feed item's comments with add and delete.
//! * [`NotificationStream`]: latest pushed message and connection state.
//!
//! Handles are cheap to clone and read through the shared cache. Reads
//! return plain view structs; `subscribe` registers a store listener so a UI
//! knows when to read again.

mod client;
mod list;
mod notifications;
mod thread;
mod toggle;
#[cfg(test)]
mod testing;

pub use client::Client;
pub use list::{FeedList, FeedListView, ListView, NotificationList, NotificationListView, PagedList};
pub use notifications::{NotificationStream, NotificationView};
pub use thread::{CommentThreadHandle, CommentThreadView};
pub use toggle::{FollowToggle, LikeToggle};
