//! Server-derived domain objects.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
	($(#[$meta:meta])* $name:ident($inner:ty)) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub $inner);

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}
	};
}

id_newtype!(
	/// Feed item (post) identifier.
	FeedId(u64)
);
id_newtype!(
	/// User identifier.
	UserId(u64)
);
id_newtype!(
	/// Comment identifier. Negative values are provisional, client-assigned
	/// ids for comments that have not been confirmed by the server.
	CommentId(i64)
);
id_newtype!(NotificationId(u64));

impl CommentId {
	pub const fn is_provisional(self) -> bool {
		self.0 < 0
	}
}

/// A single post in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
	pub id: FeedId,
	pub author_id: UserId,
	pub content: String,
	#[serde(default)]
	pub like_count: u32,
	#[serde(default)]
	pub liked: bool,
	#[serde(default)]
	pub comment_count: u32,
	#[serde(default)]
	pub image_refs: Vec<String>,
	pub created_at: DateTime<Utc>,
}

impl FeedItem {
	/// Flips `liked` and moves `like_count` by one in the matching direction.
	///
	/// The count saturates at zero, so an unlike on a stale zero count stays
	/// at zero.
	pub fn toggle_like(&mut self) {
		self.liked = !self.liked;
		self.like_count = if self.liked {
			self.like_count.saturating_add(1)
		} else {
			self.like_count.saturating_sub(1)
		};
	}

	/// Overwrites the like pair with authoritative server values.
	pub fn apply_like_status(&mut self, status: LikeStatus) {
		self.liked = status.liked;
		self.like_count = status.like_count;
	}
}

/// Authoritative like state returned by the like/unlike endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatus {
	pub liked: bool,
	pub like_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
	pub id: CommentId,
	#[serde(default)]
	pub parent_id: Option<CommentId>,
	pub author_id: UserId,
	pub content: String,
	pub created_at: DateTime<Utc>,
}

/// Follow state of another user as seen by the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
	pub id: UserId,
	pub nickname: String,
	#[serde(default)]
	pub following: bool,
	#[serde(default)]
	pub follower_count: u32,
	#[serde(default)]
	pub following_count: u32,
}

impl Profile {
	pub fn toggle_follow(&mut self) {
		self.following = !self.following;
		self.follower_count = if self.following {
			self.follower_count.saturating_add(1)
		} else {
			self.follower_count.saturating_sub(1)
		};
	}

	pub fn apply_follow_status(&mut self, status: FollowStatus) {
		self.following = status.following;
		self.follower_count = status.follower_count;
	}
}

/// Authoritative follow state returned by the follow/unfollow endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowStatus {
	pub following: bool,
	pub follower_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
	pub id: NotificationId,
	pub message: String,
	#[serde(default)]
	pub feed_id: Option<FeedId>,
	#[serde(default)]
	pub read: bool,
	pub created_at: DateTime<Utc>,
}

/// Pagination metadata of one fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
	/// 1-based page index this response corresponds to.
	pub page: u32,
	pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
	pub items: Vec<T>,
	pub cursor: Cursor,
}
