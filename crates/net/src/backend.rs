use async_trait::async_trait;
use plume_cache::{Comment, CommentId, FeedId, FeedItem, FeedQuery, FollowStatus, LikeStatus, Notification, Page, Profile, UserId};
use serde::Serialize;

use crate::error::Result;

/// Body of a new comment or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDraft {
	pub content: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<CommentId>,
}

/// The REST surface consumed by the consistency core.
///
/// Implementations must be cheap to share; the engine holds them behind an
/// `Arc` and calls them from spawned tasks.
#[async_trait]
pub trait FeedBackend: Send + Sync + 'static {
	/// One page of a feed collection. `page` is 1-based.
	async fn feeds(&self, query: &FeedQuery, page: u32, size: u32) -> Result<Page<FeedItem>>;

	async fn feed(&self, id: FeedId) -> Result<FeedItem>;

	async fn like(&self, id: FeedId) -> Result<LikeStatus>;

	async fn unlike(&self, id: FeedId) -> Result<LikeStatus>;

	async fn comments(&self, feed: FeedId) -> Result<Vec<Comment>>;

	async fn add_comment(&self, feed: FeedId, draft: &CommentDraft) -> Result<Comment>;

	async fn delete_comment(&self, feed: FeedId, comment: CommentId) -> Result<()>;

	async fn notifications(&self, page: u32, size: u32) -> Result<Page<Notification>>;

	async fn profile(&self, user: UserId) -> Result<Profile>;

	async fn follow(&self, user: UserId) -> Result<FollowStatus>;

	async fn unfollow(&self, user: UserId) -> Result<FollowStatus>;
}
