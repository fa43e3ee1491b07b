//! Comment thread accessor.

use std::fmt;
use std::sync::Arc;

use plume_cache::{CacheEvent, CacheKey, Comment, CommentId, CommentThread, FeedId, Subscription, UserId};
use plume_net::{ClientError, FeedBackend};
use plume_sync::{MutationEngine, MutationError, MutationOutcome};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentThreadView {
	pub feed_id: FeedId,
	/// In server order, predicted comments last.
	pub comments: Vec<Comment>,
	/// `commentCount` of the cached feed item, if any copy is cached.
	pub comment_count: Option<u32>,
}

impl CommentThreadView {
	pub fn replies_of(&self, parent: CommentId) -> impl Iterator<Item = &Comment> {
		self.comments.iter().filter(move |comment| comment.parent_id == Some(parent))
	}
}

#[derive(Clone)]
pub struct CommentThreadHandle {
	engine: MutationEngine,
	backend: Arc<dyn FeedBackend>,
	feed: FeedId,
	viewer: UserId,
}

impl fmt::Debug for CommentThreadHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CommentThreadHandle")
			.field("feed", &self.feed)
			.field("viewer", &self.viewer)
			.finish_non_exhaustive()
	}
}

impl CommentThreadHandle {
	pub(crate) fn new(engine: MutationEngine, backend: Arc<dyn FeedBackend>, feed: FeedId, viewer: UserId) -> Self {
		Self {
			engine,
			backend,
			feed,
			viewer,
		}
	}

	pub fn feed_id(&self) -> FeedId {
		self.feed
	}

	/// The cached thread, `None` if it was never loaded or has been
	/// invalidated by a notification.
	pub fn thread(&self) -> Option<CommentThreadView> {
		let feed = self.feed;
		self.engine.store().transaction(|txn| {
			let thread = txn.get(&CacheKey::Comments(feed)).and_then(|value| value.as_thread())?;
			let comment_count = txn
				.keys_holding_feed(feed)
				.first()
				.and_then(|key| txn.get(key))
				.and_then(|value| value.feed(feed))
				.map(|item| item.comment_count);
			Some(CommentThreadView {
				feed_id: feed,
				comments: thread.iter().cloned().collect(),
				comment_count,
			})
		})
	}

	/// Fetches the thread and replaces the cached copy.
	pub async fn load(&self) -> Result<CommentThreadView, ClientError> {
		let comments = self.backend.comments(self.feed).await?;
		let thread = CommentThread::from_comments(self.feed, comments).map_err(|err| ClientError::Decode(err.to_string()))?;
		debug!(feed = %self.feed, comments = thread.len(), "thread.loaded");
		self.engine.store().put(CacheKey::Comments(self.feed), thread);
		self.thread()
			.ok_or_else(|| ClientError::Decode(format!("thread of {} vanished after load", self.feed)))
	}

	/// The cached thread, fetched first when absent.
	pub async fn get(&self) -> Result<CommentThreadView, ClientError> {
		match self.thread() {
			Some(view) => Ok(view),
			None => self.load().await,
		}
	}

	/// Posts `text` as the viewer, as a reply when `parent` is given.
	pub async fn add_comment(
		&self,
		text: impl Into<String>,
		parent: Option<CommentId>,
	) -> Result<MutationOutcome<Comment>, MutationError> {
		self.engine.add_comment(self.feed, self.viewer, text, parent).await
	}

	/// Deletes `comment` together with its replies.
	pub async fn delete_comment(&self, comment: CommentId) -> Result<MutationOutcome<()>, MutationError> {
		self.engine.delete_comment(self.feed, comment).await
	}

	pub fn subscribe(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> Subscription {
		self.engine.store().subscribe(CacheKey::Comments(self.feed), listener)
	}
}
