//! The concrete user actions.

use async_trait::async_trait;
use chrono::Utc;
use plume_cache::{CacheKey, Comment, CommentId, FeedId, FollowStatus, LikeStatus, StoreTxn, ThreadError, UserId};
use plume_net::{ClientError, CommentDraft, FeedBackend};
use tracing::{trace, warn};

use super::{ActionKind, GateKey, Mutation, Reconciler, TargetId};

/// Keys of every cached copy of `feed`, plus its comment thread.
fn feed_and_thread(txn: &StoreTxn<'_>, feed: FeedId) -> Vec<CacheKey> {
	let mut keys = txn.keys_holding_feed(feed);
	keys.push(CacheKey::Comments(feed));
	keys
}

/// Like or unlike, whichever flips the current cached state.
#[derive(Debug, Clone)]
pub struct ToggleLike {
	feed: FeedId,
	like: bool,
}

impl ToggleLike {
	pub fn new(feed: FeedId) -> Self {
		Self { feed, like: true }
	}

	/// Direction decided during prediction: `true` sends a like.
	pub fn is_like(&self) -> bool {
		self.like
	}
}

#[async_trait]
impl Mutation for ToggleLike {
	type Response = LikeStatus;

	fn gate(&self) -> GateKey {
		GateKey::new(ActionKind::ToggleLike, TargetId::Feed(self.feed))
	}

	fn targets(&self, txn: &StoreTxn<'_>) -> Vec<CacheKey> {
		txn.keys_holding_feed(self.feed)
	}

	fn predict(&mut self, txn: &mut StoreTxn<'_>) {
		let keys = txn.keys_holding_feed(self.feed);
		// `feed:{id}` sorts first, so the single-item entry decides the
		// direction when it is cached. With no cached copy at all, like.
		self.like = keys
			.iter()
			.find_map(|key| txn.get(key)?.feed(self.feed).map(|item| !item.liked))
			.unwrap_or(true);
		for key in &keys {
			txn.patch(key, |value| {
				if let Some(item) = value.feed_mut(self.feed)
					&& item.liked != self.like
				{
					item.toggle_like();
				}
			});
		}
	}

	async fn request(&self, backend: &dyn FeedBackend) -> Result<LikeStatus, ClientError> {
		if self.like { backend.like(self.feed).await } else { backend.unlike(self.feed).await }
	}

	fn reconcile(&self, reconciler: &mut Reconciler<'_, '_>, status: &LikeStatus) {
		for key in reconciler.targets().to_vec() {
			reconciler.overwrite(&key, TargetId::Feed(self.feed), |value| {
				if let Some(item) = value.feed_mut(self.feed) {
					item.apply_like_status(*status);
				}
			});
		}
	}
}

/// Follow or unfollow, whichever flips the cached profile.
#[derive(Debug, Clone)]
pub struct ToggleFollow {
	user: UserId,
	follow: bool,
}

impl ToggleFollow {
	pub fn new(user: UserId) -> Self {
		Self { user, follow: true }
	}
}

#[async_trait]
impl Mutation for ToggleFollow {
	type Response = FollowStatus;

	fn gate(&self) -> GateKey {
		GateKey::new(ActionKind::ToggleFollow, TargetId::User(self.user))
	}

	fn targets(&self, _txn: &StoreTxn<'_>) -> Vec<CacheKey> {
		vec![CacheKey::Profile(self.user)]
	}

	fn predict(&mut self, txn: &mut StoreTxn<'_>) {
		let key = CacheKey::Profile(self.user);
		self.follow = txn
			.get(&key)
			.and_then(|value| value.as_profile())
			.map_or(true, |profile| !profile.following);
		txn.patch(&key, |value| {
			if let Some(profile) = value.as_profile_mut() {
				profile.toggle_follow();
			}
		});
	}

	async fn request(&self, backend: &dyn FeedBackend) -> Result<FollowStatus, ClientError> {
		if self.follow { backend.follow(self.user).await } else { backend.unfollow(self.user).await }
	}

	fn reconcile(&self, reconciler: &mut Reconciler<'_, '_>, status: &FollowStatus) {
		reconciler.overwrite(&CacheKey::Profile(self.user), TargetId::User(self.user), |value| {
			if let Some(profile) = value.as_profile_mut() {
				profile.apply_follow_status(*status);
			}
		});
	}
}

/// New comment or reply, shown immediately under a provisional id.
#[derive(Debug, Clone)]
pub struct AddComment {
	feed: FeedId,
	draft: CommentDraft,
	provisional: Comment,
}

impl AddComment {
	/// `provisional` must be negative so it can never collide with a server id.
	pub fn new(feed: FeedId, provisional: CommentId, author: UserId, draft: CommentDraft) -> Self {
		let provisional = Comment {
			id: provisional,
			parent_id: draft.parent_id,
			author_id: author,
			content: draft.content.clone(),
			created_at: Utc::now(),
		};
		Self { feed, draft, provisional }
	}

	pub fn provisional_id(&self) -> CommentId {
		self.provisional.id
	}
}

#[async_trait]
impl Mutation for AddComment {
	type Response = Comment;

	fn gate(&self) -> GateKey {
		GateKey::new(ActionKind::AddComment, TargetId::Feed(self.feed))
	}

	fn targets(&self, txn: &StoreTxn<'_>) -> Vec<CacheKey> {
		feed_and_thread(txn, self.feed)
	}

	fn predict(&mut self, txn: &mut StoreTxn<'_>) {
		for key in txn.keys_holding_feed(self.feed) {
			txn.patch(&key, |value| {
				if let Some(item) = value.feed_mut(self.feed) {
					item.comment_count = item.comment_count.saturating_add(1);
				}
			});
		}
		txn.patch(&CacheKey::Comments(self.feed), |value| {
			if let Some(thread) = value.as_thread_mut()
				&& let Err(err) = thread.push(self.provisional.clone())
			{
				warn!(feed = %self.feed, error = %err, "comment.predict.skipped");
			}
		});
	}

	async fn request(&self, backend: &dyn FeedBackend) -> Result<Comment, ClientError> {
		backend.add_comment(self.feed, &self.draft).await
	}

	fn reconcile(&self, reconciler: &mut Reconciler<'_, '_>, confirmed: &Comment) {
		let provisional = self.provisional.id;
		reconciler.patch(&CacheKey::Comments(self.feed), |value| {
			let Some(thread) = value.as_thread_mut() else {
				return;
			};
			match thread.confirm(provisional, confirmed.clone()) {
				Ok(()) => {}
				// The thread was reloaded while the request was in flight and
				// may or may not already include the new comment.
				Err(ThreadError::UnknownComment(_)) if !thread.contains(confirmed.id) => {
					if let Err(err) = thread.push(confirmed.clone()) {
						trace!(error = %err, "comment.confirm.skipped");
					}
				}
				Err(err) => trace!(error = %err, "comment.confirm.skipped"),
			}
		});
	}
}

/// Removes a comment together with its replies.
#[derive(Debug, Clone)]
pub struct DeleteComment {
	feed: FeedId,
	comment: CommentId,
}

impl DeleteComment {
	pub fn new(feed: FeedId, comment: CommentId) -> Self {
		Self { feed, comment }
	}
}

#[async_trait]
impl Mutation for DeleteComment {
	type Response = ();

	fn gate(&self) -> GateKey {
		GateKey::new(ActionKind::DeleteComment, TargetId::Comment(self.comment))
	}

	fn targets(&self, txn: &StoreTxn<'_>) -> Vec<CacheKey> {
		feed_and_thread(txn, self.feed)
	}

	fn predict(&mut self, txn: &mut StoreTxn<'_>) {
		// Without a cached thread the replies are unknown; count the comment alone.
		let mut removed = 1;
		txn.patch(&CacheKey::Comments(self.feed), |value| {
			if let Some(thread) = value.as_thread_mut() {
				removed = thread.remove_with_replies(self.comment).len();
			}
		});
		let removed = u32::try_from(removed).unwrap_or(u32::MAX);
		for key in txn.keys_holding_feed(self.feed) {
			txn.patch(&key, |value| {
				if let Some(item) = value.feed_mut(self.feed) {
					item.comment_count = item.comment_count.saturating_sub(removed);
				}
			});
		}
	}

	async fn request(&self, backend: &dyn FeedBackend) -> Result<(), ClientError> {
		backend.delete_comment(self.feed, self.comment).await
	}

	fn reconcile(&self, _reconciler: &mut Reconciler<'_, '_>, _response: &()) {}
}
