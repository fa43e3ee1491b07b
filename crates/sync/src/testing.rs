//! Backend doubles whose responses the test controls.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use plume_cache::{Comment, CommentId, Cursor, FeedId, FeedItem, FeedQuery, FollowStatus, LikeStatus, Notification, Page, Profile, UserId};
use plume_net::{ClientError, CommentDraft, FeedBackend};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

pub fn feed(id: u64, like_count: u32, liked: bool) -> FeedItem {
	FeedItem {
		id: FeedId(id),
		author_id: UserId(1),
		content: format!("post {id}"),
		like_count,
		liked,
		comment_count: 0,
		image_refs: Vec::new(),
		created_at: DateTime::<Utc>::UNIX_EPOCH,
	}
}

pub fn comment(id: i64, parent: Option<i64>) -> Comment {
	Comment {
		id: CommentId(id),
		parent_id: parent.map(CommentId),
		author_id: UserId(1),
		content: format!("comment {id}"),
		created_at: DateTime::<Utc>::UNIX_EPOCH,
	}
}

pub fn page_of(ids: &[u64], page: u32, has_next: bool) -> Page<FeedItem> {
	Page {
		items: ids.iter().map(|&id| feed(id, 0, false)).collect(),
		cursor: Cursor { page, has_next },
	}
}

/// One request observed by [`ChannelBackend`].
pub struct Call {
	pub op: String,
	reply: oneshot::Sender<Result<Value, ClientError>>,
}

impl Call {
	pub fn reply(self, response: Result<Value, ClientError>) {
		let _ = self.reply.send(response);
	}

	pub fn ok(self, value: impl serde::Serialize) {
		let value = serde_json::to_value(value).expect("serializable response");
		self.reply(Ok(value));
	}

	pub fn fail(self, err: ClientError) {
		self.reply(Err(err));
	}
}

/// Forwards every request to the test as a [`Call`] and waits for the reply.
pub struct ChannelBackend {
	calls: mpsc::UnboundedSender<Call>,
}

impl ChannelBackend {
	pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Call>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Arc::new(Self { calls: tx }), rx)
	}

	async fn call<T: DeserializeOwned>(&self, op: String) -> Result<T, ClientError> {
		let (reply, rx) = oneshot::channel();
		self.calls
			.send(Call { op, reply })
			.map_err(|_| ClientError::NetworkFailure("test dropped the call receiver".into()))?;
		let value = rx.await.map_err(|_| ClientError::NetworkFailure("call dropped".into()))??;
		Ok(serde_json::from_value(value)?)
	}
}

#[async_trait]
impl FeedBackend for ChannelBackend {
	async fn feeds(&self, query: &FeedQuery, page: u32, size: u32) -> Result<Page<FeedItem>, ClientError> {
		self.call(format!("feeds {query:?} page={page} size={size}")).await
	}

	async fn feed(&self, id: FeedId) -> Result<FeedItem, ClientError> {
		self.call(format!("feed {id}")).await
	}

	async fn like(&self, id: FeedId) -> Result<LikeStatus, ClientError> {
		self.call(format!("like {id}")).await
	}

	async fn unlike(&self, id: FeedId) -> Result<LikeStatus, ClientError> {
		self.call(format!("unlike {id}")).await
	}

	async fn comments(&self, feed: FeedId) -> Result<Vec<Comment>, ClientError> {
		self.call(format!("comments {feed}")).await
	}

	async fn add_comment(&self, feed: FeedId, draft: &CommentDraft) -> Result<Comment, ClientError> {
		self.call(format!("add_comment {feed} {:?}", draft.parent_id)).await
	}

	async fn delete_comment(&self, feed: FeedId, comment: CommentId) -> Result<(), ClientError> {
		self.call(format!("delete_comment {feed} {comment}")).await
	}

	async fn notifications(&self, page: u32, size: u32) -> Result<Page<Notification>, ClientError> {
		self.call(format!("notifications page={page} size={size}")).await
	}

	async fn profile(&self, user: UserId) -> Result<Profile, ClientError> {
		self.call(format!("profile {user}")).await
	}

	async fn follow(&self, user: UserId) -> Result<FollowStatus, ClientError> {
		self.call(format!("follow {user}")).await
	}

	async fn unfollow(&self, user: UserId) -> Result<FollowStatus, ClientError> {
		self.call(format!("unfollow {user}")).await
	}
}

/// Server-side like state of one item, answering immediately.
///
/// Requests whose scripted outcome is `false` fail without changing state.
pub struct LikeServer {
	pub state: Mutex<LikeStatus>,
	pub outcomes: Mutex<Vec<bool>>,
}

impl LikeServer {
	pub fn new(state: LikeStatus, outcomes: Vec<bool>) -> Arc<Self> {
		let mut outcomes = outcomes;
		outcomes.reverse();
		Arc::new(Self {
			state: Mutex::new(state),
			outcomes: Mutex::new(outcomes),
		})
	}

	fn apply(&self, like: bool) -> Result<LikeStatus, ClientError> {
		if !self.outcomes.lock().pop().unwrap_or(true) {
			return Err(ClientError::ServerRejected {
				status: 500,
				message: "try again".into(),
			});
		}
		let mut state = self.state.lock();
		if state.liked != like {
			state.liked = like;
			state.like_count = if like { state.like_count + 1 } else { state.like_count.saturating_sub(1) };
		}
		Ok(*state)
	}
}

#[async_trait]
impl FeedBackend for LikeServer {
	async fn feeds(&self, _: &FeedQuery, _: u32, _: u32) -> Result<Page<FeedItem>, ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}

	async fn feed(&self, _: FeedId) -> Result<FeedItem, ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}

	async fn like(&self, _: FeedId) -> Result<LikeStatus, ClientError> {
		self.apply(true)
	}

	async fn unlike(&self, _: FeedId) -> Result<LikeStatus, ClientError> {
		self.apply(false)
	}

	async fn comments(&self, _: FeedId) -> Result<Vec<Comment>, ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}

	async fn add_comment(&self, _: FeedId, _: &CommentDraft) -> Result<Comment, ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}

	async fn delete_comment(&self, _: FeedId, _: CommentId) -> Result<(), ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}

	async fn notifications(&self, _: u32, _: u32) -> Result<Page<Notification>, ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}

	async fn profile(&self, _: UserId) -> Result<Profile, ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}

	async fn follow(&self, _: UserId) -> Result<FollowStatus, ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}

	async fn unfollow(&self, _: UserId) -> Result<FollowStatus, ClientError> {
		Err(ClientError::NetworkFailure("unscripted".into()))
	}
}
