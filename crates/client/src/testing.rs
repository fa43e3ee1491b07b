//! In-memory backend and push transport for accessor tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use plume_cache::{
	Comment, CommentId, Cursor, FeedId, FeedItem, FeedQuery, FollowStatus, LikeStatus, Notification, NotificationId, Page, Profile,
	UserId,
};
use plume_net::{ClientConfig, ClientError, CommentDraft, Credential, FeedBackend};
use plume_stream::{EventSource, Frame, Transport};
use tokio::sync::oneshot;

use crate::Client;

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
		author_id: UserId(2),
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

pub fn notification_page(ids: &[u64], page: u32, has_next: bool) -> Page<Notification> {
	Page {
		items: ids
			.iter()
			.map(|&id| Notification {
				id: NotificationId(id),
				message: format!("notification {id}"),
				feed_id: None,
				read: false,
				created_at: DateTime::<Utc>::UNIX_EPOCH,
			})
			.collect(),
		cursor: Cursor { page, has_next },
	}
}

/// Client over `backend` with a push transport that never delivers.
pub fn client(backend: &Arc<MemoryBackend>) -> Client {
	client_with(backend, ReplayTransport::new(Vec::new()), None)
}

pub fn client_with(backend: &Arc<MemoryBackend>, transport: Arc<ReplayTransport>, credential: Option<Credential>) -> Client {
	Client::with_parts(&ClientConfig::default(), backend.clone(), transport, credential, UserId(1))
}

/// A small consistent server: likes, follows and comments change its
/// state; feeds and notifications serve scripted pages.
#[derive(Default)]
pub struct MemoryBackend {
	feed_pages: Mutex<HashMap<FeedQuery, Vec<Page<FeedItem>>>>,
	notification_pages: Mutex<Vec<Page<Notification>>>,
	items: Mutex<HashMap<FeedId, FeedItem>>,
	comments: Mutex<HashMap<FeedId, Vec<Comment>>>,
	likes: Mutex<HashMap<FeedId, LikeStatus>>,
	follows: Mutex<HashMap<UserId, FollowStatus>>,
	failures: Mutex<VecDeque<ClientError>>,
	held: Mutex<Option<oneshot::Receiver<()>>>,
	requests: Mutex<Vec<String>>,
	next_comment: AtomicI64,
}

impl MemoryBackend {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			next_comment: AtomicI64::new(100),
			..Self::default()
		})
	}

	pub fn set_feed_pages(&self, query: FeedQuery, pages: Vec<Page<FeedItem>>) {
		self.feed_pages.lock().insert(query, pages);
	}

	pub fn set_notification_pages(&self, pages: Vec<Page<Notification>>) {
		*self.notification_pages.lock() = pages;
	}

	pub fn set_item(&self, item: FeedItem) {
		self.items.lock().insert(item.id, item);
	}

	pub fn set_comments(&self, feed: FeedId, comments: Vec<Comment>) {
		self.comments.lock().insert(feed, comments);
	}

	/// Makes the next request fail with `err`.
	pub fn fail_next(&self, err: ClientError) {
		self.failures.lock().push_back(err);
	}

	/// Holds the next request until the returned sender fires (or drops).
	pub fn hold_next(&self) -> oneshot::Sender<()> {
		let (tx, rx) = oneshot::channel();
		*self.held.lock() = Some(rx);
		tx
	}

	pub fn requests(&self) -> Vec<String> {
		self.requests.lock().clone()
	}

	async fn enter(&self, op: String) -> Result<(), ClientError> {
		self.requests.lock().push(op);
		let held = self.held.lock().take();
		if let Some(held) = held {
			let _ = held.await;
		}
		match self.failures.lock().pop_front() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	fn set_like(&self, id: FeedId, liked: bool) -> LikeStatus {
		let mut likes = self.likes.lock();
		let status = likes.entry(id).or_insert(LikeStatus {
			liked: false,
			like_count: 0,
		});
		if status.liked != liked {
			status.liked = liked;
			status.like_count = if liked { status.like_count + 1 } else { status.like_count.saturating_sub(1) };
		}
		*status
	}

	fn set_follow(&self, user: UserId, following: bool) -> FollowStatus {
		let mut follows = self.follows.lock();
		let status = follows.entry(user).or_insert(FollowStatus {
			following: false,
			follower_count: 0,
		});
		if status.following != following {
			status.following = following;
			status.follower_count = if following {
				status.follower_count + 1
			} else {
				status.follower_count.saturating_sub(1)
			};
		}
		*status
	}
}

fn not_found(what: String) -> ClientError {
	ClientError::ServerRejected {
		status: 404,
		message: format!("{what} not found"),
	}
}

#[async_trait]
impl FeedBackend for MemoryBackend {
	async fn feeds(&self, query: &FeedQuery, page: u32, _size: u32) -> Result<Page<FeedItem>, ClientError> {
		self.enter(format!("feeds {query:?} page={page}")).await?;
		let pages = self.feed_pages.lock();
		pages
			.get(query)
			.and_then(|pages| pages.get(page as usize - 1))
			.cloned()
			.ok_or_else(|| not_found(format!("page {page}")))
	}

	async fn feed(&self, id: FeedId) -> Result<FeedItem, ClientError> {
		self.enter(format!("feed {id}")).await?;
		self.items.lock().get(&id).cloned().ok_or_else(|| not_found(format!("feed {id}")))
	}

	async fn like(&self, id: FeedId) -> Result<LikeStatus, ClientError> {
		self.enter(format!("like {id}")).await?;
		Ok(self.set_like(id, true))
	}

	async fn unlike(&self, id: FeedId) -> Result<LikeStatus, ClientError> {
		self.enter(format!("unlike {id}")).await?;
		Ok(self.set_like(id, false))
	}

	async fn comments(&self, feed: FeedId) -> Result<Vec<Comment>, ClientError> {
		self.enter(format!("comments {feed}")).await?;
		Ok(self.comments.lock().get(&feed).cloned().unwrap_or_default())
	}

	async fn add_comment(&self, feed: FeedId, draft: &CommentDraft) -> Result<Comment, ClientError> {
		self.enter(format!("add_comment {feed}")).await?;
		let comment = Comment {
			id: CommentId(self.next_comment.fetch_add(1, Ordering::SeqCst)),
			parent_id: draft.parent_id,
			author_id: UserId(1),
			content: draft.content.clone(),
			created_at: DateTime::<Utc>::UNIX_EPOCH,
		};
		self.comments.lock().entry(feed).or_default().push(comment.clone());
		Ok(comment)
	}

	async fn delete_comment(&self, feed: FeedId, comment: CommentId) -> Result<(), ClientError> {
		self.enter(format!("delete_comment {feed} {comment}")).await?;
		if let Some(comments) = self.comments.lock().get_mut(&feed) {
			comments.retain(|c| c.id != comment && c.parent_id != Some(comment));
		}
		Ok(())
	}

	async fn notifications(&self, page: u32, _size: u32) -> Result<Page<Notification>, ClientError> {
		self.enter(format!("notifications page={page}")).await?;
		self.notification_pages
			.lock()
			.get(page as usize - 1)
			.cloned()
			.ok_or_else(|| not_found(format!("page {page}")))
	}

	async fn profile(&self, user: UserId) -> Result<Profile, ClientError> {
		self.enter(format!("profile {user}")).await?;
		let status = self.follows.lock().get(&user).copied();
		Ok(Profile {
			id: user,
			nickname: format!("user{user}"),
			following: status.is_some_and(|s| s.following),
			follower_count: status.map_or(0, |s| s.follower_count),
			following_count: 0,
		})
	}

	async fn follow(&self, user: UserId) -> Result<FollowStatus, ClientError> {
		self.enter(format!("follow {user}")).await?;
		Ok(self.set_follow(user, true))
	}

	async fn unfollow(&self, user: UserId) -> Result<FollowStatus, ClientError> {
		self.enter(format!("unfollow {user}")).await?;
		Ok(self.set_follow(user, false))
	}
}

/// Every connection replays the same frames, then stays silent.
pub struct ReplayTransport {
	frames: Vec<Frame>,
}

impl ReplayTransport {
	pub fn new(frames: Vec<Frame>) -> Arc<Self> {
		Arc::new(Self { frames })
	}
}

struct Replay(VecDeque<Frame>);

#[async_trait]
impl EventSource for Replay {
	async fn next_frame(&mut self) -> Result<Option<Frame>, ClientError> {
		match self.0.pop_front() {
			Some(frame) => Ok(Some(frame)),
			None => std::future::pending().await,
		}
	}
}

#[async_trait]
impl Transport for ReplayTransport {
	async fn connect(&self, _: &Credential) -> Result<Box<dyn EventSource>, ClientError> {
		Ok(Box::new(Replay(self.frames.iter().cloned().collect())))
	}
}
