use std::fmt;
use std::sync::Arc;

use plume_cache::{CacheKey, CacheStore, FeedId, FeedItem, FeedQuery, Notification, UserId};
use plume_net::{ClientConfig, ClientError, Credential, FeedBackend, HttpBackend};
use plume_stream::{HttpTransport, StreamHub, Transport};
use plume_sync::{BackendPages, CollectionController, MutationEngine, PageSource};
use tracing::debug;

use crate::list::{FeedList, NotificationList, PagedList};
use crate::notifications::NotificationStream;
use crate::thread::CommentThreadHandle;
use crate::toggle::{FollowToggle, LikeToggle};

/// Entry point for UI code: one cache, one engine, one notification hub.
#[derive(Clone)]
pub struct Client {
	store: CacheStore,
	backend: Arc<dyn FeedBackend>,
	engine: MutationEngine,
	feeds: CollectionController<FeedItem>,
	notifications: CollectionController<Notification>,
	hub: StreamHub,
	credential: Option<Credential>,
	viewer: UserId,
}

impl fmt::Debug for Client {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Client")
			.field("viewer", &self.viewer)
			.field("credential", &self.credential)
			.field("pending", &self.engine.pending_count())
			.finish_non_exhaustive()
	}
}

impl Client {
	/// Client for the REST and push endpoints under `config.base_url`.
	///
	/// `viewer` is the signed-in user; it authors predicted comments.
	pub fn connect(config: &ClientConfig, credential: Option<Credential>, viewer: UserId) -> Result<Self, ClientError> {
		let backend = Arc::new(HttpBackend::new(config, credential.clone())?);
		let transport = Arc::new(HttpTransport::new(config)?);
		debug!(base_url = %config.base_url, stream = %transport.url(), "client.connect");
		Ok(Self::with_parts(config, backend, transport, credential, viewer))
	}

	/// Client over caller-supplied backend and push transport.
	pub fn with_parts(
		config: &ClientConfig,
		backend: Arc<dyn FeedBackend>,
		transport: Arc<dyn Transport>,
		credential: Option<Credential>,
		viewer: UserId,
	) -> Self {
		let store = CacheStore::new();
		let pages = BackendPages(Arc::clone(&backend));
		let feed_pages: Arc<dyn PageSource<FeedItem>> = Arc::new(pages.clone());
		let notification_pages: Arc<dyn PageSource<Notification>> = Arc::new(pages);
		Self {
			engine: MutationEngine::new(store.clone(), Arc::clone(&backend)),
			feeds: CollectionController::new(store.clone(), feed_pages, config.page_size),
			notifications: CollectionController::new(store.clone(), notification_pages, config.page_size),
			hub: StreamHub::new(transport, config.stream.clone(), Some(store.clone())),
			store,
			backend,
			credential,
			viewer,
		}
	}

	pub fn store(&self) -> &CacheStore {
		&self.store
	}

	pub fn engine(&self) -> &MutationEngine {
		&self.engine
	}

	pub fn hub(&self) -> &StreamHub {
		&self.hub
	}

	pub fn viewer(&self) -> UserId {
		self.viewer
	}

	pub fn credential(&self) -> Option<&Credential> {
		self.credential.as_ref()
	}

	pub fn feed_list(&self, query: FeedQuery) -> FeedList {
		PagedList::new(self.feeds.clone(), CacheKey::Feeds(query))
	}

	pub fn notification_list(&self) -> NotificationList {
		PagedList::new(self.notifications.clone(), CacheKey::Notifications)
	}

	pub fn like_toggle(&self, feed: FeedId) -> LikeToggle {
		LikeToggle::new(self.engine.clone(), feed)
	}

	pub fn follow_toggle(&self, user: UserId) -> FollowToggle {
		FollowToggle::new(self.engine.clone(), Arc::clone(&self.backend), user)
	}

	pub fn comment_thread(&self, feed: FeedId) -> CommentThreadHandle {
		CommentThreadHandle::new(self.engine.clone(), Arc::clone(&self.backend), feed, self.viewer)
	}

	/// Joins the push stream of this client's credential. Without one the
	/// stream stays disconnected.
	pub fn notification_stream(&self) -> NotificationStream {
		NotificationStream::new(self.hub.subscribe(self.credential.clone()))
	}

	/// The cached `feed:{id}` item, fetched and cached when absent (never
	/// loaded, or evicted by a notification).
	pub async fn feed(&self, id: FeedId) -> Result<FeedItem, ClientError> {
		if let Some(item) = self.store.feed(id) {
			return Ok(item);
		}
		let item = self.backend.feed(id).await?;
		debug!(feed = %id, "client.feed.fetched");
		self.store.put(CacheKey::Feed(id), item.clone());
		Ok(item)
	}
}
