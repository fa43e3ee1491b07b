//! Gated optimistic toggles.

use std::sync::Arc;

use plume_cache::{CacheEvent, CacheKey, FeedId, FeedItem, FollowStatus, LikeStatus, Profile, Subscription, UserId};
use plume_net::{ClientError, FeedBackend};
use plume_sync::{ActionKind, GateKey, MutationEngine, MutationError, MutationOutcome, TargetId};

/// Like button of one feed item.
#[derive(Debug, Clone)]
pub struct LikeToggle {
	engine: MutationEngine,
	feed: FeedId,
}

impl LikeToggle {
	pub(crate) fn new(engine: MutationEngine, feed: FeedId) -> Self {
		Self { engine, feed }
	}

	pub fn feed_id(&self) -> FeedId {
		self.feed
	}

	pub fn gate(&self) -> GateKey {
		GateKey::new(ActionKind::ToggleLike, TargetId::Feed(self.feed))
	}

	/// True while a toggle is awaiting the server. Further toggles are
	/// ignored until it resolves.
	pub fn is_pending(&self) -> bool {
		self.engine.is_pending(self.gate())
	}

	/// The item as currently cached, from `feed:{id}` or any list holding it.
	pub fn item(&self) -> Option<FeedItem> {
		let feed = self.feed;
		self.engine.store().transaction(|txn| {
			txn.keys_holding_feed(feed)
				.first()
				.and_then(|key| txn.get(key))
				.and_then(|value| value.feed(feed))
				.cloned()
		})
	}

	pub async fn toggle(&self) -> Result<MutationOutcome<LikeStatus>, MutationError> {
		self.engine.toggle_like(self.feed).await
	}

	/// Listens on `feed:{id}`. List copies notify through their list key.
	pub fn subscribe(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> Subscription {
		self.engine.store().subscribe(CacheKey::Feed(self.feed), listener)
	}
}

/// Follow button of one profile.
#[derive(Clone)]
pub struct FollowToggle {
	engine: MutationEngine,
	backend: Arc<dyn FeedBackend>,
	user: UserId,
}

impl std::fmt::Debug for FollowToggle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FollowToggle").field("user", &self.user).finish_non_exhaustive()
	}
}

impl FollowToggle {
	pub(crate) fn new(engine: MutationEngine, backend: Arc<dyn FeedBackend>, user: UserId) -> Self {
		Self { engine, backend, user }
	}

	pub fn gate(&self) -> GateKey {
		GateKey::new(ActionKind::ToggleFollow, TargetId::User(self.user))
	}

	pub fn is_pending(&self) -> bool {
		self.engine.is_pending(self.gate())
	}

	pub fn profile(&self) -> Option<Profile> {
		self.engine.store().profile(self.user)
	}

	/// Fetches the profile into `profile:{id}`.
	pub async fn load(&self) -> Result<Profile, ClientError> {
		let profile = self.backend.profile(self.user).await?;
		self.engine.store().put(CacheKey::Profile(self.user), profile.clone());
		Ok(profile)
	}

	pub async fn toggle(&self) -> Result<MutationOutcome<FollowStatus>, MutationError> {
		self.engine.toggle_follow(self.user).await
	}

	pub fn subscribe(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> Subscription {
		self.engine.store().subscribe(CacheKey::Profile(self.user), listener)
	}
}
