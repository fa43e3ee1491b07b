//! Optimistic mutations: predict, commit, then reconcile or roll back.
//!
//! A mutation snapshots its target keys and applies its prediction inside one
//! store transaction, so readers see either the state before or the fully
//! predicted state. The request then runs without any lock held. Its outcome
//! is applied in a second transaction: the response is reconciled into the
//! targets, or the prediction is undone.
//!
//! Undo composes with other writers. A target nobody touched since the
//! prediction gets its snapshot back wholesale. A target written in the
//! meantime (an overlapping mutation, a page load, a reconciliation) is
//! reverted three-way through [`Revert`], so only the parts that still hold
//! this mutation's prediction go back.

mod ops;
#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plume_cache::{CacheKey, CacheStore, CacheValue, Comment, CommentId, FeedId, LikeStatus, FollowStatus, Revert, Snapshot, StoreTxn, UserId};
use plume_net::{ClientError, CommentDraft, FeedBackend};
use tracing::{debug, trace, warn};

pub use self::ops::{AddComment, DeleteComment, ToggleFollow, ToggleLike};
use crate::error::MutationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
	ToggleLike,
	AddComment,
	DeleteComment,
	ToggleFollow,
}

impl ActionKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::ToggleLike => "toggle_like",
			Self::AddComment => "add_comment",
			Self::DeleteComment => "delete_comment",
			Self::ToggleFollow => "toggle_follow",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
	Feed(FeedId),
	Comment(CommentId),
	User(UserId),
}

/// Re-entrancy gate: at most one pending mutation per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateKey {
	pub kind: ActionKind,
	pub target: TargetId,
}

impl GateKey {
	pub const fn new(kind: ActionKind, target: TargetId) -> Self {
		Self { kind, target }
	}
}

impl fmt::Display for GateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let kind = self.kind.as_str();
		match self.target {
			TargetId::Feed(id) => write!(f, "{kind}:feed:{id}"),
			TargetId::Comment(id) => write!(f, "{kind}:comment:{id}"),
			TargetId::User(id) => write!(f, "{kind}:user:{id}"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
	Pending,
	Committed,
	RolledBack,
}

/// Result of a mutation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome<R> {
	/// The server accepted the request and its response was reconciled.
	Committed(R),
	/// Another mutation with the same [`GateKey`] was pending; nothing was
	/// predicted and no request was sent.
	Ignored,
}

impl<R> MutationOutcome<R> {
	pub fn is_ignored(&self) -> bool {
		matches!(self, Self::Ignored)
	}

	pub fn committed(self) -> Option<R> {
		match self {
			Self::Committed(response) => Some(response),
			Self::Ignored => None,
		}
	}
}

/// One user action expressed against the cache and the backend.
#[async_trait]
pub trait Mutation: Send + Sync {
	type Response: Send + Sync;

	fn gate(&self) -> GateKey;

	/// Keys the prediction may write. Evaluated in the same transaction as
	/// [`Mutation::predict`].
	fn targets(&self, txn: &StoreTxn<'_>) -> Vec<CacheKey>;

	/// Applies the expected outcome. Must only write [`Mutation::targets`].
	fn predict(&mut self, txn: &mut StoreTxn<'_>);

	async fn request(&self, backend: &dyn FeedBackend) -> Result<Self::Response, ClientError>;

	/// Folds the server response into the cache. Server values win over the
	/// prediction.
	fn reconcile(&self, reconciler: &mut Reconciler<'_, '_>, response: &Self::Response);
}

/// Write access handed to [`Mutation::reconcile`].
pub struct Reconciler<'t, 'a> {
	txn: &'t mut StoreTxn<'a>,
	seq: u64,
	targets: &'t [CacheKey],
	reconciled: &'t mut HashMap<(CacheKey, TargetId), u64>,
}

impl Reconciler<'_, '_> {
	/// Issue sequence number of the mutation being reconciled.
	pub fn seq(&self) -> u64 {
		self.seq
	}

	pub fn targets(&self) -> &[CacheKey] {
		self.targets
	}

	pub fn get(&self, key: &CacheKey) -> Option<&CacheValue> {
		self.txn.get(key)
	}

	/// Structural follow-up write (for example swapping a provisional comment
	/// for its confirmed copy). Always applied when the key is present.
	pub fn patch(&mut self, key: &CacheKey, f: impl FnOnce(&mut CacheValue)) -> bool {
		self.txn.patch(key, f).is_some()
	}

	/// Writes authoritative server state for `entity` under `key`, unless a
	/// mutation issued after this one has already reconciled that entity
	/// there. Other rows of a collection key do not block each other.
	pub fn overwrite(&mut self, key: &CacheKey, entity: TargetId, f: impl FnOnce(&mut CacheValue)) -> bool {
		let slot = (key.clone(), entity);
		if self.reconciled.get(&slot).is_some_and(|&later| later > self.seq) {
			trace!(key = %key, seq = self.seq, "mutation.reconcile.superseded");
			return false;
		}
		let applied = self.txn.patch(key, f).is_some();
		if applied {
			self.reconciled.insert(slot, self.seq);
		}
		applied
	}
}

/// Bookkeeping for one in-flight mutation.
///
/// Dropping an intent that is still pending (its future was dropped while
/// the request was outstanding) rolls the prediction back.
pub struct MutationIntent {
	seq: u64,
	gate: GateKey,
	targets: Vec<CacheKey>,
	rollback: Snapshot,
	predicted: Snapshot,
	status: IntentStatus,
	store: CacheStore,
}

impl fmt::Debug for MutationIntent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MutationIntent")
			.field("seq", &self.seq)
			.field("gate", &self.gate)
			.field("targets", &self.targets)
			.field("status", &self.status)
			.finish_non_exhaustive()
	}
}

impl MutationIntent {
	pub fn seq(&self) -> u64 {
		self.seq
	}

	pub fn gate(&self) -> GateKey {
		self.gate
	}

	pub fn targets(&self) -> &[CacheKey] {
		&self.targets
	}

	/// State of the targets right before the prediction.
	pub fn rollback_snapshot(&self) -> &Snapshot {
		&self.rollback
	}

	/// State of the targets right after the prediction.
	pub fn predicted_snapshot(&self) -> &Snapshot {
		&self.predicted
	}

	pub fn status(&self) -> IntentStatus {
		self.status
	}

	fn roll_back(&self, txn: &mut StoreTxn<'_>) {
		for key in &self.targets {
			let (Some(original), Some(predicted)) = (self.rollback.get(key), self.predicted.get(key)) else {
				continue;
			};
			if predicted.version == original.version {
				continue;
			}
			if txn.version(key) == predicted.version {
				match &original.value {
					Some(value) => {
						txn.put(key.clone(), value.clone());
					}
					None => {
						txn.remove(key);
					}
				}
				continue;
			}
			match (&original.value, &predicted.value) {
				(Some(original), Some(predicted)) => {
					txn.patch(key, |current| current.revert(predicted, original));
				}
				(None, Some(predicted)) if txn.get(key) == Some(predicted) => {
					txn.remove(key);
				}
				_ => {}
			}
		}
	}
}

impl Drop for MutationIntent {
	fn drop(&mut self) {
		if self.status != IntentStatus::Pending {
			return;
		}
		warn!(seq = self.seq, gate = %self.gate, "mutation.abandoned");
		let store = self.store.clone();
		store.transaction(|txn| self.roll_back(txn));
		self.status = IntentStatus::RolledBack;
	}
}

#[derive(Default)]
struct EngineState {
	pending: HashSet<GateKey>,
	next_seq: u64,
	next_provisional: i64,
	/// Latest issue sequence that reconciled each entity under each key.
	/// Only meaningful while an earlier mutation may still be pending, so it
	/// is cleared whenever the engine goes idle.
	reconciled: HashMap<(CacheKey, TargetId), u64>,
}

/// Releases a gate when the mutation ends, however it ends.
struct GateGuard {
	state: Arc<Mutex<EngineState>>,
	gate: GateKey,
	seq: u64,
}

impl Drop for GateGuard {
	fn drop(&mut self) {
		let mut state = self.state.lock();
		state.pending.remove(&self.gate);
		if state.pending.is_empty() {
			state.reconciled.clear();
		}
	}
}

/// Runs [`Mutation`]s against one cache and one backend.
#[derive(Clone)]
pub struct MutationEngine {
	store: CacheStore,
	backend: Arc<dyn FeedBackend>,
	state: Arc<Mutex<EngineState>>,
}

impl fmt::Debug for MutationEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("MutationEngine")
			.field("pending", &state.pending.len())
			.field("issued", &state.next_seq)
			.finish_non_exhaustive()
	}
}

impl MutationEngine {
	pub fn new(store: CacheStore, backend: Arc<dyn FeedBackend>) -> Self {
		Self {
			store,
			backend,
			state: Arc::new(Mutex::new(EngineState::default())),
		}
	}

	pub fn store(&self) -> &CacheStore {
		&self.store
	}

	pub fn is_pending(&self, gate: GateKey) -> bool {
		self.state.lock().pending.contains(&gate)
	}

	pub fn pending_count(&self) -> usize {
		self.state.lock().pending.len()
	}

	fn acquire(&self, gate: GateKey) -> Option<GateGuard> {
		let mut state = self.state.lock();
		if !state.pending.insert(gate) {
			return None;
		}
		state.next_seq += 1;
		Some(GateGuard {
			state: Arc::clone(&self.state),
			gate,
			seq: state.next_seq,
		})
	}

	/// Allocates a client-side id for a comment the server has not seen.
	fn next_provisional(&self) -> CommentId {
		let mut state = self.state.lock();
		state.next_provisional -= 1;
		CommentId(state.next_provisional)
	}

	/// Predicts, requests, then reconciles or rolls back.
	///
	/// Returns [`MutationOutcome::Ignored`] without touching anything when a
	/// mutation with the same gate is pending. On failure the prediction is
	/// undone before the error is returned; there is no retry.
	pub async fn mutate<M: Mutation>(&self, mut mutation: M) -> Result<MutationOutcome<M::Response>, MutationError> {
		let gate = mutation.gate();
		let Some(guard) = self.acquire(gate) else {
			debug!(gate = %gate, "mutation.ignored");
			return Ok(MutationOutcome::Ignored);
		};

		let (targets, rollback, predicted) = self.store.transaction(|txn| {
			let targets = mutation.targets(txn);
			let rollback = txn.snapshot(&targets);
			mutation.predict(txn);
			let predicted = txn.snapshot(&targets);
			(targets, rollback, predicted)
		});
		let mut intent = MutationIntent {
			seq: guard.seq,
			gate,
			targets,
			rollback,
			predicted,
			status: IntentStatus::Pending,
			store: self.store.clone(),
		};
		debug!(seq = intent.seq, gate = %gate, targets = intent.targets.len(), "mutation.predicted");

		match mutation.request(self.backend.as_ref()).await {
			Ok(response) => {
				self.store.transaction(|txn| {
					let mut state = self.state.lock();
					let mut reconciler = Reconciler {
						txn,
						seq: intent.seq,
						targets: &intent.targets,
						reconciled: &mut state.reconciled,
					};
					mutation.reconcile(&mut reconciler, &response);
				});
				intent.status = IntentStatus::Committed;
				debug!(seq = intent.seq, gate = %gate, "mutation.committed");
				Ok(MutationOutcome::Committed(response))
			}
			Err(err) => {
				self.store.transaction(|txn| intent.roll_back(txn));
				intent.status = IntentStatus::RolledBack;
				warn!(seq = intent.seq, gate = %gate, error = %err, "mutation.rolled_back");
				Err(err.into())
			}
		}
	}

	/// Flips the like state of a feed item in every cached copy.
	pub async fn toggle_like(&self, feed: FeedId) -> Result<MutationOutcome<LikeStatus>, MutationError> {
		self.mutate(ToggleLike::new(feed)).await
	}

	pub async fn toggle_follow(&self, user: UserId) -> Result<MutationOutcome<FollowStatus>, MutationError> {
		self.mutate(ToggleFollow::new(user)).await
	}

	/// Posts a comment or, with `parent`, a reply.
	///
	/// A reply must reference a confirmed comment of the same feed's cached
	/// thread; otherwise it is rejected before anything is predicted.
	pub async fn add_comment(
		&self,
		feed: FeedId,
		author: UserId,
		content: impl Into<String>,
		parent: Option<CommentId>,
	) -> Result<MutationOutcome<Comment>, MutationError> {
		let content = content.into();
		if content.trim().is_empty() {
			return Err(MutationError::EmptyComment);
		}
		if let Some(parent) = parent {
			if parent.is_provisional() {
				return Err(MutationError::Provisional(parent));
			}
			match self.store.thread(feed) {
				Some(thread) => thread.validate_parent(Some(parent))?,
				None => return Err(plume_cache::ThreadError::UnknownParent { feed, parent }.into()),
			}
		}
		let draft = CommentDraft {
			content,
			parent_id: parent,
		};
		let provisional = self.next_provisional();
		self.mutate(AddComment::new(feed, provisional, author, draft)).await
	}

	/// Deletes a comment and, in the cache, all of its replies.
	pub async fn delete_comment(&self, feed: FeedId, comment: CommentId) -> Result<MutationOutcome<()>, MutationError> {
		if comment.is_provisional() {
			return Err(MutationError::Provisional(comment));
		}
		self.mutate(DeleteComment::new(feed, comment)).await
	}
}
