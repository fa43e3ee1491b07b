//! One stream per credential, shared by every subscriber.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use plume_cache::CacheStore;
use plume_net::{Credential, StreamConfig};
use plume_worker::{GenerationClock, GenerationToken, TaskClass};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dispatch::StreamMessage;
use crate::transport::Transport;
use crate::watchdog::{Channels, ConnectionState, Watchdog};

struct Running {
	token: GenerationToken,
	task: JoinHandle<()>,
}

struct HubEntry {
	channels: Arc<Channels>,
	subscribers: usize,
	session: Option<Running>,
}

struct HubInner {
	transport: Arc<dyn Transport>,
	settings: StreamConfig,
	store: Option<CacheStore>,
	clock: GenerationClock,
	entries: Mutex<HashMap<Credential, HubEntry>>,
	/// Cancelled tasks of torn-down sessions, awaited by the next session of
	/// the same credential before it connects.
	retired: Mutex<HashMap<Credential, JoinHandle<()>>>,
}

impl HubInner {
	/// Starts a session for `credential`, cancelling the current one first.
	/// The new session connects only after the old task has finished.
	fn start(&self, credential: &Credential, entry: &mut HubEntry) {
		let previous = match entry.session.take() {
			Some(running) => {
				running.token.cancel();
				Some(running.task)
			}
			None => self.retired.lock().remove(credential),
		};
		let token = GenerationToken::new(self.clock.next());
		debug!(generation = token.generation(), replaces = previous.is_some(), "stream.session.start");
		let watchdog = Watchdog {
			transport: Arc::clone(&self.transport),
			credential: credential.clone(),
			settings: self.settings.clone(),
			store: self.store.clone(),
			channels: Arc::clone(&entry.channels),
			token: token.clone(),
		};
		let task = plume_worker::spawn(TaskClass::Stream, watchdog.run(previous));
		entry.session = Some(Running { token, task });
	}

	/// Drops one subscriber of the entry owning `channels`. Subscribers of a
	/// revoked entry do not count against its replacement.
	fn release(&self, credential: &Credential, channels: &Weak<Channels>) {
		let mut entries = self.entries.lock();
		let Some(entry) = entries.get_mut(credential) else {
			return;
		};
		if !std::ptr::eq(Arc::as_ptr(&entry.channels), channels.as_ptr()) {
			return;
		}
		entry.subscribers = entry.subscribers.saturating_sub(1);
		if entry.subscribers > 0 {
			return;
		}
		if let Some(running) = entry.session.take() {
			debug!(generation = running.token.generation(), "stream.session.stop");
			self.retire(credential, running);
		}
		entries.remove(credential);
	}

	/// Cancels `running` and keeps its task until it is superseded.
	fn retire(&self, credential: &Credential, running: Running) {
		running.token.cancel();
		let mut retired = self.retired.lock();
		retired.retain(|_, task| !task.is_finished());
		retired.insert(credential.clone(), running.task);
	}
}

/// Owner of every push connection.
///
/// The first subscriber of a credential opens its stream; the last one to
/// drop its [`StreamSubscription`] closes it.
#[derive(Clone)]
pub struct StreamHub {
	inner: Arc<HubInner>,
}

impl fmt::Debug for StreamHub {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StreamHub")
			.field("sessions", &self.session_count())
			.finish_non_exhaustive()
	}
}

impl StreamHub {
	/// With a `store`, notifications naming a feed item evict that item and
	/// its comment thread so the next read refetches them.
	pub fn new(transport: Arc<dyn Transport>, settings: StreamConfig, store: Option<CacheStore>) -> Self {
		Self {
			inner: Arc::new(HubInner {
				transport,
				settings,
				store,
				clock: GenerationClock::new(),
				entries: Mutex::new(HashMap::new()),
				retired: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Joins (or opens) the stream of `credential`.
	///
	/// Without a credential the subscription is permanently
	/// [`ConnectionState::Disconnected`].
	pub fn subscribe(&self, credential: Option<Credential>) -> StreamSubscription {
		let Some(credential) = credential else {
			debug!("stream.subscribe.no_credential");
			let channels = Channels::new(1);
			return StreamSubscription {
				credential: None,
				hub: Weak::new(),
				channels: Weak::new(),
				state: channels.state.subscribe(),
				latest: channels.latest.subscribe(),
				messages: channels.messages,
			};
		};
		let mut entries = self.inner.entries.lock();
		let entry = entries.entry(credential.clone()).or_insert_with(|| HubEntry {
			channels: Arc::new(Channels::new(self.inner.settings.buffer)),
			subscribers: 0,
			session: None,
		});
		entry.subscribers += 1;
		// A session that ended on its own (rejected credential) is restarted
		// by the next subscriber.
		if entry.session.as_ref().is_none_or(|running| running.task.is_finished()) {
			self.inner.start(&credential, entry);
		}
		StreamSubscription {
			state: entry.channels.state.subscribe(),
			latest: entry.channels.latest.subscribe(),
			messages: entry.channels.messages.clone(),
			channels: Arc::downgrade(&entry.channels),
			credential: Some(credential),
			hub: Arc::downgrade(&self.inner),
		}
	}

	/// Replaces the live session of `credential` with a fresh one, e.g. after
	/// the token was refreshed server-side. Returns false when nobody is
	/// subscribed.
	pub fn restart(&self, credential: &Credential) -> bool {
		let mut entries = self.inner.entries.lock();
		match entries.get_mut(credential) {
			Some(entry) => {
				self.inner.start(credential, entry);
				true
			}
			None => false,
		}
	}

	/// Closes the stream of a credential that is no longer valid, regardless
	/// of subscribers. Existing subscriptions observe `Disconnected`.
	pub fn revoke(&self, credential: &Credential) {
		let mut entries = self.inner.entries.lock();
		if let Some(running) = entries.remove(credential).and_then(|entry| entry.session) {
			debug!(generation = running.token.generation(), "stream.session.revoked");
			self.inner.retire(credential, running);
		}
	}

	/// Number of credentials with a running session.
	pub fn session_count(&self) -> usize {
		self.inner
			.entries
			.lock()
			.values()
			.filter(|entry| entry.session.as_ref().is_some_and(|running| !running.task.is_finished()))
			.count()
	}
}

/// A subscriber's view of one stream. Dropping it unsubscribes.
#[must_use = "dropping a StreamSubscription unsubscribes"]
pub struct StreamSubscription {
	credential: Option<Credential>,
	hub: Weak<HubInner>,
	channels: Weak<Channels>,
	state: watch::Receiver<ConnectionState>,
	latest: watch::Receiver<Option<StreamMessage>>,
	messages: broadcast::Sender<StreamMessage>,
}

impl fmt::Debug for StreamSubscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StreamSubscription").field("state", &self.state()).finish_non_exhaustive()
	}
}

impl StreamSubscription {
	pub fn state(&self) -> ConnectionState {
		*self.state.borrow()
	}

	pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
		self.state.clone()
	}

	/// Most recent surfaced message of this credential's stream.
	pub fn latest(&self) -> Option<StreamMessage> {
		self.latest.borrow().clone()
	}

	pub fn latest_watch(&self) -> watch::Receiver<Option<StreamMessage>> {
		self.latest.clone()
	}

	/// Messages surfaced from now on.
	pub fn messages(&self) -> broadcast::Receiver<StreamMessage> {
		self.messages.subscribe()
	}
}

impl Drop for StreamSubscription {
	fn drop(&mut self) {
		if let (Some(credential), Some(hub)) = (&self.credential, self.hub.upgrade()) {
			hub.release(credential, &self.channels);
		}
	}
}
