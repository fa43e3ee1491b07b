//! Connection lifecycle for one credential.

use std::sync::Arc;
use std::time::Duration;

use plume_cache::{CacheKey, CacheStore};
use plume_net::{ClientError, Credential, StreamConfig};
use plume_worker::GenerationToken;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, trace, warn};

use crate::dispatch::{Dispatch, StreamMessage, dispatch};
use crate::frame::Frame;
use crate::transport::{EventSource, Transport};

/// Observable connection state.
///
/// `Disconnected` is final: it is only entered when the last subscriber is
/// gone or the credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
	Reconnecting,
}

impl ConnectionState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Connected => "connected",
			Self::Reconnecting => "reconnecting",
		}
	}
}

/// Outputs shared by every session of one credential.
pub(crate) struct Channels {
	pub(crate) state: watch::Sender<ConnectionState>,
	pub(crate) latest: watch::Sender<Option<StreamMessage>>,
	pub(crate) messages: broadcast::Sender<StreamMessage>,
}

impl Channels {
	pub(crate) fn new(buffer: usize) -> Self {
		Self {
			state: watch::channel(ConnectionState::Disconnected).0,
			latest: watch::channel(None).0,
			messages: broadcast::channel(buffer.max(1)).0,
		}
	}
}

/// One open connection. Replaced, never reused, on reconnect.
struct StreamSession {
	source: Box<dyn EventSource>,
	opened_at: Instant,
	last_activity: Instant,
	idle_deadline: Duration,
}

impl StreamSession {
	fn open(source: Box<dyn EventSource>, idle_deadline: Duration) -> Self {
		let now = Instant::now();
		Self {
			source,
			opened_at: now,
			last_activity: now,
			idle_deadline,
		}
	}

	/// Next frame, or `None` when the idle deadline passed first.
	async fn next(&mut self) -> Option<Result<Option<Frame>, ClientError>> {
		let frame = timeout(self.idle_deadline, self.source.next_frame()).await.ok()?;
		if matches!(frame, Ok(Some(_))) {
			self.last_activity = Instant::now();
		}
		Some(frame)
	}
}

enum Exit {
	Reconnect,
	Stop,
}

pub(crate) struct Watchdog {
	pub(crate) transport: Arc<dyn Transport>,
	pub(crate) credential: Credential,
	pub(crate) settings: StreamConfig,
	pub(crate) store: Option<CacheStore>,
	pub(crate) channels: Arc<Channels>,
	pub(crate) token: GenerationToken,
}

impl Watchdog {
	/// Connect, pump, reconnect, until cancelled or the credential is
	/// rejected. A connect attempt gets the idle deadline to produce a
	/// stream. `previous` is the task of the session this one replaces; it
	/// has been cancelled and is awaited before the first connect.
	pub(crate) async fn run(self, previous: Option<JoinHandle<()>>) {
		if let Some(previous) = previous {
			let _ = previous.await;
		}
		let generation = self.token.generation();
		loop {
			self.set_state(ConnectionState::Connecting);
			let connect = timeout(self.settings.idle_deadline(), self.transport.connect(&self.credential));
			let connected = tokio::select! {
				biased;
				() = self.token.cancelled() => break,
				connected = connect => connected,
			};
			match connected {
				Err(_) => warn!(generation, "stream.connect_timeout"),
				Ok(Ok(source)) => {
					if let Exit::Stop = self.pump(source).await {
						break;
					}
				}
				Ok(Err(ClientError::AuthRequired)) => {
					warn!(generation, "stream.auth_required");
					break;
				}
				Ok(Err(err)) => warn!(generation, error = %err, "stream.connect_failed"),
			}
			self.set_state(ConnectionState::Reconnecting);
			tokio::select! {
				biased;
				() = self.token.cancelled() => break,
				() = sleep(self.settings.reconnect_backoff()) => {}
			}
		}
		self.set_state(ConnectionState::Disconnected);
		debug!(generation, "stream.stopped");
	}

	async fn pump(&self, source: Box<dyn EventSource>) -> Exit {
		let generation = self.token.generation();
		let mut session = StreamSession::open(source, self.settings.idle_deadline());
		self.set_state(ConnectionState::Connected);
		info!(generation, "stream.connected");
		let exit = loop {
			let next = tokio::select! {
				biased;
				() = self.token.cancelled() => break Exit::Stop,
				next = session.next() => next,
			};
			match next {
				None => {
					let idle_ms = session.last_activity.elapsed().as_millis() as u64;
					warn!(generation, idle_ms, "stream.idle_timeout");
					break Exit::Reconnect;
				}
				Some(Ok(Some(frame))) => self.handle(frame),
				Some(Ok(None)) => {
					warn!(generation, "stream.closed_by_server");
					break Exit::Reconnect;
				}
				Some(Err(ClientError::AuthRequired)) => {
					warn!(generation, "stream.auth_required");
					break Exit::Stop;
				}
				Some(Err(err)) => {
					warn!(generation, error = %err, "stream.transport_error");
					break Exit::Reconnect;
				}
			}
		};
		let open_ms = session.opened_at.elapsed().as_millis() as u64;
		info!(generation, open_ms, "stream.closed");
		exit
	}

	fn handle(&self, frame: Frame) {
		let data = match frame {
			Frame::Keepalive => {
				trace!("stream.keepalive");
				return;
			}
			Frame::Data(data) => data,
		};
		match dispatch(&data, &self.settings.ack_prefix) {
			Dispatch::Liveness => trace!("stream.ack"),
			Dispatch::Surface(message) => self.surface(message),
		}
	}

	fn surface(&self, message: StreamMessage) {
		if let (Some(store), Some(feed)) = (&self.store, message.feed_id) {
			store.transaction(|txn| {
				txn.remove(&CacheKey::Feed(feed));
				txn.remove(&CacheKey::Comments(feed));
			});
			debug!(feed = %feed, "stream.invalidated");
		}
		trace!(text = %message.text, "stream.message");
		self.channels.latest.send_replace(Some(message.clone()));
		// Nobody listening is fine; `latest` still has it.
		let _ = self.channels.messages.send(message);
	}

	fn set_state(&self, state: ConnectionState) {
		let changed = self.channels.state.send_if_modified(|current| {
			if *current == state {
				return false;
			}
			*current = state;
			true
		});
		if changed {
			debug!(generation = self.token.generation(), state = state.as_str(), "stream.state");
		}
	}
}
