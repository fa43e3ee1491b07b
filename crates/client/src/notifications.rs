//! Live notification accessor.

use plume_stream::{ConnectionState, StreamMessage, StreamSubscription};
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationView {
	pub latest: Option<StreamMessage>,
	pub state: ConnectionState,
}

/// The viewer's push stream. Dropping the last one closes the connection.
#[derive(Debug)]
pub struct NotificationStream {
	subscription: StreamSubscription,
	state: watch::Receiver<ConnectionState>,
	latest: watch::Receiver<Option<StreamMessage>>,
}

impl NotificationStream {
	pub(crate) fn new(subscription: StreamSubscription) -> Self {
		Self {
			state: subscription.state_watch(),
			latest: subscription.latest_watch(),
			subscription,
		}
	}

	pub fn latest(&self) -> Option<StreamMessage> {
		self.subscription.latest()
	}

	pub fn state(&self) -> ConnectionState {
		self.subscription.state()
	}

	pub fn view(&self) -> NotificationView {
		NotificationView {
			latest: self.latest(),
			state: self.state(),
		}
	}

	/// Every message surfaced from now on, for callers that must not miss
	/// one between reads of [`Self::latest`].
	pub fn messages(&self) -> broadcast::Receiver<StreamMessage> {
		self.subscription.messages()
	}

	/// Waits until the state or the latest message changes.
	///
	/// Returns `None` once the stream can no longer change, e.g. for a
	/// client without credential.
	pub async fn changed(&mut self) -> Option<NotificationView> {
		tokio::select! {
			changed = self.state.changed() => changed.ok()?,
			changed = self.latest.changed() => changed.ok()?,
		}
		let _ = self.state.borrow_and_update();
		let _ = self.latest.borrow_and_update();
		Some(self.view())
	}
}
