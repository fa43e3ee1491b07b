//! In-memory transport driven by the test.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use plume_net::{ClientError, Credential};
use tokio::sync::mpsc;

use crate::frame::Frame;
use crate::transport::{EventSource, Transport};

pub type FrameTx = mpsc::UnboundedSender<Result<Frame, ClientError>>;

/// Hands the test a frame sender for every successful connect.
pub struct FakeTransport {
	connections: mpsc::UnboundedSender<(Credential, FrameTx)>,
	failures: Mutex<VecDeque<ClientError>>,
	hangs: AtomicUsize,
	connects: AtomicUsize,
}

impl FakeTransport {
	pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(Credential, FrameTx)>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let transport = Arc::new(Self {
			connections: tx,
			failures: Mutex::new(VecDeque::new()),
			hangs: AtomicUsize::new(0),
			connects: AtomicUsize::new(0),
		});
		(transport, rx)
	}

	/// Makes the next connect attempt fail with `err`.
	pub fn fail_next(&self, err: ClientError) {
		self.failures.lock().push_back(err);
	}

	/// Makes the next connect attempt accept and then never answer.
	pub fn hang_next(&self) {
		self.hangs.fetch_add(1, Ordering::SeqCst);
	}

	pub fn connects(&self) -> usize {
		self.connects.load(Ordering::SeqCst)
	}
}

struct ChannelSource(mpsc::UnboundedReceiver<Result<Frame, ClientError>>);

#[async_trait]
impl EventSource for ChannelSource {
	async fn next_frame(&mut self) -> Result<Option<Frame>, ClientError> {
		self.0.recv().await.transpose()
	}
}

#[async_trait]
impl Transport for FakeTransport {
	async fn connect(&self, credential: &Credential) -> Result<Box<dyn EventSource>, ClientError> {
		self.connects.fetch_add(1, Ordering::SeqCst);
		if let Some(err) = self.failures.lock().pop_front() {
			return Err(err);
		}
		if self.hangs.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
			std::future::pending::<()>().await;
		}
		let (tx, rx) = mpsc::unbounded_channel();
		let _ = self.connections.send((credential.clone(), tx));
		Ok(Box::new(ChannelSource(rx)))
	}
}
