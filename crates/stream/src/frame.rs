//! Server-sent event framing.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::trace;

/// One unit of inbound traffic. Both kinds count as liveness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	/// Payload of one event; multi-line `data:` fields are joined with `\n`.
	Data(String),
	/// A `:` comment line, sent by the server to keep the connection warm.
	Keepalive,
}

/// Reads [`Frame`]s from a `text/event-stream` body.
///
/// `event:`, `id:` and `retry:` fields are accepted and ignored.
pub struct SseReader<R> {
	lines: Lines<R>,
	data: Vec<String>,
}

impl<R: AsyncBufRead + Unpin> SseReader<R> {
	pub fn new(reader: R) -> Self {
		Self {
			lines: reader.lines(),
			data: Vec::new(),
		}
	}

	/// Next complete frame, or `None` at end of stream.
	pub async fn read_frame(&mut self) -> io::Result<Option<Frame>> {
		loop {
			let Some(line) = self.lines.next_line().await? else {
				return Ok(self.flush());
			};
			if line.is_empty() {
				match self.flush() {
					Some(frame) => return Ok(Some(frame)),
					None => continue,
				}
			}
			if line.starts_with(':') {
				trace!(len = line.len(), "sse.comment");
				return Ok(Some(Frame::Keepalive));
			}
			let (field, value) = match line.split_once(':') {
				Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
				None => (line.as_str(), ""),
			};
			if field == "data" {
				self.data.push(value.to_owned());
			}
		}
	}

	fn flush(&mut self) -> Option<Frame> {
		if self.data.is_empty() {
			return None;
		}
		let data = self.data.join("\n");
		self.data.clear();
		Some(Frame::Data(data))
	}
}
