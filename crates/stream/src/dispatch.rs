use plume_cache::FeedId;
use serde_json::Value;

/// A notification surfaced to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
	pub text: String,
	/// Feed item the notification is about, when the payload names one.
	pub feed_id: Option<FeedId>,
}

/// What to do with one data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
	/// Connection acknowledgement or empty payload: proves liveness only.
	Liveness,
	Surface(StreamMessage),
}

/// Classifies a data frame.
///
/// JSON objects with a `message` field surface that field: strings as they
/// are, other non-null values as compact JSON. Anything else (other JSON,
/// plain text) surfaces verbatim. Frames starting with `ack_prefix` are
/// never surfaced.
pub fn dispatch(data: &str, ack_prefix: &str) -> Dispatch {
	let trimmed = data.trim();
	if trimmed.is_empty() || (!ack_prefix.is_empty() && trimmed.starts_with(ack_prefix)) {
		return Dispatch::Liveness;
	}
	let payload = serde_json::from_str::<Value>(trimmed).ok();
	let object = payload.as_ref().and_then(Value::as_object);
	let text = match object.and_then(|object| object.get("message")) {
		Some(Value::String(text)) => text.clone(),
		None | Some(Value::Null) => data.to_owned(),
		Some(other) => other.to_string(),
	};
	let feed_id = object.and_then(|object| object.get("feedId")).and_then(Value::as_u64).map(FeedId);
	Dispatch::Surface(StreamMessage { text, feed_id })
}
