//! Long-lived notification subscription.
//!
//! The server pushes text frames over one GET request per credential. A
//! frame of any kind proves the connection alive; silence for longer than the
//! idle deadline means it died without telling us, so the watchdog drops it
//! and reconnects after a fixed backoff. This repeats for as long as someone
//! is subscribed. Delivery is best effort: frames sent while disconnected are
//! lost and nothing is replayed.

mod dispatch;
mod frame;
mod hub;
mod transport;
mod watchdog;
#[cfg(test)]
mod testing;

pub use dispatch::{Dispatch, StreamMessage, dispatch};
pub use frame::{Frame, SseReader};
pub use hub::{StreamHub, StreamSubscription};
pub use transport::{EventSource, HttpTransport, Transport};
pub use watchdog::ConnectionState;
