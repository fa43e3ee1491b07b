//! Shared task primitives for plume services.
//!
//! * [`TaskClass`]: classification carried into spawn tracing.
//! * [`spawn`]: spawns onto the ambient tokio runtime, or a lazily built
//!   fallback runtime when called outside one.
//! * [`GenerationClock`] / [`GenerationToken`]: monotonic generations with
//!   cancellation, used to supersede in-flight work (query resets, stream
//!   reconnects) without aborting the underlying future.

mod class;
mod spawn;
mod token;

pub use class::TaskClass;
pub use spawn::spawn;
pub use token::{GenerationClock, GenerationToken};
