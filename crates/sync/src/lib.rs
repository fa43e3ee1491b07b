//! Consistency layer between user actions, the backend and the cache.
//!
//! * [`MutationEngine`] applies optimistic predictions to every cached copy
//!   of the target, issues the request and then reconciles with the server
//!   response or rolls the prediction back.
//! * [`CollectionController`] loads paged collections one page at a time
//!   and discards responses for superseded query identities.
//! * [`ScrollTrigger`] turns sentinel visibility into "load next page" calls.

mod controller;
mod error;
mod mutation;
mod scroll;
#[cfg(test)]
mod testing;

pub use controller::{BackendPages, CollectionController, LoadOutcome, PageSource, SkipReason};
pub use error::MutationError;
pub use mutation::{
	ActionKind, AddComment, DeleteComment, GateKey, IntentStatus, Mutation, MutationEngine, MutationIntent, MutationOutcome, Reconciler,
	TargetId, ToggleFollow, ToggleLike,
};
pub use scroll::ScrollTrigger;
