use plume_cache::{CommentId, ThreadError};
use plume_net::ClientError;
use thiserror::Error;

/// Why a user action did not take effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
	/// The request failed; the prediction has been rolled back.
	#[error(transparent)]
	Client(#[from] ClientError),
	/// Rejected before any request because it would break thread structure.
	#[error(transparent)]
	Thread(#[from] ThreadError),
	#[error("comment {0} has not been confirmed by the server yet")]
	Provisional(CommentId),
	#[error("comment text is empty")]
	EmptyComment,
}

impl MutationError {
	pub fn user_message(&self) -> String {
		match self {
			Self::Client(err) => err.user_message(),
			Self::Thread(_) => "That comment is no longer available.".to_string(),
			Self::Provisional(_) => "Please wait until the comment is posted.".to_string(),
			Self::EmptyComment => "Write something first.".to_string(),
		}
	}

	pub fn client(&self) -> Option<&ClientError> {
		match self {
			Self::Client(err) => Some(err),
			_ => None,
		}
	}
}
