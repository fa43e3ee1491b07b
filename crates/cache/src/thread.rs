//! Comment threads with reply structure.

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::{Comment, CommentId, FeedId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
	/// A reply referenced a parent that is not part of this feed's thread.
	#[error("comment {parent} is not part of the thread of feed {feed}")]
	UnknownParent { feed: FeedId, parent: CommentId },
	#[error("comment {0} already exists in the thread")]
	Duplicate(CommentId),
	#[error("comment {0} does not exist in the thread")]
	UnknownComment(CommentId),
}

/// Ordered comments of one feed item.
///
/// Every `parent_id` refers to a comment in the same thread.
#[derive(Debug, Clone)]
pub struct CommentThread {
	feed_id: FeedId,
	comments: IndexMap<CommentId, Comment>,
}

impl PartialEq for CommentThread {
	fn eq(&self, other: &Self) -> bool {
		self.feed_id == other.feed_id && self.comments.iter().eq(other.comments.iter())
	}
}

impl CommentThread {
	pub fn new(feed_id: FeedId) -> Self {
		Self {
			feed_id,
			comments: IndexMap::new(),
		}
	}

	/// Builds a thread from server order. Comments whose parent is unknown
	/// at their position are rejected.
	pub fn from_comments(feed_id: FeedId, comments: impl IntoIterator<Item = Comment>) -> Result<Self, ThreadError> {
		let mut thread = Self::new(feed_id);
		for comment in comments {
			thread.push(comment)?;
		}
		Ok(thread)
	}

	pub fn feed_id(&self) -> FeedId {
		self.feed_id
	}

	pub fn len(&self) -> usize {
		self.comments.len()
	}

	pub fn is_empty(&self) -> bool {
		self.comments.is_empty()
	}

	pub fn get(&self, id: CommentId) -> Option<&Comment> {
		self.comments.get(&id)
	}

	pub fn contains(&self, id: CommentId) -> bool {
		self.comments.contains_key(&id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Comment> {
		self.comments.values()
	}

	/// Top-level comments in thread order.
	pub fn roots(&self) -> impl Iterator<Item = &Comment> {
		self.comments.values().filter(|c| c.parent_id.is_none())
	}

	/// Direct replies of `parent` in thread order.
	pub fn replies_of(&self, parent: CommentId) -> impl Iterator<Item = &Comment> {
		self.comments.values().filter(move |c| c.parent_id == Some(parent))
	}

	/// Checks that `parent` may be referenced by a new reply.
	pub fn validate_parent(&self, parent: Option<CommentId>) -> Result<(), ThreadError> {
		match parent {
			Some(parent) if !self.comments.contains_key(&parent) => Err(ThreadError::UnknownParent { feed: self.feed_id, parent }),
			_ => Ok(()),
		}
	}

	/// Appends a comment at the end of the thread.
	pub fn push(&mut self, comment: Comment) -> Result<(), ThreadError> {
		self.validate_parent(comment.parent_id)?;
		if self.comments.contains_key(&comment.id) {
			return Err(ThreadError::Duplicate(comment.id));
		}
		self.comments.insert(comment.id, comment);
		Ok(())
	}

	/// Swaps a provisional comment for its confirmed server copy in place.
	///
	/// Replies that pointed at the provisional id are re-parented to the
	/// confirmed id.
	pub fn confirm(&mut self, provisional: CommentId, confirmed: Comment) -> Result<(), ThreadError> {
		let Some(index) = self.comments.get_index_of(&provisional) else {
			return Err(ThreadError::UnknownComment(provisional));
		};
		if confirmed.id != provisional && self.comments.contains_key(&confirmed.id) {
			return Err(ThreadError::Duplicate(confirmed.id));
		}
		let confirmed_id = confirmed.id;
		self.comments.shift_remove_index(index);
		self.comments.shift_insert(index, confirmed_id, confirmed);
		for comment in self.comments.values_mut() {
			if comment.parent_id == Some(provisional) {
				comment.parent_id = Some(confirmed_id);
			}
		}
		Ok(())
	}

	/// Removes a comment together with all of its transitive replies.
	/// Returns the removed comments in thread order.
	pub fn remove_with_replies(&mut self, id: CommentId) -> Vec<Comment> {
		if !self.comments.contains_key(&id) {
			return Vec::new();
		}
		let mut doomed = vec![id];
		let mut frontier = vec![id];
		while let Some(parent) = frontier.pop() {
			for comment in self.comments.values() {
				if comment.parent_id == Some(parent) && !doomed.contains(&comment.id) {
					doomed.push(comment.id);
					frontier.push(comment.id);
				}
			}
		}
		let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.comments).into_iter().partition(|(cid, _)| doomed.contains(cid));
		self.comments = kept.into_iter().collect();
		removed.into_iter().map(|(_, c)| c).collect()
	}

	pub(crate) fn comments_mut(&mut self) -> &mut IndexMap<CommentId, Comment> {
		&mut self.comments
	}

	pub(crate) fn comments_map(&self) -> &IndexMap<CommentId, Comment> {
		&self.comments
	}
}
