use std::fmt;

use crate::model::{FeedId, UserId};

/// Query identity of a paged feed collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeedQuery {
	/// The main timeline.
	Latest,
	/// Keyword search results.
	Search(String),
	/// Posts of one author.
	ByAuthor(UserId),
}

/// Composite cache key: entity kind plus identity.
///
/// The `Display` form (`feed:42`, `feeds:list`, `comments:42`) is what appears
/// in logs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheKey {
	Feed(FeedId),
	Feeds(FeedQuery),
	Comments(FeedId),
	Profile(UserId),
	Notifications,
}

impl CacheKey {
	pub fn feed_list() -> Self {
		Self::Feeds(FeedQuery::Latest)
	}

	pub fn search(keyword: impl Into<String>) -> Self {
		Self::Feeds(FeedQuery::Search(keyword.into()))
	}

	/// Returns true for keys whose value is a paged collection.
	pub fn is_collection(&self) -> bool {
		matches!(self, Self::Feeds(_) | Self::Notifications)
	}
}

impl fmt::Display for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Feed(id) => write!(f, "feed:{id}"),
			Self::Feeds(FeedQuery::Latest) => f.write_str("feeds:list"),
			Self::Feeds(FeedQuery::Search(keyword)) => write!(f, "feeds:search:{keyword}"),
			Self::Feeds(FeedQuery::ByAuthor(user)) => write!(f, "feeds:user:{user}"),
			Self::Comments(id) => write!(f, "comments:{id}"),
			Self::Profile(id) => write!(f, "profile:{id}"),
			Self::Notifications => f.write_str("notifications:list"),
		}
	}
}
