//! reqwest implementation of [`FeedBackend`].

use async_trait::async_trait;
use parking_lot::RwLock;
use plume_cache::{Comment, CommentId, FeedId, FeedItem, FeedQuery, FollowStatus, LikeStatus, Notification, Page, Profile, UserId};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::backend::{CommentDraft, FeedBackend};
use crate::config::ClientConfig;
use crate::credential::Credential;
use crate::error::{ClientError, Result};

/// REST backend over HTTP with a bearer credential.
#[derive(Debug)]
pub struct HttpBackend {
	client: Client,
	base_url: Url,
	credential: RwLock<Option<Credential>>,
}

impl HttpBackend {
	pub fn new(config: &ClientConfig, credential: Option<Credential>) -> Result<Self> {
		let client = Client::builder()
			.timeout(config.request_timeout())
			.build()
			.map_err(|e| ClientError::NetworkFailure(e.to_string()))?;
		Ok(Self {
			client,
			base_url: config.base_url.clone(),
			credential: RwLock::new(credential),
		})
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	pub fn credential(&self) -> Option<Credential> {
		self.credential.read().clone()
	}

	/// Swaps the credential used by subsequent requests. `None` makes every
	/// request fail with [`ClientError::AuthRequired`].
	pub fn set_credential(&self, credential: Option<Credential>) {
		*self.credential.write() = credential;
	}

	/// Resolves `segments` below the base URL path.
	pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
		let mut url = self.base_url.clone();
		url.path_segments_mut()
			.map_err(|()| ClientError::NetworkFailure(format!("base URL {} cannot carry a path", self.base_url)))?
			.pop_if_empty()
			.extend(segments);
		Ok(url)
	}

	fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
		let credential = self.credential.read().clone().ok_or(ClientError::AuthRequired)?;
		debug!(%method, %url, "http.request");
		Ok(self.client.request(method, url).header(AUTHORIZATION, credential.bearer()))
	}

	async fn send(&self, request: RequestBuilder) -> Result<Response> {
		let response = request.send().await?;
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		let body = response.text().await.unwrap_or_default();
		let err = ClientError::from_status(status.as_u16(), &body);
		warn!(status = status.as_u16(), error = %err, "http.rejected");
		Err(err)
	}

	async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
		let response = self.send(request).await?;
		let bytes = response.bytes().await?;
		Ok(serde_json::from_slice(&bytes)?)
	}
}

fn paged(mut url: Url, page: u32, size: u32) -> Url {
	url.query_pairs_mut()
		.append_pair("page", &page.to_string())
		.append_pair("size", &size.to_string());
	url
}

#[async_trait]
impl FeedBackend for HttpBackend {
	async fn feeds(&self, query: &FeedQuery, page: u32, size: u32) -> Result<Page<FeedItem>> {
		let url = match query {
			FeedQuery::Latest => self.endpoint(&["feeds"])?,
			FeedQuery::Search(keyword) => {
				let mut url = self.endpoint(&["feeds", "search"])?;
				url.query_pairs_mut().append_pair("keyword", keyword);
				url
			}
			FeedQuery::ByAuthor(user) => self.endpoint(&["users", &user.to_string(), "feeds"])?,
		};
		self.json(self.request(Method::GET, paged(url, page, size))?).await
	}

	async fn feed(&self, id: FeedId) -> Result<FeedItem> {
		let url = self.endpoint(&["feeds", &id.to_string()])?;
		self.json(self.request(Method::GET, url)?).await
	}

	async fn like(&self, id: FeedId) -> Result<LikeStatus> {
		let url = self.endpoint(&["feeds", &id.to_string(), "likes"])?;
		self.json(self.request(Method::POST, url)?).await
	}

	async fn unlike(&self, id: FeedId) -> Result<LikeStatus> {
		let url = self.endpoint(&["feeds", &id.to_string(), "likes"])?;
		self.json(self.request(Method::DELETE, url)?).await
	}

	async fn comments(&self, feed: FeedId) -> Result<Vec<Comment>> {
		let url = self.endpoint(&["feeds", &feed.to_string(), "comments"])?;
		self.json(self.request(Method::GET, url)?).await
	}

	async fn add_comment(&self, feed: FeedId, draft: &CommentDraft) -> Result<Comment> {
		let url = self.endpoint(&["feeds", &feed.to_string(), "comments"])?;
		self.json(self.request(Method::POST, url)?.json(draft)).await
	}

	async fn delete_comment(&self, feed: FeedId, comment: CommentId) -> Result<()> {
		let url = self.endpoint(&["feeds", &feed.to_string(), "comments", &comment.to_string()])?;
		self.send(self.request(Method::DELETE, url)?).await?;
		Ok(())
	}

	async fn notifications(&self, page: u32, size: u32) -> Result<Page<Notification>> {
		let url = paged(self.endpoint(&["notifications"])?, page, size);
		self.json(self.request(Method::GET, url)?).await
	}

	async fn profile(&self, user: UserId) -> Result<Profile> {
		let url = self.endpoint(&["users", &user.to_string()])?;
		self.json(self.request(Method::GET, url)?).await
	}

	async fn follow(&self, user: UserId) -> Result<FollowStatus> {
		let url = self.endpoint(&["users", &user.to_string(), "follow"])?;
		self.json(self.request(Method::POST, url)?).await
	}

	async fn unfollow(&self, user: UserId) -> Result<FollowStatus> {
		let url = self.endpoint(&["users", &user.to_string(), "follow"])?;
		self.json(self.request(Method::DELETE, url)?).await
	}
}
