//! Connection establishment for the push endpoint.

use std::io;

use async_trait::async_trait;
use futures::TryStreamExt;
use plume_net::{ClientConfig, ClientError, Credential};
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use crate::frame::{Frame, SseReader};

/// An open push connection. Dropping it closes the connection.
#[async_trait]
pub trait EventSource: Send {
	/// Next frame, `Ok(None)` when the server ended the stream.
	async fn next_frame(&mut self) -> Result<Option<Frame>, ClientError>;
}

/// Opens push connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	async fn connect(&self, credential: &Credential) -> Result<Box<dyn EventSource>, ClientError>;
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for SseReader<R> {
	async fn next_frame(&mut self) -> Result<Option<Frame>, ClientError> {
		self.read_frame().await.map_err(|e| ClientError::NetworkFailure(e.to_string()))
	}
}

/// Long-lived GET against the configured stream path.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: Client,
	url: Url,
}

impl HttpTransport {
	/// The request has a connect timeout but no overall timeout; liveness is
	/// the watchdog's job.
	pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
		let client = Client::builder()
			.connect_timeout(config.request_timeout())
			.build()
			.map_err(|e| ClientError::NetworkFailure(e.to_string()))?;
		let mut url = config.base_url.clone();
		url.path_segments_mut()
			.map_err(|()| ClientError::NetworkFailure(format!("base URL {} cannot carry a path", config.base_url)))?
			.pop_if_empty()
			.extend(config.stream.path.split('/').filter(|segment| !segment.is_empty()));
		Ok(Self { client, url })
	}

	pub fn url(&self) -> &Url {
		&self.url
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn connect(&self, credential: &Credential) -> Result<Box<dyn EventSource>, ClientError> {
		debug!(url = %self.url, "stream.http.connect");
		let response = self
			.client
			.get(self.url.clone())
			.header(AUTHORIZATION, credential.bearer())
			.header(ACCEPT, "text/event-stream")
			.send()
			.await?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(ClientError::from_status(status.as_u16(), &body));
		}
		let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
		Ok(Box::new(SseReader::new(StreamReader::new(body))))
	}
}
