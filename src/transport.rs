//! One-way event channels to the agent.
//!
//! A [`Transport`] opens an [`EventChannel`] for a named endpoint. The
//! channel yields text messages in the order they were received and can be
//! closed any number of times.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use crate::client::ClientError;
use crate::http::{add_extra_headers, endpoint_url};
use crate::options::TransportOptions;
use crate::sse::SseResponseExt;

/// Boxed stream of raw messages backing an [`EventChannel`].
pub type MessageStream = BoxStream<'static, Result<String, ClientError>>;

/// Opens event channels.
///
/// Implement this trait to feed sessions from something other than HTTP.
/// Errors returned from `open` or yielded by the channel are reported to the
/// session as connection failures.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish a persistent one-way event connection to `endpoint`.
    async fn open(&self, endpoint: &str) -> Result<EventChannel, ClientError>;
}

/// Handle to an open event stream.
pub struct EventChannel {
    endpoint: String,
    messages: Option<MessageStream>,
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventChannel {
    /// Wrap a message stream.
    pub fn new<S>(endpoint: impl Into<String>, messages: S) -> Self
    where
        S: Stream<Item = Result<String, ClientError>> + Send + 'static,
    {
        Self {
            endpoint: endpoint.into(),
            messages: Some(messages.boxed()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Next message, or `None` once the stream has ended or been closed.
    pub async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        let messages = self.messages.as_mut()?;
        messages.next().await
    }

    /// Release the underlying connection. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.messages.take().is_some() {
            debug!("Closed event channel to {}", self.endpoint);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.messages.is_none()
    }
}

/// Event channels over HTTP, framed as Server-Sent Events.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    options: Arc<TransportOptions>,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client, options: Arc<TransportOptions>) -> Self {
        Self { http, options }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, endpoint: &str) -> Result<EventChannel, ClientError> {
        let url = endpoint_url(&self.options.base_url, endpoint);

        let mut req = self
            .http
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        req = add_extra_headers(req, &self.options.extra_headers);

        let response = req
            .send()
            .await
            .map_err(|e| ClientError::Connection(format!("failed to connect to {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Connection(format!("HTTP {}: {}", status, body)));
        }

        debug!("Opened event channel to {}", url);

        let messages = response.sse().map(|result| result.map_err(into_connection_error));
        Ok(EventChannel::new(endpoint, messages))
    }
}

/// Normalize any transport-level failure into a connection error.
pub(crate) fn into_connection_error(error: ClientError) -> ClientError {
    match error {
        ClientError::Connection(_) => error,
        other => ClientError::Connection(other.to_string()),
    }
}
