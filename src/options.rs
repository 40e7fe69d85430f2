//! Options structures for transport and session configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Default address of a locally running VCX agent.
pub const DEFAULT_BASE_URL: &str = "http://localhost:9847";

/// Transport configuration shared by plain requests and event streams.
///
/// # Example
/// ```rust
/// use vcx_client::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new()
///     .with_base_url("http://127.0.0.1:9000".to_string())
///     .with_timeout(Duration::from_secs(10));
///
/// assert_eq!(options.base_url, "http://127.0.0.1:9000");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base URL of the agent, without a trailing slash
    pub base_url: String,

    /// Timeout for establishing a connection (applies to streams too)
    pub connect_timeout: Option<Duration>,

    /// Whole-request timeout for plain request/response calls.
    /// Never applied to event streams, which are long-lived by nature.
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportOptions {
    /// Create transport options pointing at the default local agent.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: None,
            timeout: None,
            proxy: None,
            extra_headers: None,
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the request timeout for plain calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}

/// How a session treats messages that are not structured records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Unstructured messages are forwarded verbatim as text updates.
    Lenient,

    /// Unstructured messages are decode failures and end the session.
    #[default]
    Strict,
}

/// Per-session configuration passed to `SessionController::start`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Decoding policy for inbound messages
    pub policy: DecodePolicy,

    /// Upper bound on the whole session. When it elapses the channel is
    /// closed and the session fails as if the transport had dropped.
    pub timeout: Option<Duration>,
}

impl SessionOptions {
    /// Options for a session that accepts plain text messages.
    pub fn lenient() -> Self {
        Self {
            policy: DecodePolicy::Lenient,
            timeout: None,
        }
    }

    /// Options for a session that only accepts structured records.
    pub fn strict() -> Self {
        Self {
            policy: DecodePolicy::Strict,
            timeout: None,
        }
    }

    /// Set the session timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
