//! Agent client and error types.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::decode::DecodeError;
use crate::http::{add_extra_headers, build_http_client, endpoint_url};
use crate::model::{HealthStatus, PingResponse};
use crate::options::TransportOptions;
use crate::project;
use crate::session::{SessionController, SessionId};
use crate::transport::HttpTransport;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Decode failure: {0}")]
    Decode(#[from] DecodeError),

    #[error("Session timed out after {0:?}")]
    Timeout(Duration),

    #[error("A session is already active ({0})")]
    AlreadyActive(SessionId),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Client for a VCX agent.
///
/// Construct one per agent and hand it to whatever owns the UI or session
/// lifecycle. Clones share the underlying connection pool.
///
/// # Example
/// ```no_run
/// use vcx_client::options::TransportOptions;
/// use vcx_client::AgentClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = AgentClient::new(TransportOptions::new())?;
///     let health = client.health().await?;
///     println!("agent status: {}", health.status);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    options: Arc<TransportOptions>,
}

impl AgentClient {
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        if reqwest::Url::parse(&options.base_url).is_err() {
            return Err(ClientError::Config(format!(
                "invalid base URL: {}",
                options.base_url
            )));
        }

        let http = build_http_client(&options)?;
        Ok(Self {
            http,
            options: Arc::new(options),
        })
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Check the agent's health.
    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.get_json(project::HEALTH).await
    }

    /// Ping the agent.
    pub async fn ping(&self) -> Result<PingResponse, ClientError> {
        self.get_json(project::PING).await
    }

    /// Run project initialization and wait for the whole text result.
    pub async fn project_init(&self) -> Result<String, ClientError> {
        let response = self.get(project::INIT).await?;
        Ok(response.text().await?)
    }

    /// Event-stream transport sharing this client's connection pool.
    pub fn transport(&self) -> HttpTransport {
        HttpTransport::new(self.http.clone(), self.options.clone())
    }

    /// A new session controller with its own state store.
    pub fn controller(&self) -> SessionController<HttpTransport> {
        SessionController::new(self.transport())
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClientError> {
        let response = self.get(endpoint).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get(&self, endpoint: &str) -> Result<reqwest::Response, ClientError> {
        let url = endpoint_url(&self.options.base_url, endpoint);
        debug!("GET {}", url);

        let mut req = self.http.get(&url).header(ACCEPT, "*/*");
        if let Some(timeout) = self.options.timeout {
            req = req.timeout(timeout);
        }
        req = add_extra_headers(req, &self.options.extra_headers);

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SessionOptions;
    use crate::session::SessionEvent;
    use crate::test_support::{http_response, serve_once};

    fn client_for(base_url: String) -> AgentClient {
        AgentClient::new(
            TransportOptions::new()
                .with_base_url(base_url)
                .with_header("X-Client".to_string(), "vcx-test".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_base_url() {
        let err = AgentClient::new(TransportOptions::new().with_base_url("not a url".to_string()))
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ClientError::Connection("reset".to_string()).to_string(),
            "Connection error: reset"
        );
        assert_eq!(
            ClientError::Decode(DecodeError::MissingField("step")).to_string(),
            "Decode failure: missing field `step`"
        );
    }

    #[tokio::test]
    async fn test_health() {
        let (base_url, request) =
            serve_once(http_response("200 OK", "application/json", r#"{"status":"ok"}"#)).await;

        let health = client_for(base_url).health().await.unwrap();
        assert!(health.is_ok());

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /health "));
        assert!(request.to_ascii_lowercase().contains("x-client: vcx-test"));
    }

    #[tokio::test]
    async fn test_ping() {
        let body = r#"{"method":"GET","timestamp":"2025-01-01T10:00:00.000000001Z"}"#;
        let (base_url, request) = serve_once(http_response("200 OK", "application/json", body)).await;

        let ping = client_for(base_url).ping().await.unwrap();
        assert_eq!(ping.method, "GET");
        assert!(request.await.unwrap().starts_with("GET /ping "));
    }

    #[tokio::test]
    async fn test_project_init_returns_text() {
        let (base_url, request) = serve_once(http_response(
            "200 OK",
            "text/plain",
            "temp Files processed: 3\n",
        ))
        .await;

        let text = client_for(base_url).project_init().await.unwrap();
        assert_eq!(text, "temp Files processed: 3\n");
        assert!(request.await.unwrap().starts_with("GET /api/project/init "));
    }

    #[tokio::test]
    async fn test_status_error_is_surfaced_once() {
        let (base_url, _request) =
            serve_once(http_response("503 Service Unavailable", "text/plain", "busy")).await;

        match client_for(base_url).health().await {
            Err(ClientError::Status { status, body }) => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_health_invalid_json() {
        let (base_url, _request) =
            serve_once(http_response("200 OK", "application/json", "{\"status\":")).await;

        let err = client_for(base_url).health().await.unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[tokio::test]
    async fn test_stream_over_http() {
        let body = concat!(
            "{\"step\": 1, \"total\": 2, \"message\": \"Creating project directory...\"}\n",
            "{\"step\": 2, \"total\": 2, \"message\": \"Project initialized successfully!\"}\n",
            "{\"completed\": true}\n",
        );
        let (base_url, _request) =
            serve_once(http_response("200 OK", "text/event-stream", body)).await;

        let controller = client_for(base_url).controller();
        let mut session = controller
            .start(project::INIT_STREAM, SessionOptions::strict())
            .unwrap();

        let mut messages = Vec::new();
        let terminal = loop {
            match session.next().await {
                Some(SessionEvent::Progress(update)) => messages.push(update.message().to_string()),
                Some(other) => break other,
                None => panic!("session ended without terminal event"),
            }
        };

        assert!(matches!(terminal, SessionEvent::Completed));
        assert_eq!(
            messages,
            vec!["Creating project directory...", "Project initialized successfully!"]
        );
    }
}
