//! Helpers shared by unit tests: a scripted in-memory transport and a
//! one-shot HTTP server.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::ClientError;
use crate::transport::{EventChannel, Transport};

enum Script {
    Refuse(String),
    Stream(mpsc::UnboundedReceiver<Result<String, ClientError>>),
}

/// Transport whose channels are fed by the test through [`Feed`]s.
/// Each `open` consumes the next queued script in order.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a channel for the next `open` and return its feeding side.
    pub(crate) fn feed(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(Script::Stream(rx));
        Feed { tx: Some(tx) }
    }

    /// Make the next `open` fail.
    pub(crate) fn refuse(&self, reason: &str) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Refuse(reason.to_string()));
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, endpoint: &str) -> Result<EventChannel, ClientError> {
        self.opened.lock().unwrap().push(endpoint.to_string());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Stream(rx)) => {
                let messages = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|message| (message, rx))
                });
                Ok(EventChannel::new(endpoint, messages))
            }
            Some(Script::Refuse(reason)) => Err(ClientError::Connection(reason)),
            None => Err(ClientError::Connection("no scripted channel".to_string())),
        }
    }
}

/// Server side of a scripted channel.
pub(crate) struct Feed {
    tx: Option<mpsc::UnboundedSender<Result<String, ClientError>>>,
}

impl Feed {
    pub(crate) fn send(&self, message: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Ok(message.to_string()));
        }
    }

    pub(crate) fn fail(&self, error: ClientError) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(error));
        }
    }

    /// End the stream from the server side.
    pub(crate) fn end(&mut self) {
        self.tx = None;
    }

    /// True once the client side has closed the channel.
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

pub(crate) fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Serve exactly one connection with a canned response.
///
/// Returns the base URL and a handle resolving to the raw request head.
pub(crate) async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });

    (base_url, handle)
}
