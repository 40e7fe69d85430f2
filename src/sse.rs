//! Server-Sent Events (SSE) stream framing.
//!
//! Turns a chunked byte stream into a stream of text messages. Two line
//! shapes are accepted because the agent does not always speak strict SSE:
//!
//! ```text
//! data: {"step": 1, "total": 5, "message": "Creating project directory..."}
//!
//! /Users/someone/project/src/main.rs
//! {"completed": true}
//! ```
//!
//! `data:` fields accumulate until an empty line, as in the SSE standard.
//! Any other line that is not an SSE field or comment is a complete message
//! on its own and is passed on verbatim, whitespace included.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use futures::stream::{self, Stream, StreamExt};

use crate::client::ClientError;

/// Extension trait for `reqwest::Response` to enable SSE streaming.
///
/// # Example
/// ```ignore
/// use vcx_client::sse::SseResponseExt;
///
/// let response = client.get("http://localhost:9847/api/project/init-stream").send().await?;
///
/// let mut stream = response.sse();
/// while let Some(result) = stream.next().await {
///     let message = result?;
///     println!("SSE data: {}", message);
/// }
/// ```
pub trait SseResponseExt {
    /// Convert the response into a stream of framed text messages.
    fn sse(self) -> impl Stream<Item = Result<String, ClientError>> + Send;
}

impl SseResponseExt for reqwest::Response {
    fn sse(self) -> impl Stream<Item = Result<String, ClientError>> + Send {
        sse_messages(self.bytes_stream())
    }
}

/// Frame any byte stream into SSE messages.
///
/// Transport errors are yielded in place and end the stream.
pub fn sse_messages<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ClientError> + Send,
{
    stream::unfold(
        (Box::pin(byte_stream), SseFramer::new(), VecDeque::new(), false),
        |(mut byte_stream, mut framer, mut ready, mut ended)| async move {
            loop {
                if let Some(message) = ready.pop_front() {
                    return Some((Ok(message), (byte_stream, framer, ready, ended)));
                }

                if ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(chunk)) => ready.extend(framer.push(chunk.as_ref())),
                    Some(Err(e)) => {
                        ended = true;
                        return Some((Err(e.into()), (byte_stream, framer, ready, ended)));
                    }
                    None => {
                        ended = true;
                        ready.extend(framer.finish());
                    }
                }
            }
        },
    )
}

/// Incremental line framer.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across chunks survive intact.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: BytesMut,
    data: Option<String>,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every message it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            let line = String::from_utf8_lossy(&line);
            self.process_line(line.trim_end_matches('\r'), &mut messages);
        }
        messages
    }

    /// Flush a trailing unterminated line and any pending `data:` block.
    pub fn finish(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let line = String::from_utf8_lossy(&rest);
            self.process_line(line.trim_end_matches('\r'), &mut messages);
        }
        self.dispatch(&mut messages);
        messages
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }

        match parse_sse_field(line) {
            Some(SseLine::Data(value)) => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            Some(SseLine::Comment) | Some(SseLine::Ignored) => {}
            None => {
                self.dispatch(out);
                out.push(line.to_string());
            }
        }
    }

    fn dispatch(&mut self, out: &mut Vec<String>) {
        if let Some(data) = self.data.take() {
            out.push(data);
        }
    }
}

/// Classification of a single SSE line.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Value of a `data:` field
    Data(&'a str),
    /// A line starting with `:`
    Comment,
    /// `event:`, `id:` or `retry:` fields, which carry nothing we use
    Ignored,
}

/// Parse an SSE line into a field, or `None` for a bare line.
///
/// # Example
/// ```
/// use vcx_client::sse::{parse_sse_field, SseLine};
///
/// assert_eq!(parse_sse_field("data: {\"completed\": true}"), Some(SseLine::Data("{\"completed\": true}")));
/// assert_eq!(parse_sse_field(": keep-alive"), Some(SseLine::Comment));
/// assert_eq!(parse_sse_field("Files processed: 3"), None);
/// ```
pub fn parse_sse_field(line: &str) -> Option<SseLine<'_>> {
    if line.starts_with(':') {
        return Some(SseLine::Comment);
    }

    let (name, value) = match line.split_once(':') {
        Some((name, value)) => (name, value),
        None => (line, ""),
    };

    match name {
        "data" => Some(SseLine::Data(value.strip_prefix(' ').unwrap_or(value))),
        "event" | "id" | "retry" => Some(SseLine::Ignored),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_parse_sse_field() {
        assert_eq!(parse_sse_field("data: hello"), Some(SseLine::Data("hello")));
        assert_eq!(parse_sse_field("data:hello"), Some(SseLine::Data("hello")));
        assert_eq!(parse_sse_field("data:  two"), Some(SseLine::Data(" two")));
        assert_eq!(parse_sse_field("data"), Some(SseLine::Data("")));
        assert_eq!(parse_sse_field("event: progress"), Some(SseLine::Ignored));
        assert_eq!(parse_sse_field("retry: 100"), Some(SseLine::Ignored));
        assert_eq!(parse_sse_field(":"), Some(SseLine::Comment));
        assert_eq!(parse_sse_field("invalid"), None);
        assert_eq!(parse_sse_field("/tmp/a:b"), None);
    }

    #[test]
    fn test_framer_sse_blocks() {
        let mut framer = SseFramer::new();
        let out = framer.push(b"data: {\"step\": 1,\ndata: \"total\": 2}\n\ndata: x\n");
        assert_eq!(out, vec!["{\"step\": 1,\n\"total\": 2}".to_string()]);
        assert_eq!(framer.finish(), vec!["x".to_string()]);
    }

    #[test]
    fn test_framer_bare_lines() {
        let mut framer = SseFramer::new();
        let out = framer.push(b"first line\r\nsecond: line\n{\"completed\": true}\n");
        assert_eq!(out, vec!["first line", "second: line", "{\"completed\": true}"]);
        assert!(framer.finish().is_empty());
    }

    #[test]
    fn test_framer_keeps_bare_line_whitespace() {
        let mut framer = SseFramer::new();
        let out = framer.push(b"  indented/path.go  \r\n   \n\n");
        assert_eq!(out, vec!["  indented/path.go  ", "   "]);
    }

    #[test]
    fn test_framer_split_across_chunks() {
        let mut framer = SseFramer::new();
        let text = "data: caf\u{e9}\n\n";
        let bytes = text.as_bytes();
        // split inside the two-byte 'é'
        let split = text.find('\u{e9}').unwrap() + 1;
        assert!(framer.push(&bytes[..split]).is_empty());
        assert_eq!(framer.push(&bytes[split..]), vec!["caf\u{e9}".to_string()]);
    }

    #[test]
    fn test_framer_comments_and_unterminated_tail() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b": ping\n\nid: 7\n").is_empty());
        assert!(framer.push(b"tail without newline").is_empty());
        assert_eq!(framer.finish(), vec!["tail without newline".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_messages_over_byte_stream() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"data: {\"step\": 1, \"total\": 2, \"mes")),
            Ok(Bytes::from_static(b"sage\": \"a\"}\n\nplain\n")),
            Ok(Bytes::from_static(b"data: {\"completed\": true}")),
        ];
        let messages: Vec<String> = sse_messages(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(
            messages,
            vec![
                "{\"step\": 1, \"total\": 2, \"message\": \"a\"}".to_string(),
                "plain".to_string(),
                "{\"completed\": true}".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_sse_messages_error_ends_stream() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"one\n")),
            Err(ClientError::Connection("reset".to_string())),
            Ok(Bytes::from_static(b"two\n")),
        ];
        let results: Vec<Result<String, ClientError>> =
            sse_messages(stream::iter(chunks)).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "one");
        assert!(matches!(results[1], Err(ClientError::Connection(_))));
    }
}
