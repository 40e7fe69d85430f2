//! Agent endpoints and the two flavours of project initialization streams.
//!
//! - [`init_stream_simple`] follows `/api/project/init`, which reports each
//!   processed file as a plain text line. Decoded leniently.
//! - [`init_stream`] follows `/api/project/init-stream`, which reports
//!   structured `{step, total, message}` records. Decoded strictly.

use std::time::Duration;

use crate::client::ClientError;
use crate::options::SessionOptions;
use crate::session::{SessionController, SessionHandle};
use crate::transport::Transport;

pub const HEALTH: &str = "/health";
pub const PING: &str = "/ping";
pub const INIT: &str = "/api/project/init";
pub const INIT_STREAM: &str = "/api/project/init-stream";

/// Stream project initialization as plain text lines.
pub fn init_stream_simple<T: Transport>(
    controller: &SessionController<T>,
    timeout: Option<Duration>,
) -> Result<SessionHandle, ClientError> {
    let options = SessionOptions {
        timeout,
        ..SessionOptions::lenient()
    };
    controller.start(INIT, options)
}

/// Stream project initialization as structured progress.
pub fn init_stream<T: Transport>(
    controller: &SessionController<T>,
    timeout: Option<Duration>,
) -> Result<SessionHandle, ClientError> {
    let options = SessionOptions {
        timeout,
        ..SessionOptions::strict()
    };
    controller.start(INIT_STREAM, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProgressEvent, ProgressUpdate};
    use crate::session::SessionEvent;
    use crate::test_support::ScriptedTransport;

    #[tokio::test]
    async fn test_simple_stream_is_lenient() {
        let transport = ScriptedTransport::new();
        let feed = transport.feed();
        feed.send("/Users/someone/dev/temp/main.go");
        feed.send(r#"{"completed": true}"#);

        let controller = SessionController::new(transport);
        let mut session = init_stream_simple(&controller, None).unwrap();

        assert!(matches!(
            session.next().await,
            Some(SessionEvent::Progress(ProgressUpdate::Text(ref t))) if t == "/Users/someone/dev/temp/main.go"
        ));
        assert!(matches!(session.next().await, Some(SessionEvent::Completed)));
        assert_eq!(controller.transport().opened(), vec![INIT.to_string()]);
    }

    #[tokio::test]
    async fn test_progress_stream_is_strict() {
        let transport = ScriptedTransport::new();
        let feed = transport.feed();
        feed.send(r#"{"step": 1, "total": 5, "message": "Creating project directory..."}"#);
        feed.send("unexpected text");

        let controller = SessionController::new(transport);
        let mut session = init_stream(&controller, Some(Duration::from_secs(5))).unwrap();

        match session.next().await {
            Some(SessionEvent::Progress(ProgressUpdate::Progress(event))) => {
                assert_eq!(event, ProgressEvent::new(1, 5, "Creating project directory..."))
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            session.next().await,
            Some(SessionEvent::Failed(ClientError::Decode(_)))
        ));
        assert_eq!(controller.transport().opened(), vec![INIT_STREAM.to_string()]);
    }
}
