//! Stream session controller.
//!
//! A [`SessionController`] runs at most one streaming session at a time. Each
//! session owns one [`EventChannel`](crate::transport::EventChannel), decodes
//! every inbound message, mirrors progress into the controller's
//! [`StateStore`] and queues [`SessionEvent`]s for the caller.
//!
//! Every session ends with exactly one terminal event (`Completed`, `Failed`
//! or `Cancelled`). The channel is closed and the controller is back to
//! [`SessionPhase::Idle`] before that event is queued, so a caller may start
//! the next session as soon as it sees it.
//!
//! # Example
//! ```no_run
//! use vcx_client::options::{SessionOptions, TransportOptions};
//! use vcx_client::session::SessionEvent;
//! use vcx_client::AgentClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AgentClient::new(TransportOptions::new())?;
//!     let controller = client.controller();
//!
//!     let mut session = controller.start("/api/project/init-stream", SessionOptions::strict())?;
//!     while let Some(event) = session.next().await {
//!         match event {
//!             SessionEvent::Progress(update) => println!("{}", update.message()),
//!             SessionEvent::Completed => println!("done"),
//!             SessionEvent::Failed(e) => eprintln!("failed: {}", e),
//!             SessionEvent::Cancelled => println!("cancelled"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClientError;
use crate::decode::{decode, Decoded};
use crate::model::ProgressUpdate;
use crate::options::SessionOptions;
use crate::store::{SessionState, StateStore};
use crate::transport::{into_connection_error, Transport};

/// Identifies one session on its controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No channel open
    Idle,
    /// Session requested, channel not yet established
    Opening,
    /// Channel open, messages flowing
    Streaming,
    /// Terminal condition reached, channel being closed
    Terminating,
}

/// What the caller receives for a session.
///
/// `Progress` may repeat; exactly one of the other variants ends the session.
#[derive(Debug)]
pub enum SessionEvent {
    Progress(ProgressUpdate),
    Completed,
    Failed(ClientError),
    Cancelled,
}

impl SessionEvent {
    /// Returns true if this event ends the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Progress(_))
    }
}

/// Callback-style consumer of a session, driven by [`SessionHandle::observe`].
pub trait SessionObserver {
    fn on_progress(&mut self, update: ProgressUpdate);

    fn on_complete(&mut self);

    fn on_error(&mut self, error: ClientError);

    /// A cancellation is neither success nor failure.
    fn on_cancelled(&mut self) {}
}

struct Active {
    id: SessionId,
    phase: SessionPhase,
    cancel: CancellationToken,
}

/// State shared between a controller, its session tasks and their handles.
struct Shared {
    active: Mutex<Option<Active>>,
    store: Arc<StateStore>,
    next_id: AtomicU64,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> SessionPhase {
        self.active()
            .as_ref()
            .map_or(SessionPhase::Idle, |active| active.phase)
    }

    /// Move `id` from `from` to `to`. Fails if the session moved on meanwhile.
    fn advance(&self, id: SessionId, from: SessionPhase, to: SessionPhase) -> bool {
        match self.active().as_mut() {
            Some(active) if active.id == id && active.phase == from => {
                active.phase = to;
                true
            }
            _ => false,
        }
    }

    fn terminate(&self, id: SessionId) {
        if let Some(active) = self.active().as_mut().filter(|active| active.id == id) {
            active.phase = SessionPhase::Terminating;
        }
    }

    fn cancel(&self, id: SessionId) -> bool {
        match self.active().as_mut() {
            Some(active) if active.id == id => {
                active.phase = SessionPhase::Terminating;
                active.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Free the slot and publish the session's final state together, so a
    /// listener seeing the store go inactive can start the next session.
    fn release(&self, id: SessionId, last: SessionState) {
        {
            let mut active = self.active();
            if active.as_ref().is_some_and(|a| a.id == id) {
                *active = None;
            }
            self.store.replace(last);
        }
        self.store.notify();
    }
}

/// Runs streaming sessions against a [`Transport`], one at a time.
pub struct SessionController<T: Transport> {
    transport: Arc<T>,
    shared: Arc<Shared>,
}

impl<T: Transport> Clone for SessionController<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for SessionController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("phase", &self.phase())
            .field("store", &self.shared.store)
            .finish()
    }
}

impl<T: Transport> SessionController<T> {
    /// Create a controller with its own, idle state store.
    pub fn new(transport: T) -> Self {
        Self::with_transport(Arc::new(transport))
    }

    /// Create a controller sharing an existing transport.
    pub fn with_transport(transport: Arc<T>) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                store: Arc::new(StateStore::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// State store written by this controller's sessions.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.shared.store
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.phase()
    }

    /// Id of the running session, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        self.shared.active().as_ref().map(|active| active.id)
    }

    /// Start a session streaming from `endpoint`.
    ///
    /// Fails with [`ClientError::AlreadyActive`] while another session runs on
    /// this controller; that session is left untouched. Must be called from
    /// within a tokio runtime. Connection failures are not reported here but
    /// as the session's terminal [`SessionEvent::Failed`].
    pub fn start(&self, endpoint: &str, options: SessionOptions) -> Result<SessionHandle, ClientError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::Config(format!("no tokio runtime: {}", e)))?;

        let cancel = CancellationToken::new();
        let id = {
            let mut active = self.shared.active();
            if let Some(running) = active.as_ref() {
                return Err(ClientError::AlreadyActive(running.id));
            }

            let id = SessionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
            *active = Some(Active {
                id,
                phase: SessionPhase::Opening,
                cancel: cancel.clone(),
            });
            self.shared.store.replace(SessionState::started());
            id
        };

        self.shared.store.notify();
        info!("Starting {} on {} ({:?})", id, endpoint, options.policy);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_session(
            self.transport.clone(),
            self.shared.clone(),
            id,
            endpoint.to_string(),
            options,
            cancel.clone(),
            events_tx,
        ));

        Ok(SessionHandle {
            canceller: SessionCanceller {
                id,
                cancel,
                shared: self.shared.clone(),
            },
            events: events_rx,
            finished: false,
        })
    }

    /// Cancel a running session.
    ///
    /// Returns false if `id` is not the running session. Calling it again
    /// has no further effect.
    pub fn cancel(&self, id: SessionId) -> bool {
        let cancelled = self.shared.cancel(id);
        if cancelled {
            info!("Cancelling {}", id);
        }
        cancelled
    }
}

async fn run_session<T: Transport>(
    transport: Arc<T>,
    shared: Arc<Shared>,
    id: SessionId,
    endpoint: String,
    options: SessionOptions,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let terminal = stream_messages(&*transport, &shared, id, &endpoint, options, &cancel, &events).await;
    shared.terminate(id);

    let last = match &terminal {
        SessionEvent::Failed(e) => {
            warn!("{} failed: {}", id, e);
            SessionState::failed(e.to_string())
        }
        SessionEvent::Cancelled => {
            info!("{} cancelled", id);
            SessionState::default()
        }
        _ => {
            info!("{} completed", id);
            SessionState::default()
        }
    };

    shared.release(id, last);
    let _ = events.send(terminal);
}

/// Pump the channel until a terminal condition. The channel is closed on
/// every path before this returns.
async fn stream_messages<T: Transport>(
    transport: &T,
    shared: &Shared,
    id: SessionId,
    endpoint: &str,
    options: SessionOptions,
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> SessionEvent {
    let timeout = options.timeout;
    let deadline = async move {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return SessionEvent::Cancelled,
        _ = &mut deadline => return timed_out(options),
        opened = transport.open(endpoint) => opened,
    };

    let mut channel = match opened {
        Ok(channel) => channel,
        Err(e) => return SessionEvent::Failed(into_connection_error(e)),
    };

    if !shared.advance(id, SessionPhase::Opening, SessionPhase::Streaming) {
        channel.close();
        return SessionEvent::Cancelled;
    }
    debug!("{} streaming from {}", id, endpoint);

    let terminal = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionEvent::Cancelled,
            _ = &mut deadline => break timed_out(options),
            next = channel.recv() => next,
        };

        let raw = match next {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => break SessionEvent::Failed(into_connection_error(e)),
            None => {
                break SessionEvent::Failed(ClientError::Connection(
                    "stream ended before completion".to_string(),
                ))
            }
        };

        let update = match decode(&raw, options.policy) {
            Decoded::Completion => break SessionEvent::Completed,
            Decoded::Malformed(e) => {
                debug!("{} rejected message {:?}", id, raw);
                break SessionEvent::Failed(ClientError::Decode(e));
            }
            Decoded::Progress(event) => ProgressUpdate::Progress(event),
            Decoded::RawText(text) => ProgressUpdate::Text(text),
        };

        shared.store.update(update.clone());
        let _ = events.send(SessionEvent::Progress(update));
    };

    shared.terminate(id);
    channel.close();
    terminal
}

fn timed_out(options: SessionOptions) -> SessionEvent {
    SessionEvent::Failed(ClientError::Timeout(options.timeout.unwrap_or_default()))
}

/// Cancels one session. Cheap to clone and safe to use from anywhere.
#[derive(Clone)]
pub struct SessionCanceller {
    id: SessionId,
    cancel: CancellationToken,
    shared: Arc<Shared>,
}

impl SessionCanceller {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Cancel the session. No progress, completion or error is delivered
    /// afterwards; the session ends with [`SessionEvent::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.shared.cancel(self.id);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for SessionCanceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCanceller")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Receiving end of one session.
///
/// Dropping the handle before the session ended cancels it.
#[derive(Debug)]
pub struct SessionHandle {
    canceller: SessionCanceller,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    finished: bool,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.canceller.id
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// A detached canceller, for cancelling while the handle is being consumed.
    pub fn canceller(&self) -> SessionCanceller {
        self.canceller.clone()
    }

    /// Next event, or `None` after the terminal event was returned.
    ///
    /// Once the session is cancelled, queued progress is discarded and the
    /// session's own terminal event is awaited and reported as `Cancelled`.
    /// By then the channel is closed and the controller is idle.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        if self.finished {
            return None;
        }

        let event = loop {
            let event = match self.events.recv().await {
                Some(event) => event,
                None if self.canceller.is_cancelled() => break SessionEvent::Cancelled,
                None => {
                    break SessionEvent::Failed(ClientError::Connection(
                        "session ended without a terminal event".to_string(),
                    ))
                }
            };

            if !self.canceller.is_cancelled() {
                break event;
            }
            if event.is_terminal() {
                break SessionEvent::Cancelled;
            }
        };

        if event.is_terminal() {
            self.finished = true;
            self.events.close();
        }
        Some(event)
    }

    /// Turn the handle into a stream of events ending with the terminal one.
    pub fn into_stream(self) -> impl Stream<Item = SessionEvent> + Send {
        stream::unfold(self, |mut handle| async move {
            handle.next().await.map(|event| (event, handle))
        })
    }

    /// Drive the session to its end, dispatching every event to `observer`.
    pub async fn observe<O: SessionObserver + ?Sized>(mut self, observer: &mut O) {
        while let Some(event) = self.next().await {
            match event {
                SessionEvent::Progress(update) => observer.on_progress(update),
                SessionEvent::Completed => observer.on_complete(),
                SessionEvent::Failed(e) => observer.on_error(e),
                SessionEvent::Cancelled => observer.on_cancelled(),
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.canceller.cancel();
        }
    }
}
