//! # vcx-client - VCX agent control client
//!
//! A small Rust library for triggering the VCX agent's project
//! initialization and following its progress over a long-lived event stream.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Incremental SSE / newline-delimited framing
//! - Lenient and strict decoding of progress messages
//! - One-session-at-a-time controller with cancellation and timeouts
//! - Observable state store for UI layers
//!
//! ## Architecture
//!
//! - **`Transport`**: opens an `EventChannel` for an endpoint (`HttpTransport` over reqwest)
//! - **`decode`**: pure classification of one raw message
//! - **`SessionController`**: owns one channel per session and guarantees a
//!   single terminal event after the channel is closed
//! - **`StateStore`**: latest progress, error and activity flag, written by the controller
//!
//! ## Example
//! ```no_run
//! use vcx_client::options::TransportOptions;
//! use vcx_client::session::SessionObserver;
//! use vcx_client::model::ProgressUpdate;
//! use vcx_client::{project, AgentClient, ClientError};
//!
//! struct Printer;
//!
//! impl SessionObserver for Printer {
//!     fn on_progress(&mut self, update: ProgressUpdate) {
//!         println!("{}", update.message());
//!     }
//!
//!     fn on_complete(&mut self) {
//!         println!("done");
//!     }
//!
//!     fn on_error(&mut self, error: ClientError) {
//!         eprintln!("failed: {}", error);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AgentClient::new(TransportOptions::new())?;
//!     let controller = client.controller();
//!
//!     let session = project::init_stream(&controller, None)?;
//!     session.observe(&mut Printer).await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod decode;
pub mod http;
pub mod model;
pub mod options;
pub mod project;
pub mod session;
pub mod sse;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use client::{AgentClient, ClientError};
pub use decode::{decode, Decoded, DecodeError};
pub use model::{ProgressEvent, ProgressUpdate};
pub use session::{SessionController, SessionEvent, SessionHandle, SessionObserver};
pub use store::{SessionState, StateStore};
pub use transport::{EventChannel, HttpTransport, Transport};
