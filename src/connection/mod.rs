//! Coordination channel: a persistent, self-healing duplex connection.
//!
//! * [`state`]: the pure reconnect state machine ([`ConnectionFsm`]).
//! * [`manager`]: the tokio actor that drives it ([`ConnectionManager`]).
//! * [`transport`]: the link seam and its WebSocket implementation.
//! * [`protocol`]: JSON frames exchanged with the server.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use avatar_client::config::AppConfig;
//! use avatar_client::connection::{ConnectionManager, OutboundMessage, WebSocketConnector};
//! use avatar_client::session::SessionHandle;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let session = SessionHandle::new();
//!     let manager = ConnectionManager::spawn(
//!         &config.connection,
//!         Arc::new(WebSocketConnector),
//!         session.clone(),
//!     );
//!     manager.connect();
//!
//!     // Always check the result: nothing is queued while disconnected.
//!     if let Err(e) = manager.send(&OutboundMessage::user_message("hello")).await {
//!         eprintln!("not delivered: {e}");
//!     }
//! }
//! ```

pub mod manager;
pub mod protocol;
pub mod state;
pub mod transport;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use manager::{
    ConnectionHandlers, ConnectionManager, ConnectionStatus, ErrorHandler, MessageHandler,
    SendError, StateHandler,
};
pub use protocol::{InboundMessage, OutboundMessage};
pub use state::{ConnectionEvent, ConnectionFsm, ConnectionState, Effect};
pub use transport::{Connector, Link, LinkReader, LinkWriter, TransportError, WebSocketConnector};
