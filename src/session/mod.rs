//! Per-session state shared by the connection, health and pipeline
//! components.
//!
//! # Quick start
//!
//! ```rust
//! use avatar_client::connection::ConnectionState;
//! use avatar_client::session::SessionHandle;
//!
//! let session = SessionHandle::new();
//! let snapshot = session.snapshot();
//! assert_eq!(snapshot.connection, ConnectionState::Disconnected);
//! assert!(snapshot.history.is_empty());
//! ```

pub mod message;
pub mod state;

pub use message::{Message, Role};
pub use state::{SessionHandle, SessionSnapshot};
