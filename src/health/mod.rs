//! Service health monitoring.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use avatar_client::config::AppConfig;
//! use avatar_client::health::HealthMonitor;
//! use avatar_client::session::SessionHandle;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let monitor = Arc::new(HealthMonitor::http(&config, SessionHandle::new()));
//!     let mut status = monitor.subscribe();
//!     let _task = Arc::clone(&monitor).spawn();
//!
//!     status.changed().await.unwrap();
//!     println!("down: {:?}", status.borrow().down());
//! }
//! ```

pub mod monitor;
pub mod status;

pub use monitor::{HealthMonitor, HealthProbe, HttpProbe};
pub use status::{ServiceHealth, ServiceId, ServiceStatus};
