//! Client-side orchestration core for a talking-avatar assistant.
//!
//! * [`connection`]: self-healing coordination channel (WebSocket).
//! * [`health`]: periodic reachability checks of the inference services.
//! * [`pipeline`]: recognize → generate → synthesize → animate, one turn at
//!   a time.
//! * [`session`]: the shared session aggregate and message history.
//! * [`services`]: clients for the inference services.
//! * [`audio`]: push-to-talk capture and WAV packaging.
//! * [`config`]: TOML settings.

pub mod audio;
pub mod config;
pub mod connection;
pub mod health;
pub mod pipeline;
pub mod services;
pub mod session;
