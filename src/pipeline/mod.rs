//! Conversation pipeline: one user turn through recognize → generate →
//! synthesize → animate.
//!
//! * [`run`]: run identity, stages, and accumulated results.
//! * [`error`]: failure kinds and the reported outcome taxonomy.
//! * [`context`]: conversation context sent to the generator.
//! * [`coordinator`]: [`PipelineCoordinator`], which runs the stages.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use avatar_client::config::AppConfig;
//! use avatar_client::connection::{ConnectionManager, WebSocketConnector};
//! use avatar_client::pipeline::{PipelineCoordinator, PipelineInput};
//! use avatar_client::services::ServiceSet;
//! use avatar_client::session::SessionHandle;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let session = SessionHandle::new();
//!     let connection =
//!         ConnectionManager::spawn(&config.connection, Arc::new(WebSocketConnector), session.clone());
//!     connection.connect();
//!
//!     let coordinator = PipelineCoordinator::new(
//!         session.clone(),
//!         connection.subscribe(),
//!         ServiceSet::http(&config),
//!         &config.pipeline,
//!     );
//!     match coordinator.run_pipeline(PipelineInput::text("Hello")).await {
//!         Ok(done) => println!("{} → {}", done.response_text, done.media),
//!         Err(e) if e.is_reportable() => eprintln!("{e}"),
//!         Err(_) => {} // superseded by a newer turn
//!     }
//! }
//! ```

pub mod context;
pub mod coordinator;
pub mod error;
pub mod run;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use context::ConversationContext;
pub use coordinator::{CompletedRun, PipelineCoordinator, PipelineEvent};
pub use error::{FailureKind, PipelineError, ResultKind};
pub use run::{FailureDetail, PipelineInput, PipelineRun, RunId, RunStage, StageResults};
