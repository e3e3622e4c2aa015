//! The session aggregate and its shared handle.
//!
//! [`Session`] is the single owner of per-session state: connection state,
//! service status, the active and last pipeline run, and the message
//! history. It lives behind [`SessionHandle`] (`Arc<Mutex<Session>>`).
//!
//! Readers get snapshots. Every mutator is crate-private and has exactly one
//! writer:
//!
//! | Field | Writer |
//! |-------|--------|
//! | `connection` | `ConnectionManager` |
//! | `services` | `HealthMonitor` (wholesale replacement only) |
//! | `active_run`, `last_run`, `history` | `PipelineCoordinator` |
//!
//! Run mutators take the run id and do nothing unless it matches the active
//! run, so a superseded run can never write into the session.
//!
//! The lock is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::connection::ConnectionState;
use crate::health::ServiceStatus;
use crate::pipeline::{FailureDetail, PipelineRun, RunId, RunStage, StageResults};

use super::message::Message;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Session {
    id: Uuid,
    connection: ConnectionState,
    services: ServiceStatus,
    active_run: Option<PipelineRun>,
    last_run: Option<PipelineRun>,
    history: Vec<Message>,
}

impl Session {
    fn active_mut(&mut self, id: RunId) -> Option<&mut PipelineRun> {
        self.active_run.as_mut().filter(|run| run.id == id)
    }

    fn take_active(&mut self, id: RunId) -> Option<PipelineRun> {
        if self.active_run.as_ref().is_some_and(|run| run.id == id) {
            self.active_run.take()
        } else {
            None
        }
    }
}

/// Point-in-time copy of the session for the interface layer.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub connection: ConnectionState,
    pub services: ServiceStatus,
    pub active_run: Option<PipelineRun>,
    pub last_run: Option<PipelineRun>,
    pub history: Vec<Message>,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable handle to the session.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Session {
            id: Uuid::new_v4(),
            connection: ConnectionState::default(),
            services: ServiceStatus::default(),
            active_run: None,
            last_run: None,
            history: Vec::new(),
        })))
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.lock().id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lock().connection
    }

    pub fn services(&self) -> ServiceStatus {
        self.lock().services.clone()
    }

    pub fn active_run(&self) -> Option<PipelineRun> {
        self.lock().active_run.clone()
    }

    pub fn last_run(&self) -> Option<PipelineRun> {
        self.lock().last_run.clone()
    }

    /// `true` while a run is in a non-terminal stage.
    pub fn is_busy(&self) -> bool {
        self.lock().active_run.is_some()
    }

    pub fn history(&self) -> Vec<Message> {
        self.lock().history.clone()
    }

    /// The last `n` messages, oldest first.
    pub fn recent_history(&self, n: usize) -> Vec<Message> {
        let session = self.lock();
        let start = session.history.len().saturating_sub(n);
        session.history[start..].to_vec()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.lock();
        SessionSnapshot {
            id: session.id,
            connection: session.connection,
            services: session.services.clone(),
            active_run: session.active_run.clone(),
            last_run: session.last_run.clone(),
            history: session.history.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Writes: ConnectionManager
    // -----------------------------------------------------------------------

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        self.lock().connection = state;
    }

    // -----------------------------------------------------------------------
    // Writes: HealthMonitor
    // -----------------------------------------------------------------------

    pub(crate) fn replace_services(&self, status: ServiceStatus) {
        self.lock().services = status;
    }

    // -----------------------------------------------------------------------
    // Writes: PipelineCoordinator
    // -----------------------------------------------------------------------

    /// Install `run` as the active run and return the run it displaced.
    pub(crate) fn begin_run(&self, run: PipelineRun) -> Option<PipelineRun> {
        self.lock().active_run.replace(run)
    }

    #[cfg(test)]
    pub(crate) fn is_active_run(&self, id: RunId) -> bool {
        self.lock().active_run.as_ref().is_some_and(|run| run.id == id)
    }

    pub(crate) fn advance_run(&self, id: RunId, stage: RunStage) -> bool {
        match self.lock().active_mut(id) {
            Some(run) => {
                run.stage = stage;
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_results(&self, id: RunId, results: &StageResults) -> bool {
        match self.lock().active_mut(id) {
            Some(run) => {
                run.results = results.clone();
                true
            }
            None => false,
        }
    }

    /// Move the run to `Failed` and keep it as the last run.
    pub(crate) fn fail_run(
        &self,
        id: RunId,
        failure: FailureDetail,
        finished_at: DateTime<Utc>,
    ) -> bool {
        let mut session = self.lock();
        let Some(mut run) = session.take_active(id) else {
            return false;
        };
        run.stage = RunStage::Failed;
        run.failure = Some(failure);
        run.finished_at = Some(finished_at);
        session.last_run = Some(run);
        true
    }

    /// Move the run to `Done` and append the user and assistant messages,
    /// in that order, under a single lock.
    pub(crate) fn complete_run(
        &self,
        id: RunId,
        results: StageResults,
        finished_at: DateTime<Utc>,
        user: Message,
        assistant: Message,
    ) -> bool {
        let mut session = self.lock();
        let Some(mut run) = session.take_active(id) else {
            return false;
        };
        run.stage = RunStage::Done;
        run.results = results;
        run.finished_at = Some(finished_at);
        session.last_run = Some(run);
        session.history.push(user);
        session.history.push(assistant);
        true
    }

    /// Drop the active run without recording an outcome.
    pub(crate) fn cancel_run(&self, id: RunId) -> bool {
        self.lock().take_active(id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn append(&self, message: Message) {
        self.lock().history.push(message);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
