//! Pipeline coordinator: drives one user turn through recognize → generate
//! → synthesize → animate.
//!
//! # Run flow
//!
//! ```text
//! run_pipeline(input)
//!   ├─ channel not Connected ─▶ Err(ConnectionRequired)   (no service call)
//!   ├─ cancel previous run's token, install new run id
//!   ├─ for each stage:
//!   │     advance run ─▶ StageStarted event
//!   │     select { token cancelled ─▶ Err(Cancelled),
//!   │              timeout(stage_timeout, dispatch(stage)) }
//!   │     fault ─▶ run Failed, Failed event, Err(Stage { .. })
//!   └─ run Done, user + assistant messages appended, Completed event
//! ```
//!
//! Only one run is active at a time. Starting a new run supersedes the old
//! one: its token is cancelled and its id no longer matches, so any result
//! it still produces is dropped instead of reaching the session or the
//! event stream.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::connection::ConnectionStatus;
use crate::services::{AudioRef, MediaRef, ServiceError, ServiceSet, SynthesisRequest};
use crate::session::{Message, SessionHandle};

use super::context::ConversationContext;
use super::error::{FailureKind, PipelineError, ResultKind};
use super::run::{FailureDetail, PipelineInput, PipelineRun, RunId, RunStage, StageResults};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Progress notifications for the interface layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageStarted {
        run_id: RunId,
        stage: RunStage,
    },
    Completed {
        run_id: RunId,
        response_text: String,
        media: MediaRef,
    },
    Failed {
        run_id: RunId,
        kind: ResultKind,
        message: String,
    },
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRun {
    pub run_id: RunId,
    pub recognized_text: String,
    pub response_text: String,
    pub emotion: Option<String>,
    pub audio: AudioRef,
    pub media: MediaRef,
}

impl CompletedRun {
    fn from_results(run_id: RunId, results: &StageResults) -> Option<Self> {
        Some(Self {
            run_id,
            recognized_text: results.recognized_text.clone()?,
            response_text: results.response_text.clone()?,
            emotion: results.emotion.clone(),
            audio: results.audio.clone()?,
            media: results.media.clone()?,
        })
    }

    pub fn kind(&self) -> ResultKind {
        ResultKind::Completed
    }
}

// ---------------------------------------------------------------------------
// Stage plumbing
// ---------------------------------------------------------------------------

enum StageOutput {
    Recognized(String),
    Generated { text: String, emotion: Option<String> },
    Synthesized(AudioRef),
    Animated(MediaRef),
}

impl StageOutput {
    fn apply(self, results: &mut StageResults) {
        match self {
            StageOutput::Recognized(text) => results.recognized_text = Some(text),
            StageOutput::Generated { text, emotion } => {
                results.response_text = Some(text);
                results.emotion = emotion;
            }
            StageOutput::Synthesized(audio) => results.audio = Some(audio),
            StageOutput::Animated(media) => results.media = Some(media),
        }
    }
}

struct StageFault {
    kind: FailureKind,
    detail: String,
}

impl StageFault {
    fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    fn missing(what: &str) -> Self {
        Self::new(FailureKind::Failed, format!("no {what} from the previous stage"))
    }
}

impl From<ServiceError> for StageFault {
    fn from(e: ServiceError) -> Self {
        Self::new(FailureKind::from_service(&e), e.to_string())
    }
}

struct ActiveRun {
    id: RunId,
    token: CancellationToken,
}

struct ReleaseOnDrop<'a> {
    coordinator: &'a PipelineCoordinator,
    run_id: RunId,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        let mut active = self.coordinator.lock_active();
        if active.as_ref().is_some_and(|a| a.id == self.run_id) {
            *active = None;
            // No-op when the run already reached Done or Failed.
            self.coordinator.session.cancel_run(self.run_id);
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineCoordinator
// ---------------------------------------------------------------------------

/// Shared by every caller (wrap it in an `Arc`); [`run_pipeline`] takes
/// `&self`.
///
/// [`run_pipeline`]: Self::run_pipeline
pub struct PipelineCoordinator {
    session: SessionHandle,
    connection: watch::Receiver<ConnectionStatus>,
    services: ServiceSet,
    config: PipelineConfig,
    context: ConversationContext,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
    /// The run currently allowed to write. Locked before the session so run
    /// hand-over and result publication never interleave.
    active: Mutex<Option<ActiveRun>>,
}

impl PipelineCoordinator {
    pub fn new(
        session: SessionHandle,
        connection: watch::Receiver<ConnectionStatus>,
        services: ServiceSet,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            session,
            connection,
            services,
            context: ConversationContext::new(config.context_messages),
            config: config.clone(),
            events: None,
            active: Mutex::new(None),
        }
    }

    /// Send [`PipelineEvent`]s to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Process one user turn.
    ///
    /// Resolves to [`PipelineError::Cancelled`] if a newer call supersedes
    /// this one before it finishes.
    pub async fn run_pipeline(&self, input: PipelineInput) -> Result<CompletedRun, PipelineError> {
        let state = self.connection.borrow().state;
        if !state.is_connected() {
            log::warn!("pipeline: refusing run, coordination channel is {state}");
            return Err(PipelineError::ConnectionRequired);
        }

        let run = PipelineRun::new(input.clone(), Utc::now());
        let run_id = run.id;
        let results = run.results.clone();
        let token = CancellationToken::new();
        {
            let mut active = self.lock_active();
            if let Some(previous) = active.replace(ActiveRun {
                id: run_id,
                token: token.clone(),
            }) {
                log::info!("pipeline: run {} superseded by {run_id}", previous.id);
                previous.token.cancel();
            }
            self.session.begin_run(run);
        }
        log::info!("pipeline: run {run_id} started");

        // Releases the slot on every exit, including the caller dropping us.
        let _release = ReleaseOnDrop {
            coordinator: self,
            run_id,
        };
        self.drive(run_id, &input, results, &token).await
    }

    /// Cancel the active run, if any, without starting a new one.
    pub fn cancel_active(&self) -> Option<RunId> {
        let mut active = self.lock_active();
        let run = active.take()?;
        run.token.cancel();
        self.session.cancel_run(run.id);
        log::info!("pipeline: run {} cancelled", run.id);
        Some(run.id)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` only while `run_id` still owns the active slot, keeping the
    /// slot locked for the duration.
    fn if_current<T>(&self, run_id: RunId, f: impl FnOnce() -> T) -> Option<T> {
        let active = self.lock_active();
        if active.as_ref().map(|a| a.id) != Some(run_id) {
            return None;
        }
        Some(f())
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    async fn drive(
        &self,
        run_id: RunId,
        input: &PipelineInput,
        mut results: StageResults,
        token: &CancellationToken,
    ) -> Result<CompletedRun, PipelineError> {
        let cancelled = || PipelineError::Cancelled { run_id };
        let mut stage = RunStage::first_for(input);

        while !stage.is_terminal() {
            let started = self.if_current(run_id, || {
                if self.session.advance_run(run_id, stage) {
                    self.emit(PipelineEvent::StageStarted { run_id, stage });
                    true
                } else {
                    false
                }
            });
            if started != Some(true) {
                return Err(cancelled());
            }
            log::debug!("pipeline: run {run_id} {stage}");

            let budget = self.config.stage_timeout();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(cancelled()),
                outcome = tokio::time::timeout(budget, self.dispatch(stage, input, &results)) => outcome,
            };
            let outcome = outcome.unwrap_or_else(|_| {
                Err(StageFault::new(
                    FailureKind::Timeout,
                    format!("no response within {}s", budget.as_secs_f32()),
                ))
            });

            match outcome {
                Ok(output) => {
                    output.apply(&mut results);
                    let recorded = self.if_current(run_id, || {
                        self.session.record_results(run_id, &results)
                    });
                    if recorded != Some(true) {
                        return Err(cancelled());
                    }
                }
                Err(fault) => return Err(self.fail(run_id, stage, fault, results)),
            }
            stage = stage.next();
        }

        self.complete(run_id, results)
    }

    async fn dispatch(
        &self,
        stage: RunStage,
        input: &PipelineInput,
        results: &StageResults,
    ) -> Result<StageOutput, StageFault> {
        match stage {
            RunStage::Recognizing => {
                let PipelineInput::Audio(clip) = input else {
                    return Err(StageFault::missing("audio"));
                };
                let recognition = self.services.recognizer.recognize(clip).await?;
                let text = recognition.text.trim();
                if text.is_empty() {
                    return Err(StageFault::new(
                        FailureKind::Empty,
                        "no speech recognized",
                    ));
                }
                Ok(StageOutput::Recognized(text.to_string()))
            }
            RunStage::Generating => {
                let message = results
                    .recognized_text
                    .as_deref()
                    .ok_or_else(|| StageFault::missing("user text"))?;
                let context = self.context.build(&self.session);
                let generation = self.services.generator.generate(message, &context).await?;
                Ok(StageOutput::Generated {
                    text: generation.text,
                    emotion: generation.emotion,
                })
            }
            RunStage::Synthesizing => {
                let text = results
                    .response_text
                    .as_deref()
                    .ok_or_else(|| StageFault::missing("response text"))?;
                let request = SynthesisRequest::new(text, results.emotion.as_deref(), &self.config);
                let audio = self.services.synthesizer.synthesize(&request).await?;
                Ok(StageOutput::Synthesized(audio))
            }
            RunStage::Animating => {
                let audio = results
                    .audio
                    .as_ref()
                    .ok_or_else(|| StageFault::missing("audio"))?;
                let media = self.services.animator.animate(audio).await?;
                Ok(StageOutput::Animated(media))
            }
            RunStage::Done | RunStage::Failed => Err(StageFault::new(
                FailureKind::Failed,
                format!("{stage} is not a runnable stage"),
            )),
        }
    }

    fn fail(
        &self,
        run_id: RunId,
        stage: RunStage,
        fault: StageFault,
        partial: StageResults,
    ) -> PipelineError {
        let error = PipelineError::Stage {
            run_id,
            stage,
            kind: fault.kind,
            detail: fault.detail,
            partial,
        };
        let failure = FailureDetail {
            stage,
            kind: fault.kind,
            message: error.to_string(),
        };

        let reported = self.if_current(run_id, || {
            if !self.session.fail_run(run_id, failure, Utc::now()) {
                return false;
            }
            self.emit(PipelineEvent::Failed {
                run_id,
                kind: error.kind(),
                message: error.to_string(),
            });
            true
        });

        if reported == Some(true) {
            log::error!("pipeline: run {run_id} failed: {error}");
            error
        } else {
            PipelineError::Cancelled { run_id }
        }
    }

    fn complete(&self, run_id: RunId, results: StageResults) -> Result<CompletedRun, PipelineError> {
        let Some(completed) = CompletedRun::from_results(run_id, &results) else {
            let fault = StageFault::new(FailureKind::Malformed, "run finished with missing results");
            return Err(self.fail(run_id, RunStage::Animating, fault, results));
        };

        let finished_at = Utc::now();
        let user = Message::user(completed.recognized_text.clone(), finished_at);
        let assistant = Message::assistant(
            completed.response_text.clone(),
            Some(completed.media.clone()),
            finished_at,
        );

        let reported = self.if_current(run_id, || {
            if !self
                .session
                .complete_run(run_id, results, finished_at, user, assistant)
            {
                return false;
            }
            self.emit(PipelineEvent::Completed {
                run_id,
                response_text: completed.response_text.clone(),
                media: completed.media.clone(),
            });
            true
        });

        if reported == Some(true) {
            log::info!("pipeline: run {run_id} completed");
            Ok(completed)
        } else {
            Err(PipelineError::Cancelled { run_id })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
