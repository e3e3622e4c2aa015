//! Pipeline outcome taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::ServiceError;

use super::run::{RunId, RunStage, StageResults};

/// How a single stage went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-success response or transport failure.
    Failed,
    /// A response arrived but its payload did not match the contract.
    Malformed,
    /// No response within the stage timeout.
    Timeout,
    /// Recognition produced no usable text.
    Empty,
}

impl FailureKind {
    pub fn from_service(error: &ServiceError) -> Self {
        match error {
            ServiceError::Timeout => FailureKind::Timeout,
            ServiceError::Malformed(_) => FailureKind::Malformed,
            _ => FailureKind::Failed,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Failed => "failed",
            FailureKind::Malformed => "malformed response",
            FailureKind::Timeout => "timed out",
            FailureKind::Empty => "empty result",
        })
    }
}

/// The outcome reported for every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Completed,
    RecognitionFailed,
    RecognitionEmpty,
    GenerationFailed,
    SynthesisFailed,
    AnimationFailed,
    Timeout,
    ConnectionRequired,
    Cancelled,
}

impl ResultKind {
    /// Classify a stage fault. Timeouts keep their own kind whatever the
    /// stage; malformed payloads count as a failure of their stage.
    pub fn for_stage(stage: RunStage, kind: FailureKind) -> Self {
        match (stage, kind) {
            (_, FailureKind::Timeout) => ResultKind::Timeout,
            (RunStage::Recognizing, FailureKind::Empty) => ResultKind::RecognitionEmpty,
            (RunStage::Recognizing, _) => ResultKind::RecognitionFailed,
            (RunStage::Generating, _) => ResultKind::GenerationFailed,
            (RunStage::Synthesizing, _) => ResultKind::SynthesisFailed,
            // Terminal stages never run a service call; a fault found after
            // the last stage is charged to it.
            (RunStage::Animating | RunStage::Done | RunStage::Failed, _) => {
                ResultKind::AnimationFailed
            }
        }
    }
}

/// Why [`run_pipeline`](super::PipelineCoordinator::run_pipeline) did not
/// complete.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// The coordination channel was not `Connected` when the run was
    /// requested. No service was contacted.
    #[error("the coordination channel is not connected")]
    ConnectionRequired,

    /// A newer run superseded this one. Not a user-facing error.
    #[error("run {run_id} was superseded by a newer request")]
    Cancelled { run_id: RunId },

    /// A stage failed; `partial` holds what earlier stages produced.
    #[error("{stage} {kind}: {detail}")]
    Stage {
        run_id: RunId,
        stage: RunStage,
        kind: FailureKind,
        detail: String,
        partial: StageResults,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ResultKind {
        match self {
            PipelineError::ConnectionRequired => ResultKind::ConnectionRequired,
            PipelineError::Cancelled { .. } => ResultKind::Cancelled,
            PipelineError::Stage { stage, kind, .. } => ResultKind::for_stage(*stage, *kind),
        }
    }

    /// `true` for outcomes the interface layer should present as errors.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, PipelineError::Cancelled { .. })
    }
}
