//! One pass through the pipeline and the data it accumulates.
//!
//! The stage sequence is:
//!
//! ```text
//! Audio input: Recognizing ─▶ Generating ─▶ Synthesizing ─▶ Animating ─▶ Done
//! Text input:                 Generating ─▶ Synthesizing ─▶ Animating ─▶ Done
//! any stage ──fault──▶ Failed
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::AudioClip;
use crate::services::{AudioRef, MediaRef};

use super::error::FailureKind;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Identity of a pipeline run. Stage completions are only accepted when they
/// carry the id of the session's active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell runs apart in logs.
        let full = self.0.simple().to_string();
        f.write_str(&full[..8])
    }
}

// ---------------------------------------------------------------------------
// RunStage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Recognizing,
    Generating,
    Synthesizing,
    Animating,
    Done,
    Failed,
}

impl RunStage {
    /// First stage for the given input kind.
    pub fn first_for(input: &PipelineInput) -> Self {
        match input {
            PipelineInput::Audio(_) => RunStage::Recognizing,
            PipelineInput::Text(_) => RunStage::Generating,
        }
    }

    /// Stage that follows a successful `self`. Terminal stages stay put.
    pub fn next(self) -> Self {
        match self {
            RunStage::Recognizing => RunStage::Generating,
            RunStage::Generating => RunStage::Synthesizing,
            RunStage::Synthesizing => RunStage::Animating,
            RunStage::Animating => RunStage::Done,
            RunStage::Done => RunStage::Done,
            RunStage::Failed => RunStage::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunStage::Recognizing => "recognizing",
            RunStage::Generating => "generating",
            RunStage::Synthesizing => "synthesizing",
            RunStage::Animating => "animating",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Input and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineInput {
    Text(String),
    Audio(AudioClip),
}

impl PipelineInput {
    pub fn text(text: impl Into<String>) -> Self {
        PipelineInput::Text(text.into())
    }
}

/// Everything the stages of one run produced so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResults {
    /// Transcript for audio input, or the typed text for text input.
    pub recognized_text: Option<String>,
    pub response_text: Option<String>,
    pub emotion: Option<String>,
    pub audio: Option<AudioRef>,
    pub media: Option<MediaRef>,
}

/// Where and how a run failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureDetail {
    pub stage: RunStage,
    pub kind: FailureKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub id: RunId,
    pub stage: RunStage,
    pub input: PipelineInput,
    pub results: StageResults,
    pub failure: Option<FailureDetail>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(input: PipelineInput, started_at: DateTime<Utc>) -> Self {
        let results = match &input {
            PipelineInput::Text(text) => StageResults {
                recognized_text: Some(text.clone()),
                ..StageResults::default()
            },
            PipelineInput::Audio(_) => StageResults::default(),
        };
        Self {
            id: RunId::new(),
            stage: RunStage::first_for(&input),
            input,
            results,
            failure: None,
            started_at,
            finished_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.stage.is_terminal()
    }
}
