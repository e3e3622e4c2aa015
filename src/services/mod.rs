//! Clients for the external inference services.
//!
//! Each pipeline stage talks to its service through one async trait:
//!
//! | Stage | Trait | HTTP implementation |
//! |-------|-------|---------------------|
//! | recognize | [`Recognizer`] | [`HttpRecognizer`] |
//! | generate | [`Generator`] | [`HttpGenerator`] |
//! | synthesize | [`Synthesizer`] | [`HttpSynthesizer`] |
//! | animate | [`Animator`] | [`HttpAnimator`] |
//!
//! [`ServiceSet`] bundles one of each behind `Arc<dyn _>` so the pipeline
//! can be driven by real services or test doubles alike.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use avatar_client::config::AppConfig;
//! use avatar_client::services::ServiceSet;
//!
//! #[tokio::main]
//! async fn main() {
//!     let services = ServiceSet::http(&AppConfig::default());
//!     let reply = services.generator.generate("Hello", "").await;
//!     println!("{reply:?}");
//! }
//! ```

pub mod animation;
pub mod error;
pub mod generation;
pub(crate) mod http;
pub mod recognition;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod mock;
#[cfg(test)]
pub(crate) mod stub;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

pub use animation::{Animator, HttpAnimator};
pub use error::ServiceError;
pub use generation::{Generation, Generator, HttpGenerator};
pub use recognition::{HttpRecognizer, Recognition, Recognizer};
pub use synthesis::{HttpSynthesizer, SynthesisRequest, Synthesizer, NEUTRAL_EMOTION};

// ---------------------------------------------------------------------------
// References to produced media
// ---------------------------------------------------------------------------

/// Location of a rendered video, as handed to the interface layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(String);

impl MediaRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Synthesized speech: where the server keeps it and the downloaded bytes.
#[derive(Clone, PartialEq)]
pub struct AudioRef {
    pub id: String,
    pub url: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioRef")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ServiceSet
// ---------------------------------------------------------------------------

/// One client per pipeline stage.
#[derive(Clone)]
pub struct ServiceSet {
    pub recognizer: Arc<dyn Recognizer>,
    pub generator: Arc<dyn Generator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub animator: Arc<dyn Animator>,
}

impl ServiceSet {
    /// HTTP clients for every stage, configured from `config`.
    pub fn http(config: &AppConfig) -> Self {
        let (services, pipeline) = (&config.services, &config.pipeline);
        Self {
            recognizer: Arc::new(HttpRecognizer::from_config(services, pipeline)),
            generator: Arc::new(HttpGenerator::from_config(services, pipeline)),
            synthesizer: Arc::new(HttpSynthesizer::from_config(services, pipeline)),
            animator: Arc::new(HttpAnimator::from_config(services, pipeline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_ref_serializes_as_plain_string() {
        let media = MediaRef::new("http://anim/video/v1");
        assert_eq!(
            serde_json::to_string(&media).unwrap(),
            r#""http://anim/video/v1""#
        );
        assert_eq!(media.to_string(), "http://anim/video/v1");
    }

    #[test]
    fn audio_ref_debug_omits_bytes() {
        let audio = AudioRef {
            id: "a1".into(),
            url: "u".into(),
            data: vec![7; 1024],
        };
        assert!(format!("{audio:?}").contains("bytes: 1024"));
    }

    #[test]
    fn http_set_builds_from_default_config() {
        let set = ServiceSet::http(&AppConfig::default());
        let _clone = set.clone();
    }
}
