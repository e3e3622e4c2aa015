//! Speech recognition: WAV in, transcript out.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::audio::AudioClip;
use crate::config::{PipelineConfig, ServicesConfig};

use super::error::ServiceError;
use super::http;

/// Transcript returned by the recognition service. The text may be empty;
/// deciding what an empty transcript means is up to the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recognition {
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, clip: &AudioClip) -> Result<Recognition, ServiceError>;
}

// ---------------------------------------------------------------------------
// HttpRecognizer
// ---------------------------------------------------------------------------

/// `POST {recognition_url}/api/v1/recognize-speech` with a multipart `file`
/// field and the spoken `language`.
pub struct HttpRecognizer {
    client: reqwest::Client,
    url: String,
    language: String,
}

impl HttpRecognizer {
    pub fn from_config(services: &ServicesConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            client: http::client(pipeline.stage_timeout()),
            url: http::endpoint(&services.recognition_url, "api/v1/recognize-speech"),
            language: pipeline.language.clone(),
        }
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, clip: &AudioClip) -> Result<Recognition, ServiceError> {
        let file = Part::bytes(clip.wav_bytes().to_vec())
            .file_name("speech.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("language", self.language.clone());

        log::debug!(
            "recognition: uploading {:.2}s of audio to {}",
            clip.duration_secs(),
            self.url
        );
        let response = self.client.post(&self.url).multipart(form).send().await?;
        let response = http::ensure_success(response).await?;
        http::read_json(response).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
