//! Speech synthesis: reply text in, downloadable audio out.
//!
//! Two calls per stage: `POST /synthesize` renders the audio on the server
//! and names it, then `GET /audio/{id}` fetches the bytes the animation
//! service needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, ServicesConfig};

use super::error::ServiceError;
use super::http;
use super::AudioRef;

/// Emotion sent when generation did not supply one.
pub const NEUTRAL_EMOTION: &str = "neutral";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub speed: f32,
    pub emotion: String,
}

impl SynthesisRequest {
    pub fn new(text: &str, emotion: Option<&str>, pipeline: &PipelineConfig) -> Self {
        Self {
            text: text.to_string(),
            voice_id: pipeline.voice_id.clone(),
            speed: pipeline.speed,
            emotion: emotion.unwrap_or(NEUTRAL_EMOTION).to_string(),
        }
    }
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioRef, ServiceError>;
}

// ---------------------------------------------------------------------------
// HttpSynthesizer
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SynthesisResponse {
    #[serde(default)]
    audio_id: Option<String>,
    #[serde(default)]
    audio_path: Option<String>,
}

pub struct HttpSynthesizer {
    client: reqwest::Client,
    base: String,
}

impl HttpSynthesizer {
    pub fn from_config(services: &ServicesConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            client: http::client(pipeline.stage_timeout()),
            base: services.synthesis_url.clone(),
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioRef, ServiceError> {
        let response = self
            .client
            .post(http::endpoint(&self.base, "synthesize"))
            .json(request)
            .send()
            .await?;
        let response = http::ensure_success(response).await?;
        let rendered: SynthesisResponse = http::read_json(response).await?;
        let id = http::resource_id(rendered.audio_id, rendered.audio_path)?;

        let url = http::endpoint(&self.base, &format!("audio/{id}"));
        log::debug!("synthesis: fetching {url}");
        let response = self.client.get(&url).send().await?;
        let data = http::ensure_success(response).await?.bytes().await?;
        if data.is_empty() {
            return Err(ServiceError::Malformed(format!("audio {id} is empty")));
        }

        Ok(AudioRef {
            id,
            url,
            data: data.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stub::{Route, StubServer};
    use serde_json::json;

    fn synthesizer(base: &str) -> HttpSynthesizer {
        let services = ServicesConfig {
            synthesis_url: base.to_string(),
            ..ServicesConfig::default()
        };
        HttpSynthesizer::from_config(&services, &PipelineConfig::default())
    }

    fn request() -> SynthesisRequest {
        SynthesisRequest::new("Hi there", None, &PipelineConfig::default())
    }

    #[test]
    fn missing_emotion_defaults_to_neutral() {
        let req = request();
        assert_eq!(req.emotion, "neutral");
        assert_eq!(req.voice_id, "default");
        let req = SynthesisRequest::new("x", Some("happy"), &PipelineConfig::default());
        assert_eq!(req.emotion, "happy");
    }

    #[tokio::test]
    async fn renders_then_downloads() {
        let server = StubServer::start(vec![
            Route::json("POST", "/synthesize", 200, json!({"audio_id": "a1"})),
            Route::bytes("GET", "/audio/a1", 200, b"RIFF....WAVE"),
        ])
        .await;

        let audio = synthesizer(server.base()).synthesize(&request()).await.unwrap();
        assert_eq!(audio.id, "a1");
        assert!(audio.url.ends_with("/audio/a1"));
        assert_eq!(audio.data, b"RIFF....WAVE");

        let requests = server.requests();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["text"], "Hi there");
        assert_eq!(sent["emotion"], "neutral");
        assert_eq!(requests[1].path, "/audio/a1");
    }

    #[tokio::test]
    async fn audio_path_names_the_download() {
        let server = StubServer::start(vec![
            Route::json(
                "POST",
                "/synthesize",
                200,
                json!({"audio_path": "data/synthesized/speech_01.wav"}),
            ),
            Route::bytes("GET", "/audio/speech_01.wav", 200, b"wav"),
        ])
        .await;

        let audio = synthesizer(server.base()).synthesize(&request()).await.unwrap();
        assert_eq!(audio.id, "speech_01.wav");
    }

    #[tokio::test]
    async fn missing_download_fails() {
        let server = StubServer::start(vec![Route::json(
            "POST",
            "/synthesize",
            200,
            json!({"audio_id": "gone"}),
        )])
        .await;

        let err = synthesizer(server.base()).synthesize(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn response_without_reference_is_malformed() {
        let server = StubServer::start(vec![Route::json(
            "POST",
            "/synthesize",
            200,
            json!({"status": "ok"}),
        )])
        .await;

        let err = synthesizer(server.base()).synthesize(&request()).await.unwrap_err();
        assert!(err.is_malformed());
    }
}
