//! Response generation: user text plus conversation context in, reply out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, ServicesConfig};

use super::error::ServiceError;
use super::http;

/// Reply produced by the generation service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Generation {
    /// Older deployments call this field `response`.
    #[serde(alias = "response")]
    pub text: String,
    /// Optional delivery hint forwarded to synthesis.
    #[serde(default)]
    pub emotion: Option<String>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// `context` is a pre-built transcript of recent turns; empty when there
    /// is no history yet.
    async fn generate(&self, message: &str, context: &str) -> Result<Generation, ServiceError>;
}

// ---------------------------------------------------------------------------
// HttpGenerator
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    context: &'a str,
}

/// `POST {generation_url}/api/v1/chat/chat`.
pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
}

impl HttpGenerator {
    pub fn from_config(services: &ServicesConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            client: http::client(pipeline.stage_timeout()),
            url: http::endpoint(&services.generation_url, "api/v1/chat/chat"),
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, message: &str, context: &str) -> Result<Generation, ServiceError> {
        let body = ChatRequest { message, context };
        let response = self.client.post(&self.url).json(&body).send().await?;
        let response = http::ensure_success(response).await?;

        let mut generation: Generation = http::read_json(response).await?;
        generation.text = generation.text.trim().to_string();
        if generation.text.is_empty() {
            return Err(ServiceError::Malformed("empty reply".into()));
        }
        Ok(generation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
