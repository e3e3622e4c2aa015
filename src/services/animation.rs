//! Talking-head animation: synthesized audio plus the avatar image in, video
//! reference out.
//!
//! `POST /animate` queues a render and names the video; `GET /video/{id}` is
//! then polled until the file is ready. The poll loop has no bound of its
//! own: the stage timeout around the whole call ends it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::{PipelineConfig, ServicesConfig};

use super::error::ServiceError;
use super::http;
use super::{AudioRef, MediaRef};

#[async_trait]
pub trait Animator: Send + Sync {
    async fn animate(&self, audio: &AudioRef) -> Result<MediaRef, ServiceError>;
}

// ---------------------------------------------------------------------------
// HttpAnimator
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AnimateResponse {
    #[serde(default)]
    video_id: Option<String>,
    #[serde(default)]
    video_path: Option<String>,
}

pub struct HttpAnimator {
    client: reqwest::Client,
    base: String,
    image: PathBuf,
    poll_interval: Duration,
}

impl HttpAnimator {
    pub fn from_config(services: &ServicesConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            client: http::client(pipeline.stage_timeout()),
            base: services.animation_url.clone(),
            image: pipeline.avatar_image_path(),
            poll_interval: pipeline.animation_poll_interval(),
        }
    }

    async fn image_part(&self) -> Result<Part, ServiceError> {
        let bytes = tokio::fs::read(&self.image).await.map_err(|e| {
            ServiceError::InvalidInput(format!(
                "cannot read avatar image {}: {e}",
                self.image.display()
            ))
        })?;
        let name = self
            .image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("avatar.jpg")
            .to_string();
        Ok(Part::bytes(bytes)
            .file_name(name)
            .mime_str(image_mime(&self.image))?)
    }

    async fn wait_for_video(&self, id: &str) -> Result<MediaRef, ServiceError> {
        let url = http::endpoint(&self.base, &format!("video/{id}"));
        loop {
            let response = self.client.get(&url).send().await?;
            match response.status() {
                // Still rendering.
                StatusCode::NOT_FOUND | StatusCode::ACCEPTED => {
                    log::debug!("animation: video {id} not ready yet");
                    tokio::time::sleep(self.poll_interval).await;
                }
                _ => {
                    http::ensure_success(response).await?;
                    return Ok(MediaRef::new(url));
                }
            }
        }
    }
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[async_trait]
impl Animator for HttpAnimator {
    async fn animate(&self, audio: &AudioRef) -> Result<MediaRef, ServiceError> {
        let audio_part = Part::bytes(audio.data.clone())
            .file_name(audio.id.clone())
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("image", self.image_part().await?)
            .part("audio", audio_part);

        let response = self
            .client
            .post(http::endpoint(&self.base, "animate"))
            .multipart(form)
            .send()
            .await?;
        let response = http::ensure_success(response).await?;
        let queued: AnimateResponse = http::read_json(response).await?;
        let id = http::resource_id(queued.video_id, queued.video_path)?;

        log::debug!("animation: render {id} queued");
        self.wait_for_video(&id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
