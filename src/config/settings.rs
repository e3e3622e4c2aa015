//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it overrides.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Settings for the persistent coordination channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket URL of the coordination endpoint.
    pub url: String,
    /// Fixed delay before each automatic reconnect attempt, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Automatic reconnect attempts allowed before the manager gives up and
    /// enters `Failed`.
    pub max_reconnect_attempts: u32,
    /// Time allowed for the WebSocket handshake, in milliseconds. An open
    /// that runs past it counts as a failed attempt.
    pub connect_timeout_ms: u64,
    /// Send a `{"type":"ping"}` frame as soon as the channel opens.
    pub ping_on_open: bool,
}

impl ConnectionConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".into(),
            reconnect_interval_ms: 3_000,
            max_reconnect_attempts: 5,
            connect_timeout_ms: 10_000,
            ping_on_open: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ServicesConfig
// ---------------------------------------------------------------------------

/// Base URLs of the external inference services.
///
/// Paths (`/api/v1/recognize-speech`, `/synthesize`, …) are appended by the
/// individual clients; only scheme, host and port live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub recognition_url: String,
    pub generation_url: String,
    pub synthesis_url: String,
    pub animation_url: String,
    /// HTTP base URL of the coordination server, probed by the health
    /// monitor alongside the inference services.
    pub coordination_url: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            recognition_url: "http://localhost:8000".into(),
            generation_url: "http://localhost:8000".into(),
            synthesis_url: "http://localhost:8001".into(),
            animation_url: "http://localhost:8002".into(),
            coordination_url: "http://localhost:8000".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Settings for the recognize → generate → synthesize → animate pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-stage timeout in seconds. Each stage gets its own budget.
    pub stage_timeout_secs: u64,
    /// Spoken language passed to the recognition service.
    pub language: String,
    /// Voice identifier passed to the synthesis service.
    pub voice_id: String,
    /// Speech rate multiplier passed to the synthesis service.
    pub speed: f32,
    /// Still image the animation service drives with the synthesized audio.
    /// `None` means [`AppPaths::default_avatar_image`].
    pub avatar_image: Option<PathBuf>,
    /// Interval between `GET /video/{id}` polls, in milliseconds.
    pub animation_poll_ms: u64,
    /// Number of most recent history messages sent as generation context.
    pub context_messages: usize,
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn animation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.animation_poll_ms)
    }

    /// Resolved avatar image path.
    pub fn avatar_image_path(&self) -> PathBuf {
        self.avatar_image
            .clone()
            .unwrap_or_else(|| AppPaths::new().default_avatar_image())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 10,
            language: "ru".into(),
            voice_id: "default".into(),
            speed: 1.0,
            avatar_image: None,
            animation_poll_ms: 500,
            context_messages: 6,
        }
    }
}

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

/// Settings for the periodic service health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between two `check_all` cycles.
    pub interval_secs: u64,
    /// Upper bound for a single probe; a probe that takes longer is down.
    pub probe_timeout_secs: u64,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            probe_timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Maximum recording length in seconds; once exceeded the oldest samples
    /// are overwritten.
    pub max_recording_secs: u32,
    /// Recordings shorter than this are rejected instead of being sent to
    /// the recognition service.
    pub min_recording_secs: f32,
}

impl AudioConfig {
    /// How long a timed recording of `secs` should run, capped at
    /// `max_recording_secs`. `None` unless `secs` is a positive finite number.
    pub fn listen_window(&self, secs: f32) -> Option<Duration> {
        if !secs.is_finite() || secs <= 0.0 {
            return None;
        }
        let secs = secs.min(self.max_recording_secs as f32);
        Duration::try_from_secs_f32(secs).ok()
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_recording_secs: 60,
            min_recording_secs: 0.3,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use avatar_client::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Coordination channel settings.
    pub connection: ConnectionConfig,
    /// Inference service endpoints.
    pub services: ServicesConfig,
    /// Pipeline behaviour.
    pub pipeline: PipelineConfig,
    /// Health monitor schedule.
    pub health: HealthConfig,
    /// Audio capture settings.
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
