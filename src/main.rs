//! Application entry point: console front-end for the avatar client.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread).
//! 4. Spawn the connection manager and request a connection.
//! 5. Spawn the health monitor.
//! 6. Build the pipeline coordinator over the HTTP service clients.
//! 7. Read console lines until `/quit` or end of input.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use avatar_client::audio::AudioClip;
use avatar_client::config::AppConfig;
use avatar_client::connection::{
    ConnectionHandlers, ConnectionManager, InboundMessage, WebSocketConnector,
};
use avatar_client::health::HealthMonitor;
use avatar_client::pipeline::{PipelineCoordinator, PipelineEvent, PipelineInput};
use avatar_client::services::ServiceSet;
use avatar_client::session::SessionHandle;

const HELP: &str = "\
Type a message to send it through the pipeline, or:
  /status            connection state and reconnect attempts
  /health            probe every service now
  /history           conversation so far
  /reconnect         drop the channel and connect again
  /disconnect        close the channel
  /listen <secs>     record from the microphone
  /wav <path>        send a WAV file as speech
  /quit              exit";

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("avatar client starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let session = SessionHandle::new();

    // 4. Coordination channel
    let connection = ConnectionManager::spawn(
        &config.connection,
        Arc::new(WebSocketConnector),
        session.clone(),
    );
    connection.set_handlers(ConnectionHandlers {
        on_state_change: Some(Box::new(|state| log::info!("connection: {state}"))),
        on_message: Some(Box::new(print_inbound)),
        on_error: Some(Box::new(|e| log::debug!("connection error: {e}"))),
    });
    connection.connect();

    // 5. Health monitor
    let monitor = Arc::new(HealthMonitor::http(&config, session.clone()));
    let health_task = Arc::clone(&monitor).spawn();

    // 6. Pipeline
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let coordinator = Arc::new(
        PipelineCoordinator::new(
            session.clone(),
            connection.subscribe(),
            ServiceSet::http(&config),
            &config.pipeline,
        )
        .with_events(events_tx),
    );
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_event(&event);
        }
    });

    let microphone = open_microphone(&config);

    // 7. Console loop
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        match command {
            "/quit" => break,
            "/help" => println!("{HELP}"),
            "/status" => {
                let status = connection.status();
                println!(
                    "connection: {} (reconnect attempts {}/{})",
                    status.state, status.attempts, status.max_attempts
                );
                if session.is_busy() {
                    println!("a turn is in progress");
                }
            }
            "/health" => {
                let status = monitor.check_now().await;
                for (id, health) in status.iter() {
                    let mark = if health.up { "up" } else { "DOWN" };
                    println!("  {id:<13} {mark}");
                }
            }
            "/history" => {
                for message in session.history() {
                    let media = message
                        .media()
                        .map(|m| format!("  [{m}]"))
                        .unwrap_or_default();
                    println!(
                        "{} {:>9}: {}{media}",
                        message.created_at().format("%H:%M:%S"),
                        message.role().label(),
                        message.text()
                    );
                }
            }
            "/reconnect" => {
                connection.disconnect();
                connection.connect();
            }
            "/disconnect" => connection.disconnect(),
            "/wav" => match AudioClip::from_wav_file(Path::new(arg)).await {
                Ok(clip) => submit(&coordinator, PipelineInput::Audio(clip)),
                Err(e) => println!("{e}"),
            },
            "/listen" => {
                let secs: f32 = arg.parse().unwrap_or(5.0);
                listen(&microphone, secs, &config, &coordinator).await;
            }
            _ if command.starts_with('/') => println!("unknown command {command}; try /help"),
            _ => submit(&coordinator, PipelineInput::text(line)),
        }
    }

    log::info!("avatar client shutting down");
    coordinator.cancel_active();
    connection.disconnect();
    health_task.abort();
    // Let the connection actor close the socket.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run a turn in the background so a newer line can supersede it.
fn submit(coordinator: &Arc<PipelineCoordinator>, input: PipelineInput) {
    let coordinator = Arc::clone(coordinator);
    tokio::spawn(async move {
        match coordinator.run_pipeline(input).await {
            Ok(done) => println!("assistant: {}\n  video: {}", done.response_text, done.media),
            Err(e) if e.is_reportable() => println!("error ({:?}): {e}", e.kind()),
            Err(e) => log::debug!("{e}"),
        }
    });
}

fn print_inbound(message: InboundMessage) {
    match message {
        InboundMessage::AssistantResponse { text, audio } => match audio {
            Some(audio) => println!("server: {text}  [{audio}]"),
            None => println!("server: {text}"),
        },
        InboundMessage::ProcessingStatus { processing, progress } => {
            log::info!("server processing: {processing} {progress:?}");
        }
        InboundMessage::Error { message } => println!("server error: {message}"),
        InboundMessage::ServiceStatus { services } => {
            let down: Vec<_> = services
                .iter()
                .filter(|(_, up)| !**up)
                .map(|(name, _)| name.as_str())
                .collect();
            log::info!("server reports services down: {down:?}");
        }
        InboundMessage::Unknown => {}
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::StageStarted { run_id, stage } => log::info!("turn {run_id}: {stage}"),
        PipelineEvent::Completed { run_id, .. } => log::info!("turn {run_id}: done"),
        PipelineEvent::Failed { run_id, kind, .. } => log::info!("turn {run_id}: {kind:?}"),
    }
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

#[cfg(feature = "microphone")]
type Microphone = Option<avatar_client::audio::AudioRecorder>;

#[cfg(not(feature = "microphone"))]
type Microphone = ();

#[cfg(feature = "microphone")]
fn open_microphone(config: &AppConfig) -> Microphone {
    use avatar_client::audio::{AudioRecorder, MicrophoneBackend};

    match MicrophoneBackend::new() {
        Ok(mic) => Some(AudioRecorder::new(Box::new(mic), config.audio.clone())),
        Err(e) => {
            log::warn!("Audio capture unavailable: {e}");
            None
        }
    }
}

#[cfg(not(feature = "microphone"))]
fn open_microphone(_config: &AppConfig) -> Microphone {}

/// Record for `secs` (capped at the configured maximum) and submit the clip.
#[cfg(feature = "microphone")]
async fn listen(
    microphone: &Microphone,
    secs: f32,
    config: &AppConfig,
    coordinator: &Arc<PipelineCoordinator>,
) {
    let Some(recorder) = microphone else {
        println!("no microphone available");
        return;
    };
    let Some(window) = config.audio.listen_window(secs) else {
        println!("usage: /listen <secs>, with secs a positive number");
        return;
    };
    let recording = match recorder.start() {
        Ok(recording) => recording,
        Err(e) => {
            println!("{e}");
            return;
        }
    };

    println!("listening for {:.1}s...", window.as_secs_f32());
    tokio::time::sleep(window).await;

    match recording.finish() {
        Ok(clip) => submit(coordinator, PipelineInput::Audio(clip)),
        Err(e) => println!("{e}"),
    }
}

#[cfg(not(feature = "microphone"))]
async fn listen(
    _microphone: &Microphone,
    _secs: f32,
    _config: &AppConfig,
    _coordinator: &Arc<PipelineCoordinator>,
) {
    println!("built without microphone support; rebuild with --features microphone");
}
