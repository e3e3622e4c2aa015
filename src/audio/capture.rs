//! Microphone capture via `cpal`.
//!
//! [`MicrophoneBackend`] wraps the cpal host/device/stream lifecycle and
//! plugs into [`AudioRecorder`](super::AudioRecorder). Only compiled with
//! the `microphone` feature.

use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::buffer::SampleBuffer;
use super::recorder::{CaptureBackend, CaptureStream, RecordError};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

impl From<CaptureError> for RecordError {
    fn from(e: CaptureError) -> Self {
        RecordError::Capture(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// MicrophoneBackend
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
struct MicrophoneStream {
    _stream: cpal::Stream,
}

impl CaptureStream for MicrophoneStream {}

/// The system default input device.
///
/// ```rust,no_run
/// use avatar_client::audio::{AudioRecorder, MicrophoneBackend};
/// use avatar_client::config::AudioConfig;
///
/// let mic = MicrophoneBackend::new().unwrap();
/// let recorder = AudioRecorder::new(Box::new(mic), AudioConfig::default());
/// let recording = recorder.start().unwrap();
/// // ... user speaks ...
/// let clip = recording.finish().unwrap();
/// ```
pub struct MicrophoneBackend {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl MicrophoneBackend {
    /// Open the default input device with its preferred stream config.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!("audio: input device ready ({sample_rate} Hz, {channels} ch)");
        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    fn build(&self, sink: Arc<Mutex<SampleBuffer>>) -> Result<cpal::Stream, CaptureError> {
        let channels = self.channels;
        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_interleaved(data, channels);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )?;
        stream.play()?;
        Ok(stream)
    }
}

impl CaptureBackend for MicrophoneBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&self, sink: Arc<Mutex<SampleBuffer>>) -> Result<Box<dyn CaptureStream>, RecordError> {
        let stream = self.build(sink)?;
        Ok(Box::new(MicrophoneStream { _stream: stream }))
    }
}
