//! Exclusive push-to-talk recording.
//!
//! [`AudioRecorder`] hands out at most one [`Recording`] at a time. The
//! recording is a RAII lease: dropping it (or calling
//! [`Recording::finish`] / [`Recording::abort`]) stops the capture stream and
//! lets the next recording start.
//!
//! The hardware side sits behind [`CaptureBackend`] so the recorder can be
//! driven by the microphone in production and by scripted samples in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::config::AudioConfig;

use super::buffer::SampleBuffer;
use super::clip::{AudioClip, ClipError};

/// Peak amplitude below which a recording counts as silence.
const SILENCE_FLOOR: f32 = 0.01;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("audio capture failed: {0}")]
    Capture(String),

    #[error("nothing was recorded")]
    Empty,

    #[error("recording too short: {got_secs:.2}s (minimum {min_secs:.2}s)")]
    TooShort { min_secs: f32, got_secs: f32 },

    #[error("recording is silent: peak amplitude {peak:.4}")]
    TooQuiet { peak: f32 },

    #[error(transparent)]
    Encode(#[from] ClipError),
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// Live capture stream. Dropping it stops delivering samples.
pub trait CaptureStream {}

/// Source of mono-or-interleaved samples, e.g. the default microphone.
pub trait CaptureBackend {
    /// Native sample rate of the samples written to the sink.
    fn sample_rate(&self) -> u32;

    /// Start streaming samples into `sink` until the returned stream is
    /// dropped.
    fn open(&self, sink: Arc<Mutex<SampleBuffer>>) -> Result<Box<dyn CaptureStream>, RecordError>;
}

// ---------------------------------------------------------------------------
// AudioRecorder
// ---------------------------------------------------------------------------

pub struct AudioRecorder {
    backend: Box<dyn CaptureBackend>,
    config: AudioConfig,
    active: Arc<AtomicBool>,
}

impl AudioRecorder {
    pub fn new(backend: Box<dyn CaptureBackend>, config: AudioConfig) -> Self {
        Self {
            backend,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begin recording.
    ///
    /// # Errors
    ///
    /// [`RecordError::AlreadyRecording`] while another [`Recording`] is
    /// alive, or [`RecordError::Capture`] if the backend cannot open.
    pub fn start(&self) -> Result<Recording, RecordError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RecordError::AlreadyRecording);
        }
        // From here on the lease releases the flag on every exit path.
        let lease = Lease(Arc::clone(&self.active));

        let sample_rate = self.backend.sample_rate();
        let buffer = Arc::new(Mutex::new(SampleBuffer::for_duration(
            sample_rate,
            self.config.max_recording_secs,
        )));
        let stream = self.backend.open(Arc::clone(&buffer))?;
        log::debug!("audio: recording started @ {sample_rate} Hz");

        Ok(Recording {
            stream,
            buffer,
            sample_rate,
            min_secs: self.config.min_recording_secs,
            lease,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

struct Lease(Arc<AtomicBool>);

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// An in-progress recording. Field order matters: the stream stops before the
/// lease is released.
pub struct Recording {
    stream: Box<dyn CaptureStream>,
    buffer: Arc<Mutex<SampleBuffer>>,
    sample_rate: u32,
    min_secs: f32,
    lease: Lease,
}

impl Recording {
    /// Seconds captured so far.
    pub fn elapsed_secs(&self) -> f32 {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .duration_secs(self.sample_rate)
    }

    /// Stop capturing and package the samples as a WAV clip.
    pub fn finish(self) -> Result<AudioClip, RecordError> {
        let Recording {
            stream,
            buffer,
            sample_rate,
            min_secs,
            lease,
        } = self;
        drop(stream);

        let (samples, overwritten) = {
            let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
            let overwritten = buffer.overwritten();
            (buffer.drain(), overwritten)
        };
        drop(lease);

        if overwritten > 0 {
            log::warn!("audio: recording hit the length limit, dropped {overwritten} early samples");
        }
        if samples.is_empty() {
            return Err(RecordError::Empty);
        }

        let got_secs = samples.len() as f32 / sample_rate.max(1) as f32;
        if got_secs < min_secs {
            return Err(RecordError::TooShort { min_secs, got_secs });
        }

        let peak = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        if peak < SILENCE_FLOOR {
            return Err(RecordError::TooQuiet { peak });
        }

        log::info!("audio: recorded {got_secs:.2}s");
        Ok(AudioClip::from_samples(&samples, sample_rate)?)
    }

    /// Stop capturing and discard everything.
    pub fn abort(self) {
        log::debug!("audio: recording aborted");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
