//! Audio input: push-to-talk capture packaged as WAV for the recognizer.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → SampleBuffer (downmix to mono)
//!           → Recording::finish → AudioClip (16-bit PCM WAV)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use avatar_client::audio::AudioClip;
//!
//! let clip = AudioClip::from_samples(&[0.1_f32; 16_000], 16_000).unwrap();
//! assert!((clip.duration_secs() - 1.0).abs() < 1e-3);
//! ```

pub mod buffer;
#[cfg(feature = "microphone")]
pub mod capture;
pub mod clip;
pub mod recorder;

pub use buffer::SampleBuffer;
#[cfg(feature = "microphone")]
pub use capture::{CaptureError, MicrophoneBackend};
pub use clip::{AudioClip, ClipError};
pub use recorder::{AudioRecorder, CaptureBackend, CaptureStream, RecordError, Recording};
