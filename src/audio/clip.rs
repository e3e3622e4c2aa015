//! Recorded speech, packaged as an in-memory WAV file.
//!
//! The recognition service takes a multipart WAV upload, so an
//! [`AudioClip`] always holds complete WAV bytes (16-bit PCM, mono) rather
//! than raw samples.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("failed to encode WAV: {0}")]
    Encode(#[from] hound::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("not a valid WAV file: {0}")]
    InvalidWav(String),
}

/// A complete WAV file plus the metadata the pipeline logs and checks.
#[derive(Clone, PartialEq)]
pub struct AudioClip {
    wav: Vec<u8>,
    sample_rate: u32,
    duration_secs: f32,
}

impl AudioClip {
    /// Encode mono `f32` samples in `[-1.0, 1.0]` as 16-bit PCM WAV.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Result<Self, ClipError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in samples {
                let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(pcm)?;
            }
            writer.finalize()?;
        }

        Ok(Self {
            wav: cursor.into_inner(),
            sample_rate,
            duration_secs: duration(samples.len() as u32, sample_rate),
        })
    }

    /// Wrap existing WAV bytes after checking the header.
    pub fn from_wav_bytes(wav: Vec<u8>) -> Result<Self, ClipError> {
        let reader = hound::WavReader::new(Cursor::new(wav.as_slice()))
            .map_err(|e| ClipError::InvalidWav(e.to_string()))?;
        let spec = reader.spec();
        let duration_secs = duration(reader.duration(), spec.sample_rate);
        drop(reader);

        Ok(Self {
            wav,
            sample_rate: spec.sample_rate,
            duration_secs,
        })
    }

    /// Load a WAV file from disk without blocking the runtime.
    pub async fn from_wav_file(path: &Path) -> Result<Self, ClipError> {
        let wav = tokio::fs::read(path).await.map_err(|source| ClipError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_wav_bytes(wav)
    }

    pub fn wav_bytes(&self) -> &[u8] {
        &self.wav
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration_secs
    }
}

// Keep the raw bytes out of log lines.
impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("bytes", &self.wav.len())
            .field("sample_rate", &self.sample_rate)
            .field("duration_secs", &self.duration_secs)
            .finish()
    }
}

fn duration(frames: u32, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        0.0
    } else {
        frames as f32 / sample_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_mono_pcm16() {
        let clip = AudioClip::from_samples(&vec![0.25; 16_000], 16_000).unwrap();
        assert_eq!(&clip.wav_bytes()[..4], b"RIFF");
        assert!((clip.duration_secs() - 1.0).abs() < f32::EPSILON);
        // 44-byte header + 2 bytes per sample.
        assert_eq!(clip.wav_bytes().len(), 44 + 32_000);
    }

    #[test]
    fn reparsing_keeps_metadata() {
        let clip = AudioClip::from_samples(&vec![0.0; 8_000], 16_000).unwrap();
        let again = AudioClip::from_wav_bytes(clip.wav_bytes().to_vec()).unwrap();
        assert_eq!(again.sample_rate(), 16_000);
        assert!((again.duration_secs() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_non_wav_bytes() {
        let err = AudioClip::from_wav_bytes(b"definitely not audio".to_vec()).unwrap_err();
        assert!(matches!(err, ClipError::InvalidWav(_)));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let err = AudioClip::from_wav_file(Path::new("/nonexistent/clip.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipError::Read { .. }));
    }

    #[tokio::test]
    async fn loads_wav_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turn.wav");
        let clip = AudioClip::from_samples(&vec![0.1; 4_000], 16_000).unwrap();
        std::fs::write(&path, clip.wav_bytes()).unwrap();

        let loaded = AudioClip::from_wav_file(&path).await.unwrap();
        assert_eq!(loaded, clip);
    }

    #[test]
    fn debug_hides_payload() {
        let clip = AudioClip::from_samples(&[0.0; 4], 8_000).unwrap();
        let text = format!("{clip:?}");
        assert!(text.contains("bytes"));
        assert!(!text.contains("RIFF"));
    }
}
