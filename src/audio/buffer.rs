//! Bounded sample store for an in-progress recording.
//!
//! When the buffer is full, new samples **overwrite** the oldest data so that
//! the most recent `capacity` samples are kept. A recording that runs past
//! the configured maximum therefore keeps its tail, which is the part the
//! user just said.
//!
//! ```rust
//! use avatar_client::audio::SampleBuffer;
//!
//! let mut buf = SampleBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
//! assert_eq!(buf.drain(), vec![2.0, 3.0, 4.0, 5.0]);
//! ```

/// Fixed-capacity circular buffer of mono `f32` samples.
pub struct SampleBuffer {
    buf: Vec<f32>,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
    /// Samples lost to overwriting since the last drain.
    overwritten: usize,
}

impl SampleBuffer {
    /// Create a buffer holding at most `capacity` samples. A zero capacity is
    /// bumped to one so the buffer is always writable.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity.max(1)],
            write_pos: 0,
            len: 0,
            overwritten: 0,
        }
    }

    /// Buffer sized for `secs` seconds at `sample_rate`.
    pub fn for_duration(sample_rate: u32, secs: u32) -> Self {
        Self::new(sample_rate as usize * secs as usize)
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn push_slice(&mut self, data: &[f32]) {
        let capacity = self.capacity();
        for &sample in data {
            self.buf[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
            if self.len < capacity {
                self.len += 1;
            } else {
                self.overwritten += 1;
            }
        }
    }

    /// Downmix interleaved frames to mono (channel average) and append them.
    pub fn push_interleaved(&mut self, data: &[f32], channels: u16) {
        if channels <= 1 {
            self.push_slice(data);
            return;
        }
        let channels = channels as usize;
        for frame in data.chunks(channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            self.push_slice(&[mono]);
        }
    }

    /// Take every stored sample in chronological order and reset the buffer.
    pub fn drain(&mut self) -> Vec<f32> {
        let capacity = self.capacity();
        // Before the first wrap the data starts at 0; afterwards the oldest
        // sample sits where the next write would go.
        let read_pos = if self.len < capacity { 0 } else { self.write_pos };

        let samples = (0..self.len)
            .map(|i| self.buf[(read_pos + i) % capacity])
            .collect();

        self.write_pos = 0;
        self.len = 0;
        self.overwritten = 0;
        samples
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples dropped because the recording outgrew the buffer.
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.len as f32 / sample_rate as f32
    }
}
