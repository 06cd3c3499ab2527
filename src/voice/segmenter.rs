//! Phrase segmentation over captured audio chunks
//!
//! Chunks accumulate into one open buffer. When the silence between the end
//! of the buffer and the start of the next chunk exceeds the phrase timeout,
//! or the stream stays idle that long, the buffer is sealed as a complete
//! [`AudioSegment`] and a fresh buffer starts. Time is always passed in, so
//! the state machine runs the same under test as live.

use std::time::{Duration, Instant};

use super::capture::{AudioChunk, SAMPLE_RATE};

/// A span of captured audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub samples: Vec<i16>,
    pub start: Instant,
    pub end: Instant,
    /// `true` once the phrase is closed, `false` for a live snapshot
    pub complete: bool,
}

impl AudioSegment {
    /// Length of the audio
    #[must_use]
    pub fn duration(&self) -> Duration {
        samples_duration(self.samples.len())
    }
}

fn samples_duration(len: usize) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let secs = len as f64 / f64::from(SAMPLE_RATE);
    Duration::from_secs_f64(secs)
}

/// Splits a chunk stream into phrases
#[derive(Debug)]
pub struct SpeechSegmenter {
    phrase_timeout: Duration,
    buffer: Vec<i16>,
    start: Option<Instant>,
    last_received: Option<Instant>,
}

impl SpeechSegmenter {
    /// Create a segmenter
    #[must_use]
    pub const fn new(phrase_timeout: Duration) -> Self {
        Self {
            phrase_timeout,
            buffer: Vec::new(),
            start: None,
            last_received: None,
        }
    }

    /// Append a chunk, sealing the open phrase first if the gap before it
    /// exceeds the phrase timeout
    pub fn push(&mut self, chunk: AudioChunk) -> Option<AudioSegment> {
        let chunk_end = chunk.captured_at;
        let chunk_start = chunk_end
            .checked_sub(samples_duration(chunk.samples.len()))
            .unwrap_or(chunk_end);

        let sealed = match self.last_received {
            Some(last) if chunk_start.saturating_duration_since(last) > self.phrase_timeout => {
                self.seal()
            }
            _ => None,
        };

        if self.buffer.is_empty() {
            self.start = Some(chunk_start);
        }
        self.buffer.extend_from_slice(&chunk.samples);
        self.last_received = Some(chunk_end);

        sealed
    }

    /// Seal the open phrase if nothing has arrived for longer than the
    /// phrase timeout
    pub fn tick_idle(&mut self, now: Instant) -> Option<AudioSegment> {
        let last = self.last_received?;
        if now.saturating_duration_since(last) > self.phrase_timeout {
            self.seal()
        } else {
            None
        }
    }

    /// Copy of the open phrase, for live transcription
    #[must_use]
    pub fn snapshot(&self) -> Option<AudioSegment> {
        let (Some(start), Some(end)) = (self.start, self.last_received) else {
            return None;
        };
        if self.buffer.is_empty() {
            return None;
        }

        Some(AudioSegment {
            samples: self.buffer.clone(),
            start,
            end,
            complete: false,
        })
    }

    /// Whether a phrase is open
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn seal(&mut self) -> Option<AudioSegment> {
        let start = self.start.take()?;
        let end = self.last_received.take()?;
        if self.buffer.is_empty() {
            return None;
        }

        let segment = AudioSegment {
            samples: std::mem::take(&mut self.buffer),
            start,
            end,
            complete: true,
        };
        tracing::debug!(
            duration_ms = segment.duration().as_millis(),
            "phrase sealed"
        );
        Some(segment)
    }
}

/// Live transcript: the open line plus every finalized line
#[derive(Debug, Default, Clone)]
pub struct TranscriptState {
    pub current: String,
    pub lines: Vec<String>,
}

impl TranscriptState {
    /// Replace the open line with a fresh partial transcription
    pub fn update_current(&mut self, text: &str) {
        self.current = text.to_string();
    }

    /// Finalize a line at a phrase boundary
    pub fn commit(&mut self, text: &str) -> &str {
        self.current.clear();
        self.lines.push(text.trim().to_string());
        self.lines.last().map_or("", String::as_str)
    }
}
