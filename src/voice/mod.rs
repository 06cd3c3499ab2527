//! Voice processing module
//!
//! Handles audio capture, phrase segmentation, transcription and trigger
//! detection. The capture stream is the only producer; the [`Listener`] is
//! the only consumer.

mod capture;
mod listener;
mod segmenter;
mod stt;
mod trigger;

pub use capture::{AudioCapture, AudioChunk, PhraseChunker, SAMPLE_RATE, rms, samples_to_wav};
pub use listener::{Listener, TickReport};
pub use segmenter::{AudioSegment, SpeechSegmenter, TranscriptState};
pub use stt::{SpeechToText, Transcriber, Transcript, normalize_pcm16};
pub use trigger::{TriggerDetector, TriggerEvent, normalize, ratio};
