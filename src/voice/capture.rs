//! Audio capture from microphone
//!
//! The capture stream runs on the audio driver's thread. Incoming samples
//! are downmixed to mono, cut into speech chunks by a [`PhraseChunker`], and
//! handed to the listener over a bounded channel. Chunks are dropped, not
//! queued without limit, when the listener falls behind.

use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Analysis frame, 30 ms at 16 kHz
const FRAME_SAMPLES: usize = 480;

/// Silence that ends a chunk of speech
const PAUSE: Duration = Duration::from_millis(800);

/// A chunk of captured speech in 16-bit PCM
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub captured_at: Instant,
}

/// Root-mean-square energy of normalized samples
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean.sqrt()
}

/// Convert a normalized sample to 16-bit PCM
///
/// Inverse of [`normalize_pcm16`](crate::voice::normalize_pcm16) for every `i16`.
#[must_use]
pub fn to_pcm16(sample: f32) -> i16 {
    #[allow(clippy::cast_possible_truncation)]
    let pcm = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
    pcm
}

fn duration_to_samples(d: Duration) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (d.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize;
    n
}

/// Energy-gated chunking of a mono sample stream
///
/// Silence before speech is discarded. A chunk closes after [`PAUSE`] of
/// silence following speech, or when it reaches the record limit, whichever
/// comes first.
#[derive(Debug)]
pub struct PhraseChunker {
    energy_threshold: f32,
    record_limit: usize,
    pause_limit: usize,
    frame: Vec<f32>,
    current: Vec<i16>,
    in_speech: bool,
    silence_run: usize,
}

impl PhraseChunker {
    /// Create a chunker
    #[must_use]
    pub fn new(energy_threshold: f32, record_timeout: Duration) -> Self {
        Self {
            energy_threshold,
            record_limit: duration_to_samples(record_timeout).max(FRAME_SAMPLES),
            pause_limit: duration_to_samples(PAUSE),
            frame: Vec::with_capacity(FRAME_SAMPLES),
            current: Vec::new(),
            in_speech: false,
            silence_run: 0,
        }
    }

    /// Feed samples and collect every chunk they complete
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<i16>> {
        let mut done = Vec::new();

        for &sample in samples {
            self.frame.push(sample);
            if self.frame.len() == FRAME_SAMPLES {
                let frame = std::mem::replace(&mut self.frame, Vec::with_capacity(FRAME_SAMPLES));
                if let Some(chunk) = self.process_frame(&frame) {
                    done.push(chunk);
                }
            }
        }

        done
    }

    fn process_frame(&mut self, frame: &[f32]) -> Option<Vec<i16>> {
        let loud = rms(frame) >= self.energy_threshold;

        if loud {
            self.in_speech = true;
            self.silence_run = 0;
        } else if self.in_speech {
            self.silence_run += frame.len();
        } else {
            return None;
        }

        self.current.extend(frame.iter().map(|s| to_pcm16(*s)));

        if self.silence_run >= self.pause_limit {
            self.in_speech = false;
            self.silence_run = 0;
            return Some(std::mem::take(&mut self.current));
        }

        if self.current.len() >= self.record_limit {
            return Some(std::mem::take(&mut self.current));
        }

        None
    }
}

/// Captures audio from an input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device, or the first whose name contains `name`
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match name {
            Some(wanted) => host
                .input_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n.contains(wanted)))
                .ok_or_else(|| Error::Audio(format!("no input device matching {wanted:?}")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string()))?,
        };

        // Prefer mono; any channel count at 16 kHz is downmixed in the callback
        let mut candidates: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| {
                c.sample_format() == cpal::SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .collect();
        candidates.sort_by_key(cpal::SupportedStreamConfigRange::channels);

        let config = candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::Audio("no 16 kHz input config found".to_string()))?
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Start capturing, passing mono samples to `on_samples`
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start<F>(&mut self, mut on_samples: F) -> Result<()>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels.max(1));
        let mut mono = Vec::new();

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if channels == 1 {
                        on_samples(data);
                    } else {
                        mono.clear();
                        #[allow(clippy::cast_precision_loss)]
                        mono.extend(
                            data.chunks(channels)
                                .map(|f| f.iter().sum::<f32>() / f.len() as f32),
                        );
                        on_samples(&mono);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Start capturing speech chunks into a bounded queue
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start_chunked(
        &mut self,
        mut chunker: PhraseChunker,
        tx: mpsc::Sender<AudioChunk>,
    ) -> Result<()> {
        self.start(move |samples| {
            for samples in chunker.push(samples) {
                let chunk = AudioChunk {
                    samples,
                    captured_at: Instant::now(),
                };
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(chunk) {
                    tracing::warn!("audio queue full, dropping chunk");
                }
            }
        })
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(to_pcm16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[test]
    fn pcm16_survives_normalization() {
        let captured = [i16::MIN, -16384, -1, 0, 1, 16384, i16::MAX];
        let restored: Vec<i16> = crate::voice::normalize_pcm16(&captured)
            .into_iter()
            .map(to_pcm16)
            .collect();
        assert_eq!(restored, captured);
        assert_eq!(to_pcm16(1.0), i16::MAX);
    }

    #[test]
    fn rms_of_square_wave() {
        assert!((rms(&tone(100, 0.5)) - 0.5).abs() < 1e-6);
        assert!(rms(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn leading_silence_is_dropped() {
        let mut chunker = PhraseChunker::new(0.03, Duration::from_secs(2));
        assert!(chunker.push(&vec![0.0; 16_000]).is_empty());
        assert!(chunker.current.is_empty());
    }

    #[test]
    fn pause_after_speech_closes_chunk() {
        let mut chunker = PhraseChunker::new(0.03, Duration::from_secs(5));

        assert!(chunker.push(&tone(8_000, 0.3)).is_empty());
        let chunks = chunker.push(&vec![0.0; 16_000]);

        assert_eq!(chunks.len(), 1);
        // 17 speech frames (the last one part silence) plus the closing pause
        let pause_frames = duration_to_samples(PAUSE).div_ceil(FRAME_SAMPLES);
        assert_eq!(chunks[0].len(), 17 * FRAME_SAMPLES + pause_frames * FRAME_SAMPLES);
    }

    #[test]
    fn record_limit_splits_long_speech() {
        let mut chunker = PhraseChunker::new(0.03, Duration::from_secs(1));
        let chunks = chunker.push(&tone(40_000, 0.3));

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() >= 16_000));
    }

    #[test]
    fn wav_encoding_has_header() {
        let wav = samples_to_wav(&tone(160, 0.1), SAMPLE_RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 160 * 2);
    }
}
