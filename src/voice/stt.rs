//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::capture::{SAMPLE_RATE, samples_to_wav};
use crate::config::{SttProvider, VoiceConfig};
use crate::{Error, Result};

/// One transcription hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: Option<f32>,
}

/// Transcription backend boundary
///
/// Takes mono 16 kHz samples normalized to [-1.0, 1.0] and returns
/// hypotheses, best first. Only the first-best text is used.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe normalized samples
    ///
    /// # Errors
    ///
    /// Returns `Error::Auth` if the backend rejects the key, otherwise
    /// `Error::Transcription` if the backend fails
    async fn transcribe(&self, samples: &[f32]) -> Result<Vec<Transcript>>;
}

/// Scale 16-bit PCM to [-1.0, 1.0]
#[must_use]
pub fn normalize_pcm16(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}

/// Pass a successful response through; a rejected key is fatal
async fn check_status(response: reqwest::Response, backend: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Auth(format!("{backend} {status}: {body}")));
    }
    Err(Error::Transcription(format!("{backend} API error {status}: {body}")))
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Transcribes speech to text over a hosted API
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    language: String,
    provider: SttProvider,
    base_url: String,
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: SecretString, model: String, language: String) -> Result<Self> {
        Self::new(
            SttProvider::Whisper,
            api_key,
            model,
            language,
            "https://api.openai.com/v1",
        )
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: SecretString, model: String, language: String) -> Result<Self> {
        Self::new(
            SttProvider::Deepgram,
            api_key,
            model,
            language,
            "https://api.deepgram.com/v1",
        )
    }

    /// Create from voice configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no STT key is configured
    pub fn from_config(config: &VoiceConfig) -> Result<Self> {
        let api_key = config.stt_api_key.clone().ok_or_else(|| {
            Error::Config("no speech-to-text key: set STT_API_KEY or OPENAI_API_KEY".to_string())
        })?;

        match config.stt_provider {
            SttProvider::Whisper => {
                Self::new_whisper(api_key, config.stt_model.clone(), config.language.clone())
            }
            SttProvider::Deepgram => {
                Self::new_deepgram(api_key, config.stt_model.clone(), config.language.clone())
            }
        }
    }

    fn new(
        provider: SttProvider,
        api_key: SecretString,
        model: String,
        language: String,
        base_url: &str,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(format!("{provider:?} API key required")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            language,
            provider,
            base_url: base_url.to_string(),
        })
    }

    /// Point the backend at a different host (tests, proxies)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(&self, audio: Vec<u8>) -> Result<Vec<Transcript>> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("Whisper request failed: {e}")))?;

        let response = check_status(response, "Whisper").await?;

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("bad Whisper response: {e}")))?;

        tracing::debug!(transcript = %result.text, "transcription complete");
        Ok(vec![Transcript {
            text: result.text,
            confidence: None,
        }])
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: Vec<u8>) -> Result<Vec<Transcript>> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let response = self
            .client
            .post(format!("{}/listen", self.base_url))
            .query(&[
                ("model", self.model.as_str()),
                ("language", self.language.as_str()),
                ("punctuate", "true"),
            ])
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("Deepgram request failed: {e}")))?;

        let response = check_status(response, "Deepgram").await?;

        let result: DeepgramResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("bad Deepgram response: {e}")))?;

        let transcripts = result
            .results
            .channels
            .into_iter()
            .next()
            .map(|c| {
                c.alternatives
                    .into_iter()
                    .map(|a| Transcript {
                        text: a.transcript,
                        confidence: a.confidence,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(transcripts)
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, samples: &[f32]) -> Result<Vec<Transcript>> {
        let audio = samples_to_wav(samples, SAMPLE_RATE)?;
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio).await,
            SttProvider::Deepgram => self.transcribe_deepgram(audio).await,
        }
    }
}
