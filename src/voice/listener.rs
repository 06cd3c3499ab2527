//! Foreground voice loop
//!
//! Consumes the capture queue, segments it into phrases, transcribes each
//! finished phrase, and runs a turn for the phrase that follows the trigger.
//! This loop is the only owner of the transcript, segmenter and trigger
//! state. Turns run inline, so a slow model or tool pauses listening; audio
//! captured meanwhile waits in the bounded queue.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::capture::AudioChunk;
use super::segmenter::{AudioSegment, SpeechSegmenter, TranscriptState};
use super::stt::{Transcriber, normalize_pcm16};
use super::trigger::{TriggerDetector, TriggerEvent};
use crate::Result;
use crate::agent::{TurnRunner, respond};
use crate::config::VoiceConfig;
use crate::output::OutputSink;

/// What a single tick did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Chunks taken off the queue
    pub drained: usize,
    /// Phrases sealed
    pub sealed: usize,
    /// Turns run
    pub turns: usize,
}

/// The voice loop
pub struct Listener {
    chunks: mpsc::Receiver<AudioChunk>,
    segmenter: SpeechSegmenter,
    transcript: TranscriptState,
    transcriber: Arc<dyn Transcriber>,
    trigger: TriggerDetector,
    runner: Arc<TurnRunner>,
    sink: Arc<dyn OutputSink>,
    thread_id: String,
    poll_interval: Duration,
    live_transcription: bool,
}

impl Listener {
    /// Create a listener over the receiving end of the capture queue
    #[must_use]
    pub fn new(
        chunks: mpsc::Receiver<AudioChunk>,
        transcriber: Arc<dyn Transcriber>,
        runner: Arc<TurnRunner>,
        sink: Arc<dyn OutputSink>,
        config: &VoiceConfig,
        thread_id: impl Into<String>,
    ) -> Self {
        Self {
            chunks,
            segmenter: SpeechSegmenter::new(config.phrase_timeout),
            transcript: TranscriptState::default(),
            transcriber,
            trigger: TriggerDetector::new(config.trigger_phrase.clone(), config.activation_threshold),
            runner,
            sink,
            thread_id: thread_id.into(),
            poll_interval: config.poll_interval,
            live_transcription: config.live_transcription,
        }
    }

    /// Transcript lines finalized so far
    #[must_use]
    pub fn transcript(&self) -> &TranscriptState {
        &self.transcript
    }

    #[must_use]
    pub const fn trigger(&self) -> &TriggerDetector {
        &self.trigger
    }

    /// Run until `shutdown` resolves
    ///
    /// Shutdown is only observed between ticks; a turn in progress finishes
    /// first.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            trigger = self.trigger.phrase(),
            thread_id = %self.thread_id,
            "listening"
        );

        loop {
            let report = self.tick(Instant::now()).await?;
            let pause = if report.drained == 0 {
                self.poll_interval
            } else {
                Duration::ZERO
            };

            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!(lines = self.transcript.lines.len(), "listener stopped");
        Ok(())
    }

    /// Process everything queued as of `now`
    ///
    /// # Errors
    ///
    /// Returns an error only when it is fatal
    pub async fn tick(&mut self, now: Instant) -> Result<TickReport> {
        let mut report = TickReport::default();
        let mut sealed = Vec::new();

        while let Ok(chunk) = self.chunks.try_recv() {
            report.drained += 1;
            sealed.extend(self.segmenter.push(chunk));
        }
        if report.drained == 0 {
            sealed.extend(self.segmenter.tick_idle(now));
        }

        report.sealed = sealed.len();
        for segment in sealed {
            if self.finish_phrase(segment).await? {
                report.turns += 1;
            }
        }

        if report.drained > 0 && self.live_transcription {
            self.refresh_live_line().await?;
        }

        Ok(report)
    }

    /// Transcribe a sealed phrase and feed it to the trigger; `true` if a
    /// turn ran
    async fn finish_phrase(&mut self, segment: AudioSegment) -> Result<bool> {
        let Some(text) = self.transcribe(&segment).await? else {
            return Ok(false);
        };

        let line = self.transcript.commit(&text).to_string();
        tracing::info!(text = %line, "phrase transcribed");

        match self.trigger.on_phrase(&line) {
            TriggerEvent::Activated { score } => {
                tracing::debug!(score, "waiting for request");
                Ok(false)
            }
            TriggerEvent::Forward(request) => {
                tracing::info!(request = %request, "forwarding request");
                respond(&self.runner, self.sink.as_ref(), &request, &self.thread_id).await?;
                Ok(true)
            }
            TriggerEvent::Ignored => Ok(false),
        }
    }

    async fn refresh_live_line(&mut self) -> Result<()> {
        let Some(open) = self.segmenter.snapshot() else {
            return Ok(());
        };
        if let Some(text) = self.transcribe(&open).await? {
            self.transcript.update_current(&text);
            tracing::debug!(partial = %text, "live transcript");
        }
        Ok(())
    }

    /// First-best text of a segment; `None` when the segment is dropped
    async fn transcribe(&self, segment: &AudioSegment) -> Result<Option<String>> {
        let samples = normalize_pcm16(&segment.samples);

        match self.transcriber.transcribe(&samples).await {
            Ok(hypotheses) => {
                let text = hypotheses
                    .into_iter()
                    .next()
                    .map(|t| t.text.trim().to_string())
                    .filter(|t| !t.is_empty());
                if text.is_none() {
                    tracing::debug!(complete = segment.complete, "empty transcription, segment dropped");
                }
                Ok(text)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed, segment dropped");
                Ok(None)
            }
        }
    }
}
