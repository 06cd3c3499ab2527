//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use nao_agent::agent::{ChatModel, Message, ModelOutput, ToolCallRequest, TurnRunner};
use nao_agent::config::{SttProvider, VoiceConfig};
use nao_agent::db::{MemorySessionStore, SessionStore};
use nao_agent::output::OutputSink;
use nao_agent::robot::{Posture, RobotControl};
use nao_agent::tools::{SetPostureTool, ToolRegistry};
use nao_agent::voice::{AudioChunk, Transcriber, Transcript};
use nao_agent::{Error, Result};

/// Model that replays scripted outputs, then answers "ok"
#[derive(Default)]
pub struct StubModel {
    outputs: Mutex<VecDeque<Result<ModelOutput>>>,
    pub histories: Mutex<Vec<Vec<Message>>>,
}

impl StubModel {
    #[must_use]
    pub fn new(outputs: Vec<Result<ModelOutput>>) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(outputs.into()),
            histories: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for StubModel {
    async fn generate(&self, history: &[Message]) -> Result<ModelOutput> {
        self.histories.lock().unwrap().push(history.to_vec());
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ModelOutput::Text("ok".to_string())))
    }
}

/// A single tool call
#[must_use]
pub fn tool_call(id: &str, name: &str, arguments: Value) -> ModelOutput {
    ModelOutput::ToolCalls {
        preamble: None,
        calls: vec![ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
    }
}

/// Transcriber that replays scripted results, then returns nothing
#[derive(Default)]
pub struct StubTranscriber {
    results: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<usize>,
}

impl StubTranscriber {
    #[must_use]
    pub fn new(results: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(0),
        })
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, samples: &[f32]) -> Result<Vec<Transcript>> {
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        *self.calls.lock().unwrap() += 1;

        match self.results.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(vec![Transcript {
                text,
                confidence: None,
            }]),
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

/// Robot that records commands instead of moving
#[derive(Default)]
pub struct RecordingRobot {
    pub postures: Mutex<Vec<Posture>>,
    pub said: Mutex<Vec<String>>,
}

#[async_trait]
impl RobotControl for RecordingRobot {
    async fn set_posture(&self, posture: Posture) -> Result<()> {
        self.postures.lock().unwrap().push(posture);
        Ok(())
    }

    async fn say(&self, text: &str) -> Result<()> {
        self.said.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Sink that keeps every line
#[derive(Default)]
pub struct RecordingSink {
    pub lines: Mutex<Vec<String>>,
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn emit(&self, text: &str) -> Result<()> {
        self.lines.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Registry holding only the posture tool, bound to `robot`
#[must_use]
pub fn posture_registry(robot: &Arc<RecordingRobot>) -> ToolRegistry {
    let control: Arc<dyn RobotControl> = Arc::clone(robot) as Arc<dyn RobotControl>;
    ToolRegistry::new(Duration::from_secs(5)).with(Arc::new(SetPostureTool::new(control)))
}

/// Runner over an in-memory session store
#[must_use]
pub fn runner(
    model: Arc<StubModel>,
    registry: ToolRegistry,
    cap: usize,
) -> (TurnRunner, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    let sessions: Arc<dyn SessionStore> = Arc::clone(&store) as Arc<dyn SessionStore>;
    (
        TurnRunner::new(model, Arc::new(registry), sessions, cap),
        store,
    )
}

/// Voice settings with a 3 s phrase timeout and the default trigger
#[must_use]
pub fn voice_config() -> VoiceConfig {
    VoiceConfig {
        trigger_phrase: "realiza algo".to_string(),
        activation_threshold: 50,
        phrase_timeout: Duration::from_secs(3),
        record_timeout: Duration::from_secs(2),
        energy_threshold: 0.03,
        poll_interval: Duration::from_millis(10),
        queue_capacity: 16,
        live_transcription: false,
        language: "es".to_string(),
        stt_provider: SttProvider::Whisper,
        stt_api_key: None,
        stt_model: "whisper-1".to_string(),
        microphone: None,
    }
}

/// Half a second of audio ending `end_ms` after `t0`
#[must_use]
pub fn chunk(t0: Instant, end_ms: u64) -> AudioChunk {
    AudioChunk {
        samples: vec![1_000; 8_000],
        captured_at: t0 + Duration::from_millis(end_ms),
    }
}

/// Transcription failure for scripting
#[must_use]
pub fn stt_failure() -> Error {
    Error::Transcription("backend returned 500".to_string())
}
