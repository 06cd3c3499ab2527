//! TOML configuration file loading
//!
//! Supports `~/.config/nao-agent/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AgentConfigFile {
    /// Conversation thread used for session memory
    pub thread_id: Option<String>,

    /// Persist session memory to disk
    pub memory: Option<bool>,

    /// Data directory override (database location)
    pub data_dir: Option<String>,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Microphone, segmentation and trigger configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Speech output configuration
    #[serde(default)]
    pub output: OutputFileConfig,

    /// Robot connection
    #[serde(default)]
    pub robot: RobotFileConfig,

    /// Tool execution and tool API keys
    #[serde(default)]
    pub tools: ToolsFileConfig,
}

/// Language model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Provider ("anthropic" or "openai")
    pub provider: Option<String>,

    /// Model identifier (e.g. "claude-3-haiku-20240307")
    pub model: Option<String>,

    /// API key for the provider
    pub api_key: Option<String>,

    /// Base URL override (OpenAI-compatible servers, proxies)
    pub base_url: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Max tokens per completion
    pub max_tokens: Option<u32>,

    /// Max tool-call rounds per turn
    pub max_tool_rounds: Option<usize>,

    /// System prompt override
    pub system_prompt: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Activation phrase
    pub trigger_phrase: Option<String>,

    /// Fuzzy-match threshold (0-100) for the activation phrase
    pub activation_threshold: Option<u8>,

    /// Silence gap (seconds) that closes a phrase
    pub phrase_timeout: Option<f64>,

    /// Longest chunk (seconds) the recorder hands over at once
    pub record_timeout: Option<f64>,

    /// RMS energy below which audio counts as silence
    pub energy_threshold: Option<f32>,

    /// Idle sleep between polls, milliseconds
    pub poll_interval_ms: Option<u64>,

    /// Capacity of the capture queue, in chunks
    pub queue_capacity: Option<usize>,

    /// Transcribe the open phrase on every tick for live display
    pub live_transcription: Option<bool>,

    /// Spoken language hint for transcription ("en", "es")
    pub language: Option<String>,

    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// STT API key (defaults to the OpenAI key for Whisper)
    pub stt_api_key: Option<String>,

    /// Input device name substring
    pub microphone: Option<String>,
}

/// Speech output configuration
#[derive(Debug, Default, Deserialize)]
pub struct OutputFileConfig {
    /// Sink kind ("console", "process", "robot")
    pub sink: Option<String>,

    /// Speech program for the process sink (e.g. "say", "espeak")
    pub program: Option<String>,

    /// Voice identifier
    pub voice: Option<String>,

    /// Volume (0.0 - 1.0)
    pub volume: Option<f32>,

    /// Words per minute
    pub rate: Option<u32>,
}

/// Robot connection configuration
#[derive(Debug, Default, Deserialize)]
pub struct RobotFileConfig {
    /// Robot IP address
    pub ip: Option<String>,

    /// NAOqi port
    pub port: Option<u16>,

    /// Python interpreter with the NAOqi SDK
    pub python: Option<String>,

    /// Directory holding `setPosture.py` and `NaoSpeak.py`
    pub script_dir: Option<String>,
}

/// Tool configuration
#[derive(Debug, Default, Deserialize)]
pub struct ToolsFileConfig {
    /// Default per-tool timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Timeout for the human-input tool in seconds
    pub human_timeout_secs: Option<u64>,

    /// Web search provider ("tavily", "brave", "serper")
    pub search_provider: Option<String>,

    /// Web search API key
    pub search_api_key: Option<String>,
}

/// Load the TOML config file from `path`, or from the standard location
///
/// Returns `AgentConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> AgentConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return AgentConfigFile::default();
    };

    if !path.exists() {
        return AgentConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AgentConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AgentConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/nao-agent/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("nao-agent").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let fc: AgentConfigFile = toml::from_str(
            r#"
            thread_id = "kitchen"

            [voice]
            trigger_phrase = "hola robot"
            phrase_timeout = 2.5

            [robot]
            ip = "169.254.1.157"
            "#,
        )
        .unwrap();

        assert_eq!(fc.thread_id.as_deref(), Some("kitchen"));
        assert_eq!(fc.voice.trigger_phrase.as_deref(), Some("hola robot"));
        assert_eq!(fc.voice.phrase_timeout, Some(2.5));
        assert_eq!(fc.robot.ip.as_deref(), Some("169.254.1.157"));
        assert!(fc.llm.model.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let fc = load_config_file(Some(Path::new("/nonexistent/nao-agent.toml")));
        assert!(fc.thread_id.is_none());
    }

    #[test]
    fn unparseable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let fc = load_config_file(Some(&path));
        assert!(fc.llm.provider.is_none());
    }
}
