//! Configuration management for the NAO agent
//!
//! Settings are read once at startup and passed into constructors. Sources,
//! lowest to highest precedence: built-in defaults, the TOML file, `.env` and
//! the process environment. CLI flags are applied on top by the binary.

pub mod file;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Placeholder key sent to self-hosted OpenAI-compatible servers
const NO_KEY: &str = "sk-no-key";

const DEFAULT_SYSTEM_PROMPT: &str = "You are NAO, a small humanoid robot. \
Answer in one or two short spoken sentences. \
Use the available tools when the user asks you to move, tell a joke, \
check the weather or look something up.";

/// NAO agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Language model settings
    pub llm: LlmConfig,

    /// Microphone, segmentation and trigger settings
    pub voice: VoiceConfig,

    /// Speech output settings
    pub output: OutputConfig,

    /// Robot connection
    pub robot: RobotConfig,

    /// Tool execution settings
    pub tools: ToolsConfig,

    /// Conversation thread used for session memory
    pub thread_id: String,

    /// Persist session memory in `SQLite` (false = in-memory only)
    pub memory: bool,

    /// Path to data directory (database)
    pub data_dir: PathBuf,
}

/// Hosted chat model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Anthropic Messages API
    Anthropic,
    /// `OpenAI` chat completions, or any compatible server
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown llm provider: {other}"))),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => f.write_str("anthropic"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider
    pub provider: LlmProvider,

    /// Model identifier
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// API base URL
    pub base_url: String,

    /// Sampling temperature, clamped to [0, 1]
    pub temperature: f32,

    /// Max tokens per completion
    pub max_tokens: u32,

    /// Max tool-call rounds per turn, at least 1
    pub max_tool_rounds: usize,

    /// System prompt sent with every request
    pub system_prompt: String,
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    /// `OpenAI` Whisper transcription endpoint
    Whisper,
    /// Deepgram prerecorded endpoint
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown stt provider: {other}"))),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Activation phrase
    pub trigger_phrase: String,

    /// Similarity ratio (0-100) the activation phrase must exceed
    pub activation_threshold: u8,

    /// Silence gap that closes a phrase
    pub phrase_timeout: Duration,

    /// Longest chunk the recorder hands over at once
    pub record_timeout: Duration,

    /// RMS energy below which audio counts as silence
    pub energy_threshold: f32,

    /// Idle sleep between polls
    pub poll_interval: Duration,

    /// Capture queue capacity, in chunks
    pub queue_capacity: usize,

    /// Transcribe the open phrase on every tick for live display
    pub live_transcription: bool,

    /// Spoken language hint
    pub language: String,

    /// STT backend
    pub stt_provider: SttProvider,

    /// STT model
    pub stt_model: String,

    /// STT API key
    pub stt_api_key: Option<SecretString>,

    /// Input device name substring
    pub microphone: Option<String>,
}

/// Which output sink renders assistant text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Print to stdout
    Console,
    /// Print and speak through a local speech program
    Process,
    /// Print and speak through the robot
    Robot,
}

impl FromStr for SinkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(Self::Console),
            "process" | "say" | "local" => Ok(Self::Process),
            "robot" | "nao" => Ok(Self::Robot),
            other => Err(Error::Config(format!("unknown output sink: {other}"))),
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Sink kind
    pub sink: SinkKind,

    /// Speech program for the process sink
    pub program: String,

    /// Voice identifier
    pub voice: String,

    /// Volume, clamped to [0, 1]
    pub volume: f32,

    /// Words per minute, clamped to [20, 500]
    pub rate: u32,
}

/// Robot connection configuration
#[derive(Debug, Clone)]
pub struct RobotConfig {
    /// Robot IP address (robot tools need it)
    pub ip: Option<String>,

    /// NAOqi port
    pub port: u16,

    /// Python interpreter with the NAOqi SDK
    pub python: String,

    /// Directory holding the robot scripts
    pub script_dir: PathBuf,
}

/// Web search backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    /// Tavily search API
    Tavily,
    /// Brave Search API
    Brave,
    /// Serper (Google) API
    Serper,
}

impl FromStr for SearchBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tavily" => Ok(Self::Tavily),
            "brave" => Ok(Self::Brave),
            "serper" | "google" => Ok(Self::Serper),
            other => Err(Error::Config(format!("unknown search provider: {other}"))),
        }
    }
}

/// Web search credentials
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Backend
    pub backend: SearchBackend,

    /// API key
    pub api_key: SecretString,
}

/// Tool execution configuration
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Default per-tool timeout
    pub timeout: Duration,

    /// Timeout for the human-input tool
    pub human_timeout: Duration,

    /// Web search, registered only when configured
    pub search: Option<SearchConfig>,
}

impl Config {
    /// Load configuration from the TOML file, `.env` and the environment
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if model credentials are missing or a value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_sources(Self::read_file(path), |key| std::env::var(key).ok())
    }

    /// Load for commands that never call the model
    ///
    /// A missing model key is tolerated and left as the keyless placeholder.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a value is invalid
    pub fn load_offline(path: Option<&Path>) -> Result<Self> {
        Self::from_sources_offline(Self::read_file(path), |key| std::env::var(key).ok())
    }

    fn read_file(path: Option<&Path>) -> file::AgentConfigFile {
        // A missing .env is normal
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        file::load_config_file(path)
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if model credentials are missing or a value is invalid
    pub fn from_sources<F>(fc: file::AgentConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(fc, &env, true)
    }

    /// [`from_sources`](Self::from_sources) without the model key check
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a value is invalid
    pub fn from_sources_offline<F>(fc: file::AgentConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(fc, &env, false)
    }

    fn build<F>(fc: file::AgentConfigFile, env: &F, require_key: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_parse = |key: &str| -> Result<Option<f64>> {
            env(key)
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .map_err(|_| Error::Config(format!("{key} must be a number, got {v:?}")))
                })
                .transpose()
        };

        let llm = Self::load_llm(fc.llm, env, require_key)?;

        #[allow(clippy::cast_possible_truncation)]
        let energy_threshold = env_parse("ENERGY_THRESHOLD")?
            .map(|v| v as f32)
            .or(fc.voice.energy_threshold)
            .unwrap_or(0.03)
            .max(0.0);

        // Voice (env > toml > default)
        let voice = VoiceConfig {
            trigger_phrase: env("TRIGGER_PHRASE")
                .or(fc.voice.trigger_phrase)
                .unwrap_or_else(|| "realiza algo".to_string()),
            activation_threshold: fc.voice.activation_threshold.unwrap_or(50).min(100),
            phrase_timeout: seconds(
                env_parse("PHRASE_TIMEOUT")?.or(fc.voice.phrase_timeout),
                3.0,
            ),
            record_timeout: seconds(
                env_parse("RECORD_TIMEOUT")?.or(fc.voice.record_timeout),
                2.0,
            ),
            energy_threshold,
            poll_interval: Duration::from_millis(fc.voice.poll_interval_ms.unwrap_or(250)),
            queue_capacity: fc.voice.queue_capacity.unwrap_or(64).max(1),
            live_transcription: fc.voice.live_transcription.unwrap_or(false),
            language: env("AILANG")
                .or(fc.voice.language)
                .unwrap_or_else(|| "en".to_string()),
            stt_provider: fc
                .voice
                .stt_provider
                .as_deref()
                .map(str::parse)
                .transpose()?
                .unwrap_or(SttProvider::Whisper),
            stt_model: fc
                .voice
                .stt_model
                .unwrap_or_else(|| "whisper-1".to_string()),
            stt_api_key: env("STT_API_KEY")
                .or(fc.voice.stt_api_key)
                .or_else(|| env("OPENAI_API_KEY"))
                .or_else(|| env("DEEPGRAM_API_KEY"))
                .map(SecretString::from),
            microphone: fc.voice.microphone,
        };

        // Output (env > toml > default)
        let output = OutputConfig {
            sink: env("OUTPUT_SINK")
                .or(fc.output.sink)
                .as_deref()
                .map(str::parse)
                .transpose()?
                .unwrap_or(SinkKind::Console),
            program: fc.output.program.unwrap_or_else(|| "say".to_string()),
            voice: fc
                .output
                .voice
                .unwrap_or_else(|| "com.apple.eloquence.en-US.Grandpa".to_string()),
            volume: fc.output.volume.unwrap_or(1.0).clamp(0.0, 1.0),
            rate: fc.output.rate.unwrap_or(200).clamp(20, 500),
        };

        let robot = RobotConfig {
            ip: env("NAO_IP").or(fc.robot.ip),
            port: env("NAO_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.robot.port)
                .unwrap_or(9559),
            python: fc.robot.python.unwrap_or_else(|| "python2".to_string()),
            script_dir: fc
                .robot
                .script_dir
                .map_or_else(|| PathBuf::from("nao"), PathBuf::from),
        };

        let search = match env("TAVILY_API_KEY").or(fc.tools.search_api_key) {
            Some(key) if !key.is_empty() => Some(SearchConfig {
                backend: fc
                    .tools
                    .search_provider
                    .as_deref()
                    .map(str::parse)
                    .transpose()?
                    .unwrap_or(SearchBackend::Tavily),
                api_key: SecretString::from(key),
            }),
            _ => None,
        };

        let tools = ToolsConfig {
            timeout: Duration::from_secs(fc.tools.timeout_secs.unwrap_or(30).max(1)),
            human_timeout: Duration::from_secs(fc.tools.human_timeout_secs.unwrap_or(300).max(1)),
            search,
        };

        // Determine data directory (~/.local/share/nao-agent on Linux)
        let data_dir = fc.data_dir.map_or_else(
            || {
                directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("nao-agent"))
            },
            PathBuf::from,
        );

        Ok(Self {
            llm,
            voice,
            output,
            robot,
            tools,
            thread_id: env("THREAD_ID")
                .or(fc.thread_id)
                .unwrap_or_else(|| "1".to_string()),
            memory: fc.memory.unwrap_or(true),
            data_dir,
        })
    }

    fn load_llm<F>(fc: file::LlmFileConfig, env: &F, require_key: bool) -> Result<LlmConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = env("LLM_PROVIDER")
            .or(fc.provider)
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or(LlmProvider::Anthropic);

        let provider_key_var = match provider {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        };

        let default_url = match provider {
            LlmProvider::Anthropic => DEFAULT_ANTHROPIC_URL,
            LlmProvider::OpenAi => DEFAULT_OPENAI_URL,
        };
        let base_url = env("BASE_URL")
            .or(fc.base_url)
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string();

        let api_key = env("API_KEY")
            .or_else(|| env(provider_key_var))
            .or(fc.api_key)
            .filter(|k| !k.is_empty());

        // Self-hosted OpenAI-compatible servers usually need no key
        let api_key = match api_key {
            Some(key) => key,
            None if provider == LlmProvider::OpenAi && base_url != DEFAULT_OPENAI_URL => {
                NO_KEY.to_string()
            }
            None if !require_key => NO_KEY.to_string(),
            None => {
                return Err(Error::Config(format!(
                    "no API key for {provider}: set API_KEY or {provider_key_var}"
                )));
            }
        };

        let default_model = match provider {
            LlmProvider::Anthropic => "claude-3-haiku-20240307",
            LlmProvider::OpenAi => "gpt-3.5-turbo",
        };

        Ok(LlmConfig {
            provider,
            model: env("MODEL")
                .or(fc.model)
                .unwrap_or_else(|| default_model.to_string()),
            api_key: SecretString::from(api_key),
            base_url,
            temperature: fc.temperature.unwrap_or(0.7).clamp(0.0, 1.0),
            max_tokens: fc.max_tokens.unwrap_or(1024),
            max_tool_rounds: fc.max_tool_rounds.unwrap_or(8).max(1),
            system_prompt: fc
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }

    /// Path to the session database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("memory.db")
    }
}

impl LlmConfig {
    /// Whether the key is the placeholder used for keyless servers
    #[must_use]
    pub fn is_keyless(&self) -> bool {
        self.api_key.expose_secret() == NO_KEY
    }
}

fn seconds(value: Option<f64>, default: f64) -> Duration {
    let secs = value.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(default);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_key_only() {
        let config =
            Config::from_sources(file::AgentConfigFile::default(), env_from(&[("API_KEY", "k")]))
                .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.llm.model, "claude-3-haiku-20240307");
        assert_eq!(config.llm.max_tool_rounds, 8);
        assert_eq!(config.thread_id, "1");
        assert!(config.memory);
        assert_eq!(config.voice.trigger_phrase, "realiza algo");
        assert_eq!(config.voice.activation_threshold, 50);
        assert_eq!(config.voice.phrase_timeout, Duration::from_secs(3));
        assert_eq!(config.voice.record_timeout, Duration::from_secs(2));
        assert_eq!(config.voice.poll_interval, Duration::from_millis(250));
        assert_eq!(config.output.sink, SinkKind::Console);
        assert_eq!(config.output.rate, 200);
        assert_eq!(config.robot.port, 9559);
        assert_eq!(config.tools.timeout, Duration::from_secs(30));
        assert!(config.tools.search.is_none());
    }

    #[test]
    fn missing_key_is_config_error() {
        let err = Config::from_sources(file::AgentConfigFile::default(), env_from(&[]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn offline_load_tolerates_missing_key() {
        let config = Config::from_sources_offline(
            file::AgentConfigFile::default(),
            env_from(&[("THREAD_ID", "kitchen")]),
        )
        .unwrap();

        assert!(config.llm.is_keyless());
        assert_eq!(config.thread_id, "kitchen");
    }

    #[test]
    fn keyless_openai_compatible_server() {
        let config = Config::from_sources(
            file::AgentConfigFile::default(),
            env_from(&[
                ("LLM_PROVIDER", "openai"),
                ("BASE_URL", "http://localhost:11434/v1/"),
            ]),
        )
        .unwrap();

        assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
        assert!(config.llm.is_keyless());
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
    }

    #[test]
    fn env_overrides_file() {
        let fc: file::AgentConfigFile = toml::from_str(
            r#"
            thread_id = "from-file"

            [llm]
            api_key = "file-key"
            temperature = 3.0

            [voice]
            trigger_phrase = "hola nao"

            [output]
            volume = 4.0
            rate = 5
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_from(&[("THREAD_ID", "from-env"), ("NAO_IP", "10.0.0.7")]),
        )
        .unwrap();

        assert_eq!(config.thread_id, "from-env");
        assert_eq!(config.llm.api_key.expose_secret(), "file-key");
        assert!((config.llm.temperature - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.voice.trigger_phrase, "hola nao");
        assert!((config.output.volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.output.rate, 20);
        assert_eq!(config.robot.ip.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn tavily_key_enables_search() {
        let config = Config::from_sources(
            file::AgentConfigFile::default(),
            env_from(&[("API_KEY", "k"), ("TAVILY_API_KEY", "tv")]),
        )
        .unwrap();

        let search = config.tools.search.unwrap();
        assert_eq!(search.backend, SearchBackend::Tavily);
    }

    #[test]
    fn bad_number_is_rejected() {
        let err = Config::from_sources(
            file::AgentConfigFile::default(),
            env_from(&[("API_KEY", "k"), ("PHRASE_TIMEOUT", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("PHRASE_TIMEOUT"));
    }

    #[test]
    fn unknown_sink_is_rejected() {
        let err = Config::from_sources(
            file::AgentConfigFile::default(),
            env_from(&[("API_KEY", "k"), ("OUTPUT_SINK", "hologram")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn debug_output_hides_key() {
        let config = Config::from_sources(
            file::AgentConfigFile::default(),
            env_from(&[("API_KEY", "super-secret-value")]),
        )
        .unwrap();
        assert!(!format!("{config:?}").contains("super-secret-value"));
    }
}
