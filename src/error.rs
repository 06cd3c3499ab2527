//! Error types for the NAO agent

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the NAO agent
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credentials, bad values)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Transcription backend failed or returned nothing usable
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Language model transport failure (network, 5xx, unparseable reply)
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A hosted backend (model or transcription) rejected the configured credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Model output could not be read as structured tool calls
    #[error("malformed tool call: {reason}")]
    MalformedToolCall {
        /// What could not be parsed
        reason: String,
        /// Plain text the model wrote alongside the broken call
        text: Option<String>,
    },

    /// Model requested a tool that is not registered
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed schema validation
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments {
        /// Tool name
        tool: String,
        /// What was wrong with the arguments
        reason: String,
    },

    /// Tool exceeded its allotted time; its side effect may or may not have happened
    #[error("tool {tool} timed out after {}s (outcome unknown)", timeout.as_secs())]
    ToolTimeout {
        /// Tool name
        tool: String,
        /// Time budget that was exceeded
        timeout: Duration,
    },

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(String),

    /// Robot command error
    #[error("robot error: {0}")]
    Robot(String),

    /// Output sink error
    #[error("output error: {0}")]
    Output(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Whether this error should terminate the process
    ///
    /// Only configuration and credential failures are fatal; everything else
    /// is reported to the user and the loop keeps going.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Auth(_))
    }
}
