//! Output sinks for assistant text
//!
//! Every sink prints the text; speaking sinks also voice it, either through
//! a local speech program or through the robot.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{OutputConfig, SinkKind};
use crate::robot::RobotControl;
use crate::{Error, Result};

/// Renders assistant text to the user
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Render one piece of assistant text
    ///
    /// # Errors
    ///
    /// Returns `Error::Output` if the text could not be delivered
    async fn emit(&self, text: &str) -> Result<()>;
}

/// Prints to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

#[async_trait]
impl OutputSink for ConsoleSink {
    async fn emit(&self, text: &str) -> Result<()> {
        println!("Assistant: {text}");
        Ok(())
    }
}

/// Prints and speaks through a local speech program (`say`, `espeak`, ...)
#[derive(Debug, Clone)]
pub struct ProcessSpeechSink {
    program: String,
    voice: String,
    rate: u32,
    volume: f32,
}

impl ProcessSpeechSink {
    /// Build from output configuration
    #[must_use]
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            program: config.program.clone(),
            voice: config.voice.clone(),
            rate: config.rate,
            volume: config.volume,
        }
    }

    /// Command-line arguments for the configured program
    #[must_use]
    pub fn args(&self, text: &str) -> Vec<String> {
        let name = Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program);

        match name {
            // espeak takes amplitude 0-200 and speed in words per minute
            "espeak" | "espeak-ng" => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let amplitude = (self.volume * 200.0).round() as u32;
                vec![
                    "-v".to_string(),
                    self.voice.clone(),
                    "-s".to_string(),
                    self.rate.to_string(),
                    "-a".to_string(),
                    amplitude.to_string(),
                    text.to_string(),
                ]
            }
            // macOS `say`; volume is embedded as a speech command
            _ => {
                let text = if self.volume < 1.0 {
                    format!("[[volm {:.2}]] {text}", self.volume)
                } else {
                    text.to_string()
                };
                vec![
                    "-v".to_string(),
                    self.voice.clone(),
                    "-r".to_string(),
                    self.rate.to_string(),
                    text,
                ]
            }
        }
    }
}

#[async_trait]
impl OutputSink for ProcessSpeechSink {
    async fn emit(&self, text: &str) -> Result<()> {
        println!("Assistant: {text}");

        let status = tokio::process::Command::new(&self.program)
            .args(self.args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::Output(format!("failed to run {}: {e}", self.program)))?;

        if !status.success() {
            return Err(Error::Output(format!("{} exited with {status}", self.program)));
        }

        Ok(())
    }
}

/// Prints and speaks through the robot
pub struct RobotSpeechSink {
    robot: Arc<dyn RobotControl>,
}

impl RobotSpeechSink {
    /// Wrap a robot controller
    #[must_use]
    pub fn new(robot: Arc<dyn RobotControl>) -> Self {
        Self { robot }
    }
}

#[async_trait]
impl OutputSink for RobotSpeechSink {
    async fn emit(&self, text: &str) -> Result<()> {
        println!("Assistant: {text}");
        self.robot
            .say(text)
            .await
            .map_err(|e| Error::Output(e.to_string()))
    }
}

/// Select the sink named by configuration
///
/// # Errors
///
/// Returns `Error::Config` if the robot sink is selected without a robot
pub fn from_config(
    config: &OutputConfig,
    robot: Option<Arc<dyn RobotControl>>,
) -> Result<Arc<dyn OutputSink>> {
    let sink: Arc<dyn OutputSink> = match config.sink {
        SinkKind::Console => Arc::new(ConsoleSink),
        SinkKind::Process => Arc::new(ProcessSpeechSink::new(config)),
        SinkKind::Robot => {
            let robot = robot.ok_or_else(|| {
                Error::Config("robot output sink needs a robot IP (NAO_IP)".to_string())
            })?;
            Arc::new(RobotSpeechSink::new(robot))
        }
    };

    tracing::debug!(sink = ?config.sink, "output sink selected");
    Ok(sink)
}
