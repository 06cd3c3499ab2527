//! Physical robot boundary
//!
//! The robot is driven through NAOqi helper scripts run with the SDK's
//! Python interpreter. The wire protocol stays inside those scripts; this
//! side only spawns them and checks the exit status.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RobotConfig;
use crate::{Error, Result};

/// Predefined NAO postures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Posture {
    StandInit,
    SitRelax,
    StandZero,
    LyingBelly,
    LyingBack,
    Stand,
    Crouch,
    Sit,
}

impl Posture {
    /// Every posture the robot knows
    pub const ALL: [Self; 8] = [
        Self::StandInit,
        Self::SitRelax,
        Self::StandZero,
        Self::LyingBelly,
        Self::LyingBack,
        Self::Stand,
        Self::Crouch,
        Self::Sit,
    ];

    /// NAOqi posture name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StandInit => "StandInit",
            Self::SitRelax => "SitRelax",
            Self::StandZero => "StandZero",
            Self::LyingBelly => "LyingBelly",
            Self::LyingBack => "LyingBack",
            Self::Stand => "Stand",
            Self::Crouch => "Crouch",
            Self::Sit => "Sit",
        }
    }

    /// All posture names, in declaration order
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.as_str()).collect()
    }
}

impl FromStr for Posture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::Robot(format!("unknown posture: {s}")))
    }
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Robot actions available to tools and output sinks
#[async_trait]
pub trait RobotControl: Send + Sync {
    /// Move to a predefined posture
    ///
    /// # Errors
    ///
    /// Returns `Error::Robot` if the command fails
    async fn set_posture(&self, posture: Posture) -> Result<()>;

    /// Speak text through the robot's speaker
    ///
    /// # Errors
    ///
    /// Returns `Error::Robot` if the command fails
    async fn say(&self, text: &str) -> Result<()>;
}

/// Drives the robot by running the NAOqi helper scripts
#[derive(Debug, Clone)]
pub struct ScriptRobot {
    python: String,
    script_dir: PathBuf,
    ip: String,
    port: u16,
    timeout: Duration,
}

impl ScriptRobot {
    /// Build from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no robot IP is configured
    pub fn from_config(config: &RobotConfig, timeout: Duration) -> Result<Self> {
        let ip = config
            .ip
            .clone()
            .ok_or_else(|| Error::Config("robot IP not set (NAO_IP)".to_string()))?;

        Ok(Self {
            python: config.python.clone(),
            script_dir: config.script_dir.clone(),
            ip,
            port: config.port,
            timeout,
        })
    }

    /// Robot address
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    async fn run_script(&self, script: &str, args: &[String]) -> Result<String> {
        let path = self.script_dir.join(script);

        let mut cmd = tokio::process::Command::new(&self.python);
        cmd.arg(&path)
            .args(args)
            .env("NAO_IP", &self.ip)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(script = %path.display(), ip = %self.ip, "running robot script");

        let child = cmd.spawn().map_err(|e| {
            Error::Robot(format!(
                "failed to spawn {} {}: {e}",
                self.python,
                path.display()
            ))
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Robot(format!(
                    "{script} did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Robot(format!("{script} process error: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Robot(format!(
                "{script} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl RobotControl for ScriptRobot {
    async fn set_posture(&self, posture: Posture) -> Result<()> {
        let args = [
            "--ip".to_string(),
            self.ip.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--posture".to_string(),
            posture.to_string(),
        ];
        let family = self.run_script("setPosture.py", &args).await?;
        tracing::info!(%posture, family = %family, "posture reached");
        Ok(())
    }

    async fn say(&self, text: &str) -> Result<()> {
        self.run_script("NaoSpeak.py", &[text.to_string()]).await?;
        Ok(())
    }
}
