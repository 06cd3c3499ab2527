//! Tools the model can call
//!
//! Every tool declares a typed [`ArgSchema`]; the [`ToolRegistry`] validates
//! raw model arguments against it before the tool runs and bounds each call
//! with a timeout.

mod human;
mod joke;
mod posture;
mod registry;
mod schema;
mod search;
mod weather;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use human::{HumanInputTool, LineSource};
pub use joke::SayJokeTool;
pub use posture::SetPostureTool;
pub use registry::{ToolDefinition, ToolRegistry};
pub use schema::{ArgSchema, FieldKind, FieldSpec, ToolArgs};
pub use search::{SearchResult, WebSearchTool, format_results};
pub use weather::{CurrentWeather, WeatherClient, WeatherQuery, WeatherTool};

use crate::Result;
use crate::config::ToolsConfig;
use crate::output::OutputSink;
use crate::robot::RobotControl;

/// A callable tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// Argument schema
    fn schema(&self) -> &ArgSchema;

    /// Per-tool timeout; `None` uses the registry default
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Run the tool with validated arguments
    ///
    /// # Errors
    ///
    /// Returns error if the tool's action fails
    async fn call(&self, args: ToolArgs) -> Result<String>;
}

/// Build the standard tool set
///
/// The posture tool is only registered when a robot is available, and web
/// search only when a search key is configured. The human tool reads from
/// `input`.
#[must_use]
pub fn standard_registry(
    config: &ToolsConfig,
    robot: Option<Arc<dyn RobotControl>>,
    sink: Arc<dyn OutputSink>,
    input: LineSource,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new(config.timeout);

    if let Some(robot) = robot {
        registry.register(Arc::new(SetPostureTool::new(robot)));
    } else {
        tracing::info!("no robot configured, posture tool disabled");
    }

    registry.register(Arc::new(SayJokeTool::new(sink)));

    for tool in WeatherTool::all(&Arc::new(WeatherClient::new())) {
        registry.register(tool);
    }

    if let Some(search) = &config.search {
        registry.register(Arc::new(WebSearchTool::new(search)));
    }

    registry.register(Arc::new(HumanInputTool::new(input, config.human_timeout)));

    tracing::debug!(tools = ?registry.names(), "tool registry built");
    registry
}
