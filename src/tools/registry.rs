//! Tool registry: name lookup, argument validation and bounded execution

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::Tool;
use crate::{Error, Result};

/// Tool definition as advertised to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments
    pub parameters: Value,
}

/// Process-wide set of callable tools, read-only once built
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    default_timeout: Duration,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub const fn new(default_timeout: Duration) -> Self {
        Self {
            tools: BTreeMap::new(),
            default_timeout,
        }
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, keeping the latest");
        }
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Whether a tool with this name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every registered tool
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema().to_json_schema(),
            })
            .collect()
    }

    /// Validate arguments and run a tool under its timeout
    ///
    /// Nothing is invoked when the tool is unknown or the arguments fail
    /// validation. A timed-out call is abandoned; whatever side effect it
    /// started may or may not have completed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTool`, `InvalidArguments`, `ToolTimeout`, or the
    /// tool's own execution error
    pub async fn dispatch(&self, name: &str, raw_args: &Value) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;

        let args = tool.schema().validate(name, raw_args)?;
        let timeout = tool.timeout().unwrap_or(self.default_timeout);

        tracing::debug!(tool = %name, timeout_secs = timeout.as_secs(), "invoking tool");

        match tokio::time::timeout(timeout, tool.call(args)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ToolTimeout {
                tool: name.to_string(),
                timeout,
            }),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::tools::{ArgSchema, FieldKind, ToolArgs};

    struct Echo {
        schema: ArgSchema,
        calls: AtomicUsize,
    }

    impl Echo {
        fn new() -> Self {
            Self {
                schema: ArgSchema::new().required("text", FieldKind::String, "Text to echo"),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input"
        }

        fn schema(&self) -> &ArgSchema {
            &self.schema
        }

        async fn call(&self, args: ToolArgs) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(args.str("text")?.to_string())
        }
    }

    struct Sleeper {
        schema: ArgSchema,
    }

    #[async_trait]
    impl Tool for Sleeper {
        fn name(&self) -> &str {
            "sleeper"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        fn schema(&self) -> &ArgSchema {
            &self.schema
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(20))
        }

        async fn call(&self, _args: ToolArgs) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn dispatch_runs_known_tool() {
        let echo = Arc::new(Echo::new());
        let registry = ToolRegistry::new(Duration::from_secs(1)).with(echo.clone());

        let out = registry.dispatch("echo", &json!({"text": "hola"})).await.unwrap();
        assert_eq!(out, "hola");
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_invokes_nothing() {
        let echo = Arc::new(Echo::new());
        let registry = ToolRegistry::new(Duration::from_secs(1)).with(echo.clone());

        let err = registry.dispatch("fly", &json!({"text": "up"})).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool(ref n) if n == "fly"));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_arguments_invoke_nothing() {
        let echo = Arc::new(Echo::new());
        let registry = ToolRegistry::new(Duration::from_secs(1)).with(echo.clone());

        let err = registry.dispatch("echo", &json!({"text": 7})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments { .. }));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let registry = ToolRegistry::new(Duration::from_secs(30)).with(Arc::new(Sleeper {
            schema: ArgSchema::new(),
        }));

        let err = registry.dispatch("sleeper", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ToolTimeout { ref tool, .. } if tool == "sleeper"));
    }

    #[test]
    fn definitions_carry_json_schema() {
        let registry = ToolRegistry::new(Duration::from_secs(1)).with(Arc::new(Echo::new()));
        let defs = registry.definitions();

        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"], json!(["text"]));
    }
}
