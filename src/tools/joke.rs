//! Joke-telling tool

use std::sync::Arc;

use async_trait::async_trait;

use super::{ArgSchema, FieldKind, Tool, ToolArgs};
use crate::Result;
use crate::output::OutputSink;

/// Speaks a joke the model wrote through the output sink
pub struct SayJokeTool {
    sink: Arc<dyn OutputSink>,
    schema: ArgSchema,
}

impl SayJokeTool {
    /// Create the tool around an output sink
    #[must_use]
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            schema: ArgSchema::new().required("joke", FieldKind::String, "The full joke to tell"),
        }
    }
}

#[async_trait]
impl Tool for SayJokeTool {
    fn name(&self) -> &str {
        "say_joke"
    }

    fn description(&self) -> &str {
        "Tell a joke out loud. Pass the whole joke as the argument."
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn call(&self, args: ToolArgs) -> Result<String> {
        self.sink.emit(args.str("joke")?).await?;
        Ok("joke successfully said".to_string())
    }
}
