//! Human-in-the-loop tool: ask the person at the console

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;

use super::{ArgSchema, FieldKind, Tool, ToolArgs};
use crate::Result;

type BoxedLines = Lines<Box<dyn AsyncBufRead + Send + Unpin>>;

/// Console lines shared by the text loop and the human tool
///
/// Whoever holds the lock reads the next line. Reads are cancel-safe: a
/// caller dropped mid-read (a tool timeout) releases the lock and loses no
/// line.
#[derive(Clone)]
pub struct LineSource {
    lines: Arc<Mutex<BoxedLines>>,
}

impl LineSource {
    /// Wrap any buffered reader
    #[must_use]
    pub fn new(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
        Self {
            lines: Arc::new(Mutex::new(reader.lines())),
        }
    }

    /// Lines from the process's stdin
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }

    /// Next line without its terminator; `None` at end of input
    ///
    /// # Errors
    ///
    /// Returns error if the input cannot be read
    pub async fn next_line(&self) -> Result<Option<String>> {
        Ok(self.lines.lock().await.next_line().await?)
    }

    /// Lines up to one containing only `q`, or end of input
    ///
    /// # Errors
    ///
    /// Returns error if the input cannot be read
    pub async fn read_answer(&self) -> Result<String> {
        let mut lines = self.lines.lock().await;
        let mut answer = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim_end_matches('\r') == "q" {
                break;
            }
            answer.push(line.trim_end_matches('\r').to_string());
        }

        Ok(answer.join("\n"))
    }
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource").finish_non_exhaustive()
    }
}

/// Asks the human a question and returns what they type
///
/// Input ends with a line containing only `q`, or end of input.
pub struct HumanInputTool {
    input: LineSource,
    timeout: Duration,
    schema: ArgSchema,
}

impl HumanInputTool {
    /// Read answers from `input`
    #[must_use]
    pub fn new(input: LineSource, timeout: Duration) -> Self {
        Self {
            input,
            timeout,
            schema: ArgSchema::new().required(
                "query",
                FieldKind::String,
                "The question to ask the human",
            ),
        }
    }
}

#[async_trait]
impl Tool for HumanInputTool {
    fn name(&self) -> &str {
        "human"
    }

    fn description(&self) -> &str {
        "Ask a human for guidance when you are stuck or need information only a person has."
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn call(&self, args: ToolArgs) -> Result<String> {
        println!("\n{}", args.str("query")?);
        println!("Insert your text. Enter 'q' or press Ctrl-D to end.");

        self.input.read_answer().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::Error;
    use crate::tools::ToolRegistry;

    fn tool(input: &'static str) -> HumanInputTool {
        HumanInputTool::new(LineSource::new(input.as_bytes()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn stops_at_q_line() {
        let tool = tool("turn left\nthen sit\nq\nignored\n");
        let args = tool.schema().validate("human", &json!({"query": "Where?"})).unwrap();

        assert_eq!(tool.call(args).await.unwrap(), "turn left\nthen sit");
    }

    #[tokio::test]
    async fn stops_at_end_of_input() {
        let tool = tool("only line");
        let args = tool.schema().validate("human", &json!({"query": "Why?"})).unwrap();

        assert_eq!(tool.call(args).await.unwrap(), "only line");
    }

    #[tokio::test]
    async fn timed_out_question_leaves_input_for_the_next_reader() {
        let (mut keyboard, console) = tokio::io::duplex(256);
        let input = LineSource::new(BufReader::new(console));
        let registry = ToolRegistry::new(Duration::from_secs(5)).with(Arc::new(
            HumanInputTool::new(input.clone(), Duration::from_millis(50)),
        ));

        // Nobody answers the first question
        let err = registry
            .dispatch("human", &json!({"query": "first?"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolTimeout { .. }));

        keyboard.write_all(b"answer to q2\nq\nquit\n").await.unwrap();

        let answer = registry
            .dispatch("human", &json!({"query": "second?"}))
            .await
            .unwrap();
        assert_eq!(answer, "answer to q2");

        // The text loop still sees what follows
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("quit"));
    }
}
