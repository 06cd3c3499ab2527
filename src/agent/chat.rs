//! Text front-end: run turns from typed lines

use std::io::Write;

use super::runner::TurnRunner;
use crate::output::OutputSink;
use crate::tools::LineSource;
use crate::{Error, Result};

/// Spoken when the model cannot be reached
pub const UNAVAILABLE_REPLY: &str =
    "Sorry, I can't reach my language model right now. Please try again in a moment.";

const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// Run one turn and deliver its reply through `sink`
///
/// Turn-level failures are reported through the sink and swallowed; only
/// fatal errors are returned.
///
/// # Errors
///
/// Returns the error when it is fatal (bad configuration, rejected
/// credentials)
pub async fn respond(
    runner: &TurnRunner,
    sink: &dyn OutputSink,
    text: &str,
    thread_id: &str,
) -> Result<()> {
    let reply = match runner.submit(text, thread_id).await {
        Ok(outcome) => outcome.reply,
        Err(e) if e.is_fatal() => return Err(e),
        Err(Error::ModelUnavailable(reason)) => {
            tracing::warn!(%reason, "turn failed, model unavailable");
            UNAVAILABLE_REPLY.to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, "turn failed");
            format!("Sorry, something went wrong: {e}")
        }
    };

    if let Err(e) = sink.emit(&reply).await {
        tracing::warn!(error = %e, "failed to deliver reply");
    }
    Ok(())
}

/// Read lines from `input` until EOF or a quit word, one turn per line
///
/// `input` is not read while a turn runs, so the human tool can share it.
///
/// # Errors
///
/// Returns error on a fatal turn failure or if input cannot be read
pub async fn run_chat(
    runner: &TurnRunner,
    sink: &dyn OutputSink,
    thread_id: &str,
    input: &LineSource,
) -> Result<()> {
    loop {
        print!("User: ");
        std::io::stdout().flush()?;

        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&line.to_lowercase().as_str()) {
            println!("Goodbye!");
            break;
        }

        respond(runner, sink, line, thread_id).await?;
    }

    Ok(())
}
