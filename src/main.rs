use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use nao_agent::agent::{self, Role, TurnRunner};
use nao_agent::db::{self, MemorySessionStore, SessionRepo, SessionStore};
use nao_agent::output::{self, OutputSink};
use nao_agent::robot::{RobotControl, ScriptRobot};
use nao_agent::tools::{self, LineSource, ToolRegistry};
use nao_agent::voice::{AudioCapture, Listener, PhraseChunker, SpeechToText, rms};
use nao_agent::Config;

/// NAO Agent - voice-driven assistant with tool calling for the NAO robot
#[derive(Parser)]
#[command(name = "nao-agent", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (default: ~/.config/nao-agent/config.toml)
    #[arg(short, long, env = "NAO_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Conversation thread for session memory
    #[arg(short, long, global = true)]
    thread_id: Option<String>,

    /// Keep session memory in RAM only
    #[arg(long, global = true)]
    no_memory: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen on the microphone and answer after the trigger phrase (default)
    Listen,
    /// Chat by typing
    Chat,
    /// Run a single turn and exit
    Ask {
        /// What to ask
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// List the tools offered to the model
    Tools,
    /// Show a thread's stored messages
    History,
    /// List stored threads
    Threads,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = match cli.verbose {
        0 => "info,nao_agent=info",
        1 => "info,nao_agent=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("fatal: cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    };

    // A console read can stay parked on a blocking thread; do not wait for it
    runtime.shutdown_background();
    code
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Overrides {
        path: cli.config,
        thread_id: cli.thread_id,
        no_memory: cli.no_memory,
    };

    match cli.command.unwrap_or(Command::Listen) {
        Command::Listen => listen(&settings.load()?).await,
        Command::Chat => chat(&settings.load()?).await,
        Command::Ask { text } => ask(&settings.load()?, &text.join(" ")).await,
        Command::Tools => list_tools(&settings.load_offline()?),
        Command::History => history(&settings.load_offline()?),
        Command::Threads => threads(&settings.load_offline()?),
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

/// CLI flags applied on top of the loaded configuration
struct Overrides {
    path: Option<PathBuf>,
    thread_id: Option<String>,
    no_memory: bool,
}

impl Overrides {
    fn load(&self) -> anyhow::Result<Config> {
        self.apply(Config::load(self.path.as_deref())?)
    }

    /// For commands that never call the model
    fn load_offline(&self) -> anyhow::Result<Config> {
        self.apply(Config::load_offline(self.path.as_deref())?)
    }

    fn apply(&self, mut config: Config) -> anyhow::Result<Config> {
        if let Some(thread_id) = &self.thread_id {
            config.thread_id.clone_from(thread_id);
        }
        if self.no_memory {
            config.memory = false;
        }
        tracing::debug!(?config, "loaded configuration");
        Ok(config)
    }
}

/// Everything a turn needs, wired from configuration
struct Agent {
    runner: Arc<TurnRunner>,
    sink: Arc<dyn OutputSink>,
    input: LineSource,
}

fn build_registry(
    config: &Config,
    input: LineSource,
) -> anyhow::Result<(ToolRegistry, Arc<dyn OutputSink>)> {
    let robot: Option<Arc<dyn RobotControl>> = match &config.robot.ip {
        Some(ip) => {
            tracing::info!(ip = %ip, port = config.robot.port, "robot configured");
            Some(Arc::new(ScriptRobot::from_config(
                &config.robot,
                config.tools.timeout,
            )?))
        }
        None => None,
    };

    let sink = output::from_config(&config.output, robot.clone())?;
    let registry = tools::standard_registry(&config.tools, robot, Arc::clone(&sink), input);
    Ok((registry, sink))
}

fn open_sessions(config: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    if !config.memory {
        tracing::info!("session memory disabled, history lasts until exit");
        return Ok(Arc::new(MemorySessionStore::new()));
    }

    let pool = db::init(config.db_path())?;
    Ok(Arc::new(SessionRepo::new(pool)))
}

fn build_agent(config: &Config) -> anyhow::Result<Agent> {
    let input = LineSource::stdin();
    let (registry, sink) = build_registry(config, input.clone())?;
    let registry = Arc::new(registry);
    let model = agent::gateway::from_config(&config.llm, &registry)?;
    let sessions = open_sessions(config)?;

    let runner = Arc::new(TurnRunner::new(
        model,
        registry,
        sessions,
        config.llm.max_tool_rounds,
    ));
    Ok(Agent {
        runner,
        sink,
        input,
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Voice loop: microphone until Ctrl-C
#[allow(clippy::future_not_send)]
async fn listen(config: &Config) -> anyhow::Result<()> {
    let Agent { runner, sink, .. } = build_agent(config)?;
    let transcriber = Arc::new(SpeechToText::from_config(&config.voice)?);

    let (tx, rx) = mpsc::channel(config.voice.queue_capacity);
    let mut capture = AudioCapture::new(config.voice.microphone.as_deref())?;
    capture.start_chunked(
        PhraseChunker::new(config.voice.energy_threshold, config.voice.record_timeout),
        tx,
    )?;

    println!(
        "Say \"{}\" to get my attention. Press Ctrl-C to stop.",
        config.voice.trigger_phrase
    );

    let listener = Listener::new(
        rx,
        transcriber,
        runner,
        sink,
        &config.voice,
        config.thread_id.clone(),
    );
    let result = listener.run(shutdown_signal()).await;

    capture.stop();
    result?;
    Ok(())
}

/// Text loop on stdin
async fn chat(config: &Config) -> anyhow::Result<()> {
    let Agent { runner, sink, input } = build_agent(config)?;
    println!("Chatting on thread {}. Type 'quit' to exit.", config.thread_id);

    tokio::select! {
        result = agent::run_chat(&runner, sink.as_ref(), &config.thread_id, &input) => result?,
        () = shutdown_signal() => println!(),
    }
    Ok(())
}

async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let Agent { runner, sink, .. } = build_agent(config)?;
    agent::respond(&runner, sink.as_ref(), text, &config.thread_id).await?;
    Ok(())
}

fn list_tools(config: &Config) -> anyhow::Result<()> {
    let (registry, _) = build_registry(config, LineSource::stdin())?;

    for def in registry.definitions() {
        println!("{}\n  {}", def.name, def.description);
        println!("  {}\n", serde_json::to_string(&def.parameters)?);
    }
    println!("{} tools", registry.len());
    Ok(())
}

fn history(config: &Config) -> anyhow::Result<()> {
    let sessions = open_sessions(config)?;
    let messages = sessions.load(&config.thread_id)?;

    if messages.is_empty() {
        println!("No messages in thread {}", config.thread_id);
        return Ok(());
    }

    for message in messages {
        let role = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        };
        if !message.content.is_empty() {
            let marker = if message.is_error { " (error)" } else { "" };
            println!("{role}{marker}: {}", message.content);
        }
        for call in &message.tool_calls {
            println!("{role}: -> {}({})", call.name, call.arguments);
        }
    }
    Ok(())
}

fn threads(config: &Config) -> anyhow::Result<()> {
    let repo = SessionRepo::new(db::init(config.db_path())?);
    let threads = repo.list_threads()?;

    if threads.is_empty() {
        println!("No stored threads in {}", config.db_path().display());
        return Ok(());
    }

    for t in threads {
        println!(
            "{:<20} {:>5} messages  last active {}",
            t.thread_id,
            t.message_count,
            t.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let mut capture = AudioCapture::new(None)?;
    {
        let buffer = Arc::clone(&buffer);
        capture.start(move |samples| {
            if let Ok(mut b) = buffer.lock() {
                b.extend_from_slice(samples);
            }
        })?;
    }

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = buffer
            .lock()
            .map(|mut b| std::mem::take(&mut *b))
            .unwrap_or_default();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If RMS rises while you speak, your mic is working.");
    println!("Speech well above the energy_threshold setting (default 0.03) is picked up.");

    Ok(())
}
