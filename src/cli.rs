//! Command-line front end: interactive chat, one-shot ask, model listing and
//! config management.

use crate::api::{self, AssistantConfig, AssistantsApi, Message, Model, OpenAiClient, Role, Tool};
use crate::config::{self, Config};
use crate::conversation::{ConversationEvent, ConversationManager, PollOutcome};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Chat with an OpenAI assistant from the terminal
#[derive(Parser, Debug)]
#[command(name = "convo", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive conversation (default)
    Chat(AssistantArgs),
    /// Ask a single question and print the answer
    Ask(AskArgs),
    /// List known models
    Models,
    /// View or modify configuration
    Config(ConfigArgs),
}

/// Which assistant to talk to.
#[derive(Parser, Debug, Default, Clone)]
pub struct AssistantArgs {
    /// Attach to an existing assistant instead of creating one
    #[arg(short, long, value_name = "ASSISTANT_ID")]
    pub assistant: Option<String>,

    /// Name for a newly created assistant
    #[arg(long)]
    pub name: Option<String>,

    /// Model for a newly created assistant
    #[arg(short, long)]
    pub model: Option<String>,

    /// Instructions for a newly created assistant
    #[arg(short, long)]
    pub instructions: Option<String>,

    /// Built-in tool for a newly created assistant (repeatable)
    #[arg(short, long = "tool", value_name = "TOOL")]
    pub tools: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct AskArgs {
    /// The question (use "-" to read from stdin)
    #[arg(required = true)]
    pub question: String,

    #[command(flatten)]
    pub assistant: AssistantArgs,

    /// Output format
    #[arg(short = 'o', long, default_value = "text", value_enum)]
    pub output_format: OutputFormat,

    /// Print only the answer, no progress
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Key to get
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Key to set
        key: String,
        /// Value to set
        value: String,
    },
    /// Show config file path
    Path,
}

/// JSON output for `ask --output json`.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonEvent {
    Done {
        run_id: String,
        message_id: String,
        response: String,
    },
    Error {
        message: String,
    },
}

/// Initialize tracing.
///
/// `CONVO_LOG` writes debug logs to `convo.log`; otherwise `RUST_LOG` or
/// `--verbose` log to stderr.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    if std::env::var("CONVO_LOG").is_ok() {
        match std::fs::File::create("convo.log") {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(EnvFilter::new("convo=debug")))
                    .try_init();
            }
            Err(err) => eprintln!("Failed to create log file: {err}"),
        }
    } else if verbose {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("convo=debug"))
            .with_writer(io::stderr)
            .try_init();
    } else if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .try_init();
    }
}

/// Build the API client and a manager from config.
fn build_manager(config: &Config) -> Result<ConversationManager> {
    let api_key = config.api_key().ok_or(api::Error::MissingApiKey {
        env_var: api::API_KEY_ENV,
    })?;
    let base_url = config.base_url();
    debug!(%base_url, "Using Assistants API endpoint");
    let client: Arc<dyn AssistantsApi> = Arc::new(OpenAiClient::with_base_url(
        api_key,
        config.organization(),
        base_url,
    ));
    let policy = config.backoff();
    debug!(worst_case = ?policy.worst_case_wait(), "Polling policy");
    Ok(ConversationManager::new(client).with_policy(policy))
}

/// Assistant creation request: CLI flags over config defaults.
fn assistant_request(args: &AssistantArgs, config: &Config) -> Result<AssistantConfig> {
    let mut request = config.assistant_config()?;
    if let Some(name) = &args.name {
        request.name = Some(name.clone());
    }
    if let Some(model) = &args.model {
        let model: Model = model.parse().map_err(anyhow::Error::msg)?;
        request.model = model.id().to_string();
    }
    if let Some(instructions) = &args.instructions {
        request.instructions = Some(instructions.clone());
    }
    if !args.tools.is_empty() {
        request.tools = args
            .tools
            .iter()
            .map(|name| Tool::builtin(name).with_context(|| format!("Unknown tool: {name}")))
            .collect::<Result<_>>()?;
    }
    Ok(request)
}

/// Attach to or create the assistant and open a thread.
async fn bind_assistant(
    manager: &ConversationManager,
    args: &AssistantArgs,
    config: &Config,
) -> Result<String> {
    if let Some(id) = args.assistant.as_ref().or(config.assistant_id.as_ref()) {
        let assistant = manager
            .get_assistant(id)
            .await?
            .with_context(|| format!("Assistant {id} not found"))?;
        return Ok(describe_assistant(
            &assistant.id,
            assistant.name.as_deref(),
            &assistant.model,
        ));
    }

    let request = assistant_request(args, config)?;
    let assistant = manager.initialize_assistant(&request).await?;
    Ok(describe_assistant(
        &assistant.id,
        assistant.name.as_deref(),
        &assistant.model,
    ))
}

fn describe_assistant(id: &str, name: Option<&str>, model: &str) -> String {
    match name {
        Some(name) => format!("{name} ({id}, {model})"),
        None => format!("{id} ({model})"),
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    }
}

fn render_message(message: &Message) -> String {
    let text = message.text();
    let images = message
        .content
        .iter()
        .filter(|c| matches!(c, api::MessageContent::ImageFile { .. }))
        .count();
    let mut rendered = format!("{}: {text}", role_label(message.role));
    if images > 0 {
        rendered.push_str(&format!("\n[{images} image attachment(s)]"));
    }
    rendered
}

fn render_status(event: &ConversationEvent) -> Option<String> {
    match event {
        ConversationEvent::Status { status, steps } => {
            Some(format!("[{status}] {} step(s)", steps.len()))
        }
        _ => None,
    }
}

/// Run the interactive chat loop.
pub async fn chat(args: AssistantArgs) -> ExitCode {
    match chat_inner(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn chat_inner(args: AssistantArgs) -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let manager = build_manager(&config)?;
    let mut events = manager.subscribe();

    let description = bind_assistant(&manager, &args, &config).await?;
    println!("Connected to {description}. Type /quit to exit, /history to show the thread.");
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/cancel" => {
                        if !manager.cancel() {
                            println!("Nothing to cancel.");
                        }
                    }
                    "/history" => {
                        for message in manager.conversation_history().await?.iter().rev() {
                            println!("{}", render_message(message));
                        }
                    }
                    question => {
                        manager.submit_question(question).await;
                        continue;
                    }
                }
                prompt()?;
            }
            Some(event) = events.recv() => {
                match &event {
                    ConversationEvent::Response(message) => {
                        println!("{}", render_message(message));
                        prompt()?;
                    }
                    ConversationEvent::Status { .. } => {
                        if let Some(line) = render_status(&event) {
                            eprintln!("{line}");
                        }
                    }
                    ConversationEvent::Error(message) => {
                        eprintln!("Error: {message}");
                        prompt()?;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if !manager.cancel() {
                    break;
                }
            }
        }
    }

    manager.cancel();
    Ok(())
}

fn prompt() -> Result<()> {
    print!("You: ");
    io::stdout().flush()?;
    Ok(())
}

/// Run the one-shot ask mode.
pub async fn ask(args: AskArgs) -> ExitCode {
    let format = args.output_format;
    match ask_inner(args).await {
        Ok(code) => code,
        Err(e) => {
            report_error(format, &format!("{e:#}"));
            ExitCode::from(1)
        }
    }
}

async fn ask_inner(args: AskArgs) -> Result<ExitCode> {
    let question = if args.question == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer.trim().to_string()
    } else {
        args.question.clone()
    };
    if question.is_empty() {
        anyhow::bail!("Empty question");
    }

    let config = Config::load().context("Failed to load config")?;
    let manager = build_manager(&config)?;
    bind_assistant(&manager, &args.assistant, &config).await?;

    let mut events = manager.subscribe();
    let Some(handle) = manager.submit_question(&question).await else {
        let reason = drain_errors(&mut events).unwrap_or_else(|| "submission failed".into());
        anyhow::bail!(reason);
    };
    let run_id = handle.run_id.clone();

    let wait = handle.wait();
    tokio::pin!(wait);
    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            Some(event) = events.recv() => {
                if !args.quiet && let Some(line) = render_status(&event) {
                    eprintln!("{line}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                manager.cancel();
            }
        }
    };

    match outcome {
        PollOutcome::Completed(message) => {
            match args.output_format {
                OutputFormat::Text => println!("{}", message.text()),
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&JsonEvent::Done {
                        run_id,
                        message_id: message.id.clone(),
                        response: message.text(),
                    })?;
                    println!("{json}");
                }
            }
            Ok(ExitCode::from(0))
        }
        PollOutcome::Cancelled => {
            report_error(args.output_format, "Cancelled");
            Ok(ExitCode::from(3))
        }
        _ => {
            let reason = drain_errors(&mut events).unwrap_or_else(|| format!("{outcome:?}"));
            report_error(args.output_format, &reason);
            Ok(ExitCode::from(1))
        }
    }
}

/// Last error message already emitted, if any.
fn drain_errors(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<ConversationEvent>,
) -> Option<String> {
    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let ConversationEvent::Error(message) = event {
            last = Some(message);
        }
    }
    last
}

fn report_error(format: OutputFormat, message: &str) {
    match format {
        OutputFormat::Text => eprintln!("Error: {message}"),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string(&JsonEvent::Error {
                message: message.to_string(),
            }) {
                println!("{json}");
            }
        }
    }
}

/// Print the model enumeration.
#[must_use]
pub fn models() -> ExitCode {
    for model in Model::ALL {
        println!(
            "{:<22} {:>7} tokens  {}",
            model.id(),
            model.context_window(),
            model.description()
        );
    }
    ExitCode::SUCCESS
}

/// Run the config command.
#[must_use]
pub fn config(args: ConfigArgs) -> ExitCode {
    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            return ExitCode::from(1);
        }
    };

    match args.action {
        None => {
            for key in config::KEYS {
                let value = config.get(key).ok().flatten();
                println!("{key}: {}", value.as_deref().unwrap_or("(not set)"));
            }
            ExitCode::from(0)
        }
        Some(ConfigAction::Path) => {
            println!("{}", config::config_path().display());
            ExitCode::from(0)
        }
        Some(ConfigAction::Get { key }) => match config.get(&key) {
            Ok(value) => {
                println!("{}", value.as_deref().unwrap_or("(not set)"));
                ExitCode::from(0)
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::from(1)
            }
        },
        Some(ConfigAction::Set { key, value }) => {
            if let Err(e) = config.set(&key, &value) {
                eprintln!("{e}");
                return ExitCode::from(1);
            }
            if let Err(e) = config.save() {
                eprintln!("Failed to save config: {e}");
                return ExitCode::from(1);
            }
            println!("Updated {key}");
            ExitCode::from(0)
        }
    }
}
