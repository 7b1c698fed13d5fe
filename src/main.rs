//! # Forensic Assistant
//!
//! ```bash
//! forensic-assistant serve --port 8080   # HTTP API
//! forensic-assistant chat                # terminal conversation
//! ```
//!
//! Configuration comes from `config.toml`, `config.local.toml` and
//! `FORENSIC_*` environment variables; the completion credential falls back
//! to `OPENAI_API_KEY`.
//!
//! Logging environment:
//! - `FORENSIC_LOG_FILE`: append logs to this file (non-blocking writer)
//! - `FORENSIC_LOG_LEVEL`: filter directive, overrides `logging.level`
//! - `FORENSIC_LOG_JSON`: `1` for JSON lines, overrides `logging.format`

use anyhow::Context;
use clap::{Parser, Subcommand};
use forensic_assistant::api;
use forensic_assistant::config::LoggingConfig;
use forensic_assistant::{Config, Handler, TurnStatus};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser)]
#[command(name = "forensic-assistant")]
#[command(about = "Ask questions about the forensics database in plain language", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config.toml + config.local.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Interactive conversation in the terminal
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(&path.to_string_lossy()),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.http.host = host;
            }
            if let Some(port) = port {
                config.http.port = port;
            }
            init_tracing(&config.logging, true);
            serve(config).await
        }
        Commands::Chat => {
            init_tracing(&config.logging, false);
            chat(config).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let handler = Arc::new(Handler::from_config(&config).context("failed to start")?);
    tracing::info!(
        database = %config.database.path.display(),
        client = handler.gateway().completion_client(),
        model = %config.completion.model,
        "assistant_ready"
    );
    api::start_http_server(handler, &config.http)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("HTTP server failed")
}

async fn chat(config: Config) -> anyhow::Result<()> {
    let handler = Handler::from_config(&config).context("failed to start")?;
    let session_id = handler.create_session()?;

    println!("Forensic Digital Assistant");
    println!("Ask me anything about the forensics data. Type .quit to exit.\n");

    let mut rl = DefaultEditor::new()?;
    loop {
        let line = match rl.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == ".quit" || question == ".exit" {
            break;
        }
        let _ = rl.add_history_entry(question);

        let turn = handler.ask(&session_id, question).await?;
        // Only the latest exchange is shown
        print!("\x1B[2J\x1B[H");
        println!("You: {}", turn.question);
        match turn.status {
            TurnStatus::Ok => println!("Assistant: {}\n", turn.answer),
            TurnStatus::Error => println!("Assistant (error): {}\n", turn.answer),
        }
    }

    handler.close_session(&session_id)?;
    Ok(())
}

/// Install the global subscriber.
///
/// Logs go to `FORENSIC_LOG_FILE` when set. Otherwise `serve` logs to stdout
/// and `chat` stays quiet so the conversation is not interleaved with logs.
fn init_tracing(logging_config: &LoggingConfig, console_fallback: bool) {
    let json = env::var("FORENSIC_LOG_JSON")
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0");
    let level = env::var("FORENSIC_LOG_LEVEL")
        .ok()
        .unwrap_or_else(|| logging_config.level.clone());

    let (writer, guard) = match env::var("FORENSIC_LOG_FILE") {
        Ok(log_path) => {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("ERROR: Unable to open FORENSIC_LOG_FILE '{log_path}': {e}");
                    return;
                }
            };
            tracing_appender::non_blocking(file)
        }
        Err(_) if console_fallback => tracing_appender::non_blocking(std::io::stdout()),
        Err(_) => return,
    };
    let _ = TRACE_GUARD.set(guard);

    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(writer);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
