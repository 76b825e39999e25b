//! EduMate CLI
//!
//! Main entry point for serving the learning assistant's chat and quiz
//! sessions over HTTP and WebSocket.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use edumate_content::{CannedGenerator, ContentGenerator, OpenAiGenerator};
use edumate_session::{create_router, AppState, Config, GeneratorKind};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP server.
const DEFAULT_PORT: u16 = 3000;

/// EduMate - AI learning assistant
///
/// Serves a chat session with deferred assistant replies and a quiz session
/// that generates, records and scores multiple-choice questions.
#[derive(Parser, Debug)]
#[command(name = "edumate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: edumate.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port for the HTTP server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Content generator to use (overrides the config file)
    #[arg(short, long, value_name = "canned|openai", value_parser = parse_generator)]
    generator: Option<GeneratorKind>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("EduMate starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run_server(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration, wires the generator and serves until Ctrl+C.
async fn run_server(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(generator) = args.generator {
        config.generator = generator;
    }

    // Re-validate after overrides
    config.validate()?;

    print_config(&config);

    let generator = build_generator(&config)?;
    tracing::info!(generator = generator.name(), "Content generator ready");

    let addr = SocketAddr::new(args.host, args.port);
    let state = Arc::new(AppState::new(config, generator));
    let router = create_router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("EduMate running on http://{addr}");
    println!("  WebSocket events: ws://{addr}/ws");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

    tracing::info!("EduMate stopped");
    Ok(())
}

/// Loads the config from `--config` or from the working directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

/// Builds the content generator selected in `config`.
fn build_generator(config: &Config) -> anyhow::Result<Arc<dyn ContentGenerator>> {
    match config.generator {
        GeneratorKind::Canned => Ok(Arc::new(CannedGenerator::new())),
        GeneratorKind::OpenAi => {
            let openai = config.openai.resolve()?;
            let generator =
                OpenAiGenerator::new(openai).context("Failed to create OpenAI client")?;
            Ok(Arc::new(generator))
        }
    }
}

fn parse_generator(value: &str) -> Result<GeneratorKind, String> {
    GeneratorKind::from_str_case_insensitive(value)
        .ok_or_else(|| format!("unknown generator '{value}', expected 'canned' or 'openai'"))
}

/// Resolves when the process receives Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        // Keep serving; the process can still be killed
        std::future::pending::<()>().await;
    }
    println!();
    tracing::info!("Received Ctrl+C, shutting down");
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Generator: {}", config.generator);
    if config.generator == GeneratorKind::OpenAi {
        println!("  Model: {}", config.openai.model);
    }
    println!("  Reply delay: {}ms", config.reply_delay_ms);
    println!("  Questions per quiz: {}", config.questions_per_quiz);
}
