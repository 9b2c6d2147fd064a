use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use relay_core::config::{LoggingConfig, RelayConfig};
use relay_engine::{EngineSource, HostMessage, HttpEngineSource, ReplaySource};
use relay_stream::{ChannelSink, SinkItem, StreamOptions, process, process_messages};

#[derive(Parser)]
#[command(
    name = "relay",
    about = "Normalize execution engine event streams into text message and action execution events",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a captured engine event stream (one JSON event per line)
    Replay {
        /// Path to the JSONL capture
        file: PathBuf,
    },

    /// Run host messages through the configured engine and normalize its stream
    Stream {
        /// JSON file holding an array of host messages
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    let default = LoggingConfig::default();
    let logging = logging.unwrap_or(&default);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "debug"
        } else {
            logging.level.as_deref().unwrap_or("info")
        };
        let directives = std::iter::once(level.to_string())
            .chain(logging.filters.iter().cloned())
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let writer = match logging.output.as_str() {
        "stdout" => BoxMakeWriter::new(std::io::stdout),
        _ => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// One stdout line per sink item.
fn render(item: &SinkItem) -> anyhow::Result<String> {
    Ok(match item {
        SinkItem::Event(event) => serde_json::to_string(event)?,
        SinkItem::Complete => serde_json::json!({ "type": "Complete" }).to_string(),
    })
}

/// Print sink items until completion.
async fn print_items(mut rx: mpsc::UnboundedReceiver<SinkItem>) {
    while let Some(item) = rx.recv().await {
        match render(&item) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!("Failed to render event: {e}"),
        }
        if item == SinkItem::Complete {
            break;
        }
    }
}

async fn load_messages(path: &Path) -> anyhow::Result<Vec<HostMessage>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read input {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid host messages in {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(RelayConfig::config_path);
    let config = RelayConfig::load(&config_path)?;

    init_logging(config.logging.as_ref(), cli.verbose);

    let needs_engine = matches!(cli.command, Commands::Stream { .. });
    let (warnings, errors) = config.validate(needs_engine);
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    if !errors.is_empty() {
        for error in &errors {
            tracing::error!("{error}");
        }
        anyhow::bail!("Invalid config: {}", config_path.display());
    }

    let options = StreamOptions::from(&config.stream());

    match cli.command {
        Commands::Replay { file } => {
            let source = ReplaySource::from_path(&file).await?;
            tracing::info!(events = source.len(), "Replaying {}", file.display());

            let (sink, rx) = ChannelSink::channel();
            let printer = tokio::spawn(print_items(rx));
            let result = process(&source, &Default::default(), &sink, options).await;
            drop(sink);
            printer.await?;

            let outcome = result?;
            tracing::info!(
                run_id = %outcome.run_id,
                has_error = outcome.has_error,
                "Replay finished"
            );
        }
        Commands::Stream { input } => {
            let messages = load_messages(&input).await?;
            let source = config
                .engine
                .as_ref()
                .and_then(HttpEngineSource::from_config)
                .context("No engine url configured (set engine.url)")?;
            tracing::info!(
                source = source.id(),
                url = %source.url,
                "Streaming {} messages",
                messages.len()
            );

            let (sink, rx) = ChannelSink::channel();
            let printer = tokio::spawn(print_items(rx));
            let result = process_messages(&source, &messages, &sink, options).await;
            drop(sink);
            printer.await?;

            let outcome = result?;
            tracing::info!(
                run_id = %outcome.run_id,
                has_error = outcome.has_error,
                "Stream finished"
            );
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
        },
    }

    Ok(())
}
