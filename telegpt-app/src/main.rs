//! TeleGPT: Telegram chat relay to OpenAI, Anthropic and DeepSeek models.

mod config;
mod handlers;
mod runtime;
mod scheduler;
mod store;
#[cfg(test)]
mod testing;
mod views;

use clap::{Parser, Subcommand};
use config::TeleGptConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Parser)]
#[command(name = "telegpt", version, about = "Telegram relay to LLM chat backends")]
struct Cli {
    /// Config file (TOML). Defaults to $TELEGPT_CONFIG, then ./telegpt.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the bot (default).
    Run,
    /// Validate config, open the database and report available models.
    Doctor,
    /// List the model catalog and which models have credentials.
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    let cfg = TeleGptConfig::load(cli.config).await?;

    init_tracing(cfg.logging.level.as_deref())?;
    install_panic_hook();
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            cfg.validate()?;
            runtime::run(cfg).await
        }
        Command::Doctor => {
            cfg.validate()?;
            runtime::doctor(cfg).await
        }
        Command::Models => {
            runtime::models(&cfg);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL` / `[logging] level`; otherwise the default.
fn build_env_filter(level: Option<&str>) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    match level.map(str::trim).filter(|l| !l.is_empty()) {
        Some(level) => EnvFilter::try_new(level.to_ascii_lowercase())
            .map_err(|e| anyhow::anyhow!("invalid log level {level:?}: {e}")),
        None => Ok(EnvFilter::new(DEFAULT_LOG_FILTER)),
    }
}

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let env_filter = build_env_filter(level)?;
    let log_format = std::env::var("TELEGPT_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported TELEGPT_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(log_format = %log_format, "tracing initialized");
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
