//! Startup wiring for the `run`, `doctor` and `models` commands.

use crate::config::TeleGptConfig;
use crate::handlers::{BotContext, HandlerRouter, UpdateHandler};
use crate::scheduler::{Scheduler, SchedulerSettings};
use crate::store::{ConversationStore, SqliteStore};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use telegpt_llm::{BackendRegistry, ModelKind};
use telegpt_telegram::{Messenger, TelegramClient, UpdateSource};
use tokio_util::sync::CancellationToken;

#[tracing::instrument(level = "info", skip_all)]
pub async fn run(cfg: TeleGptConfig) -> Result<()> {
    let telegram = Arc::new(
        TelegramClient::with_base_url(&cfg.telegram.bot_token, &cfg.telegram.api_base_url)
            .context("build telegram client")?,
    );
    let me = telegram
        .get_me()
        .await
        .context("telegram credential check (getMe)")?;
    tracing::info!(bot_id = me.id, username = ?me.username, "telegram bot authenticated");

    let backends = Arc::new(build_backends(&cfg));
    let store = open_store(&cfg, backends.default_model())?;

    let messenger: Arc<dyn Messenger> = Arc::clone(&telegram) as Arc<dyn Messenger>;
    let source: Arc<dyn UpdateSource> = telegram;
    let router: Arc<dyn UpdateHandler> = Arc::new(HandlerRouter::new(BotContext {
        store,
        backends,
        messenger: Arc::clone(&messenger),
        context_turns: cfg.conversation.context_turns,
    }));

    let settings = SchedulerSettings::from(&cfg.polling);
    let scheduler = Scheduler::start(source, router, messenger, settings)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    shutdown.cancelled().await;

    let state = scheduler.stop().await?;
    tracing::info!(
        next_offset = state.next_offset,
        "telegpt stopped; pass this as polling.initial_offset to resume without replay"
    );
    Ok(())
}

/// Validate config, open the database, report backend availability.
pub async fn doctor(cfg: TeleGptConfig) -> Result<()> {
    let backends = build_backends(&cfg);
    let default_model = backends.default_model();
    open_store(&cfg, default_model)?;
    let available: Vec<&str> = backends.available().iter().map(|kind| kind.key()).collect();
    tracing::info!(
        database_path = %cfg.storage.database_path,
        available_models = ?available,
        default_model = %default_model,
        fast_interval_ms = cfg.polling.fast_interval_ms,
        slow_interval_ms = cfg.polling.slow_interval_ms,
        "config ok"
    );
    if available.is_empty() {
        tracing::warn!("no model backend has an api key; every chat message will get the unavailable notice");
    }
    Ok(())
}

/// Print the model catalog with availability.
pub fn models(cfg: &TeleGptConfig) {
    let backends = build_backends(cfg);
    let settings = cfg.model_settings();
    let default_model = backends.default_model();
    for kind in ModelKind::ALL {
        let model_id = match kind {
            ModelKind::ChatGpt => &settings.chatgpt,
            ModelKind::Claude => &settings.claude,
            ModelKind::DeepSeek => &settings.deepseek,
        };
        let status = if backends.is_available(kind) {
            "available"
        } else {
            "no api key"
        };
        let marker = if kind == default_model { "*" } else { " " };
        println!(
            "{marker} {:<9} {:<10} {:<28} {status}",
            kind.key(),
            kind.provider().label(),
            model_id
        );
    }
}

fn build_backends(cfg: &TeleGptConfig) -> BackendRegistry {
    BackendRegistry::from_config(&cfg.provider_keys(), &cfg.model_settings())
}

fn open_store(cfg: &TeleGptConfig, default_model: ModelKind) -> Result<Arc<dyn ConversationStore>> {
    let path = Path::new(&cfg.storage.database_path);
    let store = SqliteStore::open(path, default_model.key())?;
    tracing::info!(path = %path.display(), "database ready");
    Ok(Arc::new(store))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; stopping scheduler");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; stopping scheduler");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; stopping scheduler");
        }
    }
    shutdown.cancel();
}
