/*
aletheia - single-binary relay
This binary runs the WhatsApp webhook server and the Telegram polling loop inside the same process.
*/

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use common::{channel_token, resolve_secret, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use aletheia::backend::remote::RemoteBackend;
use aletheia::relay::{ChatClient, Relay};
use aletheia::telegram;
use aletheia::whatsapp::client::CloudApiClient;
use aletheia::whatsapp::server::{self, WebhookState};

#[derive(Parser, Debug)]
#[command(name = "aletheia", about = "Aletheia misinformation relay for WhatsApp and Telegram")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Do not start the WhatsApp webhook server
    #[arg(long)]
    no_whatsapp: bool,

    /// Do not start the Telegram polling loop
    #[arg(long)]
    no_telegram: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Secrets may live in a local .env file
    dotenv::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    info!("Aletheia relay - fake news detection");

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    // Load configuration with defaults, then environment overrides
    let mut config = match Config::load_with_defaults(Some(default_path.as_path()), override_path.as_deref()).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %format!("{:#}", e), "failed to load configuration");
            return Err(e);
        }
    };
    config.apply_env_overrides();
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let backend_url = config.backend_url()?;
    let backend = RemoteBackend::new(backend_url.as_str()).with_timeout(config.backend.timeout_seconds);
    info!(backend = %backend.base_url(), timeout = ?config.backend.timeout_seconds, "analysis backend configured");
    backend.check_reachable().await;
    let backend_url = backend.base_url().to_string();
    let relay = Relay::new(Arc::new(backend));

    let whatsapp_token = if args.no_whatsapp {
        None
    } else {
        channel_token(
            "whatsapp",
            config.whatsapp.enabled,
            resolve_secret(config.whatsapp.access_token_env()),
        )?
    };
    let telegram_token = if args.no_telegram {
        None
    } else {
        channel_token(
            "telegram",
            config.telegram.enabled,
            resolve_secret(config.telegram.token_env()),
        )?
    };

    if whatsapp_token.is_none() && telegram_token.is_none() {
        anyhow::bail!(
            "No chat channel enabled: set {} and/or {}",
            config.whatsapp.access_token_env(),
            config.telegram.token_env()
        );
    }

    let mut channels = Vec::new();
    if whatsapp_token.is_some() {
        channels.push("whatsapp");
    }
    if telegram_token.is_some() {
        channels.push("telegram");
    }

    // Prepare a shutdown notifier for the polling task
    let shutdown_notify = Arc::new(Notify::new());

    let mut telegram_handle = None;
    if let Some(token) = telegram_token {
        let poll_timeout = config
            .telegram
            .poll_timeout_seconds
            .unwrap_or(telegram::DEFAULT_POLL_TIMEOUT_SECS);
        let (client, me) = telegram::connect(&token, poll_timeout)
            .await
            .context("Failed to connect to Telegram")?;

        info!("Spawning telegram polling task");
        let t_relay = relay.clone();
        let t_shutdown = shutdown_notify.clone();
        telegram_handle = Some(tokio::spawn(telegram::run_polling(
            Arc::new(client),
            me,
            t_relay,
            poll_timeout,
            t_shutdown,
        )));
    }

    let mut server_result = Ok(());
    if let Some(token) = whatsapp_token {
        let phone_number_id = config
            .whatsapp
            .phone_number_id
            .clone()
            .context("whatsapp.phone_number_id must be set to send replies")?;
        let verify_token = resolve_secret(config.whatsapp.verify_token_env());
        if verify_token.is_none() {
            warn!("{} not set; webhook subscription handshakes will be refused", config.whatsapp.verify_token_env());
        }
        let app_secret = resolve_secret(config.whatsapp.app_secret_env());
        if app_secret.is_none() {
            warn!("{} not set; webhook signatures will not be checked", config.whatsapp.app_secret_env());
        }

        let client: Arc<dyn ChatClient> = Arc::new(CloudApiClient::new(
            config.whatsapp.graph_api_url(),
            phone_number_id,
            token,
        ));
        let state = WebhookState {
            started_at: Utc::now(),
            relay: relay.clone(),
            client,
            verify_token,
            app_secret,
            business_number: config.whatsapp.business_number.clone(),
            backend_url: backend_url.clone(),
            channels: channels.clone(),
        };

        // Launch the Rocket server (blocking until Rocket shuts down on SIGINT/SIGTERM)
        info!("Launching Rocket HTTP server for the WhatsApp webhook");
        server_result = server::launch(state, &config.server).await;
        if let Err(e) = &server_result {
            error!(error = %e, "Rocket server failed");
        }
    } else if let Some(handle) = telegram_handle.as_mut() {
        info!("Bot is running. Press Ctrl+C to stop.");
        let polling_exited = tokio::select! {
            res = wait_for_signal() => {
                if let Err(e) = res {
                    error!(error = %e, "failed to listen for shutdown signals");
                }
                info!("shutdown signal received");
                false
            }
            res = handle => {
                match res {
                    Ok(Ok(())) => info!("telegram polling exited"),
                    Ok(Err(e)) => error!(error = %e, "telegram polling failed"),
                    Err(join_err) => error!(%join_err, "telegram polling task panicked"),
                }
                true
            }
        };
        if polling_exited {
            telegram_handle = None;
        }
    }

    info!("Shutting down...");
    // A stored permit covers the loop being between polls
    shutdown_notify.notify_one();

    if let Some(handle) = telegram_handle {
        match tokio::time::timeout(Duration::from_secs(20), handle).await {
            Ok(Ok(Ok(()))) => info!("telegram polling exited cleanly"),
            Ok(Ok(Err(e))) => error!(error = %e, "telegram polling returned an error"),
            Ok(Err(join_err)) => error!(%join_err, "telegram polling task panicked"),
            Err(_) => info!("Timed out waiting for telegram polling to exit; continuing shutdown"),
        }
    }

    info!("Shutdown complete");
    server_result
}

/// Resolve on SIGINT, or SIGTERM where the platform has it.
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    Ok(())
}
