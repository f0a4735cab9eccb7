//! wirebot entry point: configuration, credential bootstrap, plugin
//! registration, and the gateway connection lifecycle.

mod handler;

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wirebot_client::gateway::GatewayTransport;
use wirebot_client::lifecycle::{LifecycleManager, RunOutcome};
use wirebot_client::reconnect::RetryPolicy;
use wirebot_core::config::Config;
use wirebot_plugins::builtin::{MenuPlugin, PingPlugin};
use wirebot_plugins::registry::PluginRegistry;
use wirebot_session::bootstrap::bootstrap;
use wirebot_session::fetch::HttpBlobStore;
use wirebot_session::store::SessionStore;

use crate::handler::BotHandler;

/// Exit code for a session that ended (logout or exhausted retries).
const EXIT_CONNECTION_LOST: u8 = 1;

/// Exit code for configuration and bootstrap failures.
const EXIT_BAD_STARTUP: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wirebot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_BAD_STARTUP);
        }
    };

    let store = SessionStore::new(config.session_dir.clone());
    let blobs = HttpBlobStore::new(config.blob_store_url.clone());
    let creds = match bootstrap(&store, &blobs, config.session_id.as_deref()).await {
        Ok(creds) => creds,
        Err(e) => {
            tracing::error!(error = %e, "Credential bootstrap failed");
            return ExitCode::from(EXIT_BAD_STARTUP);
        }
    };

    let mut registry = PluginRegistry::new(config.command_prefix.clone());
    registry.register(Arc::new(PingPlugin));
    registry.register(Arc::new(MenuPlugin));

    let handler = Arc::new(BotHandler::new(
        Arc::new(registry),
        config.owner_jid.clone(),
        config.menu_image_url.clone(),
    ));

    let manager = LifecycleManager::new(
        GatewayTransport::new(config.gateway_url.clone()),
        store,
        RetryPolicy {
            base: config.reconnect_base,
            cap: config.reconnect_cap,
            max_retries: config.max_reconnect_attempts,
        },
        handler,
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal_cancel.cancel();
        }
    });

    match manager.run(creds, &cancel).await {
        RunOutcome::Cancelled => {
            tracing::info!("Shut down cleanly");
            ExitCode::SUCCESS
        }
        RunOutcome::LoggedOut => {
            tracing::error!("Session logged out; provision a new session to continue");
            ExitCode::from(EXIT_CONNECTION_LOST)
        }
        RunOutcome::RetriesExhausted => {
            tracing::error!("Gateway unreachable after all reconnect attempts");
            ExitCode::from(EXIT_CONNECTION_LOST)
        }
    }
}
