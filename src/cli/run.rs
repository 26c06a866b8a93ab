//! Run the bridge service.
//!
//! Wires storage, the protocol connector, and the backend lifecycle
//! together, then blocks until the lifecycle ends.
//!
//! ## Configuration loading
//!
//! Configuration is loaded from one of these sources (in order of precedence):
//! 1. `--config` flag if provided
//! 2. `BRIDGE_CONFIG` environment variable
//! 3. Default config at the platform data dir (e.g. `~/.local/share/wabridge/config.toml`)
//!
//! If the config file doesn't exist, a default one is generated. Individual
//! values can then be overridden with `BRIDGE_SERVER` / `BRIDGE_STORAGE_URL`.

use super::config::{default_config_path, BridgeConfig};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wabridge::bridge::Lifecycle;
use wabridge::storage::{persistent_session_id, AuthState, CredentialStore};
use wabridge::whatsapp::mock::{MockConnector, MockWhatsAppClient};

pub async fn execute(
    config_path: Option<String>,
    server: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .or_else(|| std::env::var("BRIDGE_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(default_config_path);

    let mut config = if config_path.exists() {
        BridgeConfig::load(&config_path)?
    } else {
        let config = BridgeConfig::default();
        config.save(&config_path)?;
        config
    };

    config.apply_env();
    if let Some(server) = server {
        config.backend.server_url = Some(server);
    }

    init_logging(&config);
    info!(config = %config_path.display(), "starting bridge");

    let server_url = config.require_server_url()?;

    let session_id = persistent_session_id(&config.session_file())?;
    let store = CredentialStore::open(&config.database_url(), session_id).await?;
    let auth = AuthState::load(store).await;

    let bot_config = config
        .backend
        .bot_config
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    // No in-process chat transport is wired up yet; the loopback connector
    // lets the backend side run end to end.
    // TODO: replace with a socket-backed connector once one lands.
    warn!("using loopback chat client; no real chat network connection");
    let (account_id, account_name) = auth
        .creds()
        .me
        .map(|me| (me.id, me.name))
        .unwrap_or_else(|| ("000000:0@lid".to_string(), None));
    let client = MockWhatsAppClient::new(&account_id, account_name.as_deref());
    let connector = MockConnector::new(client);

    let lifecycle = Lifecycle::new(server_url, bot_config);
    lifecycle.run(&connector, Some(&auth)).await?;

    info!("bridge stopped");
    Ok(())
}

fn init_logging(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => match std::fs::File::options().create(true).append(true).open(path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_writer(file).with_ansi(false))
                    .with(filter)
                    .init();
            }
            Err(e) => {
                eprintln!("Failed to open log file '{}': {}", path.display(), e);
                tracing_subscriber::registry()
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .with(filter)
                    .init();
            }
        },
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }
}
