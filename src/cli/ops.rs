use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::account::{Database, RecoveryPhrase, SessionKeys};
use crate::actions::{Services, Settings};
use crate::backend::HttpStoreBackend;
use crate::billing::stripe::StripeBilling;
use crate::config::HotstoreConfig;
use crate::error::{AppError, AppResult};
use crate::web::{AppState, Server};

/// Wire the database, Store Backend and billing clients from configuration.
pub fn build_state(config: &HotstoreConfig) -> AppResult<AppState> {
    let db = Database::open(&config.server.db_path)?;
    let backend = HttpStoreBackend::new(
        &config.store_backend.api_url,
        &config.store_backend.admin_token,
        Duration::from_secs(config.store_backend.timeout_secs),
    )?;
    let billing = StripeBilling::new(
        &config.billing.api_url,
        &config.billing.secret_key,
        Duration::from_secs(config.billing.timeout_secs),
    )?;
    let sessions = SessionKeys::new(
        &config.server.session_secret,
        config.server.session_ttl_hours,
    )?;

    let services = Services {
        db,
        backend: Arc::new(backend),
        billing: Arc::new(billing),
        sessions,
        settings: Settings {
            base_url: config.server.base_url.clone(),
            backend_url: config.store_backend.api_url.clone(),
            trial_days: config.billing.trial_days,
        },
    };
    Ok(AppState {
        services: Arc::new(services),
        webhook_secret: config.billing.webhook_secret.clone(),
    })
}

pub async fn handle_serve_command(config: HotstoreConfig, port: Option<u16>) -> AppResult<()> {
    config.validate()?;
    let state = build_state(&config)?;
    let db = state.services.db.clone();
    let port = port.unwrap_or(config.server.port);

    info!("🚀 Hot Store starting on port {}", port);
    info!("Store backend: {}", config.store_backend.api_url);
    info!("Database: {}", config.server.db_path);

    let result = Server::new(state, port).start().await;
    db.flush().await?;
    result
}

pub fn handle_mnemonic_command() -> AppResult<()> {
    let phrase = RecoveryPhrase::generate()
        .map_err(|e| AppError::InvalidState(e.to_string()))?;
    println!("{}", phrase.to_phrase());
    Ok(())
}

pub fn handle_init_config_command(path: &str) -> AppResult<()> {
    if std::path::Path::new(path).exists() {
        return Err(AppError::Config(format!("{} already exists", path)));
    }
    HotstoreConfig::write_default(path)?;
    println!("Wrote default configuration to {}", path);
    Ok(())
}
