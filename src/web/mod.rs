pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::actions::Services;
use crate::error::AppResult;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    /// Secret for billing notification signatures
    pub webhook_secret: String,
}

/// Every storefront route, ready to be served or driven in tests
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/sign-in", post(handlers::sign_in))
        .route("/api/sign-up", post(handlers::sign_up))
        .route("/api/sign-out", post(handlers::sign_out))
        .route("/api/user", get(handlers::current_user))
        .route("/api/team", get(handlers::team_data))
        .route("/api/activity", get(handlers::activity))
        .route("/api/account", post(handlers::update_account))
        .route("/api/account/password", post(handlers::update_password))
        .route("/api/account/delete", post(handlers::delete_account))
        .route("/api/team/invite", post(handlers::invite_team_member))
        .route("/api/team/remove", post(handlers::remove_team_member))
        .route("/api/store", post(handlers::create_store))
        .route("/api/mnemonic", get(handlers::generate_mnemonic))
        .route("/api/pricing", get(handlers::pricing))
        .route("/api/billing/checkout", post(handlers::checkout))
        .route("/api/billing/portal", post(handlers::customer_portal))
        .route("/api/stripe/checkout", get(handlers::complete_checkout))
        .route("/api/stripe/webhook", post(handlers::stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct Server {
    state: AppState,
    bind_addr: String,
}

impl Server {
    pub fn new(state: AppState, port: u16) -> Self {
        Self {
            state,
            bind_addr: format!("0.0.0.0:{}", port),
        }
    }

    pub async fn start(self) -> AppResult<()> {
        let app = router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;

        info!("🌐 Storefront API listening on {}", self.bind_addr);
        axum::serve(listener, app).await?;
        Ok(())
    }
}
