//! One store per account, then four hot wallets on it
//!
//! The store flag is claimed atomically before the Store Backend is called,
//! so a second submission can never create a second store. Wallets are
//! independent: each one is attempted concurrently and reported by name,
//! and nothing already created is rolled back.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use super::outcome::{run_named, Tally};
use super::{ActionResponse, ActionState, Services};
use crate::account::types::ActivityType;
use crate::account::{RecoveryPhrase, RequestContext, StoreClaim};
use crate::backend::{BasicCredentials, CreateStoreRequest, GenerateWalletRequest, WalletKind};
use crate::error::AppResult;

const UNEXPECTED: &str = "An unexpected error occurred while creating the store or wallets.";
const NOT_AUTHENTICATED: &str = "User not authenticated.";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct CreateStoreForm {
    pub email: String,
    pub password: String,
    pub mnemonic: Option<String>,
}

pub async fn create_store(
    services: &Services,
    ctx: &RequestContext,
    form: CreateStoreForm,
) -> AppResult<ActionResponse> {
    match provision(services, ctx, form).await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("Store provisioning aborted (request {}): {}", ctx.request_id, e);
            Ok(ActionResponse::error(UNEXPECTED))
        }
    }
}

async fn provision(
    services: &Services,
    ctx: &RequestContext,
    form: CreateStoreForm,
) -> AppResult<ActionResponse> {
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        return Ok(ActionResponse::error("Email and password are required."));
    }
    let Some(user) = &ctx.user else {
        return Ok(ActionResponse::error(NOT_AUTHENTICATED));
    };
    if email != user.email {
        return Ok(ActionResponse::error(
            "The provided email does not match your account email.",
        ));
    }

    let phrase = match form.mnemonic.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(supplied) => match RecoveryPhrase::from_phrase(supplied) {
            Ok(phrase) => phrase,
            Err(_) => return Ok(ActionResponse::error("Invalid mnemonic phrase.")),
        },
        None => match RecoveryPhrase::generate() {
            Ok(phrase) => phrase,
            Err(e) => {
                error!("Could not generate a recovery phrase: {}", e);
                return Ok(ActionResponse::error(UNEXPECTED));
            }
        },
    };

    let team = services.team_of(user.id)?;
    if !team.as_ref().is_some_and(|t| t.can_provision()) {
        return Ok(ActionResponse::error(
            "You need an active or trialing subscription to create a store and wallets.",
        ));
    }

    match services.db.claim_store_slot(user.id)? {
        StoreClaim::Claimed => {}
        StoreClaim::AlreadyHasStore => {
            return Ok(ActionResponse::error(
                "You already have one store, you can delete it to create a new one or upgrade your Current Plan",
            ))
        }
        StoreClaim::UnknownUser => return Ok(ActionResponse::error(NOT_AUTHENTICATED)),
    }

    let creds = BasicCredentials {
        username: email.to_string(),
        password: form.password,
    };

    let store = match services
        .backend
        .create_store(&creds, &CreateStoreRequest::hot_store(&services.settings.backend_url))
        .await
    {
        Ok(store) => store,
        Err(e) => {
            warn!("Store creation failed for user {}: {}", user.id, e);
            if e.is_rejection() {
                services.db.release_store_slot(user.id)?;
            }
            return Ok(ActionResponse::error("Store creation failed on server."));
        }
    };

    let Some(store_id) = store.get("id").and_then(Value::as_str).map(str::to_string) else {
        error!("Store backend answered without a store id: {}", store);
        return Ok(ActionResponse::error(UNEXPECTED));
    };
    info!("Created store {} for user {}", store_id, user.id);
    // From here on the store exists remotely, so local write failures are only logged
    if let Err(e) = services.db.record_store_id(user.id, &store_id) {
        error!("Could not record store {} on user {}: {}", store_id, user.id, e);
    }
    if let Err(e) = services.log_activity(team.map(|t| t.id), user.id, ActivityType::CreateStore, ctx) {
        warn!("Could not log store creation for user {}: {}", user.id, e);
    }

    let request = GenerateWalletRequest::hot_wallet(Some(phrase.to_phrase()));
    let ops = WalletKind::ALL
        .iter()
        .map(|kind| {
            let call = services
                .backend
                .generate_wallet(&creds, &store_id, *kind, &request);
            (kind.label().to_string(), call)
        })
        .collect();
    let results = run_named(ops).await;

    let mut tally = Tally::default();
    tally.succeed("Store");
    let mut data = Map::new();
    data.insert("store".to_string(), store);

    for (kind, (label, result)) in WalletKind::ALL.iter().zip(results) {
        match result {
            Ok(wallet) => {
                data.insert(kind.data_key().to_string(), wallet);
                tally.succeed(label);
            }
            Err(e) => {
                warn!("{} creation failed on store {}: {}", label, store_id, e);
                tally.fail(label);
            }
        }
    }

    if !tally.all_succeeded() {
        warn!("Store {} provisioned partially: {:?}", store_id, tally.failed);
    }

    Ok(ActionResponse::from_state(ActionState {
        success: tally.success_message(),
        error: tally.error_message(),
        data: Some(Value::Object(data)),
    }))
}

/// A fresh 12-word recovery phrase for the store wallet form
pub fn generate_mnemonic(ctx: &RequestContext) -> ActionResponse {
    if let Err(response) = super::require_user(ctx) {
        return response;
    }
    match RecoveryPhrase::generate() {
        Ok(phrase) => ActionResponse::success("Mnemonic generated successfully.")
            .with_data(json!({ "mnemonic": phrase.to_phrase() })),
        Err(e) => {
            error!("Could not generate a recovery phrase: {}", e);
            ActionResponse::error("Failed to generate mnemonic.")
        }
    }
}
