// HTTP handlers: extract the request context, run the action, render the outcome
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Query, State},
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use super::AppState;
use crate::account::session::{session_cookie, token_from_cookie_header};
use crate::account::RequestContext;
use crate::actions::account::{DeleteAccountForm, UpdateAccountForm, UpdatePasswordForm};
use crate::actions::billing::CheckoutForm;
use crate::actions::login::{SignInForm, SignUpForm};
use crate::actions::provisioning::CreateStoreForm;
use crate::actions::team::{InviteForm, RemoveMemberForm};
use crate::actions::{self, ActionResponse};
use crate::billing::webhook;
use crate::error::{AppError, AppResult};

const SIGNATURE_HEADER: &str = "stripe-signature";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Internal server error" })),
        )
            .into_response()
    }
}

/// Resolve the session cookie into the signed-in user, if any.
#[async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let mut ctx = RequestContext::anonymous();
        ctx.ip_address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let token = parts
            .headers
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(token_from_cookie_header);
        if let Some(token) = token {
            match state.services.sessions.verify(token) {
                Ok(user_id) => {
                    ctx.user = state
                        .services
                        .db
                        .get_user(user_id)?
                        .filter(|u| !u.is_deleted());
                }
                Err(e) => debug!("Ignoring session cookie: {}", e),
            }
        }
        Ok(ctx)
    }
}

/// 303 to `location`; a target that cannot be a header value is a server error.
fn see_other(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(LOCATION, value)]).into_response(),
        Err(e) => {
            error!("Unrepresentable redirect target {:?}: {}", location, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// 303 to the redirect target, or the JSON form state; plus any cookie change.
fn render(state: &AppState, response: ActionResponse) -> Response {
    let mut http = match &response.redirect {
        Some(location) => see_other(location),
        None => Json(&response.state).into_response(),
    };
    if let Some(cookie) = session_cookie(&response.session, state.services.sessions.ttl()) {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                http.headers_mut().insert(SET_COOKIE, value);
            }
            Err(e) => warn!("Unrepresentable session cookie: {}", e),
        }
    }
    http
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn sign_in(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<SignInForm>,
) -> AppResult<Response> {
    let response = actions::login::sign_in(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn sign_up(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<SignUpForm>,
) -> AppResult<Response> {
    let response = actions::login::sign_up(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn sign_out(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let response = actions::login::sign_out(&state.services, &ctx).await?;
    Ok(render(&state, response))
}

pub async fn current_user(State(state): State<AppState>, ctx: RequestContext) -> Response {
    render(&state, actions::account::current_user(&ctx))
}

pub async fn team_data(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let response = actions::team::team_data(&state.services, &ctx)?;
    Ok(render(&state, response))
}

pub async fn activity(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let response = actions::account::activity(&state.services, &ctx)?;
    Ok(render(&state, response))
}

pub async fn update_account(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<UpdateAccountForm>,
) -> AppResult<Response> {
    let response = actions::account::update_account(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn update_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<UpdatePasswordForm>,
) -> AppResult<Response> {
    let response = actions::account::update_password(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn delete_account(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<DeleteAccountForm>,
) -> AppResult<Response> {
    let response = actions::account::delete_account(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn invite_team_member(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<InviteForm>,
) -> AppResult<Response> {
    let response = actions::team::invite_team_member(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn remove_team_member(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<RemoveMemberForm>,
) -> AppResult<Response> {
    let response = actions::team::remove_team_member(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn create_store(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<CreateStoreForm>,
) -> AppResult<Response> {
    let response = actions::provisioning::create_store(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn generate_mnemonic(State(state): State<AppState>, ctx: RequestContext) -> Response {
    render(&state, actions::provisioning::generate_mnemonic(&ctx))
}

pub async fn pricing(State(state): State<AppState>) -> AppResult<Response> {
    let response = actions::billing::pricing(&state.services).await?;
    Ok(render(&state, response))
}

pub async fn checkout(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<CheckoutForm>,
) -> AppResult<Response> {
    let response = actions::billing::checkout(&state.services, &ctx, form).await?;
    Ok(render(&state, response))
}

pub async fn customer_portal(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> AppResult<Response> {
    let response = actions::billing::customer_portal(&state.services, &ctx).await?;
    Ok(render(&state, response))
}

#[derive(Deserialize, Debug, Default)]
pub struct CheckoutQuery {
    pub session_id: Option<String>,
}

pub async fn complete_checkout(
    State(state): State<AppState>,
    Query(query): Query<CheckoutQuery>,
) -> AppResult<Response> {
    let response =
        actions::billing::complete_checkout(&state.services, query.session_id.as_deref()).await?;
    Ok(render(&state, response))
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = webhook::verify_signature(&body, signature, &state.webhook_secret, now) {
        warn!("Rejected billing notification: {}", e);
        return Ok((StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid signature" })))
            .into_response());
    }

    let event = match webhook::parse_event(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Unreadable billing notification: {}", e);
            return Ok((StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid payload" })))
                .into_response());
        }
    };
    if let Some(event) = event {
        let services = &state.services;
        webhook::handle_subscription_change(&services.db, services.billing.as_ref(), &event).await?;
    }
    Ok(Json(json!({ "received": true })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_see_other_sets_location() {
        let response = see_other("/sign-up?redirect=checkout&priceId=price_1");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[LOCATION],
            "/sign-up?redirect=checkout&priceId=price_1"
        );
    }

    #[test]
    fn test_see_other_with_control_characters() {
        let response = see_other("/sign-up?priceId=a\nb");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(LOCATION).is_none());
    }
}
