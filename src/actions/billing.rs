//! Checkout, customer portal and plan listing

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::{ActionResponse, Services};
use crate::account::types::{SubscriptionUpdate, Team, User};
use crate::account::{RequestContext, SessionChange};
use crate::billing::{CheckoutRequest, Plan};
use crate::error::AppResult;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckoutForm {
    pub price_id: String,
}

/// Sign-up page that resumes checkout for `price_id` afterwards
fn sign_up_then_checkout(price_id: &str) -> String {
    format!(
        "/sign-up?redirect=checkout&priceId={}",
        urlencoding::encode(price_id)
    )
}

/// Send the user to hosted checkout for `price_id`.
///
/// Without a team there is nobody to bill yet, so the user is sent to sign up
/// first with the checkout intent preserved.
pub async fn checkout_redirect(
    services: &Services,
    user: &User,
    team: Option<&Team>,
    price_id: Option<&str>,
) -> AppResult<ActionResponse> {
    let Some(price_id) = price_id.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(ActionResponse::error("Please choose a plan."));
    };
    let Some(team) = team else {
        return Ok(ActionResponse::redirect(sign_up_then_checkout(price_id)));
    };

    let request = CheckoutRequest {
        price_id: price_id.to_string(),
        customer_id: team.stripe_customer_id.clone(),
        client_reference_id: user.id.to_string(),
        success_url: services.url("/api/stripe/checkout?session_id={CHECKOUT_SESSION_ID}"),
        cancel_url: services.url("/pricing"),
        trial_days: services.settings.trial_days,
    };
    match services.billing.create_checkout_session(&request).await {
        Ok(url) => Ok(ActionResponse::redirect(url)),
        Err(e) => {
            warn!("Checkout session creation failed for team {}: {}", team.id, e);
            Ok(ActionResponse::error("Unable to start checkout. Please try again."))
        }
    }
}

pub async fn checkout(
    services: &Services,
    ctx: &RequestContext,
    form: CheckoutForm,
) -> AppResult<ActionResponse> {
    let Some(user) = &ctx.user else {
        return Ok(ActionResponse::redirect(sign_up_then_checkout(form.price_id.trim())));
    };
    let team = services.team_of(user.id)?;
    checkout_redirect(services, user, team.as_ref(), Some(&form.price_id)).await
}

pub async fn customer_portal(
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<ActionResponse> {
    let user = signed_in!(ctx);
    let Some(team) = services.team_of(user.id)? else {
        return Ok(ActionResponse::redirect("/pricing"));
    };
    let (Some(customer), Some(_)) = (&team.stripe_customer_id, &team.stripe_product_id) else {
        return Ok(ActionResponse::redirect("/pricing"));
    };

    match services
        .billing
        .create_portal_session(customer, &services.url("/dashboard"))
        .await
    {
        Ok(url) => Ok(ActionResponse::redirect(url)),
        Err(e) => {
            warn!("Portal session creation failed for team {}: {}", team.id, e);
            Ok(ActionResponse::error("Unable to open the billing portal. Please try again."))
        }
    }
}

/// Return leg of hosted checkout: mirror the subscription onto the team and sign the buyer in.
pub async fn complete_checkout(
    services: &Services,
    session_id: Option<&str>,
) -> AppResult<ActionResponse> {
    let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
        return Ok(ActionResponse::redirect("/pricing"));
    };

    let completion = match services.billing.retrieve_checkout(session_id).await {
        Ok(c) => c,
        Err(e) => {
            error!("Could not resolve checkout session {}: {}", session_id, e);
            return Ok(ActionResponse::redirect("/error"));
        }
    };

    let user = match completion
        .client_reference_id
        .as_deref()
        .and_then(|id| id.parse().ok())
    {
        Some(id) => services.db.get_user(id)?.filter(|u| !u.is_deleted()),
        None => None,
    };
    let Some(user) = user else {
        error!("Checkout session {} references no known user", session_id);
        return Ok(ActionResponse::redirect("/error"));
    };
    let Some(team) = services.team_of(user.id)? else {
        error!("User {} completed checkout without a team", user.id);
        return Ok(ActionResponse::redirect("/error"));
    };

    let update = SubscriptionUpdate {
        stripe_customer_id: Some(completion.customer_id),
        stripe_subscription_id: Some(completion.subscription_id),
        stripe_product_id: Some(completion.product_id),
        plan_name: Some(completion.plan_name),
        subscription_status: completion.status,
    };
    services.db.update_team_subscription(team.id, &update)?;
    info!(
        "Team {} subscribed to {:?} ({})",
        team.id, update.plan_name, update.subscription_status
    );

    Ok(ActionResponse::redirect("/dashboard")
        .with_session(SessionChange::Set(services.sessions.issue(user.id))))
}

/// Plans offered on the pricing page; Base and Plus are always listed.
pub async fn pricing(services: &Services) -> AppResult<ActionResponse> {
    let mut plans = services.billing.list_plans().await.unwrap_or_else(|e| {
        warn!("Could not load plans from billing provider: {}", e);
        Vec::new()
    });
    for name in ["Base", "Plus"] {
        if !plans.iter().any(|p| p.name == name) {
            plans.extend(Plan::fallback(name));
        }
    }
    Ok(ActionResponse::from_state(Default::default()).with_data(json!({ "plans": plans })))
}
