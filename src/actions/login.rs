//! Sign-in, sign-up and sign-out

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{billing::checkout_redirect, ActionResponse, Services};
use crate::account::auth::{self, MAX_PASSWORD_LEN};
use crate::account::types::{ActivityType, InvitationStatus, Role, Team, User};
use crate::account::{RequestContext, SessionChange};
use crate::backend::NewBackendUser;
use crate::error::{AppError, AppResult};

const INVALID_CREDENTIALS: &str = "Invalid email or password. Please try again.";
const SIGN_UP_FAILED: &str = "Failed to create user. Please try again.";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SignInForm {
    pub email: String,
    pub password: String,
    pub redirect: Option<String>,
    pub price_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub invite_id: Option<String>,
    pub redirect: Option<String>,
    pub price_id: Option<String>,
}

/// Echo the submitted email back so the form can be re-filled
fn rejected(message: &str, email: &str) -> ActionResponse {
    ActionResponse::error(message).with_data(json!({ "email": email }))
}

/// Where a freshly authenticated user goes next
async fn after_login(
    services: &Services,
    user: &User,
    team: Option<&Team>,
    redirect: Option<&str>,
    price_id: Option<&str>,
) -> AppResult<ActionResponse> {
    let session = SessionChange::Set(services.sessions.issue(user.id));
    let response = match redirect {
        Some("checkout") => checkout_redirect(services, user, team, price_id).await?,
        _ => ActionResponse::redirect("/dashboard"),
    };
    Ok(response.with_session(session))
}

pub async fn sign_in(
    services: &Services,
    ctx: &RequestContext,
    form: SignInForm,
) -> AppResult<ActionResponse> {
    let email = form.email.trim();
    if email.len() < 3 || email.len() > 255 || !auth::is_valid_email(email) {
        return Ok(rejected("Invalid email address", email));
    }
    if form.password.len() > MAX_PASSWORD_LEN {
        return Ok(rejected(INVALID_CREDENTIALS, email));
    }

    let Some(user) = services.db.find_user_by_email(email)? else {
        return Ok(rejected(INVALID_CREDENTIALS, email));
    };
    if auth::verify_password(&form.password, &user.password_hash).is_err() {
        return Ok(rejected(INVALID_CREDENTIALS, email));
    }

    let team = services.team_of(user.id)?;
    services.log_activity(team.as_ref().map(|t| t.id), user.id, ActivityType::SignIn, ctx)?;
    info!("User {} signed in", user.id);

    after_login(
        services,
        &user,
        team.as_ref(),
        form.redirect.as_deref(),
        form.price_id.as_deref(),
    )
    .await
}

pub async fn sign_up(
    services: &Services,
    ctx: &RequestContext,
    form: SignUpForm,
) -> AppResult<ActionResponse> {
    let email = form.email.trim();
    if !auth::is_valid_email(email) {
        return Ok(rejected("Invalid email address", email));
    }
    if let Err(message) = auth::check_password_policy(&form.password) {
        return Ok(rejected(message, email));
    }

    // The invitation is checked before anything is written
    let invitation = match form.invite_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let found = match raw.parse() {
                Ok(id) => services.db.get_invitation(id)?,
                Err(_) => None,
            };
            match found {
                Some(inv) if inv.email == email && inv.status == InvitationStatus::Pending => {
                    Some(inv)
                }
                _ => return Ok(rejected("Invalid or expired invitation.", email)),
            }
        }
        None => None,
    };

    if services.db.find_user_by_email(email)?.is_some() {
        return Ok(rejected(SIGN_UP_FAILED, email));
    }

    let password_hash = auth::hash_password(&form.password)?;

    let backend_user = NewBackendUser {
        email: email.to_string(),
        password: form.password.clone(),
        is_administrator: false,
    };
    if let Err(e) = services.backend.create_user(&backend_user).await {
        warn!("Store backend account creation failed for {}: {}", email, e);
        return Ok(rejected("Failed to create BTCpay user. Please try again.", email));
    }

    let role = invitation.as_ref().map(|i| i.role).unwrap_or(Role::Owner);
    let Some(user) = services.db.create_user(email, password_hash, role)? else {
        warn!("Concurrent sign-up for {} won; store backend account left behind", email);
        return Ok(rejected(SIGN_UP_FAILED, email));
    };

    let team = match &invitation {
        Some(inv) => {
            services.db.accept_invitation(inv.id)?;
            services.log_activity(Some(inv.team_id), user.id, ActivityType::AcceptInvitation, ctx)?;
            services.db.get_team(inv.team_id)?.ok_or_else(|| {
                AppError::InvalidState(format!("invitation {} points at missing team", inv.id))
            })?
        }
        None => {
            let team = services.db.create_team(&format!("{}'s Team", email))?;
            services.log_activity(Some(team.id), user.id, ActivityType::CreateTeam, ctx)?;
            team
        }
    };

    services.db.add_team_member(user.id, team.id, role)?;
    services.log_activity(Some(team.id), user.id, ActivityType::SignUp, ctx)?;
    info!("User {} signed up into team {} as {}", user.id, team.id, role);

    after_login(
        services,
        &user,
        Some(&team),
        form.redirect.as_deref(),
        form.price_id.as_deref(),
    )
    .await
}

pub async fn sign_out(services: &Services, ctx: &RequestContext) -> AppResult<ActionResponse> {
    if let Some(user) = &ctx.user {
        let team = services.team_of(user.id)?;
        services.log_activity(team.map(|t| t.id), user.id, ActivityType::SignOut, ctx)?;
    }
    Ok(ActionResponse::redirect("/sign-in").with_session(SessionChange::Clear))
}
