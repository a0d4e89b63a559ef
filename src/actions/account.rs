//! Account settings: password, profile, deletion, and the read-only views

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{require_user, ActionResponse, Services};
use crate::account::auth::{self, MAX_PASSWORD_LEN};
use crate::account::types::{ActivityType, UserProfile};
use crate::account::{RequestContext, SessionChange};
use crate::error::AppResult;

/// Entries shown on the activity page
pub const ACTIVITY_PAGE_SIZE: usize = 10;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdatePasswordForm {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DeleteAccountForm {
    pub password: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct UpdateAccountForm {
    pub name: String,
    pub email: String,
}

pub async fn update_password(
    services: &Services,
    ctx: &RequestContext,
    form: UpdatePasswordForm,
) -> AppResult<ActionResponse> {
    let user = signed_in!(ctx);

    if form.current_password.len() > MAX_PASSWORD_LEN
        || form.confirm_password.len() > MAX_PASSWORD_LEN
    {
        return Ok(ActionResponse::error("Password is too long"));
    }
    if let Err(message) = auth::check_password_policy(&form.new_password) {
        return Ok(ActionResponse::error(message));
    }
    if form.new_password != form.confirm_password {
        return Ok(ActionResponse::error("Passwords don't match"));
    }

    if auth::verify_password(&form.current_password, &user.password_hash).is_err() {
        return Ok(ActionResponse::error("Current password is incorrect."));
    }
    if form.current_password == form.new_password {
        return Ok(ActionResponse::error(
            "New password must be different from the current password.",
        ));
    }

    let new_hash = auth::hash_password(&form.new_password)?;
    services.db.set_password_hash(user.id, new_hash)?;

    let team = services.team_of(user.id)?;
    services.log_activity(team.map(|t| t.id), user.id, ActivityType::UpdatePassword, ctx)?;
    info!("User {} changed password", user.id);

    Ok(ActionResponse::success("Password updated successfully."))
}

pub async fn delete_account(
    services: &Services,
    ctx: &RequestContext,
    form: DeleteAccountForm,
) -> AppResult<ActionResponse> {
    let user = signed_in!(ctx);

    if form.password.len() > MAX_PASSWORD_LEN
        || auth::verify_password(&form.password, &user.password_hash).is_err()
    {
        return Ok(ActionResponse::error("Incorrect password. Account deletion failed."));
    }

    let team = services.team_of(user.id)?;
    services.log_activity(team.as_ref().map(|t| t.id), user.id, ActivityType::DeleteAccount, ctx)?;

    services.db.soft_delete_user(user.id)?;
    if let Some(team) = &team {
        services.db.remove_user_from_team(user.id, team.id)?;
    }
    info!("User {} deleted their account", user.id);

    Ok(ActionResponse::redirect("/sign-in").with_session(SessionChange::Clear))
}

pub async fn update_account(
    services: &Services,
    ctx: &RequestContext,
    form: UpdateAccountForm,
) -> AppResult<ActionResponse> {
    let user = signed_in!(ctx);

    let name = form.name.trim();
    let email = form.email.trim();
    if name.is_empty() {
        return Ok(ActionResponse::error("Name is required"));
    }
    if name.chars().count() > 100 {
        return Ok(ActionResponse::error("Name is too long"));
    }
    if !auth::is_valid_email(email) {
        return Ok(ActionResponse::error("Invalid email address"));
    }

    if !services.db.update_profile(user.id, name, email)? {
        return Ok(ActionResponse::error("Email is already in use."));
    }

    let team = services.team_of(user.id)?;
    services.log_activity(team.map(|t| t.id), user.id, ActivityType::UpdateAccount, ctx)?;

    Ok(ActionResponse::success("Account updated successfully."))
}

/// Profile of the signed-in user
pub fn current_user(ctx: &RequestContext) -> ActionResponse {
    let user = match require_user(ctx) {
        Ok(user) => user,
        Err(response) => return response,
    };
    ActionResponse::from_state(Default::default())
        .with_data(json!({ "user": UserProfile::from(user) }))
}

/// Latest activity of the signed-in user, newest first
pub fn activity(services: &Services, ctx: &RequestContext) -> AppResult<ActionResponse> {
    let user = signed_in!(ctx);
    let logs = services.db.activity_for_user(user.id, ACTIVITY_PAGE_SIZE)?;
    Ok(ActionResponse::from_state(Default::default()).with_data(json!({ "activity": logs })))
}
