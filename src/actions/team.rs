//! Team membership: invitations, removal and the team view

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ActionResponse, Services};
use crate::account::auth;
use crate::account::types::{ActivityType, RecordId, Role};
use crate::account::RequestContext;
use crate::error::AppResult;

const NO_TEAM: &str = "User is not part of a team";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct InviteForm {
    pub email: String,
    pub role: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoveMemberForm {
    pub member_id: Option<RecordId>,
}

pub async fn invite_team_member(
    services: &Services,
    ctx: &RequestContext,
    form: InviteForm,
) -> AppResult<ActionResponse> {
    let user = signed_in!(ctx);

    let email = form.email.trim();
    if !auth::is_valid_email(email) {
        return Ok(ActionResponse::error("Invalid email address"));
    }
    let Some(role) = Role::parse(form.role.trim()) else {
        return Ok(ActionResponse::error("Invalid role"));
    };
    let Some(team) = services.team_of(user.id)? else {
        return Ok(ActionResponse::error(NO_TEAM));
    };

    for member in services.db.members_of_team(team.id)? {
        if let Some(existing) = services.db.get_user(member.user_id)? {
            if existing.email == email {
                return Ok(ActionResponse::error("User is already a member of this team"));
            }
        }
    }
    if services.db.pending_invitation(team.id, email)?.is_some() {
        return Ok(ActionResponse::error(
            "An invitation has already been sent to this email",
        ));
    }

    let invitation = services.db.create_invitation(team.id, email, role, user.id)?;
    services.log_activity(Some(team.id), user.id, ActivityType::InviteTeamMember, ctx)?;
    info!("User {} invited {} to team {} as {}", user.id, email, team.id, role);

    Ok(ActionResponse::success("Invitation sent successfully").with_data(json!({
        "invitationId": invitation.id,
        "signUpUrl": services.url(&format!("/sign-up?inviteId={}", invitation.id)),
    })))
}

pub async fn remove_team_member(
    services: &Services,
    ctx: &RequestContext,
    form: RemoveMemberForm,
) -> AppResult<ActionResponse> {
    let user = signed_in!(ctx);

    let Some(team) = services.team_of(user.id)? else {
        return Ok(ActionResponse::error(NO_TEAM));
    };
    let removed = match form.member_id {
        Some(member_id) => services.db.remove_team_member(member_id, team.id)?,
        None => false,
    };
    if !removed {
        return Ok(ActionResponse::error("Team member not found"));
    }

    services.log_activity(Some(team.id), user.id, ActivityType::RemoveTeamMember, ctx)?;
    Ok(ActionResponse::success("Team member removed successfully"))
}

/// The caller's team with every member
pub fn team_data(services: &Services, ctx: &RequestContext) -> AppResult<ActionResponse> {
    let user = signed_in!(ctx);
    let team = services.db.team_for_user(user.id)?;
    Ok(ActionResponse::from_state(Default::default()).with_data(json!({ "team": team })))
}
