//! Server-side actions behind every form of the storefront
//!
//! Each action takes the shared [`Services`] and an explicit
//! [`RequestContext`], and answers with an [`ActionResponse`]: the JSON state
//! shown next to the form, an optional redirect, and an optional change to
//! the session cookie. User-facing failures travel inside the state;
//! only infrastructure failures surface as `Err`.

/// Unwrap the signed-in user or return the "not authenticated" response
macro_rules! signed_in {
    ($ctx:expr) => {
        match $crate::actions::require_user($ctx) {
            Ok(user) => user,
            Err(response) => return Ok(response),
        }
    };
}

pub mod outcome;
pub mod login;
pub mod account;
pub mod team;
pub mod provisioning;
pub mod billing;

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::account::types::{ActivityType, RecordId, Team, User};
use crate::account::{Database, RequestContext, SessionChange, SessionKeys};
use crate::backend::StoreBackend;
use crate::billing::BillingProvider;
use crate::error::AppResult;

/// Collaborators shared by every action
#[derive(Clone)]
pub struct Services {
    pub db: Database,
    pub backend: Arc<dyn StoreBackend>,
    pub billing: Arc<dyn BillingProvider>,
    pub sessions: SessionKeys,
    pub settings: Settings,
}

/// Deployment values actions need to build URLs and payloads
#[derive(Debug, Clone)]
pub struct Settings {
    /// Public origin of this storefront
    pub base_url: String,
    /// Public origin of the Store Backend, used as the website of new stores
    pub backend_url: String,
    pub trial_days: u32,
}

impl Services {
    /// Record an activity against the user's team; users without a team are skipped.
    pub fn log_activity(
        &self,
        team_id: Option<RecordId>,
        user_id: RecordId,
        action: ActivityType,
        ctx: &RequestContext,
    ) -> AppResult<()> {
        match team_id {
            Some(team_id) => {
                self.db.log_activity(team_id, user_id, action, ctx.ip())?;
            }
            None => debug!("user {} has no team, {:?} not logged", user_id, action),
        }
        Ok(())
    }

    /// Team the user belongs to, if any
    pub fn team_of(&self, user_id: RecordId) -> AppResult<Option<Team>> {
        match self.db.membership_for_user(user_id)? {
            Some(member) => self.db.get_team(member.team_id),
            None => Ok(None),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }
}

/// State rendered next to a form after submission
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ActionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    pub state: ActionState,
    pub redirect: Option<String>,
    pub session: SessionChange,
}

impl ActionResponse {
    pub fn from_state(state: ActionState) -> Self {
        Self {
            state,
            redirect: None,
            session: SessionChange::Keep,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::from_state(ActionState {
            error: Some(message.into()),
            ..ActionState::default()
        })
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::from_state(ActionState {
            success: Some(message.into()),
            ..ActionState::default()
        })
    }

    pub fn redirect(to: impl Into<String>) -> Self {
        Self {
            redirect: Some(to.into()),
            ..Self::from_state(ActionState::default())
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.state.data = Some(data);
        self
    }

    pub fn with_session(mut self, session: SessionChange) -> Self {
        self.session = session;
        self
    }

    pub fn is_error(&self) -> bool {
        self.state.error.is_some()
    }
}

pub const NOT_AUTHENTICATED: &str = "User is not authenticated";

/// The signed-in user, or the response to send when there is none
pub fn require_user(ctx: &RequestContext) -> Result<&User, ActionResponse> {
    ctx.user
        .as_ref()
        .ok_or_else(|| ActionResponse::error(NOT_AUTHENTICATED))
}
