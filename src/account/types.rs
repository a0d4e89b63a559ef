//! Record definitions for accounts, teams and the activity log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric record identifier issued by the database
pub type RecordId = u64;

/// Application user
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: RecordId,
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String, // Argon2id PHC string
    pub role: Role,

    // Store Backend provisioning
    pub has_store: bool,
    pub store_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// User as exposed over HTTP; never carries the password hash
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: RecordId,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub has_store: bool,
    pub store_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            has_store: user.has_store,
            store_id: user.store_id.clone(),
            created_at: user.created_at,
        }
    }
}

/// Role held by a user inside a team
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Member,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Team {
    pub id: RecordId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Billing state mirrored from the billing provider
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_product_id: Option<String>,
    pub plan_name: Option<String>,
    pub subscription_status: Option<String>,
}

impl Team {
    /// A plan other than "free" unlocks store provisioning
    pub fn has_paid_plan(&self) -> bool {
        match &self.plan_name {
            Some(plan) => !plan.trim().is_empty() && !plan.eq_ignore_ascii_case("free"),
            None => false,
        }
    }

    /// Paid plan on a subscription that is billable or in trial
    pub fn can_provision(&self) -> bool {
        self.has_paid_plan()
            && matches!(self.subscription_status.as_deref(), Some("active") | Some("trialing"))
    }
}

/// Subscription fields written back from the billing provider
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SubscriptionUpdate {
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_product_id: Option<String>,
    pub plan_name: Option<String>,
    pub subscription_status: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TeamMember {
    pub id: RecordId,
    pub user_id: RecordId,
    pub team_id: RecordId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Invitation {
    pub id: RecordId,
    pub team_id: RecordId,
    pub email: String,
    pub role: Role,
    pub invited_by: RecordId,
    pub invited_at: DateTime<Utc>,
    pub status: InvitationStatus,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    SignUp,
    SignIn,
    SignOut,
    UpdatePassword,
    DeleteAccount,
    UpdateAccount,
    CreateTeam,
    RemoveTeamMember,
    InviteTeamMember,
    AcceptInvitation,
    CreateStore,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ActivityLog {
    pub id: RecordId,
    pub team_id: RecordId,
    pub user_id: RecordId,
    pub action: ActivityType,
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
}

/// Team member as shown on the dashboard
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MemberSummary {
    pub member_id: RecordId,
    pub user_id: RecordId,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TeamWithMembers {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<MemberSummary>,
}
