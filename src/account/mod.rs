//! Account System Module
//!
//! Users, teams, memberships, invitations and the activity log, plus the
//! credential handling around them:
//! - Argon2id password hashing and form credential rules
//! - HMAC-signed session cookies and the explicit request context
//! - BIP39 recovery phrases for store wallets

pub mod types;
pub mod store;
pub mod auth;
pub mod session;
pub mod recovery;

pub use types::{ActivityLog, ActivityType, Invitation, Role, Team, TeamMember, User};
pub use store::{Database, StoreClaim};
pub use session::{RequestContext, SessionChange, SessionKeys};
pub use recovery::RecoveryPhrase;
