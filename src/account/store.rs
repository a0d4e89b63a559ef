//! Account persistence on sled
//!
//! Every record type lives in its own tree keyed by the big-endian id issued
//! by `Db::generate_id`. Live user emails are indexed in `users_by_email`;
//! that index is the uniqueness guard for sign-up.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::debug;

use super::types::{
    ActivityLog, ActivityType, Invitation, InvitationStatus, MemberSummary, RecordId, Role,
    SubscriptionUpdate, Team, TeamMember, TeamWithMembers, User,
};
use crate::error::{AppError, AppResult};

/// Handle to the application database
#[derive(Clone)]
pub struct Database {
    db: sled::Db,
    users: sled::Tree,
    users_by_email: sled::Tree,
    teams: sled::Tree,
    teams_by_customer: sled::Tree,
    team_members: sled::Tree,
    invitations: sled::Tree,
    activity_logs: sled::Tree,
}

/// Outcome of trying to reserve the single store slot of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreClaim {
    Claimed,
    AlreadyHasStore,
    UnknownUser,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database, discarded on drop
    pub fn temporary() -> AppResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> AppResult<Self> {
        Ok(Self {
            users: db.open_tree("users")?,
            users_by_email: db.open_tree("users_by_email")?,
            teams: db.open_tree("teams")?,
            teams_by_customer: db.open_tree("teams_by_customer")?,
            team_members: db.open_tree("team_members")?,
            invitations: db.open_tree("invitations")?,
            activity_logs: db.open_tree("activity_logs")?,
            db,
        })
    }

    pub async fn flush(&self) -> AppResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn next_id(&self) -> AppResult<RecordId> {
        // sled ids start at 0; keep 0 free so it never looks like a real row
        Ok(self.db.generate_id()? + 1)
    }

    // --- Users ---

    /// Insert a new user; `None` when the email is already taken.
    pub fn create_user(
        &self,
        email: &str,
        password_hash: String,
        role: Role,
    ) -> AppResult<Option<User>> {
        let id = self.next_id()?;
        let claimed = self
            .users_by_email
            .compare_and_swap(email.as_bytes(), None as Option<&[u8]>, Some(&id.to_be_bytes()[..]))?;
        if claimed.is_err() {
            return Ok(None);
        }

        let now = Utc::now();
        let user = User {
            id,
            name: None,
            email: email.to_string(),
            password_hash,
            role,
            has_store: false,
            store_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        put(&self.users, id, &user)?;
        debug!("created user {} <{}>", id, email);
        Ok(Some(user))
    }

    pub fn get_user(&self, id: RecordId) -> AppResult<Option<User>> {
        get(&self.users, id)
    }

    /// Live user by email
    pub fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        match self.users_by_email.get(email.as_bytes())? {
            Some(raw) => {
                let id = decode_id(&raw)?;
                Ok(self.get_user(id)?.filter(|u| !u.is_deleted()))
            }
            None => Ok(None),
        }
    }

    pub fn set_password_hash(&self, id: RecordId, password_hash: String) -> AppResult<()> {
        self.modify_user(id, |user| {
            user.password_hash = password_hash.clone();
        })
        .map(|_| ())
    }

    /// Update the display name and email; `Ok(false)` when the email belongs to someone else.
    pub fn update_profile(&self, id: RecordId, name: &str, email: &str) -> AppResult<bool> {
        let current = self
            .get_user(id)?
            .ok_or_else(|| AppError::InvalidState(format!("user {} not found", id)))?;

        if current.email != email {
            let claimed = self.users_by_email.compare_and_swap(
                email.as_bytes(),
                None as Option<&[u8]>,
                Some(&id.to_be_bytes()[..]),
            )?;
            if claimed.is_err() {
                return Ok(false);
            }
            self.users_by_email.remove(current.email.as_bytes())?;
        }

        self.modify_user(id, |user| {
            user.name = Some(name.to_string());
            user.email = email.to_string();
        })?;
        Ok(true)
    }

    /// Mark the user deleted and rename the email so the address can be reused.
    pub fn soft_delete_user(&self, id: RecordId) -> AppResult<Option<User>> {
        let Some(current) = self.get_user(id)? else {
            return Ok(None);
        };
        let original_email = current.email.clone();
        let now = Utc::now();
        let deleted = self.modify_user(id, |user| {
            user.deleted_at = Some(now);
            user.email = format!("{}-{}-deleted", original_email, id);
        })?;
        self.users_by_email.remove(original_email.as_bytes())?;
        Ok(deleted)
    }

    /// Atomically flip the user's store flag from unset to set.
    ///
    /// Two concurrent callers can never both observe `Claimed`.
    pub fn claim_store_slot(&self, id: RecordId) -> AppResult<StoreClaim> {
        let key = id.to_be_bytes();
        loop {
            let Some(raw) = self.users.get(key)? else {
                return Ok(StoreClaim::UnknownUser);
            };
            let mut user: User = bincode::deserialize(&raw)?;
            if user.has_store {
                return Ok(StoreClaim::AlreadyHasStore);
            }
            user.has_store = true;
            user.updated_at = Utc::now();
            let updated = bincode::serialize(&user)?;
            if self
                .users
                .compare_and_swap(key, Some(raw), Some(updated))?
                .is_ok()
            {
                return Ok(StoreClaim::Claimed);
            }
            // lost a race with another writer; re-read and retry
        }
    }

    /// Undo a claim when the Store Backend definitively refused the store.
    pub fn release_store_slot(&self, id: RecordId) -> AppResult<()> {
        self.modify_user(id, |user| {
            user.has_store = false;
            user.store_id = None;
        })
        .map(|_| ())
    }

    pub fn record_store_id(&self, id: RecordId, store_id: &str) -> AppResult<()> {
        self.modify_user(id, |user| {
            user.store_id = Some(store_id.to_string());
        })
        .map(|_| ())
    }

    fn modify_user<F>(&self, id: RecordId, f: F) -> AppResult<Option<User>>
    where
        F: Fn(&mut User),
    {
        update(&self.users, id, |user: &mut User| {
            f(user);
            user.updated_at = Utc::now();
        })
    }

    // --- Teams ---

    pub fn create_team(&self, name: &str) -> AppResult<Team> {
        let id = self.next_id()?;
        let now = Utc::now();
        let team = Team {
            id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            stripe_product_id: None,
            plan_name: None,
            subscription_status: None,
        };
        put(&self.teams, id, &team)?;
        Ok(team)
    }

    pub fn get_team(&self, id: RecordId) -> AppResult<Option<Team>> {
        get(&self.teams, id)
    }

    pub fn find_team_by_customer(&self, customer_id: &str) -> AppResult<Option<Team>> {
        match self.teams_by_customer.get(customer_id.as_bytes())? {
            Some(raw) => self.get_team(decode_id(&raw)?),
            None => Ok(None),
        }
    }

    /// Write billing state onto a team and index its customer id.
    pub fn update_team_subscription(
        &self,
        team_id: RecordId,
        sub: &SubscriptionUpdate,
    ) -> AppResult<Option<Team>> {
        if let Some(customer) = &sub.stripe_customer_id {
            self.teams_by_customer
                .insert(customer.as_bytes(), &team_id.to_be_bytes()[..])?;
        }
        update(&self.teams, team_id, |team: &mut Team| {
            if sub.stripe_customer_id.is_some() {
                team.stripe_customer_id = sub.stripe_customer_id.clone();
            }
            team.stripe_subscription_id = sub.stripe_subscription_id.clone();
            team.stripe_product_id = sub.stripe_product_id.clone();
            team.plan_name = sub.plan_name.clone();
            team.subscription_status = Some(sub.subscription_status.clone());
            team.updated_at = Utc::now();
        })
    }

    // --- Memberships ---

    pub fn add_team_member(
        &self,
        user_id: RecordId,
        team_id: RecordId,
        role: Role,
    ) -> AppResult<TeamMember> {
        let member = TeamMember {
            id: self.next_id()?,
            user_id,
            team_id,
            role,
            joined_at: Utc::now(),
        };
        put(&self.team_members, member.id, &member)?;
        Ok(member)
    }

    /// First membership of the user, if any
    pub fn membership_for_user(&self, user_id: RecordId) -> AppResult<Option<TeamMember>> {
        Ok(scan::<TeamMember>(&self.team_members)?
            .into_iter()
            .find(|m| m.user_id == user_id))
    }

    pub fn members_of_team(&self, team_id: RecordId) -> AppResult<Vec<TeamMember>> {
        Ok(scan::<TeamMember>(&self.team_members)?
            .into_iter()
            .filter(|m| m.team_id == team_id)
            .collect())
    }

    /// Remove membership `member_id` only if it belongs to `team_id`.
    pub fn remove_team_member(&self, member_id: RecordId, team_id: RecordId) -> AppResult<bool> {
        match get::<TeamMember>(&self.team_members, member_id)? {
            Some(member) if member.team_id == team_id => {
                self.team_members.remove(member_id.to_be_bytes())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn remove_user_from_team(&self, user_id: RecordId, team_id: RecordId) -> AppResult<()> {
        for member in self.members_of_team(team_id)? {
            if member.user_id == user_id {
                self.team_members.remove(member.id.to_be_bytes())?;
            }
        }
        Ok(())
    }

    /// The user's team together with every member's profile
    pub fn team_for_user(&self, user_id: RecordId) -> AppResult<Option<TeamWithMembers>> {
        let Some(membership) = self.membership_for_user(user_id)? else {
            return Ok(None);
        };
        let Some(team) = self.get_team(membership.team_id)? else {
            return Ok(None);
        };

        let mut members = Vec::new();
        for member in self.members_of_team(team.id)? {
            if let Some(user) = self.get_user(member.user_id)? {
                members.push(MemberSummary {
                    member_id: member.id,
                    user_id: user.id,
                    name: user.name,
                    email: user.email,
                    role: member.role,
                    joined_at: member.joined_at,
                });
            }
        }
        Ok(Some(TeamWithMembers { team, members }))
    }

    // --- Invitations ---

    pub fn create_invitation(
        &self,
        team_id: RecordId,
        email: &str,
        role: Role,
        invited_by: RecordId,
    ) -> AppResult<Invitation> {
        let invitation = Invitation {
            id: self.next_id()?,
            team_id,
            email: email.to_string(),
            role,
            invited_by,
            invited_at: Utc::now(),
            status: InvitationStatus::Pending,
        };
        put(&self.invitations, invitation.id, &invitation)?;
        Ok(invitation)
    }

    pub fn get_invitation(&self, id: RecordId) -> AppResult<Option<Invitation>> {
        get(&self.invitations, id)
    }

    pub fn pending_invitation(&self, team_id: RecordId, email: &str) -> AppResult<Option<Invitation>> {
        Ok(scan::<Invitation>(&self.invitations)?.into_iter().find(|i| {
            i.team_id == team_id && i.email == email && i.status == InvitationStatus::Pending
        }))
    }

    pub fn accept_invitation(&self, id: RecordId) -> AppResult<Option<Invitation>> {
        update(&self.invitations, id, |inv: &mut Invitation| {
            inv.status = InvitationStatus::Accepted;
        })
    }

    // --- Activity ---

    pub fn log_activity(
        &self,
        team_id: RecordId,
        user_id: RecordId,
        action: ActivityType,
        ip_address: &str,
    ) -> AppResult<ActivityLog> {
        let entry = ActivityLog {
            id: self.next_id()?,
            team_id,
            user_id,
            action,
            timestamp: Utc::now(),
            ip_address: ip_address.to_string(),
        };
        put(&self.activity_logs, entry.id, &entry)?;
        Ok(entry)
    }

    /// Most recent entries of a user, newest first
    pub fn activity_for_user(&self, user_id: RecordId, limit: usize) -> AppResult<Vec<ActivityLog>> {
        let mut entries = Vec::new();
        // ids are monotonic, so reverse key order is newest first
        for item in self.activity_logs.iter().rev() {
            let (_, raw) = item?;
            let entry: ActivityLog = bincode::deserialize(&raw)?;
            if entry.user_id == user_id {
                entries.push(entry);
                if entries.len() == limit {
                    break;
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
impl Database {
    /// Replace a user record with arbitrary bytes
    pub(crate) fn overwrite_user_raw(&self, id: RecordId, raw: &[u8]) {
        self.users.insert(id.to_be_bytes(), raw).unwrap();
    }
}

fn put<T: Serialize>(tree: &sled::Tree, id: RecordId, value: &T) -> AppResult<()> {
    tree.insert(id.to_be_bytes(), bincode::serialize(value)?)?;
    Ok(())
}

fn get<T: DeserializeOwned>(tree: &sled::Tree, id: RecordId) -> AppResult<Option<T>> {
    match tree.get(id.to_be_bytes())? {
        Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(tree: &sled::Tree) -> AppResult<Vec<T>> {
    let mut out = Vec::new();
    for item in tree.iter() {
        let (_, raw) = item?;
        out.push(bincode::deserialize(&raw)?);
    }
    Ok(out)
}

/// Read-modify-write of one record; `None` when the key is absent.
fn update<T, F>(tree: &sled::Tree, id: RecordId, f: F) -> AppResult<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: Fn(&mut T),
{
    let key = id.to_be_bytes();
    loop {
        let Some(raw) = tree.get(key)? else {
            return Ok(None);
        };
        let mut value: T = bincode::deserialize(&raw)?;
        f(&mut value);
        let encoded = bincode::serialize(&value)?;
        if tree.compare_and_swap(key, Some(raw), Some(encoded))?.is_ok() {
            return Ok(Some(value));
        }
    }
}

fn decode_id(raw: &[u8]) -> AppResult<RecordId> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| AppError::InvalidState("corrupt id index entry".to_string()))?;
    Ok(RecordId::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_email_is_unique() {
        let db = Database::temporary().unwrap();
        assert!(db.create_user("a@x.io", "h".into(), Role::Owner).unwrap().is_some());
        assert!(db.create_user("a@x.io", "h".into(), Role::Owner).unwrap().is_none());
    }

    #[test]
    fn test_soft_delete_frees_email() {
        let db = Database::temporary().unwrap();
        let user = db.create_user("a@x.io", "h".into(), Role::Owner).unwrap().unwrap();

        let deleted = db.soft_delete_user(user.id).unwrap().unwrap();
        assert_eq!(deleted.email, format!("a@x.io-{}-deleted", user.id));
        assert!(deleted.deleted_at.is_some());
        assert!(db.find_user_by_email("a@x.io").unwrap().is_none());

        assert!(db.create_user("a@x.io", "h".into(), Role::Owner).unwrap().is_some());
    }

    #[test]
    fn test_store_slot_claimed_once() {
        let db = Database::temporary().unwrap();
        let user = db.create_user("a@x.io", "h".into(), Role::Owner).unwrap().unwrap();

        assert_eq!(db.claim_store_slot(user.id).unwrap(), StoreClaim::Claimed);
        assert_eq!(db.claim_store_slot(user.id).unwrap(), StoreClaim::AlreadyHasStore);
        assert_eq!(db.claim_store_slot(9999).unwrap(), StoreClaim::UnknownUser);

        db.release_store_slot(user.id).unwrap();
        assert_eq!(db.claim_store_slot(user.id).unwrap(), StoreClaim::Claimed);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let db = Arc::new(Database::temporary().unwrap());
        let user = db.create_user("a@x.io", "h".into(), Role::Owner).unwrap().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.claim_store_slot(user.id).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c == StoreClaim::Claimed)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_team_membership_and_removal() {
        let db = Database::temporary().unwrap();
        let owner = db.create_user("o@x.io", "h".into(), Role::Owner).unwrap().unwrap();
        let member = db.create_user("m@x.io", "h".into(), Role::Member).unwrap().unwrap();
        let team = db.create_team("o@x.io's Team").unwrap();
        let other = db.create_team("other").unwrap();

        db.add_team_member(owner.id, team.id, Role::Owner).unwrap();
        let m = db.add_team_member(member.id, team.id, Role::Member).unwrap();

        let data = db.team_for_user(owner.id).unwrap().unwrap();
        assert_eq!(data.members.len(), 2);

        // membership of another team cannot be removed through this team
        assert!(!db.remove_team_member(m.id, other.id).unwrap());
        assert!(db.remove_team_member(m.id, team.id).unwrap());
        assert!(db.membership_for_user(member.id).unwrap().is_none());
    }

    #[test]
    fn test_update_profile_rejects_taken_email() {
        let db = Database::temporary().unwrap();
        let a = db.create_user("a@x.io", "h".into(), Role::Owner).unwrap().unwrap();
        db.create_user("b@x.io", "h".into(), Role::Owner).unwrap().unwrap();

        assert!(!db.update_profile(a.id, "A", "b@x.io").unwrap());
        assert!(db.update_profile(a.id, "A", "c@x.io").unwrap());
        assert!(db.find_user_by_email("a@x.io").unwrap().is_none());
        assert_eq!(db.find_user_by_email("c@x.io").unwrap().unwrap().id, a.id);
    }

    #[test]
    fn test_activity_newest_first() {
        let db = Database::temporary().unwrap();
        db.log_activity(1, 5, ActivityType::SignUp, "").unwrap();
        db.log_activity(1, 6, ActivityType::SignIn, "").unwrap();
        db.log_activity(1, 5, ActivityType::SignIn, "10.0.0.1").unwrap();

        let logs = db.activity_for_user(5, 10).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, ActivityType::SignIn);
        assert_eq!(logs[1].action, ActivityType::SignUp);
        assert_eq!(db.activity_for_user(5, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_subscription_indexed_by_customer() {
        let db = Database::temporary().unwrap();
        let team = db.create_team("t").unwrap();
        let update = SubscriptionUpdate {
            stripe_customer_id: Some("cus_1".into()),
            stripe_subscription_id: Some("sub_1".into()),
            stripe_product_id: Some("prod_1".into()),
            plan_name: Some("Base".into()),
            subscription_status: "active".into(),
        };
        db.update_team_subscription(team.id, &update).unwrap();

        let found = db.find_team_by_customer("cus_1").unwrap().unwrap();
        assert_eq!(found.id, team.id);
        assert!(found.has_paid_plan());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let db = Database::open(dir.path()).unwrap();
            let user = db.create_user("a@x.io", "h".into(), Role::Owner).unwrap().unwrap();
            db.claim_store_slot(user.id).unwrap();
            db.db.flush().unwrap();
            user.id
        };

        let db = Database::open(dir.path()).unwrap();
        let user = db.find_user_by_email("a@x.io").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(db.claim_store_slot(id).unwrap(), StoreClaim::AlreadyHasStore);
    }
}
