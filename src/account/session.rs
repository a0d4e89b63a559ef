//! Signed session cookies and the per-request context handed to actions

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::auth::AuthError;
use super::types::{RecordId, User};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";

/// Issues and verifies `{user_id}.{expires}.{signature}` tokens
#[derive(Clone)]
pub struct SessionKeys {
    mac: HmacSha256,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Result<Self, AuthError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AuthError::MalformedToken)?;
        Ok(Self {
            mac,
            ttl: Duration::hours(ttl_hours),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: RecordId) -> String {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: RecordId, now: DateTime<Utc>) -> String {
        let expires = (now + self.ttl).timestamp();
        let payload = format!("{}.{}", user_id, expires);
        format!("{}.{}", payload, self.sign(&payload))
    }

    /// Returns the user id carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<RecordId, AuthError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<RecordId, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (user_id, expires, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(u), Some(e), Some(s)) => (u, e, s),
            _ => return Err(AuthError::MalformedToken),
        };

        let signature = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;
        let mut mac = self.mac.clone();
        mac.update(format!("{}.{}", user_id, expires).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let expires: i64 = expires.parse().map_err(|_| AuthError::MalformedToken)?;
        if expires <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        user_id.parse().map_err(|_| AuthError::MalformedToken)
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Cookie mutation requested by an action
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    Keep,
    Set(String),
    Clear,
}

/// Everything an action may know about the incoming request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: Option<User>,
    pub ip_address: Option<String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            ip_address: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn for_user(user: User) -> Self {
        Self {
            user: Some(user),
            ..Self::anonymous()
        }
    }

    pub fn ip(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("")
    }
}

/// Render the `Set-Cookie` value for a session change.
pub fn session_cookie(change: &SessionChange, ttl: Duration) -> Option<String> {
    match change {
        SessionChange::Keep => None,
        SessionChange::Set(token) => Some(format!(
            "{}={}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            ttl.num_seconds()
        )),
        SessionChange::Clear => Some(format!(
            "{}=; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age=0",
            SESSION_COOKIE
        )),
    }
}

/// Pull the session token out of a `Cookie` request header.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
