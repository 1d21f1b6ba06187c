//! Session-stored authentication state.
//!
//! Starting an auth session marks the client behind a session as
//! authenticated, optionally with a list of roles and free-form details.
//! The auth session expires after [`TTL`] seconds of inactivity;
//! [`keep_alive`] pushes the expiry forward and is called by
//! [`AuthPlugin`](crate::plugins::AuthPlugin) after every call that passes
//! access control.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wicket_core::Session;

/// Seconds of inactivity after which an auth session expires.
pub const TTL: i64 = 1800;

/// Session key of the auth session record.
pub const SESSION_KEY: &str = "wicket.auth";

/// The stored auth session record. Times are unix timestamps in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Roles granted to the authenticated user.
    pub roles: Option<Vec<String>>,
    /// Application-defined user details.
    pub details: Value,
    /// When the auth session started.
    pub started_at: i64,
    /// Moment the auth session expires unless kept alive.
    pub valid_until: i64,
    /// Lifetime applied on every refresh.
    pub ttl: i64,
}

impl AuthSession {
    /// Whether the record is still valid at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now.timestamp()
    }

    /// Whether `role` was granted.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles
            .as_ref()
            .is_some_and(|roles| roles.iter().any(|r| r == role))
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        self.valid_until = now.timestamp() + TTL;
        self.ttl = TTL;
    }
}

/// Start an auth session, replacing any previous one.
pub fn start(session: &dyn Session, roles: Option<Vec<String>>, details: Value) -> AuthSession {
    start_at(session, roles, details, Utc::now())
}

/// [`start`] with an explicit clock.
pub fn start_at(
    session: &dyn Session,
    roles: Option<Vec<String>>,
    details: Value,
    now: DateTime<Utc>,
) -> AuthSession {
    let mut record = AuthSession {
        roles,
        details,
        started_at: now.timestamp(),
        valid_until: 0,
        ttl: TTL,
    };
    record.refresh(now);
    store(session, &record);
    tracing::debug!(roles = ?record.roles, "auth session started");
    record
}

/// End the auth session.
pub fn stop(session: &dyn Session) {
    session.remove(SESSION_KEY);
}

/// The active auth session, `None` when absent or expired.
pub fn current(session: &dyn Session) -> Option<AuthSession> {
    current_at(session, Utc::now())
}

/// [`current`] with an explicit clock.
pub fn current_at(session: &dyn Session, now: DateTime<Utc>) -> Option<AuthSession> {
    session
        .get(SESSION_KEY)
        .and_then(|value| serde_json::from_value::<AuthSession>(value).ok())
        .filter(|record| record.is_valid_at(now))
}

/// Push the expiry of an active auth session forward.
pub fn keep_alive(session: &dyn Session) -> Option<AuthSession> {
    keep_alive_at(session, Utc::now())
}

/// [`keep_alive`] with an explicit clock.
pub fn keep_alive_at(session: &dyn Session, now: DateTime<Utc>) -> Option<AuthSession> {
    let mut record = current_at(session, now)?;
    record.refresh(now);
    store(session, &record);
    Some(record)
}

/// Whether an auth session is active.
pub fn is_active(session: &dyn Session) -> bool {
    current(session).is_some()
}

/// Whether an auth session is active and grants `role`.
pub fn has_role(session: &dyn Session, role: &str) -> bool {
    current(session).is_some_and(|record| record.has_role(role))
}

fn store(session: &dyn Session, record: &AuthSession) {
    match serde_json::to_value(record) {
        Ok(value) => session.set(SESSION_KEY, value),
        Err(err) => tracing::error!(error = %err, "failed to store auth session"),
    }
}
