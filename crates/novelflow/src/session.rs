use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use dashmap::DashMap;
use novel_types::AccessCodeStatus;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::access::unix_now;
use crate::handlers::{ApiError, AppState};

/// A reader who passed access-code validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    pub token: String,
    pub code: String,
    /// Bound email or phone; scopes reading progress.
    pub identity: String,
    pub created_at: u64,
    /// Expiry of the access code the session was issued for.
    pub expires_at: u64,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Opaque bearer tokens issued on successful validation.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token valid until `expires_at`. Expired entries are pruned first.
    pub fn create(&self, code: &str, identity: &str, expires_at: u64, now: u64) -> Session {
        self.prune(now);
        let session = Session {
            token: Uuid::new_v4().to_string(),
            code: code.to_string(),
            identity: identity.to_string(),
            created_at: now,
            expires_at,
        };
        self.sessions
            .insert(session.token.clone(), session.clone());
        session
    }

    /// Live session for `token`; an expired one is evicted.
    pub fn get(&self, token: &str, now: u64) -> Option<Session> {
        let session = self.sessions.get(token).map(|s| s.clone())?;
        if session.is_expired(now) {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    /// Drop every expired session; returns how many went.
    pub fn prune(&self, now: u64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    /// End every session issued for `code`.
    pub fn revoke_code(&self, code: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.code != code);
        before.saturating_sub(self.sessions.len())
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Extractor for routes behind the access gate.
pub struct AuthSession(pub Session);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::unauthorized("missing session token"))?;
        let session = state
            .sessions
            .get(token, unix_now())
            .ok_or_else(|| ApiError::unauthorized("unknown or expired session"))?;
        if code_revoked(state, &session.code) {
            debug!("ending sessions for revoked access code");
            state.sessions.revoke_code(&session.code);
            return Err(ApiError::unauthorized("access code has been revoked"));
        }
        Ok(AuthSession(session))
    }
}

fn code_revoked(state: &AppState, code: &str) -> bool {
    match state.access_codes.find_by_code(code) {
        Ok(rows) => rows.iter().any(|r| r.status == AccessCodeStatus::Revoked),
        Err(err) => {
            warn!("access code lookup failed during session check: {err}");
            false
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
