//! Access-code validation and user binding.
//!
//! The code table is an external collaborator reached through
//! [`AccessCodeStore`]; [`MemoryAccessCodes`] is the in-process implementation
//! the binary seeds from a JSON file. Issuing codes is handled elsewhere.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use dashmap::DashMap;
use novel_types::{AccessCode, AccessCodeStatus};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("access code {0} not found")]
    NotFound(String),
    #[error("access code store unavailable: {0}")]
    Unavailable(String),
}

/// Field-level update; `None` leaves the column untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AccessCodeUpdate {
    pub status: Option<AccessCodeStatus>,
    pub bound_user_email: Option<String>,
    pub bound_user_phone: Option<String>,
    pub bound_at: Option<u64>,
    pub usage_count: Option<u64>,
    pub last_used_at: Option<u64>,
}

impl AccessCodeUpdate {
    fn apply_to(&self, code: &mut AccessCode) {
        if let Some(status) = self.status {
            code.status = status;
        }
        if let Some(email) = &self.bound_user_email {
            code.bound_user_email = Some(email.clone());
        }
        if let Some(phone) = &self.bound_user_phone {
            code.bound_user_phone = Some(phone.clone());
        }
        if let Some(at) = self.bound_at {
            code.bound_at = Some(at);
        }
        if let Some(count) = self.usage_count {
            code.usage_count = count;
        }
        if let Some(at) = self.last_used_at {
            code.last_used_at = Some(at);
        }
    }
}

/// Lookup/update interface over the access-code table.
pub trait AccessCodeStore: Send + Sync {
    /// Rows whose `code` equals `code` exactly.
    fn find_by_code(&self, code: &str) -> Result<Vec<AccessCode>, StoreError>;

    fn all(&self) -> Result<Vec<AccessCode>, StoreError>;

    fn update(&self, id: &str, update: &AccessCodeUpdate) -> Result<(), StoreError>;
}

/// `DashMap`-backed table keyed by row id.
#[derive(Debug, Default)]
pub struct MemoryAccessCodes {
    rows: DashMap<String, AccessCode>,
}

impl MemoryAccessCodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_codes(codes: impl IntoIterator<Item = AccessCode>) -> Self {
        let rows = DashMap::new();
        for code in codes {
            rows.insert(code.id.clone(), code);
        }
        Self { rows }
    }

    /// Seed from a JSON array of [`AccessCode`] rows.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let codes: Vec<AccessCode> =
            serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))?;
        info!("loaded {} access codes from {}", codes.len(), path.display());
        Ok(Self::from_codes(codes))
    }

    pub fn get(&self, id: &str) -> Option<AccessCode> {
        self.rows.get(id).map(|row| row.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl AccessCodeStore for MemoryAccessCodes {
    fn find_by_code(&self, code: &str) -> Result<Vec<AccessCode>, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.code == code)
            .map(|row| row.clone())
            .collect())
    }

    fn all(&self) -> Result<Vec<AccessCode>, StoreError> {
        Ok(self.rows.iter().map(|row| row.clone()).collect())
    }

    fn update(&self, id: &str, update: &AccessCodeUpdate) -> Result<(), StoreError> {
        let mut row = self
            .rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        update.apply_to(&mut row);
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ValidateRequest {
    #[serde(default, alias = "accessCode")]
    pub access_code: Option<String>,
    #[serde(default, alias = "userEmail")]
    pub user_email: Option<String>,
    #[serde(default, alias = "userPhone")]
    pub user_phone: Option<String>,
}

impl ValidateRequest {
    fn email(&self) -> Option<String> {
        non_blank(&self.user_email).map(|e| e.to_lowercase())
    }

    fn phone(&self) -> Option<String> {
        non_blank(&self.user_phone).map(str::to_string)
    }
}

/// Outcome of a successful validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Validation {
    /// Row as it reads after binding and usage bookkeeping.
    pub code: AccessCode,
    pub newly_bound: bool,
    /// Bound email, or phone when no email is bound.
    pub identity: String,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("access code is required")]
    MissingCode,
    #[error("an email or phone number is required")]
    MissingIdentity,
    #[error("invalid access code")]
    Invalid,
    #[error("access code has been revoked")]
    Revoked,
    #[error("access code has expired")]
    Expired,
    #[error("access code is bound to another user; enter the bound email or phone")]
    BoundToOther,
    #[error("failed to bind access code: {0}")]
    Bind(StoreError),
    #[error("access code lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl AccessError {
    /// Whether the client should prompt for an email/phone.
    pub fn requires_user_info(&self) -> bool {
        matches!(self, AccessError::MissingIdentity | AccessError::BoundToOther)
    }
}

/// Uppercase and drop whitespace and dashes: `abcd-12 34` → `ABCD1234`.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Check a code at time `now`, binding it to the caller on first use.
pub fn validate(
    store: &dyn AccessCodeStore,
    request: &ValidateRequest,
    now: u64,
) -> Result<Validation, AccessError> {
    let raw_code = non_blank(&request.access_code).ok_or(AccessError::MissingCode)?;
    let email = request.email();
    let phone = request.phone();
    if email.is_none() && phone.is_none() {
        return Err(AccessError::MissingIdentity);
    }

    let mut entry = find_code(store, raw_code)?;

    if entry.status == AccessCodeStatus::Revoked {
        return Err(AccessError::Revoked);
    }

    if now > entry.expires_at {
        let update = AccessCodeUpdate {
            status: Some(AccessCodeStatus::Expired),
            ..AccessCodeUpdate::default()
        };
        if let Err(err) = store.update(&entry.id, &update) {
            warn!("failed to mark access code {} expired: {err}", entry.id);
        }
        return Err(AccessError::Expired);
    }

    let newly_bound = !entry.is_bound();
    if newly_bound {
        let update = AccessCodeUpdate {
            bound_user_email: email.clone(),
            bound_user_phone: phone.clone(),
            bound_at: Some(now),
            ..AccessCodeUpdate::default()
        };
        store.update(&entry.id, &update).map_err(AccessError::Bind)?;
        update.apply_to(&mut entry);
        info!("access code {} bound to a new user", entry.id);
    } else if !identity_matches(&entry, email.as_deref(), phone.as_deref()) {
        return Err(AccessError::BoundToOther);
    }

    let usage = AccessCodeUpdate {
        usage_count: Some(entry.usage_count + 1),
        last_used_at: Some(now),
        ..AccessCodeUpdate::default()
    };
    // Usage bookkeeping never blocks a valid login.
    if let Err(err) = store.update(&entry.id, &usage) {
        warn!("failed to record usage for access code {}: {err}", entry.id);
    }
    usage.apply_to(&mut entry);

    let identity = non_blank(&entry.bound_user_email)
        .or_else(|| non_blank(&entry.bound_user_phone))
        .unwrap_or_default()
        .to_string();

    Ok(Validation {
        code: entry,
        newly_bound,
        identity,
    })
}

fn find_code(store: &dyn AccessCodeStore, raw: &str) -> Result<AccessCode, AccessError> {
    let exact = raw.trim().to_uppercase();
    if let Some(code) = store.find_by_code(&exact)?.into_iter().next() {
        return Ok(code);
    }
    let wanted = normalize_code(raw);
    store
        .all()?
        .into_iter()
        .find(|c| normalize_code(&c.code) == wanted)
        .ok_or(AccessError::Invalid)
}

fn identity_matches(entry: &AccessCode, email: Option<&str>, phone: Option<&str>) -> bool {
    let bound_email = non_blank(&entry.bound_user_email).map(str::to_lowercase);
    let bound_phone = non_blank(&entry.bound_user_phone);
    let email_match = matches!((bound_email.as_deref(), email), (Some(b), Some(p)) if b == p);
    let phone_match = matches!((bound_phone, phone), (Some(b), Some(p)) if b == p);
    email_match || phone_match
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
