//! Persistence collaborators.
//!
//! The core never stores tokens itself beyond the client-held credential;
//! it hands the identity and refresh-token metadata to a [`UserStore`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use crate::identity::IvaoIdentity;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No user with VID {vid}")]
    NotFound { vid: String },

    #[error("User store backend failed: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Stored user row, keyed by VID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub vid: String,
    pub first_name: String,
    pub last_name: String,
    pub refresh_token: Option<String>,
    pub refresh_token_date: Option<SystemTime>,
    pub ivao_auth_date: Option<SystemTime>,
    pub discord_user_id: Option<String>,
    pub verified: bool,
    pub is_banned: bool,
}

impl UserRecord {
    pub fn new(identity: &IvaoIdentity, tokens: &TokenMetadata) -> Self {
        Self {
            vid: identity.vid.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            refresh_token: Some(tokens.refresh_token.clone()),
            refresh_token_date: Some(tokens.recorded_at),
            ivao_auth_date: Some(tokens.recorded_at),
            discord_user_id: None,
            verified: false,
            is_banned: false,
        }
    }

    pub fn identity(&self) -> IvaoIdentity {
        IvaoIdentity {
            vid: self.vid.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }

    pub fn discord_nickname(&self) -> String {
        self.identity().discord_nickname()
    }

    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            _ => "User".to_string(),
        }
    }
}

/// Refresh token recorded alongside the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub refresh_token: String,
    pub recorded_at: SystemTime,
}

impl TokenMetadata {
    pub fn now(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            recorded_at: SystemTime::now(),
        }
    }
}

pub trait UserStore: Send + Sync {
    fn find_by_external_id(
        &self,
        vid: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>> + Send;

    /// Insert a new user, or record a fresh refresh token for a known one.
    fn upsert(
        &self,
        identity: &IvaoIdentity,
        tokens: &TokenMetadata,
    ) -> impl Future<Output = Result<UserRecord, StoreError>> + Send;

    fn attach_discord_id(
        &self,
        vid: &str,
        discord_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub trait MaintenanceFlag: Send + Sync {
    fn is_enabled(&self) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// In-process [`UserStore`].
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
    writes: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: UserRecord) {
        self.lock().insert(record.vid.clone(), record);
    }

    pub fn get(&self, vid: &str) -> Option<UserRecord> {
        self.lock().get(vid).cloned()
    }

    /// Number of mutating calls served so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, UserRecord>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserStore for MemoryUserStore {
    async fn find_by_external_id(&self, vid: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.get(vid))
    }

    async fn upsert(
        &self,
        identity: &IvaoIdentity,
        tokens: &TokenMetadata,
    ) -> Result<UserRecord, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut users = self.lock();
        let record = users
            .entry(identity.vid.clone())
            .and_modify(|existing| {
                existing.refresh_token = Some(tokens.refresh_token.clone());
                existing.refresh_token_date = Some(tokens.recorded_at);
            })
            .or_insert_with(|| UserRecord::new(identity, tokens));
        Ok(record.clone())
    }

    async fn attach_discord_id(&self, vid: &str, discord_id: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut users = self.lock();
        let record = users.get_mut(vid).ok_or_else(|| StoreError::NotFound {
            vid: vid.to_string(),
        })?;
        record.discord_user_id = Some(discord_id.to_string());
        Ok(())
    }
}

/// Maintenance switch held in memory.
#[derive(Debug, Default)]
pub struct StaticMaintenanceFlag(AtomicBool);

impl StaticMaintenanceFlag {
    pub fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

impl MaintenanceFlag for StaticMaintenanceFlag {
    async fn is_enabled(&self) -> Result<bool, StoreError> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}
