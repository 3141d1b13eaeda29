// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session token store: synchronous key-value state for the token pair and
//! the cached user profile, optionally backed by a persistence file.
//!
//! The access and refresh tokens are always written and cleared under one
//! lock acquisition, so readers never observe half of a pair.

pub mod file;

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use crate::store::file::FilePersistence;

/// Keys under which session data is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    User,
    AccessToken,
    RefreshToken,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::AccessToken => "accessToken",
            Self::RefreshToken => "refreshToken",
        }
    }
}

/// An access token together with the refresh token that can renew it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Denormalized user profile cached for instant hydration. Not authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Any other fields the backend sends along.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// What [`TokenStore::clear`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Access and refresh token only.
    Tokens,
    /// Tokens and the cached user.
    All,
}

/// Durable backing for a [`TokenStore`].
pub trait Persistence: Send + Sync + 'static {
    /// Load every persisted entry. A missing backing file is an empty map.
    fn load(&self) -> Result<HashMap<String, String>, StoreError>;

    /// Replace the persisted entries with `entries`.
    fn save(&self, entries: &HashMap<String, String>) -> Result<(), StoreError>;
}

struct Inner {
    entries: HashMap<String, String>,
    /// Bumped on every token write.
    generation: u64,
}

/// Process-wide session store.
pub struct TokenStore {
    inner: Mutex<Inner>,
    persistence: Option<Box<dyn Persistence>>,
}

impl TokenStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self { inner: Mutex::new(Inner { entries: HashMap::new(), generation: 0 }), persistence: None }
    }

    /// Load a store from `persistence`; every later write is saved back.
    pub fn with_persistence(persistence: Box<dyn Persistence>) -> Result<Self, StoreError> {
        let entries = persistence.load()?;
        Ok(Self { inner: Mutex::new(Inner { entries, generation: 0 }), persistence: Some(persistence) })
    }

    /// Open (or lazily create) a JSON session file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::with_persistence(Box::new(FilePersistence::new(path)))
    }

    pub fn get(&self, key: StoreKey) -> Option<String> {
        self.inner.lock().entries.get(key.as_str()).cloned()
    }

    /// Both tokens, or `None` if either is absent.
    pub fn tokens(&self) -> Option<TokenPair> {
        let inner = self.inner.lock();
        let access_token = inner.entries.get(StoreKey::AccessToken.as_str())?.clone();
        let refresh_token = inner.entries.get(StoreKey::RefreshToken.as_str())?.clone();
        Some(TokenPair { access_token, refresh_token })
    }

    pub fn has_session(&self) -> bool {
        self.tokens().is_some()
    }

    /// Counter of token writes, used to tell sessions apart.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Write both tokens together.
    pub fn set_tokens(&self, pair: &TokenPair) -> Result<(), StoreError> {
        self.mutate(true, |entries| {
            entries.insert(StoreKey::AccessToken.as_str().to_owned(), pair.access_token.clone());
            entries.insert(StoreKey::RefreshToken.as_str().to_owned(), pair.refresh_token.clone());
        })
    }

    /// Replace only the access token, keeping the current refresh token.
    ///
    /// Returns `false` without writing when there is no refresh token, so a
    /// refresh finishing after a logout cannot resurrect half a session.
    pub fn replace_access_token(&self, access_token: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(StoreKey::RefreshToken.as_str()) {
            return Ok(false);
        }
        let mut next = inner.entries.clone();
        next.insert(StoreKey::AccessToken.as_str().to_owned(), access_token.to_owned());
        self.commit(&mut inner, next, true)?;
        Ok(true)
    }

    /// Replace both tokens with a rotated pair, but only while a session is
    /// stored. Returns `false` without writing otherwise.
    pub fn rotate_tokens(&self, pair: &TokenPair) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(StoreKey::RefreshToken.as_str()) {
            return Ok(false);
        }
        let mut next = inner.entries.clone();
        next.insert(StoreKey::AccessToken.as_str().to_owned(), pair.access_token.clone());
        next.insert(StoreKey::RefreshToken.as_str().to_owned(), pair.refresh_token.clone());
        self.commit(&mut inner, next, true)?;
        Ok(true)
    }

    /// Store a fresh session from login or signup.
    pub fn establish(&self, pair: &TokenPair, user: Option<&UserProfile>) -> Result<(), StoreError> {
        let user_json = user.map(serde_json::to_string).transpose()?;
        self.mutate(true, |entries| {
            entries.insert(StoreKey::AccessToken.as_str().to_owned(), pair.access_token.clone());
            entries.insert(StoreKey::RefreshToken.as_str().to_owned(), pair.refresh_token.clone());
            if let Some(json) = user_json {
                entries.insert(StoreKey::User.as_str().to_owned(), json);
            }
        })
    }

    /// The cached user profile. An unreadable entry reads as absent.
    pub fn user(&self) -> Option<UserProfile> {
        let raw = self.get(StoreKey::User)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::debug!(err = %e, "ignoring unreadable cached user");
                None
            }
        }
    }

    pub fn set_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        let json = serde_json::to_string(user)?;
        self.mutate(false, |entries| {
            entries.insert(StoreKey::User.as_str().to_owned(), json);
        })
    }

    /// Remove session data. Clearing an empty store is a no-op.
    ///
    /// The in-memory state is cleared even when persisting the removal
    /// fails; the error is still returned. Returns the token generation the
    /// clear applied to.
    pub fn clear(&self, scope: ClearScope) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let mut removed = inner.entries.remove(StoreKey::AccessToken.as_str()).is_some();
        removed |= inner.entries.remove(StoreKey::RefreshToken.as_str()).is_some();
        if scope == ClearScope::All {
            removed |= inner.entries.remove(StoreKey::User.as_str()).is_some();
        }
        if removed {
            if let Some(ref persistence) = self.persistence {
                persistence.save(&inner.entries)?;
            }
        }
        Ok(inner.generation)
    }

    fn mutate(
        &self,
        bumps_generation: bool,
        f: impl FnOnce(&mut HashMap<String, String>),
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let mut next = inner.entries.clone();
        f(&mut next);
        self.commit(&mut inner, next, bumps_generation)
    }

    /// Persist `next`, then make it visible. On a persistence failure the
    /// in-memory state is left as it was.
    fn commit(
        &self,
        inner: &mut Inner,
        next: HashMap<String, String>,
        bumps_generation: bool,
    ) -> Result<(), StoreError> {
        if let Some(ref persistence) = self.persistence {
            persistence.save(&next)?;
        }
        inner.entries = next;
        if bumps_generation {
            inner.generation += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
