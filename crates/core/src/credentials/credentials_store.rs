//! File-backed credential store.
//!
//! Holds the single live copy of every credential record. Callers only ever
//! receive clones and write changes back through [`CredentialStore::upsert`]
//! or one of the narrower update methods.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{info, warn};

use super::credentials_model::{validate_username, Credential, OAuthToken};
use crate::errors::{Error, Result};
use crate::utils::{load_json, persist_json};

#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    records: Mutex<HashMap<String, Credential>>,
}

impl CredentialStore {
    /// Opens the store, loading any records already on disk.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records: HashMap<String, Credential> = match load_json(&path)? {
            Some(records) => records,
            None => {
                warn!(
                    "user credentials file {} is missing or empty",
                    path.display()
                );
                HashMap::new()
            }
        };
        info!(
            "loaded {} credential(s) from {}",
            records.len(),
            path.display()
        );
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Credential>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `op` to a copy of the records, persists the copy, and only then
    /// makes it live. On any error the live records are left untouched.
    fn mutate<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut HashMap<String, Credential>) -> Result<T>,
    {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let out = op(&mut next)?;
        persist_json(&self.path, &next)?;
        *guard = next;
        Ok(out)
    }

    pub fn find(&self, name: &str) -> Option<Credential> {
        self.lock().get(name).cloned()
    }

    /// Linear scan over the stored remote user ids.
    pub fn find_by_remote_id(&self, remote_id: &str) -> Option<Credential> {
        if remote_id.is_empty() {
            return None;
        }
        self.lock()
            .values()
            .find(|cred| cred.personal_info.id == remote_id)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Validates `name` and reserves it with a tokenless placeholder record.
    pub fn claim(&self, name: &str) -> Result<Credential> {
        validate_username(name)?;
        let placeholder = Credential::placeholder(name);
        self.mutate(|records| {
            if records.contains_key(name) {
                return Err(Error::UsernameTaken);
            }
            records.insert(name.to_string(), placeholder.clone());
            Ok(())
        })?;
        info!("claimed username {name}");
        Ok(placeholder)
    }

    /// Atomically replaces the record for `name` and persists it.
    pub fn upsert(&self, name: &str, mut record: Credential) -> Result<()> {
        record.name = name.to_string();
        let censored = record.censored_token();
        self.mutate(|records| {
            records.insert(name.to_string(), record);
            Ok(())
        })?;
        info!("updated and saved token for {name}: {censored}");
        Ok(())
    }

    /// Records a successful poll without touching anything else.
    pub fn touch(&self, name: &str) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        self.mutate(|records| {
            let record = records
                .get_mut(name)
                .ok_or_else(|| Error::UnknownUser(name.to_string()))?;
            record.last_poll = Some(now);
            Ok(())
        })?;
        Ok(now)
    }

    /// Stores `token` if its access token differs from the stored one.
    ///
    /// Returns whether a write happened, so repeated identical tokens are free.
    pub fn update_token(&self, name: &str, token: &OAuthToken) -> Result<bool> {
        {
            let records = self.lock();
            let current = records
                .get(name)
                .ok_or_else(|| Error::UnknownUser(name.to_string()))?;
            if current
                .oauth_token
                .as_ref()
                .is_some_and(|t| t.access_token == token.access_token)
            {
                return Ok(false);
            }
        }
        let changed = self.mutate(|records| {
            let record = records
                .get_mut(name)
                .ok_or_else(|| Error::UnknownUser(name.to_string()))?;
            if record
                .oauth_token
                .as_ref()
                .is_some_and(|t| t.access_token == token.access_token)
            {
                return Ok(false);
            }
            record.oauth_token = Some(token.clone());
            Ok(true)
        })?;
        if changed {
            info!(
                "updated and saved token for {name} (now {})",
                token.censored()
            );
        }
        Ok(changed)
    }

    /// Point-in-time copy of every record, ordered by name.
    pub fn snapshot(&self) -> Vec<Credential> {
        let mut all: Vec<Credential> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
