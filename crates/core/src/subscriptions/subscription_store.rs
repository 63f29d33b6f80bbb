//! Local bookkeeping of remote webhook subscriptions.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::warn;

use super::subscriptions_model::Subscription;
use crate::errors::Result;
use crate::utils::{load_json, persist_json};

#[derive(Debug)]
pub struct SubscriptionStore {
    path: PathBuf,
    subs: Mutex<Vec<Subscription>>,
}

impl SubscriptionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let subs: Vec<Subscription> = load_json(&path)?.unwrap_or_else(|| {
            warn!("subscriptions file {} is missing or empty", path.display());
            Vec::new()
        });
        Ok(Self {
            path,
            subs: Mutex::new(subs),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Subscription>) -> T,
    {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let out = op(&mut next);
        persist_json(&self.path, &next)?;
        *guard = next;
        Ok(out)
    }

    pub fn list(&self) -> Vec<Subscription> {
        self.lock().clone()
    }

    /// The current record for a (data_type, event_type) pair, if any.
    pub fn find(&self, data_type: &str, event_type: &str) -> Option<Subscription> {
        self.lock()
            .iter()
            .find(|s| s.matches(data_type, event_type))
            .cloned()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Subscription> {
        self.lock().iter().find(|s| s.id == id).cloned()
    }

    /// Inserts `sub`, dropping any record with the same id or the same
    /// (data_type, event_type) pair. The newest write wins.
    pub fn replace(&self, sub: Subscription) -> Result<()> {
        self.mutate(|subs| {
            subs.retain(|s| s.id != sub.id && !s.matches(&sub.data_type, &sub.event_type));
            subs.push(sub);
        })
    }

    /// Removes the record with `id`; returns whether one was present.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if self.find_by_id(id).is_none() {
            return Ok(false);
        }
        self.mutate(|subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            subs.len() != before
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
