//! Duplicate-submission guard.
//!
//! Mutating operations claim their logical target (an invoice, a profile, a
//! tenant's provider slot) before calling out. A second claim on the same
//! target while the first is outstanding fails with [`DomainError::Busy`].

use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::DomainError;

/// Registry of targets with an outstanding mutating call.
#[derive(Debug)]
pub struct InFlight<K: Eq + Hash> {
    keys: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash> Default for InFlight<K> {
    fn default() -> Self {
        Self {
            keys: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash> Clone for InFlight<K> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<K> InFlight<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` until the returned guard is dropped.
    pub fn claim(&self, key: K) -> Result<InFlightGuard<K>, DomainError> {
        let mut keys = lock(&self.keys);
        if !keys.insert(key.clone()) {
            tracing::warn!(target_key = %key, "duplicate submission rejected");
            return Err(DomainError::Busy(key.to_string()));
        }
        Ok(InFlightGuard {
            keys: self.keys.clone(),
            key: Some(key),
        })
    }

    pub fn is_claimed(&self, key: &K) -> bool {
        lock(&self.keys).contains(key)
    }
}

/// Releases its claim on drop.
#[derive(Debug)]
pub struct InFlightGuard<K: Eq + Hash> {
    keys: Arc<Mutex<HashSet<K>>>,
    key: Option<K>,
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.keys).remove(&key);
        }
    }
}

fn lock<K>(keys: &Mutex<HashSet<K>>) -> MutexGuard<'_, HashSet<K>> {
    keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_busy_until_release() {
        let inflight: InFlight<String> = InFlight::new();

        let guard = inflight.claim("invoice-1".to_string()).unwrap();
        assert!(matches!(
            inflight.claim("invoice-1".to_string()),
            Err(DomainError::Busy(_))
        ));

        // Other targets are independent.
        let _other = inflight.claim("invoice-2".to_string()).unwrap();

        drop(guard);
        assert!(!inflight.is_claimed(&"invoice-1".to_string()));
        assert!(inflight.claim("invoice-1".to_string()).is_ok());
    }
}
