// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Time-bounded cache of fetched secret values.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

/// How long a fetched secret value stays usable without a refetch.
pub const SECRET_TTL: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SecretKey {
    vault: String,
    secret: String,
    identity: String,
}

impl SecretKey {
    fn new(vault: &str, secret: &str, identity: &str) -> Self {
        Self {
            vault: vault.to_string(),
            secret: secret.to_string(),
            identity: identity.to_string(),
        }
    }
}

#[derive(Debug)]
struct SecretEntry {
    value: String,
    inserted_at: Instant,
}

/// Maps (vault, secret name, normalized accessing identity) to a previously
/// fetched secret value. Eviction is passive: expiry is checked on read, and
/// there is no background sweeper. Racing `add`s for the same key are
/// last-writer-wins; cached values are immutable facts, so either writer's
/// value is correct.
#[derive(Debug)]
pub struct SecretCache {
    entries: RwLock<HashMap<SecretKey, SecretEntry>>,
    ttl: Duration,
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretCache {
    pub fn new() -> Self {
        Self::with_ttl(SECRET_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached value for the triple, if present and unexpired.
    pub fn try_get(&self, vault: &str, secret: &str, identity: &str) -> Option<String> {
        let key = SecretKey::new(vault, secret, identity);
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    debug!(%vault, %secret, "secret cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    debug!(%vault, %secret, "secret cache miss");
                    return None;
                }
            }
        }

        // Expired: drop the entry unless a fresher write got in meanwhile.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            entries.remove(&key);
        }
        debug!(%vault, %secret, "secret cache entry expired");
        None
    }

    pub fn add(&self, vault: &str, secret: &str, identity: &str, value: impl Into<String>) {
        let key = SecretKey::new(vault, secret, identity);
        debug!(%vault, %secret, "caching secret value");
        self.entries.write().insert(
            key,
            SecretEntry {
                value: value.into(),
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, vault: &str, secret: &str, identity: &str) {
        let key = SecretKey::new(vault, secret, identity);
        if self.entries.write().remove(&key).is_some() {
            debug!(%vault, %secret, "invalidated cached secret");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_returns_identical_value() {
        let cache = SecretCache::new();
        cache.add("v", "s", "ambient", "topsecret");
        assert_eq!(
            cache.try_get("v", "s", "ambient").as_deref(),
            Some("topsecret")
        );
    }

    #[test]
    fn keys_are_distinguished_by_all_components() {
        let cache = SecretCache::new();
        cache.add("v", "s", "ambient", "one");
        assert_eq!(cache.try_get("v", "s", "other-identity"), None);
        assert_eq!(cache.try_get("v", "other-secret", "ambient"), None);
        assert_eq!(cache.try_get("other-vault", "s", "ambient"), None);
    }

    #[test]
    fn invalidate_removes_only_the_named_entry() {
        let cache = SecretCache::new();
        cache.add("v", "s1", "ambient", "one");
        cache.add("v", "s2", "ambient", "two");
        cache.invalidate("v", "s1", "ambient");
        assert_eq!(cache.try_get("v", "s1", "ambient"), None);
        assert_eq!(cache.try_get("v", "s2", "ambient").as_deref(), Some("two"));
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = SecretCache::with_ttl(Duration::from_millis(0));
        cache.add("v", "s", "ambient", "stale");
        assert_eq!(cache.try_get("v", "s", "ambient"), None);
        // A second read after eviction is a plain miss.
        assert_eq!(cache.try_get("v", "s", "ambient"), None);
    }

    #[test]
    fn last_writer_wins_on_racing_adds() {
        let cache = SecretCache::new();
        cache.add("v", "s", "ambient", "first");
        cache.add("v", "s", "ambient", "second");
        assert_eq!(cache.try_get("v", "s", "ambient").as_deref(), Some("second"));
    }
}
