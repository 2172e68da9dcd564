// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Cache of ready-to-use vault clients.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::CredentialError;
use crate::traits::SecretsClient;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    vault: String,
    identity: String,
}

/// Maps (vault, normalized accessing identity) to a built [`SecretsClient`].
///
/// Building a client requires resolving a credential first, which is
/// asynchronous and may itself involve nested vault reads, so the lock
/// cannot be held across the build (it would serialize unrelated vault
/// lookups and can deadlock on reentrant resolution). Population is
/// optimistic double-checked insertion: check under the lock, build with the
/// lock released, re-check under the lock and discard the just-built client
/// if another caller won the race. Entries never expire on their own.
pub struct VaultClientCache {
    clients: Mutex<HashMap<ClientKey, Arc<dyn SecretsClient>>>,
}

impl Default for VaultClientCache {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultClientCache {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached client for the pair, awaiting `build` to make one
    /// on first use (a cache hit drops `build` unpolled). At most one entry
    /// per key survives long-term; a duplicate built during a race is
    /// discarded, and the winner is returned.
    pub async fn get_or_create<F>(
        &self,
        vault: &str,
        identity: &str,
        build: F,
    ) -> Result<Arc<dyn SecretsClient>, CredentialError>
    where
        F: Future<Output = Result<Arc<dyn SecretsClient>, CredentialError>>,
    {
        let key = ClientKey {
            vault: vault.to_string(),
            identity: identity.to_string(),
        };

        {
            let clients = self.clients.lock();
            if let Some(client) = clients.get(&key) {
                debug!(%vault, "vault client cache hit");
                return Ok(client.clone());
            }
        }

        // Lock released: the build may suspend for as long as it needs.
        let built = build.await?;

        let mut clients = self.clients.lock();
        if let Some(winner) = clients.get(&key) {
            // Another resolution finished while we were building; ours loses.
            debug!(%vault, "discarding duplicate vault client built during race");
            return Ok(winner.clone());
        }
        debug!(%vault, "caching new vault client");
        clients.insert(key, built.clone());
        Ok(built)
    }

    /// Removes every client for `vault` whose accessing-identity key matches
    /// the predicate.
    pub fn invalidate_matching(&self, vault: &str, predicate: impl Fn(&str) -> bool) {
        self.clients
            .lock()
            .retain(|key, _| !(key.vault == vault && predicate(&key.identity)));
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}
