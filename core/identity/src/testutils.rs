// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! In-memory fakes for the external collaborators, shared by unit and
//! integration tests. Everything here records enough about how it was used
//! (build counts, vault reads, tokens presented) for tests to assert on
//! caching behavior.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bridge_config::certificate::CertificateConfig;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client_cache::VaultClientCache;
use crate::errors::{CertificateError, SecretsError, TokenError};
use crate::resolver::CredentialResolver;
use crate::secret_cache::SecretCache;
use crate::traits::{
    AccessToken, Certificate, CertificateStore, CredentialFactory, SecretsClient,
    SecretsClientFactory, TokenCredential, TokenRequest,
};

/// A credential that mints a fixed token value.
pub struct StaticTokenCredential {
    token: String,
    lifetime: Duration,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            lifetime: Duration::from_secs(3600),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn with_lifetime(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            lifetime,
            ..Self::new(token)
        }
    }

    /// How many times `get_token` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent `get_token` call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(
        &self,
        _request: &TokenRequest,
        _cancel: &CancellationToken,
    ) -> Result<AccessToken, TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TokenError::Rejected("credential marked failing".to_string()));
        }
        Ok(AccessToken::new(
            self.token.clone(),
            SystemTime::now() + self.lifetime,
        ))
    }
}

/// Builds [`StaticTokenCredential`]s whose token values describe how they
/// were constructed, and records every construction.
#[derive(Default)]
pub struct RecordingCredentialFactory {
    built: Mutex<Vec<String>>,
}

impl RecordingCredentialFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptions of every credential built so far, in order.
    pub fn built(&self) -> Vec<String> {
        self.built.lock().clone()
    }

    pub fn client_secret_builds(&self) -> usize {
        self.built
            .lock()
            .iter()
            .filter(|d| d.starts_with("client-secret("))
            .count()
    }

    fn build(&self, description: String) -> Arc<dyn TokenCredential> {
        self.built.lock().push(description.clone());
        Arc::new(StaticTokenCredential::new(description))
    }
}

impl CredentialFactory for RecordingCredentialFactory {
    fn client_secret(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Arc<dyn TokenCredential> {
        self.build(format!("client-secret({tenant_id}/{client_id}/{client_secret})"))
    }

    fn client_certificate(
        &self,
        tenant_id: &str,
        client_id: &str,
        certificate: Certificate,
    ) -> Arc<dyn TokenCredential> {
        self.build(format!(
            "client-certificate({tenant_id}/{client_id}/{})",
            certificate.subject
        ))
    }

    fn managed_identity(&self, client_id: Option<&str>) -> Arc<dyn TokenCredential> {
        match client_id {
            Some(client_id) => self.build(format!("managed-identity(user:{client_id})")),
            None => self.build("managed-identity(system)".to_string()),
        }
    }

    fn cli(&self) -> Arc<dyn TokenCredential> {
        self.build("cli".to_string())
    }

    fn dev_tool(&self) -> Arc<dyn TokenCredential> {
        self.build("dev-tool".to_string())
    }

    fn default_chain(&self) -> Arc<dyn TokenCredential> {
        self.build("default-chain".to_string())
    }
}

#[derive(Default)]
struct VaultState {
    secrets: Mutex<HashMap<(String, String), String>>,
    accesses: Mutex<Vec<(String, String, String)>>,
    clients_created: AtomicUsize,
}

/// An in-memory secret store acting as the [`SecretsClientFactory`].
///
/// Each produced client authenticates by minting a token from the credential
/// it was built with and records it, so tests can observe both how often a
/// vault was read and which identity did the reading.
#[derive(Default)]
pub struct InMemoryVault {
    state: Arc<VaultState>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, vault: &str, secret: &str, value: impl Into<String>) {
        self.state
            .secrets
            .lock()
            .insert((vault.to_string(), secret.to_string()), value.into());
    }

    pub fn remove(&self, vault: &str, secret: &str) {
        self.state
            .secrets
            .lock()
            .remove(&(vault.to_string(), secret.to_string()));
    }

    /// How many reads of (vault, secret) have reached the store.
    pub fn reads(&self, vault: &str, secret: &str) -> usize {
        self.state
            .accesses
            .lock()
            .iter()
            .filter(|(v, s, _)| v == vault && s == secret)
            .count()
    }

    /// The bearer token presented on the most recent read of (vault, secret).
    pub fn last_access_token(&self, vault: &str, secret: &str) -> Option<String> {
        self.state
            .accesses
            .lock()
            .iter()
            .rev()
            .find(|(v, s, _)| v == vault && s == secret)
            .map(|(_, _, token)| token.clone())
    }

    pub fn clients_created(&self) -> usize {
        self.state.clients_created.load(Ordering::SeqCst)
    }
}

impl SecretsClientFactory for InMemoryVault {
    fn client_for(
        &self,
        vault_name: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Arc<dyn SecretsClient> {
        self.state.clients_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(InMemoryVaultClient {
            vault: vault_name.to_string(),
            credential,
            state: self.state.clone(),
        })
    }
}

struct InMemoryVaultClient {
    vault: String,
    credential: Arc<dyn TokenCredential>,
    state: Arc<VaultState>,
}

#[async_trait]
impl SecretsClient for InMemoryVaultClient {
    async fn get_secret(
        &self,
        secret_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, SecretsError> {
        let token = self
            .credential
            .get_token(&TokenRequest::for_scopes(["vault"]), cancel)
            .await
            .map_err(|err| SecretsError::AccessDenied {
                vault: self.vault.clone(),
                reason: err.to_string(),
            })?;

        self.state.accesses.lock().push((
            self.vault.clone(),
            secret_name.to_string(),
            token.token,
        ));

        self.state
            .secrets
            .lock()
            .get(&(self.vault.clone(), secret_name.to_string()))
            .cloned()
            .ok_or_else(|| SecretsError::NotFound {
                vault: self.vault.clone(),
                secret: secret_name.to_string(),
            })
    }
}

/// An in-memory certificate store keyed by (store name, subject name).
#[derive(Default)]
pub struct InMemoryCertificateStore {
    certificates: Mutex<HashMap<(String, String), Certificate>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, store_name: &str, subject: &str, der: &[u8]) {
        self.certificates.lock().insert(
            (store_name.to_string(), subject.to_string()),
            Certificate {
                subject: subject.to_string(),
                der: der.to_vec(),
            },
        );
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn load(
        &self,
        config: &CertificateConfig,
        _cancel: &CancellationToken,
    ) -> Result<Certificate, CertificateError> {
        let not_found = || CertificateError::NotFound {
            store: config.store_name.clone(),
            subject: config.subject_name.clone(),
        };
        let subject = config.subject_name.as_deref().ok_or_else(not_found)?;
        self.certificates
            .lock()
            .get(&(config.store_name.clone(), subject.to_string()))
            .cloned()
            .ok_or_else(not_found)
    }
}

/// The collaborators behind a [`test_resolver`], kept so tests can seed and
/// observe them after handing them to the resolver.
pub struct TestHarness {
    pub factory: Arc<RecordingCredentialFactory>,
    pub vault: Arc<InMemoryVault>,
    pub certificates: Arc<InMemoryCertificateStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            factory: Arc::new(RecordingCredentialFactory::new()),
            vault: Arc::new(InMemoryVault::new()),
            certificates: Arc::new(InMemoryCertificateStore::new()),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolver over fresh in-memory collaborators and caches.
pub fn test_resolver() -> (CredentialResolver, TestHarness) {
    let harness = TestHarness::new();
    let resolver = CredentialResolver::new(
        harness.factory.clone(),
        harness.vault.clone(),
        harness.certificates.clone(),
        SecretCache::new(),
        VaultClientCache::new(),
    );
    (resolver, harness)
}
