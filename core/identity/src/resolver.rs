// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Resolution of identity configurations into credential objects.
//!
//! [`CredentialResolver::resolve`] classifies a configuration, constructs
//! the matching credential through the injected [`CredentialFactory`], and
//! for client secrets held in a vault recursively resolves the identity
//! used to read that vault. Vault clients and fetched secret values are
//! cached; each vault-derived credential carries a refresh closure that
//! knows how to flush exactly the cache entries it depends on, so a
//! credential that stops working (key rotation) can be replaced without
//! serving stale secrets.

use std::sync::Arc;

use bridge_config::identity::{IdentityConfig, IdentitySourceKind, VaultSecretConfig};
use bridge_config::validation::{self, ValidationError};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client_cache::VaultClientCache;
use crate::errors::CredentialError;
use crate::secret_cache::SecretCache;
use crate::traits::{CertificateStore, CredentialFactory, SecretsClientFactory, TokenCredential};

/// Upper bound on nested vault-reference resolution. The configuration tree
/// cannot alias, but programmatically generated chains can still run away;
/// past this depth resolution reports an error instead of recursing further.
pub const MAX_CHAIN_DEPTH: usize = 64;

type RefreshFuture = BoxFuture<'static, Result<Arc<dyn TokenCredential>, CredentialError>>;
type RefreshFn = Box<dyn Fn(CancellationToken) -> RefreshFuture + Send + Sync>;

/// A resolved, long-lived credential.
///
/// Holds the current [`TokenCredential`] and, for credentials derived
/// through vault-secret resolution, a refresh closure used by
/// [`replace_failed`](Self::replace_failed). Constructed only by
/// [`CredentialResolver`].
pub struct CredentialSource {
    current: RwLock<Arc<dyn TokenCredential>>,
    refresh: Option<RefreshFn>,
}

impl CredentialSource {
    fn new(credential: Arc<dyn TokenCredential>, refresh: Option<RefreshFn>) -> Self {
        Self {
            current: RwLock::new(credential),
            refresh,
        }
    }

    pub(crate) fn direct(credential: Arc<dyn TokenCredential>) -> Self {
        Self::new(credential, None)
    }

    /// The credential currently backing this source.
    pub fn credential(&self) -> Arc<dyn TokenCredential> {
        self.current.read().clone()
    }

    /// Whether [`replace_failed`](Self::replace_failed) can produce a
    /// replacement. Directly constructed credentials cannot be refreshed.
    pub fn supports_replacement(&self) -> bool {
        self.refresh.is_some()
    }

    /// Obtain a replacement for a credential the caller believes has stopped
    /// working. On success the replacement supersedes the current
    /// credential; on failure the last good credential stays in place and
    /// keeps being served to subsequent [`credential`](Self::credential)
    /// calls.
    pub async fn replace_failed(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn TokenCredential>, CredentialError> {
        let refresh = self
            .refresh
            .as_ref()
            .ok_or(CredentialError::ReplacementNotSupported)?;
        match refresh(cancel.clone()).await {
            Ok(replacement) => {
                info!("replaced failed credential");
                *self.current.write() = replacement.clone();
                Ok(replacement)
            }
            Err(err) => {
                warn!(error = %err, "credential replacement failed, keeping previous credential");
                Err(err)
            }
        }
    }
}

/// Resolves [`IdentityConfig`] values into [`CredentialSource`]s.
///
/// The resolver itself holds no cross-call lock; its statefulness is limited
/// to the two injected caches, each responsible for its own concurrency
/// safety. Cloning is cheap and shares the caches.
#[derive(Clone)]
pub struct CredentialResolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    credentials: Arc<dyn CredentialFactory>,
    secrets_clients: Arc<dyn SecretsClientFactory>,
    certificates: Arc<dyn CertificateStore>,
    secret_cache: SecretCache,
    client_cache: VaultClientCache,
}

impl CredentialResolver {
    pub fn new(
        credentials: Arc<dyn CredentialFactory>,
        secrets_clients: Arc<dyn SecretsClientFactory>,
        certificates: Arc<dyn CertificateStore>,
        secret_cache: SecretCache,
        client_cache: VaultClientCache,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                credentials,
                secrets_clients,
                certificates,
                secret_cache,
                client_cache,
            }),
        }
    }

    /// Resolve a configuration into a credential source.
    pub async fn resolve(
        &self,
        config: &IdentityConfig,
        cancel: &CancellationToken,
    ) -> Result<CredentialSource, CredentialError> {
        self.resolve_with_depth(config, cancel, 0).await
    }

    /// Flush the cached state for a configuration, then resolve it again
    /// from scratch. The config-level counterpart of
    /// [`CredentialSource::replace_failed`].
    pub async fn replace(
        &self,
        config: &IdentityConfig,
        cancel: &CancellationToken,
    ) -> Result<CredentialSource, CredentialError> {
        self.invalidate(config);
        self.resolve(config, cancel).await
    }

    /// Remove every secret-cache entry along the vault-reference chain of
    /// this configuration. The vault client cache is keyed by accessing
    /// identity rather than secret value, so it is left alone.
    pub fn invalidate(&self, config: &IdentityConfig) {
        if let Some(vault_ref) = &config.client_secret_in_vault {
            self.inner.invalidate_chain(vault_ref);
        }
    }

    pub fn secret_cache(&self) -> &SecretCache {
        &self.inner.secret_cache
    }

    pub fn client_cache(&self) -> &VaultClientCache {
        &self.inner.client_cache
    }

    fn resolve_with_depth<'a>(
        &'a self,
        config: &'a IdentityConfig,
        cancel: &'a CancellationToken,
        depth: usize,
    ) -> BoxFuture<'a, Result<CredentialSource, CredentialError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(CredentialError::Cancelled);
            }
            if depth > MAX_CHAIN_DEPTH {
                return Err(CredentialError::ChainTooDeep {
                    limit: MAX_CHAIN_DEPTH,
                });
            }

            let kind = validation::validate(config)?;
            debug!(%kind, depth, "resolving identity configuration");

            match kind {
                IdentitySourceKind::ClientSecret => {
                    self.client_secret_source(config, cancel, depth).await
                }
                IdentitySourceKind::ClientCertificate => {
                    self.client_certificate_source(config, cancel).await
                }
                IdentitySourceKind::SystemManaged => Ok(CredentialSource::direct(
                    self.inner.credentials.managed_identity(None),
                )),
                IdentitySourceKind::UserManaged => {
                    let Some(client_id) = config.managed_identity_client_id.as_deref() else {
                        return Err(ValidationError::IncompleteUserManaged.into());
                    };
                    Ok(CredentialSource::direct(
                        self.inner.credentials.managed_identity(Some(client_id)),
                    ))
                }
                IdentitySourceKind::Cli => {
                    Ok(CredentialSource::direct(self.inner.credentials.cli()))
                }
                IdentitySourceKind::DevTool => {
                    Ok(CredentialSource::direct(self.inner.credentials.dev_tool()))
                }
                IdentitySourceKind::DefaultChain => Ok(CredentialSource::direct(
                    self.inner.credentials.default_chain(),
                )),
                IdentitySourceKind::None => Err(CredentialError::UnsupportedSourceKind(kind)),
            }
        })
    }

    async fn client_certificate_source(
        &self,
        config: &IdentityConfig,
        cancel: &CancellationToken,
    ) -> Result<CredentialSource, CredentialError> {
        let (Some(tenant_id), Some(client_id), Some(cert_config)) = (
            config.tenant_id.as_deref(),
            config.client_id.as_deref(),
            config.client_certificate.as_ref(),
        ) else {
            return Err(ValidationError::IncompleteClientCertificate.into());
        };

        let certificate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
            result = self.inner.certificates.load(cert_config, cancel) => result?,
        };

        Ok(CredentialSource::direct(
            self.inner
                .credentials
                .client_certificate(tenant_id, client_id, certificate),
        ))
    }

    async fn client_secret_source(
        &self,
        config: &IdentityConfig,
        cancel: &CancellationToken,
        depth: usize,
    ) -> Result<CredentialSource, CredentialError> {
        let (Some(tenant_id), Some(client_id)) =
            (config.tenant_id.as_deref(), config.client_id.as_deref())
        else {
            return Err(ValidationError::IncompleteClientSecret.into());
        };

        match &config.client_secret_in_vault {
            Some(vault_ref) => {
                let secret = self.vault_secret(vault_ref, cancel, depth).await?;
                let credential = self
                    .inner
                    .credentials
                    .client_secret(tenant_id, client_id, &secret);

                // The closure runs when the caller reports that the
                // credential stopped working, typically after key rotation:
                // flush every cached secret along the chain that produced
                // it, then resolve again from scratch.
                let resolver = self.clone();
                let refresh_config = config.clone();
                let refresh: RefreshFn = Box::new(move |cancel: CancellationToken| {
                    let resolver = resolver.clone();
                    let config = refresh_config.clone();
                    Box::pin(async move {
                        resolver.invalidate(&config);
                        let source = resolver.resolve(&config, &cancel).await?;
                        Ok(source.credential())
                    })
                });

                Ok(CredentialSource::new(credential, Some(refresh)))
            }
            None => {
                let Some(secret) = config.client_secret_plain_text.as_deref() else {
                    return Err(ValidationError::IncompleteClientSecret.into());
                };
                Ok(CredentialSource::direct(
                    self.inner
                        .credentials
                        .client_secret(tenant_id, client_id, secret),
                ))
            }
        }
    }

    async fn vault_secret(
        &self,
        vault_ref: &VaultSecretConfig,
        cancel: &CancellationToken,
        depth: usize,
    ) -> Result<String, CredentialError> {
        let identity_key = vault_ref.client_identity_key();

        if let Some(value) = self.inner.secret_cache.try_get(
            &vault_ref.vault_name,
            &vault_ref.secret_name,
            &identity_key,
        ) {
            return Ok(value);
        }

        let client = self
            .inner
            .client_cache
            .get_or_create(&vault_ref.vault_name, &identity_key, async {
                let credential = match vault_ref.vault_client_identity.as_deref() {
                    Some(nested) => {
                        self.resolve_with_depth(nested, cancel, depth + 1)
                            .await?
                            .credential()
                    }
                    // No identity named: read the vault with the ambient
                    // (system-assigned managed) identity.
                    None => self.inner.credentials.managed_identity(None),
                };
                Ok(self
                    .inner
                    .secrets_clients
                    .client_for(&vault_ref.vault_name, credential))
            })
            .await?;

        info!(
            vault = %vault_ref.vault_name,
            secret = %vault_ref.secret_name,
            "fetching secret from vault"
        );
        let value = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
            result = client.get_secret(&vault_ref.secret_name, cancel) => {
                result.map_err(|source| CredentialError::SecretUnavailable {
                    vault: vault_ref.vault_name.clone(),
                    secret: vault_ref.secret_name.clone(),
                    source,
                })?
            }
        };

        // Only completed fetches reach the cache; a cancelled or failed read
        // leaves it untouched.
        self.inner.secret_cache.add(
            &vault_ref.vault_name,
            &vault_ref.secret_name,
            &identity_key,
            value.clone(),
        );
        Ok(value)
    }
}

impl ResolverInner {
    fn invalidate_chain(&self, vault_ref: &VaultSecretConfig) {
        self.secret_cache.invalidate(
            &vault_ref.vault_name,
            &vault_ref.secret_name,
            &vault_ref.client_identity_key(),
        );
        if let Some(nested) = vault_ref.vault_client_identity.as_deref() {
            if let Some(child) = nested.client_secret_in_vault.as_ref() {
                self.invalidate_chain(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{test_resolver, TestHarness};
    use crate::traits::TokenRequest;

    #[tokio::test]
    async fn none_source_kind_is_unsupported() {
        let (resolver, _harness) = test_resolver();
        let config = IdentityConfig::for_source(IdentitySourceKind::None);
        let err = resolver
            .resolve(&config, &CancellationToken::new())
            .await
            .err().unwrap();
        assert!(matches!(err, CredentialError::UnsupportedSourceKind(_)));
    }

    #[tokio::test]
    async fn validation_errors_propagate_verbatim() {
        let (resolver, _harness) = test_resolver();
        let err = resolver
            .resolve(&IdentityConfig::default(), &CancellationToken::new())
            .await
            .err().unwrap();
        assert!(matches!(
            err,
            CredentialError::InvalidConfiguration(ValidationError::Indeterminate)
        ));
    }

    #[tokio::test]
    async fn plaintext_secret_credentials_cannot_be_replaced() {
        let (resolver, _harness) = test_resolver();
        let config = IdentityConfig::client_secret("t", "c", "s");
        let source = resolver
            .resolve(&config, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!source.supports_replacement());
        let err = source
            .replace_failed(&CancellationToken::new())
            .await
            .err().unwrap();
        assert!(matches!(err, CredentialError::ReplacementNotSupported));
    }

    #[tokio::test]
    async fn chain_depth_is_bounded() {
        let (resolver, harness) = test_resolver();
        harness.vault.put("v", "s", "value");

        // A straight-line chain deeper than the guard allows.
        let mut config = IdentityConfig::client_secret("t", "c", "s");
        for _ in 0..(MAX_CHAIN_DEPTH + 2) {
            config = IdentityConfig::client_secret_from_vault(
                "t",
                "c",
                VaultSecretConfig::new("v", "s").with_client_identity(config),
            );
        }

        let err = resolver
            .resolve(&config, &CancellationToken::new())
            .await
            .err().unwrap();
        assert!(matches!(err, CredentialError::ChainTooDeep { .. }));
    }

    #[tokio::test]
    async fn cancelled_resolution_caches_nothing() {
        let (resolver, harness) = test_resolver();
        harness.vault.put("v", "s", "value");

        let config = IdentityConfig::client_secret_from_vault(
            "t",
            "c",
            VaultSecretConfig::new("v", "s"),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver.resolve(&config, &cancel).await.err().unwrap();
        assert!(matches!(err, CredentialError::Cancelled));
        assert_eq!(harness.vault.reads("v", "s"), 0);
        assert_eq!(
            resolver.secret_cache().try_get("v", "s", "ambient"),
            None
        );
    }

    #[tokio::test]
    async fn direct_source_kinds_build_from_the_factory() {
        let (resolver, _harness) = test_resolver();
        let cancel = CancellationToken::new();

        for (kind, expected) in [
            (IdentitySourceKind::SystemManaged, "managed-identity"),
            (IdentitySourceKind::Cli, "cli"),
            (IdentitySourceKind::DevTool, "dev-tool"),
            (IdentitySourceKind::DefaultChain, "default-chain"),
        ] {
            let source = resolver
                .resolve(&IdentityConfig::for_source(kind), &cancel)
                .await
                .unwrap();
            assert!(!source.supports_replacement());
            let token = source
                .credential()
                .get_token(&TokenRequest::for_scopes(["scope"]), &cancel)
                .await
                .unwrap();
            assert!(
                token.token.contains(expected),
                "{kind}: token {} should name {expected}",
                token.token
            );
        }
    }

    #[tokio::test]
    async fn user_managed_passes_the_client_id_through() {
        let (resolver, _harness) = test_resolver();
        let cancel = CancellationToken::new();
        let source = resolver
            .resolve(&IdentityConfig::user_managed("mi-client"), &cancel)
            .await
            .unwrap();
        let token = source
            .credential()
            .get_token(&TokenRequest::for_scopes(["scope"]), &cancel)
            .await
            .unwrap();
        assert!(token.token.contains("mi-client"));
    }

    #[tokio::test]
    async fn certificate_source_loads_from_the_store() {
        let (resolver, harness) = test_resolver();
        let cancel = CancellationToken::new();
        harness.certificates.put("My", "CN=svc", b"der-bytes");

        let config = IdentityConfig::default().with_certificate(
            "t",
            "c",
            bridge_config::certificate::CertificateConfig::new("My").with_subject_name("CN=svc"),
        );
        let source = resolver.resolve(&config, &cancel).await.unwrap();
        let token = source
            .credential()
            .get_token(&TokenRequest::for_scopes(["scope"]), &cancel)
            .await
            .unwrap();
        assert!(token.token.contains("CN=svc"));
    }

    #[tokio::test]
    async fn missing_certificate_is_a_certificate_error() {
        let (resolver, _harness) = test_resolver();
        let config = IdentityConfig::default().with_certificate(
            "t",
            "c",
            bridge_config::certificate::CertificateConfig::new("My").with_subject_name("CN=absent"),
        );
        let err = resolver
            .resolve(&config, &CancellationToken::new())
            .await
            .err().unwrap();
        assert!(matches!(err, CredentialError::Certificate(_)));
    }

    fn _assert_traits() {
        fn send_sync<T: Send + Sync>() {}
        send_sync::<CredentialResolver>();
        send_sync::<CredentialSource>();
        let _ = TestHarness::new;
    }
}
