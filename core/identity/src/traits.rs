// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Seams to the external collaborators.
//!
//! Token issuance, vault reads, and certificate lookup are delegated to
//! whatever SDK the hosting application uses. This subsystem only decides
//! *which* identity and *which* cached artifact to use, so those
//! capabilities appear here as object-safe traits, injected at construction
//! and mocked in tests.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bridge_config::certificate::CertificateConfig;
use tokio_util::sync::CancellationToken;

use crate::errors::{CertificateError, SecretsError, TokenError};

/// A bearer token and the time it stops being usable.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: SystemTime,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }
}

/// Characteristics required of a requested token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TokenRequest {
    /// Scopes determining what the token can be used for.
    pub scopes: Vec<String>,

    /// Additional claims the application needs in the token, if any.
    pub claims: Option<String>,

    /// Authority that should issue the token, or `None` for the default.
    pub authority: Option<String>,
}

impl TokenRequest {
    pub fn for_scopes<S: Into<String>>(scopes: impl IntoIterator<Item = S>) -> Self {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_claims(self, claims: impl Into<String>) -> Self {
        Self {
            claims: Some(claims.into()),
            ..self
        }
    }

    pub fn with_authority(self, authority: impl Into<String>) -> Self {
        Self {
            authority: Some(authority.into()),
            ..self
        }
    }
}

/// An object capable of minting bearer tokens for a given identity.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(
        &self,
        request: &TokenRequest,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, TokenError>;
}

/// Constructs the concrete credential objects the external identity SDK
/// provides. The constructors are cheap; any network work happens lazily
/// when the credential first mints a token.
pub trait CredentialFactory: Send + Sync {
    fn client_secret(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Arc<dyn TokenCredential>;

    fn client_certificate(
        &self,
        tenant_id: &str,
        client_id: &str,
        certificate: Certificate,
    ) -> Arc<dyn TokenCredential>;

    /// A managed-identity credential; `client_id` selects a user-assigned
    /// identity, `None` the system-assigned one.
    fn managed_identity(&self, client_id: Option<&str>) -> Arc<dyn TokenCredential>;

    fn cli(&self) -> Arc<dyn TokenCredential>;

    fn dev_tool(&self) -> Arc<dyn TokenCredential>;

    fn default_chain(&self) -> Arc<dyn TokenCredential>;
}

/// Certificate material as loaded from a store.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub subject: String,
    pub der: Vec<u8>,
}

/// Looks up certificates in a platform certificate store.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn load(
        &self,
        config: &CertificateConfig,
        cancel: &CancellationToken,
    ) -> Result<Certificate, CertificateError>;
}

/// Reads secrets from one vault, authenticated as one identity.
#[async_trait]
pub trait SecretsClient: Send + Sync {
    async fn get_secret(
        &self,
        secret_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, SecretsError>;
}

/// Builds a [`SecretsClient`] for a (vault, credential) pair.
pub trait SecretsClientFactory: Send + Sync {
    fn client_for(
        &self,
        vault_name: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Arc<dyn SecretsClient>;
}
