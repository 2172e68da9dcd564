// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Access-token views over resolved credentials.

use std::sync::Arc;

use bridge_config::identity::IdentityConfig;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::CredentialError;
use crate::resolver::{CredentialResolver, CredentialSource};
use crate::traits::{AccessToken, TokenRequest};

/// Wraps a [`CredentialSource`] as a plain source of access tokens.
///
/// Any failure from the underlying credential is folded into
/// [`CredentialError::TokenNotIssued`], so callers can branch on "could not
/// authenticate" without inspecting issuer-specific error types.
pub struct AccessTokenSource {
    source: Arc<CredentialSource>,
}

impl AccessTokenSource {
    pub fn new(source: Arc<CredentialSource>) -> Self {
        Self { source }
    }

    pub async fn get(
        &self,
        request: &TokenRequest,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, CredentialError> {
        self.source
            .credential()
            .get_token(request, cancel)
            .await
            .map_err(CredentialError::TokenNotIssued)
    }

    /// Obtain a token after the caller found the previous one no longer
    /// works: replace the underlying credential, then mint from the
    /// replacement.
    pub async fn get_replacement_for_failed(
        &self,
        request: &TokenRequest,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, CredentialError> {
        let replacement = self.source.replace_failed(cancel).await?;
        replacement
            .get_token(request, cancel)
            .await
            .map_err(CredentialError::TokenNotIssued)
    }
}

/// Binds an [`IdentityConfig`] to a resolver, resolving on first use.
///
/// Lets a component hold "the credential this configuration describes"
/// without forcing resolution at construction time. Resolution follows the
/// same optimistic pattern as the caches: racing first uses may both
/// resolve, and the first to store wins.
pub struct LazyCredentialSource {
    config: IdentityConfig,
    resolver: CredentialResolver,
    resolved: Mutex<Option<Arc<CredentialSource>>>,
}

impl LazyCredentialSource {
    pub fn new(config: IdentityConfig, resolver: CredentialResolver) -> Self {
        Self {
            config,
            resolver,
            resolved: Mutex::new(None),
        }
    }

    /// The resolved source for this configuration, resolving it now if no
    /// prior call has.
    pub async fn credential_source(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<CredentialSource>, CredentialError> {
        {
            let resolved = self.resolved.lock();
            if let Some(source) = resolved.as_ref() {
                return Ok(source.clone());
            }
        }

        let source = Arc::new(self.resolver.resolve(&self.config, cancel).await?);

        let mut resolved = self.resolved.lock();
        if let Some(winner) = resolved.as_ref() {
            return Ok(winner.clone());
        }
        *resolved = Some(source.clone());
        Ok(source)
    }

    pub async fn get_token(
        &self,
        request: &TokenRequest,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, CredentialError> {
        let source = self.credential_source(cancel).await?;
        source
            .credential()
            .get_token(request, cancel)
            .await
            .map_err(CredentialError::TokenNotIssued)
    }
}
