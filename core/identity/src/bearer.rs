// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Bearer-token access for callers outside the request pipeline.
//!
//! The proactive-refresh token cache lives in [`BearerAuthPolicy`], whose
//! job is to authenticate outgoing requests by writing an `Authorization`
//! header. Code that consumes raw token strings instead of sending requests
//! can still reuse that cache through [`BearerTokenProvider`], which
//! synthesizes a minimal request, runs the normal authenticate step, and
//! extracts the bearer value from the header it wrote.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::header::AUTHORIZATION;
use http::HeaderValue;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{CredentialError, TokenError};
use crate::resolver::CredentialSource;
use crate::traits::{AccessToken, TokenCredential, TokenRequest};

/// How long before a token's real expiry the policy starts refreshing it.
pub const REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Expiry reported by [`BearerTokenProvider::get_token`]. The authenticate
/// path does not expose the real expiry, so the provider reports a synthetic
/// horizon instead. Three minutes sits safely inside [`REFRESH_WINDOW`]:
/// callers re-ask before the real token can expire, at the cost of
/// occasional redundant cache lookups. Redundant issuer calls never happen,
/// since the cache short-circuits while the real token is fresh.
pub const SYNTHETIC_EXPIRY_HORIZON: Duration = Duration::from_secs(3 * 60);

struct CachedBearer {
    header: HeaderValue,
    expires_at: SystemTime,
}

/// Authenticates requests with bearer tokens minted by one credential,
/// caching issued tokens per requested (scopes, claims, authority) and
/// refreshing them proactively.
pub struct BearerAuthPolicy {
    credential: Arc<dyn TokenCredential>,
    tokens: RwLock<HashMap<TokenRequest, CachedBearer>>,
}

impl BearerAuthPolicy {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            credential,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Write an `Authorization: Bearer …` header for `request` onto the
    /// outgoing request's parts, minting or refreshing the token as needed.
    /// If a proactive refresh attempt fails while the cached token is still
    /// unexpired, the cached token keeps being served.
    pub async fn authenticate(
        &self,
        request: &TokenRequest,
        parts: &mut http::request::Parts,
        cancel: &CancellationToken,
    ) -> Result<(), CredentialError> {
        let now = SystemTime::now();

        {
            let tokens = self.tokens.read();
            if let Some(entry) = tokens.get(request) {
                if entry.expires_at > now + REFRESH_WINDOW {
                    parts.headers.insert(AUTHORIZATION, entry.header.clone());
                    return Ok(());
                }
            }
        }

        debug!(scopes = ?request.scopes, "minting bearer token");
        match self.credential.get_token(request, cancel).await {
            Ok(token) => {
                let header = bearer_header(&token.token)?;
                self.tokens.write().insert(
                    request.clone(),
                    CachedBearer {
                        header: header.clone(),
                        expires_at: token.expires_at,
                    },
                );
                parts.headers.insert(AUTHORIZATION, header);
                Ok(())
            }
            Err(err) => {
                let tokens = self.tokens.read();
                if let Some(entry) = tokens.get(request) {
                    if entry.expires_at > now {
                        warn!(
                            error = %err,
                            "proactive token refresh failed, serving unexpired cached token"
                        );
                        parts.headers.insert(AUTHORIZATION, entry.header.clone());
                        return Ok(());
                    }
                }
                Err(CredentialError::TokenNotIssued(err))
            }
        }
    }
}

fn bearer_header(token: &str) -> Result<HeaderValue, CredentialError> {
    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        CredentialError::TokenNotIssued(TokenError::Malformed(
            "token value is not a valid header value".to_string(),
        ))
    })
}

struct ProviderState {
    credential: Arc<dyn TokenCredential>,
    policy: Arc<BearerAuthPolicy>,
}

/// Token-value access over a [`CredentialSource`], backed by the
/// [`BearerAuthPolicy`] cache.
///
/// When the source's credential is replaced, the policy (and with it the
/// whole issued-token cache) is replaced wholesale, never merged.
pub struct BearerTokenProvider {
    source: Arc<CredentialSource>,
    state: RwLock<ProviderState>,
}

impl BearerTokenProvider {
    pub fn new(source: Arc<CredentialSource>) -> Self {
        let credential = source.credential();
        Self {
            source,
            state: RwLock::new(ProviderState {
                credential: credential.clone(),
                policy: Arc::new(BearerAuthPolicy::new(credential)),
            }),
        }
    }

    /// Obtain a raw bearer token for the requested characteristics.
    ///
    /// The reported expiry is `now +` [`SYNTHETIC_EXPIRY_HORIZON`], not the
    /// real one. A failure of the underlying authenticate step surfaces as
    /// [`CredentialError::TokenNotIssued`].
    pub async fn get_token(
        &self,
        request: &TokenRequest,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, CredentialError> {
        let policy = self.current_policy();

        let (mut parts, _body) = http::Request::new(()).into_parts();
        policy.authenticate(request, &mut parts, cancel).await?;

        let malformed = || {
            CredentialError::TokenNotIssued(TokenError::Malformed(
                "authenticate step produced no bearer authorization header".to_string(),
            ))
        };
        let header = parts.headers.get(AUTHORIZATION).ok_or_else(malformed)?;
        let value = header.to_str().map_err(|_| malformed())?;
        let token = value.strip_prefix("Bearer ").ok_or_else(malformed)?;

        Ok(AccessToken::new(
            token,
            SystemTime::now() + SYNTHETIC_EXPIRY_HORIZON,
        ))
    }

    fn current_policy(&self) -> Arc<BearerAuthPolicy> {
        let current = self.source.credential();
        {
            let state = self.state.read();
            if Arc::ptr_eq(&state.credential, &current) {
                return state.policy.clone();
            }
        }

        let mut state = self.state.write();
        if !Arc::ptr_eq(&state.credential, &current) {
            debug!("credential replaced, discarding issued-token cache");
            *state = ProviderState {
                credential: current.clone(),
                policy: Arc::new(BearerAuthPolicy::new(current)),
            };
        }
        state.policy.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::StaticTokenCredential;

    fn provider_over(credential: Arc<StaticTokenCredential>) -> BearerTokenProvider {
        let source = Arc::new(CredentialSource::direct(credential));
        BearerTokenProvider::new(source)
    }

    #[tokio::test]
    async fn repeated_requests_reuse_the_cached_token() {
        let credential = Arc::new(StaticTokenCredential::new("tok-1"));
        let provider = provider_over(credential.clone());
        let cancel = CancellationToken::new();
        let request = TokenRequest::for_scopes(["scope-a"]);

        let first = provider.get_token(&request, &cancel).await.unwrap();
        let second = provider.get_token(&request, &cancel).await.unwrap();

        assert_eq!(first.token, "tok-1");
        assert_eq!(second.token, "tok-1");
        assert_eq!(credential.calls(), 1);
    }

    #[tokio::test]
    async fn distinct_scopes_are_cached_separately() {
        let credential = Arc::new(StaticTokenCredential::new("tok"));
        let provider = provider_over(credential.clone());
        let cancel = CancellationToken::new();

        provider
            .get_token(&TokenRequest::for_scopes(["scope-a"]), &cancel)
            .await
            .unwrap();
        provider
            .get_token(&TokenRequest::for_scopes(["scope-b"]), &cancel)
            .await
            .unwrap();

        assert_eq!(credential.calls(), 2);
    }

    #[tokio::test]
    async fn expiry_is_the_synthetic_horizon() {
        let credential = Arc::new(StaticTokenCredential::new("tok"));
        let provider = provider_over(credential);
        let before = SystemTime::now();

        let token = provider
            .get_token(&TokenRequest::for_scopes(["s"]), &CancellationToken::new())
            .await
            .unwrap();

        let min = before + SYNTHETIC_EXPIRY_HORIZON;
        let max = SystemTime::now() + SYNTHETIC_EXPIRY_HORIZON;
        assert!(token.expires_at >= min && token.expires_at <= max);
    }

    #[tokio::test]
    async fn failures_surface_as_token_not_issued() {
        let credential = Arc::new(StaticTokenCredential::new("tok"));
        credential.set_failing(true);
        let provider = provider_over(credential);

        let err = provider
            .get_token(&TokenRequest::for_scopes(["s"]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::TokenNotIssued(_)));
    }

    #[tokio::test]
    async fn unexpired_token_keeps_serving_when_refresh_fails() {
        // Lifetime shorter than the refresh window: every authenticate call
        // after the first attempts a proactive refresh.
        let credential = Arc::new(StaticTokenCredential::with_lifetime(
            "tok",
            Duration::from_secs(120),
        ));
        let provider = provider_over(credential.clone());
        let cancel = CancellationToken::new();
        let request = TokenRequest::for_scopes(["s"]);

        let first = provider.get_token(&request, &cancel).await.unwrap();
        credential.set_failing(true);
        let second = provider.get_token(&request, &cancel).await.unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(credential.calls(), 2);
    }

    #[tokio::test]
    async fn authenticate_writes_the_authorization_header() {
        let policy = BearerAuthPolicy::new(Arc::new(StaticTokenCredential::new("tok")));
        let (mut parts, _body) = http::Request::new(()).into_parts();
        policy
            .authenticate(
                &TokenRequest::for_scopes(["s"]),
                &mut parts,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            parts.headers.get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer tok"
        );
    }
}
