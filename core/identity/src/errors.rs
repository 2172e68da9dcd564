// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use bridge_config::identity::IdentitySourceKind;
use bridge_config::validation::ValidationError;
use thiserror::Error;

/// Errors reported by the external token issuance capability.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("issuer unreachable: {0}")]
    IssuerUnreachable(String),

    #[error("authentication rejected: {0}")]
    Rejected(String),

    #[error("token value is malformed: {0}")]
    Malformed(String),

    #[error("token request cancelled")]
    Cancelled,
}

/// Errors reported by the external secret-store capability.
#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("secret {secret} not found in vault {vault}")]
    NotFound { vault: String, secret: String },

    #[error("access to vault {vault} denied: {reason}")]
    AccessDenied { vault: String, reason: String },

    #[error("vault transport error: {0}")]
    Transport(String),
}

/// Errors reported by the external certificate-store capability.
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("no certificate matching {subject:?} in store {store}")]
    NotFound {
        store: String,
        subject: Option<String>,
    },

    #[error("certificate store error: {0}")]
    Store(String),
}

/// Errors from identity resolution and token acquisition.
#[derive(Error, Debug)]
pub enum CredentialError {
    // Configuration
    #[error("invalid identity configuration: {0}")]
    InvalidConfiguration(#[from] ValidationError),
    #[error("unsupported identity source kind: {0}")]
    UnsupportedSourceKind(IdentitySourceKind),
    #[error("identity chain exceeds {limit} nested vault references")]
    ChainTooDeep { limit: usize },

    // Acquisition
    #[error("access token cannot be acquired")]
    TokenNotIssued(#[source] TokenError),
    #[error("secret {secret} in vault {vault} is unavailable")]
    SecretUnavailable {
        vault: String,
        secret: String,
        #[source]
        source: SecretsError,
    },
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    // Lifecycle
    #[error("credential does not support replacement")]
    ReplacementNotSupported,
    #[error("resolution cancelled")]
    Cancelled,
}
