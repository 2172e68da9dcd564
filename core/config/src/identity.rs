// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Identity configuration value types.
//!
//! An [`IdentityConfig`] describes which identity client code should present
//! when making an outbound call: a client-id/secret pair, a client
//! certificate, a managed identity, or a developer-tool identity. The client
//! secret may live in a secret vault, and the identity used to read that
//! vault may itself be described by another [`IdentityConfig`], so the type
//! is a recursive value tree. Configurations are typically deserialized from
//! an application's structured configuration:
//!
//! ```yaml
//! tenant_id: "77777777-7777-7777-7777-777777777777"
//! client_id: "88888888-8888-8888-8888-888888888888"
//! client_secret_in_vault:
//!   vault_name: myvault
//!   secret_name: my-client-secret
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::certificate::CertificateConfig;

/// Cache-key sentinel used when a vault is accessed with the ambient
/// identity rather than an explicitly configured one.
pub const AMBIENT_IDENTITY_KEY: &str = "ambient";

/// The source an identity can be drawn from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySourceKind {
    /// No identity is in use (e.g. the target allows anonymous access).
    None,

    /// An explicitly configured client id, authenticating with a client
    /// secret presented to the issuer.
    ClientSecret,

    /// An explicitly configured client id, authenticating with a client
    /// certificate.
    ClientCertificate,

    /// The ambient system-assigned managed identity.
    SystemManaged,

    /// A user-assigned managed identity, selected by its client id.
    UserManaged,

    /// The identity the platform CLI is currently logged in with. For local
    /// development only.
    Cli,

    /// The identity the developer's IDE tooling is signed in with. For local
    /// development only.
    DevTool,

    /// The issuer SDK's default credential chain: explicit environment
    /// configuration first, then a managed identity, then local development
    /// sources.
    DefaultChain,
}

impl std::fmt::Display for IdentitySourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IdentitySourceKind::None => "none",
            IdentitySourceKind::ClientSecret => "client_secret",
            IdentitySourceKind::ClientCertificate => "client_certificate",
            IdentitySourceKind::SystemManaged => "system_managed",
            IdentitySourceKind::UserManaged => "user_managed",
            IdentitySourceKind::Cli => "cli",
            IdentitySourceKind::DevTool => "dev_tool",
            IdentitySourceKind::DefaultChain => "default_chain",
        };
        write!(f, "{}", name)
    }
}

/// Identifies a secret held in an external secret vault, along with the
/// identity to use when reading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct VaultSecretConfig {
    /// Name of the vault that holds the secret.
    pub vault_name: String,

    /// Name of the secret within the vault.
    pub secret_name: String,

    /// Identity to use when reading the vault. When absent, the ambient
    /// identity (typically the system-assigned managed identity) is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_client_identity: Option<Box<IdentityConfig>>,
}

impl VaultSecretConfig {
    /// Create a reference to `secret_name` in `vault_name`, read with the
    /// ambient identity.
    pub fn new(vault_name: impl Into<String>, secret_name: impl Into<String>) -> Self {
        Self {
            vault_name: vault_name.into(),
            secret_name: secret_name.into(),
            vault_client_identity: None,
        }
    }

    pub fn with_client_identity(self, identity: IdentityConfig) -> Self {
        Self {
            vault_client_identity: Some(Box::new(identity)),
            ..self
        }
    }

    /// Normalized cache-key component for the identity used to read the
    /// vault. Two references with identical identity field values map to the
    /// same key regardless of where the values came from.
    pub fn client_identity_key(&self) -> String {
        match &self.vault_client_identity {
            Some(identity) => identity.cache_key(),
            None => AMBIENT_IDENTITY_KEY.to_string(),
        }
    }
}

/// Configuration determining the identity client code will use for some
/// operation (e.g. connecting to a storage service, or reading secrets from
/// a vault).
///
/// All fields are optional. Which fields must be populated together is
/// defined by [`crate::validation::validate`], which classifies a
/// configuration into exactly one [`IdentitySourceKind`] or reports why it
/// cannot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct IdentityConfig {
    /// Explicit source kind. Optional because the kind can usually be
    /// inferred from which other fields are set; some kinds (e.g.
    /// `system_managed`) have no other fields and need the explicit tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<IdentitySourceKind>,

    /// Tenant defining the application registration to authenticate as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Client id (application id) to authenticate as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Client secret supplied directly in configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_plain_text: Option<String>,

    /// Where in a secret vault to find the client secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_in_vault: Option<VaultSecretConfig>,

    /// Client certificate to authenticate with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<CertificateConfig>,

    /// Client id of the user-assigned managed identity to authenticate as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_identity_client_id: Option<String>,
}

impl IdentityConfig {
    /// A configuration consisting only of an explicit source kind.
    pub fn for_source(kind: IdentitySourceKind) -> Self {
        Self {
            source_kind: Some(kind),
            ..Self::default()
        }
    }

    /// A client-id/secret configuration with the secret supplied in plain
    /// text.
    pub fn client_secret(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            client_id: Some(client_id.into()),
            client_secret_plain_text: Some(client_secret.into()),
            ..Self::default()
        }
    }

    /// A client-id/secret configuration with the secret held in a vault.
    pub fn client_secret_from_vault(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        vault_secret: VaultSecretConfig,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            client_id: Some(client_id.into()),
            client_secret_in_vault: Some(vault_secret),
            ..Self::default()
        }
    }

    /// A user-assigned managed identity configuration.
    pub fn user_managed(managed_identity_client_id: impl Into<String>) -> Self {
        Self {
            managed_identity_client_id: Some(managed_identity_client_id.into()),
            ..Self::default()
        }
    }

    pub fn with_source_kind(self, kind: IdentitySourceKind) -> Self {
        Self {
            source_kind: Some(kind),
            ..self
        }
    }

    pub fn with_certificate(
        self,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        certificate: CertificateConfig,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            client_id: Some(client_id.into()),
            client_certificate: Some(certificate),
            ..self
        }
    }

    /// Normalized serialization of this configuration, used as a cache-key
    /// component. Configurations with identical field values produce
    /// identical keys; identity is by value, never by reference.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).expect("IdentityConfig serialization is infallible")
    }
}
