// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Certificate lookup configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which certificate store to search.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStoreLocation {
    /// The store belonging to the current user.
    #[default]
    CurrentUser,

    /// The machine-wide store.
    LocalMachine,
}

impl std::fmt::Display for CertificateStoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateStoreLocation::CurrentUser => write!(f, "current_user"),
            CertificateStoreLocation::LocalMachine => write!(f, "local_machine"),
        }
    }
}

/// Describes where to find the client certificate to authenticate with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct CertificateConfig {
    /// Location of the certificate store to use.
    #[serde(default)]
    pub store_location: CertificateStoreLocation,

    /// Name of the certificate store to use.
    pub store_name: String,

    /// Subject name the certificate must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
}

impl CertificateConfig {
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_location: CertificateStoreLocation::default(),
            store_name: store_name.into(),
            subject_name: None,
        }
    }

    pub fn with_location(self, store_location: CertificateStoreLocation) -> Self {
        Self {
            store_location,
            ..self
        }
    }

    pub fn with_subject_name(self, subject_name: impl Into<String>) -> Self {
        Self {
            subject_name: Some(subject_name.into()),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_location_defaults_to_current_user() {
        let config: CertificateConfig = serde_yaml::from_str("store_name: My").unwrap();
        assert_eq!(config.store_location, CertificateStoreLocation::CurrentUser);
        assert_eq!(config.subject_name, None);
    }

    #[test]
    fn builder_sets_all_fields() {
        let config = CertificateConfig::new("My")
            .with_location(CertificateStoreLocation::LocalMachine)
            .with_subject_name("CN=service.example.com");
        assert_eq!(config.store_location, CertificateStoreLocation::LocalMachine);
        assert_eq!(config.subject_name.as_deref(), Some("CN=service.example.com"));
    }
}
