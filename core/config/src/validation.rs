// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Classification of [`IdentityConfig`] values.
//!
//! Exactly one identity source kind must be deducible from the populated
//! fields (plus the optional explicit tag). Zero or multiple indicated kinds
//! is a validation error, never silently resolved. Classification is pure
//! and synchronous.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::identity::{IdentityConfig, IdentitySourceKind};

fn kind_list(kinds: &[IdentitySourceKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unable to determine identity source because no suitable fields are set")]
    Indeterminate,

    #[error(
        "identity source is ambiguous because source_kind is {declared} but the populated fields are for {}",
        kind_list(.conflicting)
    )]
    AmbiguousWithDeclared {
        declared: IdentitySourceKind,
        conflicting: Vec<IdentitySourceKind>,
    },

    #[error(
        "identity source is ambiguous because the populated fields are for {}",
        kind_list(.indicated)
    )]
    AmbiguousFields { indicated: Vec<IdentitySourceKind> },

    #[error(
        "client_secret configuration must provide tenant_id, client_id, and exactly one of client_secret_plain_text or client_secret_in_vault"
    )]
    IncompleteClientSecret,

    #[error(
        "client_certificate configuration must provide tenant_id, client_id, and client_certificate, and no client secret fields"
    )]
    IncompleteClientCertificate,

    #[error("user_managed configuration must provide managed_identity_client_id")]
    IncompleteUserManaged,
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Classify a configuration into exactly one [`IdentitySourceKind`].
///
/// The set of indicated kinds is computed from the populated fields: either
/// secret field indicates `client_secret` (as do tenant/client ids on their
/// own, when no certificate reference is present), a certificate reference
/// indicates `client_certificate`, and a managed-identity client id
/// indicates `user_managed`. An explicit `source_kind` joins the set, so a
/// tag that matches what the fields already indicate is not a conflict.
pub fn validate(config: &IdentityConfig) -> Result<IdentitySourceKind, ValidationError> {
    let tenant_present = present(&config.tenant_id);
    let client_present = present(&config.client_id);
    let secret_plain_present = present(&config.client_secret_plain_text);
    let secret_vault_present = config.client_secret_in_vault.is_some();
    let certificate_present = config.client_certificate.is_some();
    let managed_client_present = present(&config.managed_identity_client_id);

    let mut indicated = BTreeSet::new();
    if let Some(declared) = config.source_kind {
        indicated.insert(declared);
    }

    if secret_plain_present
        || secret_vault_present
        || ((tenant_present || client_present) && !certificate_present)
    {
        indicated.insert(IdentitySourceKind::ClientSecret);
    }

    if certificate_present {
        indicated.insert(IdentitySourceKind::ClientCertificate);
    }

    if managed_client_present {
        indicated.insert(IdentitySourceKind::UserManaged);
    }

    let kinds: Vec<IdentitySourceKind> = indicated.into_iter().collect();
    let kind = match kinds.as_slice() {
        [] => return Err(ValidationError::Indeterminate),
        [kind] => *kind,
        _ => {
            return Err(match config.source_kind {
                Some(declared) => ValidationError::AmbiguousWithDeclared {
                    declared,
                    conflicting: kinds.into_iter().filter(|k| *k != declared).collect(),
                },
                None => ValidationError::AmbiguousFields { indicated: kinds },
            });
        }
    };

    match kind {
        IdentitySourceKind::ClientSecret => {
            if !(tenant_present
                && client_present
                && (secret_plain_present ^ secret_vault_present))
            {
                return Err(ValidationError::IncompleteClientSecret);
            }
        }
        IdentitySourceKind::ClientCertificate => {
            if !(tenant_present && client_present && certificate_present)
                || secret_plain_present
                || secret_vault_present
            {
                return Err(ValidationError::IncompleteClientCertificate);
            }
        }
        IdentitySourceKind::UserManaged => {
            if !managed_client_present {
                return Err(ValidationError::IncompleteUserManaged);
            }
        }
        // The remaining kinds are complete with just the explicit tag.
        _ => {}
    }

    Ok(kind)
}
