// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Legacy connection-string support.
//!
//! Older deployments selected their identity through a single
//! connection-string setting rather than a structured [`IdentityConfig`].
//! This module translates the supported forms so applications can keep that
//! setting while moving to the structured configuration:
//!
//! - `` (empty): the issuer SDK's default credential chain
//! - `RunAs=App`: the system-assigned managed identity
//! - `RunAs=Developer;DeveloperTool=Cli`: the platform CLI's identity
//! - `RunAs=Developer;DeveloperTool=Ide`: the IDE tooling's identity
//! - `RunAs=App;AppId=<guid>;TenantId=<guid>;AppKey=<secret>`: a
//!   client-id/secret identity

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::identity::{IdentityConfig, IdentitySourceKind};

static APP_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^RunAs=App;AppId=(?P<app_id>[A-Fa-f0-9]{8}(?:-[A-Fa-f0-9]{4}){3}-[A-Fa-f0-9]{12});TenantId=(?P<tenant_id>[A-Fa-f0-9]{8}(?:-[A-Fa-f0-9]{4}){3}-[A-Fa-f0-9]{12});AppKey=(?P<app_key>[^;]*)$",
    )
    .expect("connection string pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStringError {
    #[error("connection string '{0}' is not supported")]
    Unsupported(String),
}

/// Translate a legacy connection string into an [`IdentityConfig`].
pub fn parse(connection_string: &str) -> Result<IdentityConfig, ConnectionStringError> {
    match connection_string.trim() {
        "" => Ok(IdentityConfig::for_source(IdentitySourceKind::DefaultChain)),
        "RunAs=App" => Ok(IdentityConfig::for_source(IdentitySourceKind::SystemManaged)),
        "RunAs=Developer;DeveloperTool=Cli" => {
            Ok(IdentityConfig::for_source(IdentitySourceKind::Cli))
        }
        "RunAs=Developer;DeveloperTool=Ide" => {
            Ok(IdentityConfig::for_source(IdentitySourceKind::DevTool))
        }
        trimmed => match APP_ID_PATTERN.captures(trimmed) {
            Some(captures) => Ok(IdentityConfig::client_secret(
                &captures["tenant_id"],
                &captures["app_id"],
                &captures["app_key"],
            )),
            None => Err(ConnectionStringError::Unsupported(trimmed.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;

    const APP_ID: &str = "0b51d201-dfe9-42e2-91a5-3ac3b0a7fbbc";
    const TENANT_ID: &str = "63c3096d-96d6-4f6d-8b53-45208a5b80c1";

    #[test]
    fn empty_string_means_default_chain() {
        let config = parse("").unwrap();
        assert_eq!(config.source_kind, Some(IdentitySourceKind::DefaultChain));
        assert_eq!(validate(&config), Ok(IdentitySourceKind::DefaultChain));
    }

    #[test]
    fn whitespace_is_trimmed() {
        let config = parse("  RunAs=App  ").unwrap();
        assert_eq!(config.source_kind, Some(IdentitySourceKind::SystemManaged));
    }

    #[test]
    fn developer_tools_parse() {
        assert_eq!(
            parse("RunAs=Developer;DeveloperTool=Cli").unwrap().source_kind,
            Some(IdentitySourceKind::Cli)
        );
        assert_eq!(
            parse("RunAs=Developer;DeveloperTool=Ide").unwrap().source_kind,
            Some(IdentitySourceKind::DevTool)
        );
    }

    #[test]
    fn app_id_form_parses_to_client_secret() {
        let connection_string =
            format!("RunAs=App;AppId={APP_ID};TenantId={TENANT_ID};AppKey=hunter2");
        let config = parse(&connection_string).unwrap();
        assert_eq!(config.tenant_id.as_deref(), Some(TENANT_ID));
        assert_eq!(config.client_id.as_deref(), Some(APP_ID));
        assert_eq!(config.client_secret_plain_text.as_deref(), Some("hunter2"));
        assert_eq!(validate(&config), Ok(IdentitySourceKind::ClientSecret));
    }

    #[test]
    fn malformed_guid_is_unsupported() {
        let connection_string =
            format!("RunAs=App;AppId=not-a-guid;TenantId={TENANT_ID};AppKey=hunter2");
        assert!(matches!(
            parse(&connection_string),
            Err(ConnectionStringError::Unsupported(_))
        ));
    }

    #[test]
    fn unknown_forms_are_unsupported() {
        let err = parse("RunAs=CurrentUser").unwrap_err();
        assert_eq!(
            err.to_string(),
            "connection string 'RunAs=CurrentUser' is not supported"
        );
    }
}
