// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Dynamic identity resolution and credential caching.
//!
//! Applications describe the identity to authenticate with through an
//! [`IdentityConfig`](bridge_config::identity::IdentityConfig) supplied at
//! runtime. The [`resolver::CredentialResolver`] turns that configuration
//! into a credential object, recursively resolving client secrets held in
//! secret vaults (which may themselves be read with another configured
//! identity), and caching the expensive intermediate artifacts: vault
//! clients, fetched secret values, and issued tokens.

pub mod bearer;
pub mod client_cache;
pub mod errors;
pub mod resolver;
pub mod secret_cache;
pub mod testutils;
pub mod token_source;
pub mod traits;

pub use errors::CredentialError;
pub use resolver::{CredentialResolver, CredentialSource};
pub use traits::{AccessToken, TokenCredential, TokenRequest};
