// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod certificate;
pub mod connection_string;
pub mod identity;
pub mod validation;
