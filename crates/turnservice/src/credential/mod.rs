// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TURN credential caching: issued credential sets, self-expiring cache
//! entries, the store that decides when to fetch, and observer fan-out.
//!
//! The store is the single owner of the "current" credential. A background
//! loop asks it to refresh on a fixed tick (or immediately when auto-refresh
//! is switched on), and every completed fetch is published to observers.

pub mod cached;
pub mod fetch;
pub mod notify;
pub mod refresh;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default share of the TTL after which a cached credential counts as expired.
pub const DEFAULT_EXPIRATION_PERCENTILE: u8 = 80;

/// Map an unset (zero) percentile to the default and cap at 100.
pub fn effective_percentile(percentile: u8) -> u8 {
    match percentile {
        0 => DEFAULT_EXPIRATION_PERCENTILE,
        p => p.min(100),
    }
}

/// TURN credentials with relay servers, as issued by the credential service.
///
/// Never mutated once handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    /// Lifetime in seconds.
    pub ttl: u64,
    pub username: String,
    pub password: String,
    /// Relay server groups in the order the issuer listed them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_uri: Option<String>,
    /// Session token returned alongside the credentials, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// A group of TURN server URIs sharing an id and priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerGroup {
    pub id: String,
    pub urns: Vec<String>,
    pub prio: i32,
}

/// Identity presented to the issuer on every fetch.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub access_token: String,
    pub client_id: String,
    pub session: String,
}

impl Identity {
    pub fn new(
        access_token: impl Into<String>,
        client_id: impl Into<String>,
        session: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            client_id: client_id.into(),
            session: session.into(),
        }
    }

    /// A fetch needs at least one of access token or client id.
    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty() || !self.client_id.is_empty()
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("access_token", &redact(&self.access_token))
            .field("client_id", &self.client_id)
            .field("session", &redact(&self.session))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
