// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ring::hmac;

use crate::credential::fetch::TransportConfig;
use crate::credential::store::StoreConfig;
use crate::credential::DEFAULT_EXPIRATION_PERCENTILE;

/// Fetch and keep fresh short-lived TURN relay credentials.
#[derive(Debug, Parser)]
#[command(name = "turnservicecli", version, about)]
pub struct Config {
    /// Base URI of the TURN credential service.
    #[arg(long, env = "TURNSERVICE_URI")]
    pub uri: String,

    /// Access token presented to the service.
    #[arg(long, env = "TURNSERVICE_ACCESS_TOKEN", default_value = "")]
    pub access_token: String,

    /// Client identifier sent with each request.
    #[arg(long, env = "TURNSERVICE_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// Initial session token.
    #[arg(long, env = "TURNSERVICE_SESSION", default_value = "")]
    pub session: String,

    /// Derive the access token as HMAC-SHA256 of the client id under this
    /// secret. Overrides --access-token.
    #[arg(long, env = "TURNSERVICE_HMAC_SECRET")]
    pub hmac_secret: Option<String>,

    /// Percentage of the TTL after which a credential counts as expired
    /// (0 selects the default).
    #[arg(long, env = "TURNSERVICE_EXPIRATION_PERCENTILE", default_value_t = DEFAULT_EXPIRATION_PERCENTILE)]
    pub expiration_percentile: u8,

    /// Seconds between background refresh checks.
    #[arg(long, env = "TURNSERVICE_REFRESH_INTERVAL_SECS", default_value = "60")]
    pub refresh_interval_secs: u64,

    /// Request timeout in seconds.
    #[arg(long, env = "TURNSERVICE_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds, TLS handshake included.
    #[arg(long, env = "TURNSERVICE_CONNECT_TIMEOUT_SECS", default_value = "30")]
    pub connect_timeout_secs: u64,

    /// Accept invalid TLS certificates.
    #[arg(long, env = "TURNSERVICE_INSECURE")]
    pub insecure: bool,

    /// Additional PEM root certificate to trust.
    #[arg(long, env = "TURNSERVICE_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Fetch once, print the credentials as JSON, and exit.
    #[arg(long)]
    pub once: bool,

    /// Log format (json or text).
    #[arg(long, env = "TURNSERVICE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "TURNSERVICE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.uri.starts_with("http://") || self.uri.starts_with("https://")) {
            anyhow::bail!("--uri must be an http:// or https:// URL, got {:?}", self.uri);
        }
        if self.expiration_percentile > 99 {
            anyhow::bail!(
                "--expiration-percentile must be between 0 and 99, got {}",
                self.expiration_percentile
            );
        }
        if self.refresh_interval_secs == 0 {
            anyhow::bail!("--refresh-interval-secs must be greater than zero");
        }
        if self.timeout_secs == 0 || self.connect_timeout_secs == 0 {
            anyhow::bail!("timeouts must be greater than zero");
        }
        if self.hmac_secret.is_some() && self.client_id.is_empty() {
            anyhow::bail!("--hmac-secret requires --client-id");
        }
        if self.hmac_secret.is_none() && self.access_token.is_empty() && self.client_id.is_empty()
        {
            anyhow::bail!("one of --access-token, --client-id or --hmac-secret is required");
        }
        Ok(())
    }

    /// Token to present: the HMAC-derived one when a secret is configured.
    pub fn access_token(&self) -> String {
        match self.hmac_secret {
            Some(ref secret) => derive_access_token(secret, &self.client_id),
            None => self.access_token.clone(),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            expiration_percentile: self.expiration_percentile,
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            accept_invalid_certs: self.insecure,
            ca_cert: self.ca_cert.clone(),
        }
    }
}

/// `"h" + hex(HMAC-SHA256(secret, client_id))`.
pub fn derive_access_token(secret: &str, client_id: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, client_id.as_bytes());
    format!("h{}", hex::encode(tag.as_ref()))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
