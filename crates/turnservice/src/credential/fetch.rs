// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential fetching from the TURN service REST API.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Once;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credential::{CredentialSet, Identity};
use crate::error::{Error, IntegrityFailure};

/// Path of the credentials endpoint relative to the service URI.
pub const CREDENTIALS_PATH: &str = "/api/v1/turn/credentials";

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<CredentialSet, Error>> + Send + 'a>>;

/// Source of fresh credential sets.
///
/// The returned set carries the issuer's session token in
/// [`CredentialSet::session`]. Implementations own any request timeout.
///
/// Object-safe for use as `Arc<dyn Fetcher>`.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch<'a>(&'a self, identity: &'a Identity) -> FetchFuture<'a>;
}

/// REST response carrying TURN credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsResponse {
    pub success: bool,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub turn: Option<CredentialSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl CredentialsResponse {
    /// Check the response against the nonce that was sent and extract the
    /// credential set.
    pub fn verify(self, nonce: &str) -> Result<CredentialSet, Error> {
        if !self.success {
            return Err(Error::Integrity(IntegrityFailure::Unsuccessful));
        }
        if self.nonce != nonce {
            return Err(Error::Integrity(IntegrityFailure::NonceMismatch));
        }
        let mut set =
            self.turn.ok_or_else(|| Error::Protocol("response carries no turn data".into()))?;
        set.session = self.session;
        Ok(set)
    }
}

/// HTTP client settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on the whole request.
    pub timeout: Duration,
    /// Bound on connection setup including the TLS handshake.
    pub connect_timeout: Duration,
    /// Accept invalid or self-signed certificates. Development only.
    pub accept_invalid_certs: bool,
    /// Extra PEM root certificate to trust.
    pub ca_cert: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            ca_cert: None,
        }
    }
}

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Fetches credentials with a form POST to `{uri}/api/v1/turn/credentials`.
pub struct HttpFetcher {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(uri: &str, transport: &TransportConfig) -> anyhow::Result<Self> {
        ensure_crypto();

        let mut builder = reqwest::Client::builder()
            .timeout(transport.timeout)
            .connect_timeout(transport.connect_timeout)
            .danger_accept_invalid_certs(transport.accept_invalid_certs);
        if let Some(ref path) = transport.ca_cert {
            let pem = std::fs::read(path)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        Ok(Self { endpoint: credentials_url(uri), http: builder.build()? })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, identity: &Identity) -> Result<CredentialSet, Error> {
        let nonce = generate_nonce();
        let resp = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, bearer(identity))
            .form(&[("nonce", nonce.as_str()), ("client_id", identity.client_id.as_str())])
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Forbidden(text));
        }
        if status != reqwest::StatusCode::OK {
            return Err(Error::Status(status.as_u16()));
        }

        let body = resp.bytes().await.map_err(|e| Error::Transport(e.to_string()))?;
        let response: CredentialsResponse =
            serde_json::from_slice(&body).map_err(|e| Error::Protocol(e.to_string()))?;
        let set = response.verify(&nonce)?;
        debug!(ttl = set.ttl, servers = set.servers.len(), "credentials fetched");
        Ok(set)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, identity: &'a Identity) -> FetchFuture<'a> {
        Box::pin(self.request(identity))
    }
}

/// Build the credentials endpoint URL from a service base URI.
pub fn credentials_url(uri: &str) -> String {
    format!("{}{CREDENTIALS_PATH}", uri.trim_end_matches('/'))
}

/// `Bearer base64("<access_token>:<session>")`.
pub fn bearer(identity: &Identity) -> String {
    let raw = format!("{}:{}", identity.access_token, identity.session);
    format!("Bearer {}", STANDARD.encode(raw))
}

/// Random per-request nonce (32 bytes, URL-safe base64 without padding).
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
