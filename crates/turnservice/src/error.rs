// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors produced while fetching or managing TURN credentials.
///
/// Cloneable so a single failure can be recorded as the store's last error
/// and handed to every observer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Neither an access token nor a client id was set before a fetch.
    #[error("one of access token or client id must be set")]
    Configuration,
    /// Network or connection failure talking to the issuer.
    #[error("transport error: {0}")]
    Transport(String),
    /// The issuer rejected the request (HTTP 403).
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The issuer answered with an unexpected status.
    #[error("credentials returned wrong status: {0}")]
    Status(u16),
    /// The response body could not be decoded.
    #[error("malformed credentials response: {0}")]
    Protocol(String),
    /// The response decoded but must not be trusted.
    #[error("credentials response rejected: {0}")]
    Integrity(IntegrityFailure),
    /// The store was used after `shutdown`.
    #[error("credential store has been shut down")]
    Shutdown,
    /// A cached credential was closed twice.
    #[error("cached credential already closed")]
    AlreadyClosed,
}

/// Reason an otherwise well-formed response was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// `success` was false.
    Unsuccessful,
    /// The echoed nonce did not match the one sent.
    NonceMismatch,
}

impl Error {
    /// Stable machine-readable code for logs and tooling.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::Transport(_) => "TRANSPORT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Status(_) => "STATUS",
            Self::Protocol(_) => "PROTOCOL",
            Self::Integrity(_) => "INTEGRITY",
            Self::Shutdown => "SHUTDOWN",
            Self::AlreadyClosed => "ALREADY_CLOSED",
        }
    }

    /// Misuse of the API rather than a failed fetch.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Shutdown | Self::AlreadyClosed)
    }
}

impl fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsuccessful => f.write_str("response unsuccessful"),
            Self::NonceMismatch => f.write_str("invalid nonce"),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
