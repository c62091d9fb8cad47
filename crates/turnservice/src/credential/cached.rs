// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A credential set paired with its own early-expiry timer.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::credential::{effective_percentile, CredentialSet};
use crate::error::Error;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELED: u8 = 2;

/// One-shot timer state. Exactly one of fire or cancel wins the transition
/// out of `ARMED`.
struct ExpiryTimer {
    state: AtomicU8,
    cancel: CancellationToken,
}

impl ExpiryTimer {
    fn fire(&self) -> bool {
        self.state.compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    fn disarm(&self) -> bool {
        let won = self
            .state
            .compare_exchange(ARMED, CANCELED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.cancel.cancel();
        }
        won
    }

    fn fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }
}

/// A [`CredentialSet`] that expires itself after a percentile of its TTL.
///
/// Handles returned by the store are `Arc<CachedCredential>`; a superseded
/// instance keeps answering [`expired`](Self::expired) correctly for whoever
/// still holds it.
pub struct CachedCredential {
    credentials: CredentialSet,
    expires_at: Instant,
    early_expiry: Duration,
    timer: Arc<ExpiryTimer>,
    closed: AtomicBool,
}

impl CachedCredential {
    /// Wrap `credentials` and arm the expiry timer. Must be called from
    /// within a tokio runtime.
    pub fn new(credentials: CredentialSet, expiration_percentile: u8) -> Self {
        let now = Instant::now();
        let ttl = Duration::from_secs(credentials.ttl);
        let early_expiry = early_expiry(credentials.ttl, expiration_percentile);

        let timer = Arc::new(ExpiryTimer {
            state: AtomicU8::new(ARMED),
            cancel: CancellationToken::new(),
        });
        spawn_timer(Arc::clone(&timer), deadline_after(now, early_expiry));

        Self {
            credentials,
            expires_at: deadline_after(now, ttl),
            early_expiry,
            timer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    /// True once the early-expiry timer fired or the credential was closed.
    /// Never reverts to false.
    pub fn expired(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.timer.fired()
    }

    /// Whole seconds until the issuer-side TTL lapses, floored at zero.
    pub fn remaining_ttl(&self) -> u64 {
        self.expires_in().as_secs()
    }

    /// Time until the issuer-side TTL lapses.
    pub fn expires_in(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Delay after creation at which the credential counts as expired.
    pub fn early_expiry(&self) -> Duration {
        self.early_expiry
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Force-expire the credential and stop its timer.
    ///
    /// Closing an instance whose timer already fired is fine. Closing the
    /// same instance twice is a contract violation and returns
    /// [`Error::AlreadyClosed`].
    pub fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            error!(username = %self.credentials.username, "cached credential closed twice");
            return Err(Error::AlreadyClosed);
        }
        if self.timer.disarm() {
            debug!(username = %self.credentials.username, "expiry timer canceled");
        }
        Ok(())
    }
}

impl Drop for CachedCredential {
    fn drop(&mut self) {
        // Nobody can observe this instance any more; stop the timer task.
        self.timer.cancel.cancel();
    }
}

impl std::fmt::Debug for CachedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCredential")
            .field("username", &self.credentials.username)
            .field("ttl", &self.credentials.ttl)
            .field("early_expiry", &self.early_expiry)
            .field("expired", &self.expired())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// `ttl * percentile / 100`, computed on durations so short TTLs do not
/// round down to zero.
pub fn early_expiry(ttl_secs: u64, expiration_percentile: u8) -> Duration {
    let percentile = u32::from(effective_percentile(expiration_percentile));
    Duration::from_secs(ttl_secs)
        .checked_mul(percentile)
        .map_or(Duration::from_secs(ttl_secs / 100 * u64::from(percentile)), |d| d / 100)
}

/// Roughly thirty years; stands in for deadlines that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or(now + FAR_FUTURE)
}

fn spawn_timer(timer: Arc<ExpiryTimer>, deadline: Instant) {
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancel.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => {
                timer.fire();
            }
        }
    });
}

#[cfg(test)]
#[path = "cached_tests.rs"]
mod tests;
