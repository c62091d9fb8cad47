// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background refresh loop: one per store, ticking on a fixed interval and
//! woken early by auto-refresh requests.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::credential::store::CredentialStore;

/// Spawn the refresh loop for `store`.
///
/// Holds only a weak reference so dropping the last store handle ends the
/// loop on its next wake-up.
pub(crate) fn spawn_refresh_loop(
    store: Weak<CredentialStore>,
    refresh_rx: mpsc::Receiver<()>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        refresh_loop(store, refresh_rx, interval, shutdown).await;
    })
}

async fn refresh_loop(
    store: Weak<CredentialStore>,
    mut refresh_rx: mpsc::Receiver<()>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let interval = interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval_secs = interval.as_secs(), "credential refresh loop started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(()) = refresh_rx.recv() => {
                debug!("immediate refresh requested");
            }
            _ = ticker.tick() => {}
        }

        let Some(store) = store.upgrade() else {
            break;
        };
        if !store.auto_refresh().await {
            continue;
        }

        match store.get_credentials(true).await {
            Ok(Some(current)) => {
                debug!(remaining_secs = current.remaining_ttl(), "credentials fresh");
            }
            Ok(None) => {}
            Err(e) if e.is_contract_violation() => {
                debug!(code = e.code(), "store no longer usable");
                break;
            }
            // The store already logged and published this failure.
            Err(e) => debug!(code = e.code(), "scheduled credential refresh failed"),
        }
    }

    info!("credential refresh loop stopped");
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
