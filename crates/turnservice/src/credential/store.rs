// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential store: serves the cached credential, fetches when asked to,
//! and publishes every fetch outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credential::cached::CachedCredential;
use crate::credential::fetch::Fetcher;
use crate::credential::notify::{NotificationHub, SubscriptionId};
use crate::credential::{effective_percentile, CredentialSet, Identity};
use crate::error::Error;

/// Default interval between background refresh checks.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Construction-time settings for [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Share of the TTL after which a cached credential expires (0 = 80).
    pub expiration_percentile: u8,
    /// Tick of the background refresh loop.
    pub refresh_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { expiration_percentile: 0, refresh_interval: DEFAULT_REFRESH_INTERVAL }
    }
}

/// Mutable state guarded by the store lock.
#[derive(Default)]
struct StoreState {
    identity: Identity,
    current: Option<Arc<CachedCredential>>,
    last_error: Option<Error>,
    auto_refresh: bool,
    shut_down: bool,
}

/// Single authority for the current TURN credential.
///
/// Cache hits take the read lock only. Fetches are serialized by a separate
/// gate so the network call never runs under the state lock, and staleness is
/// re-checked once the gate is held: concurrent callers that all find the
/// cache empty trigger one fetch between them.
pub struct CredentialStore {
    state: RwLock<StoreState>,
    fetch_gate: Mutex<()>,
    fetcher: Arc<dyn Fetcher>,
    expiration_percentile: u8,
    hub: NotificationHub,
    refresh_tx: mpsc::Sender<()>,
    shutdown: CancellationToken,
}

impl CredentialStore {
    /// Create a store and spawn its background refresh loop. Must be called
    /// from within a tokio runtime.
    pub fn new(config: StoreConfig, fetcher: Arc<dyn Fetcher>) -> Arc<Self> {
        // Depth one: a pending refresh request absorbs any further ones.
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        let store = Arc::new(Self {
            state: RwLock::new(StoreState::default()),
            fetch_gate: Mutex::new(()),
            fetcher,
            expiration_percentile: effective_percentile(config.expiration_percentile),
            hub: NotificationHub::new(),
            refresh_tx,
            shutdown: shutdown.clone(),
        });

        crate::credential::refresh::spawn_refresh_loop(
            Arc::downgrade(&store),
            refresh_rx,
            config.refresh_interval,
            shutdown,
        );

        store
    }

    pub fn expiration_percentile(&self) -> u8 {
        self.expiration_percentile
    }

    /// Replace the identity used for subsequent fetches. The cached
    /// credential, if any, stays valid.
    pub async fn set_identity(
        &self,
        access_token: impl Into<String>,
        client_id: impl Into<String>,
        session: impl Into<String>,
    ) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.shut_down {
            return Err(Error::Shutdown);
        }
        state.identity = Identity::new(access_token, client_id, session);
        debug!(client_id = %state.identity.client_id, "identity updated");
        Ok(())
    }

    /// Snapshot of the identity that the next fetch will present.
    pub async fn identity(&self) -> Identity {
        self.state.read().await.identity.clone()
    }

    /// Return the current credential, fetching a new one if `fetch` is set
    /// and nothing usable is cached.
    ///
    /// Without `fetch` this never touches the network and never hands out an
    /// expired credential. A failed fetch is returned here, recorded as the
    /// last error, and published to observers.
    pub async fn get_credentials(
        &self,
        fetch: bool,
    ) -> Result<Option<Arc<CachedCredential>>, Error> {
        {
            let state = self.state.read().await;
            if state.shut_down {
                return Err(Error::Shutdown);
            }
            if let Some(current) = usable(&state.current) {
                return Ok(Some(current));
            }
            if !fetch {
                return Ok(None);
            }
        }

        let _gate = self.fetch_gate.lock().await;

        // Another caller may have refreshed while we waited for the gate.
        let identity = {
            let state = self.state.read().await;
            if state.shut_down {
                return Err(Error::Shutdown);
            }
            if let Some(current) = usable(&state.current) {
                return Ok(Some(current));
            }
            state.identity.clone()
        };

        let result = self.fetch_with(&identity).await;

        let mut state = self.state.write().await;
        if state.shut_down {
            debug!("discarding fetch result that arrived after shutdown");
            return Err(Error::Shutdown);
        }

        match result {
            Ok(set) => {
                // A concurrent set_identity wins over the session rotation.
                if state.identity == identity {
                    state.identity.session = set.session.clone().unwrap_or_default();
                } else {
                    debug!("identity changed during fetch, keeping new session");
                }
                let cached = Arc::new(CachedCredential::new(set, self.expiration_percentile));
                state.current = Some(Arc::clone(&cached));
                state.last_error = None;
                drop(state);

                info!(
                    username = %cached.credentials().username,
                    ttl = cached.credentials().ttl,
                    early_expiry_secs = cached.early_expiry().as_secs(),
                    "TURN credentials installed"
                );
                self.hub.publish(Some(Arc::clone(&cached)), None);
                Ok(Some(cached))
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                drop(state);

                warn!(code = e.code(), err = %e, "TURN credential fetch failed");
                self.hub.publish(None, Some(e.clone()));
                Err(e)
            }
        }
    }

    /// Fetch with the current identity, bypassing the cache. Nothing is
    /// installed, recorded, or published.
    pub async fn fetch_credentials(&self) -> Result<CredentialSet, Error> {
        let identity = {
            let state = self.state.read().await;
            if state.shut_down {
                return Err(Error::Shutdown);
            }
            state.identity.clone()
        };
        self.fetch_with(&identity).await
    }

    async fn fetch_with(&self, identity: &Identity) -> Result<CredentialSet, Error> {
        if !identity.is_configured() {
            return Err(Error::Configuration);
        }
        self.fetcher.fetch(identity).await
    }

    /// Most recent fetch error; cleared by the next successful fetch.
    pub async fn last_error(&self) -> Option<Error> {
        self.state.read().await.last_error.clone()
    }

    pub async fn auto_refresh(&self) -> bool {
        self.state.read().await.auto_refresh
    }

    /// Enable or disable refreshing on each background tick. Switching it on
    /// also requests an immediate refresh, unless one is already pending.
    pub async fn set_auto_refresh(&self, enabled: bool) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.shut_down {
            return Err(Error::Shutdown);
        }
        if state.auto_refresh == enabled {
            return Ok(());
        }
        state.auto_refresh = enabled;
        if enabled && self.refresh_tx.try_send(()).is_err() {
            debug!("refresh already pending, request coalesced");
        }
        Ok(())
    }

    /// Register an observer for completed fetch attempts.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Option<Arc<CachedCredential>>, Option<Error>) + Send + Sync + 'static,
    {
        self.hub.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Stop the refresh loop, force-expire the current credential, and
    /// forget the identity. Every later call fails with [`Error::Shutdown`].
    pub async fn shutdown(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.shut_down {
            warn!("credential store shut down twice");
            return Err(Error::Shutdown);
        }
        state.shut_down = true;
        self.shutdown.cancel();

        if let Some(current) = state.current.take() {
            // The caller may already have closed its handle.
            if let Err(e) = current.close() {
                debug!(err = %e, "current credential was already closed");
            }
        }
        state.identity = Identity::default();
        info!("credential store shut down");
        Ok(())
    }

    pub async fn is_shut_down(&self) -> bool {
        self.state.read().await.shut_down
    }
}

fn usable(current: &Option<Arc<CachedCredential>>) -> Option<Arc<CachedCredential>> {
    current.as_ref().filter(|c| !c.expired()).map(Arc::clone)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
