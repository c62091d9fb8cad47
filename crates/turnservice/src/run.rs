// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level runner shared by `main` and integration tests.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::credential::fetch::HttpFetcher;
use crate::credential::store::CredentialStore;
use crate::credential::CredentialSet;

/// Build the HTTP fetcher and store, install the configured identity, and
/// subscribe a logging observer.
pub async fn open(config: &Config) -> anyhow::Result<Arc<CredentialStore>> {
    let fetcher = HttpFetcher::new(&config.uri, &config.transport_config())?;
    info!(endpoint = fetcher.endpoint(), "using TURN credential service");

    let store = CredentialStore::new(config.store_config(), Arc::new(fetcher));
    store
        .set_identity(config.access_token(), config.client_id.clone(), config.session.clone())
        .await?;

    store.subscribe(|cred, err| match (cred, err) {
        (Some(cred), _) => info!(
            username = %cred.credentials().username,
            servers = cred.credentials().servers.len(),
            expires_in_secs = cred.expires_in().as_secs(),
            "credentials refreshed"
        ),
        (None, Some(e)) => warn!(code = e.code(), err = %e, "credential refresh failed"),
        (None, None) => {}
    });

    Ok(store)
}

/// Fetch through the store and return the installed credential set.
pub async fn fetch_once(store: &CredentialStore) -> anyhow::Result<CredentialSet> {
    let cached = store
        .get_credentials(true)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no credentials returned"))?;
    Ok(cached.credentials().clone())
}

/// Keep credentials fresh in the background until `shutdown` fires, then shut
/// the store down.
pub async fn run_until(config: &Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let store = open(config).await?;
    store.set_auto_refresh(true).await?;
    info!(interval_secs = config.refresh_interval_secs, "auto-refresh enabled");

    shutdown.cancelled().await;
    store.shutdown().await?;
    Ok(())
}

/// Run the binary: print one credential set with `--once`, otherwise refresh
/// until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    if config.once {
        let store = open(&config).await?;
        let result = fetch_once(&store).await;
        store.shutdown().await?;
        println!("{}", serde_json::to_string_pretty(&result?)?);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(err = %e, "failed to listen for ctrl-c");
        }
        info!("interrupt received, shutting down");
        signal_token.cancel();
    });

    run_until(&config, shutdown).await
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
