// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out of "credentials changed" notifications to registered observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::credential::cached::CachedCredential;
use crate::error::Error;

/// Observer invoked once per completed fetch attempt.
pub type CredentialHandler =
    Arc<dyn Fn(Option<Arc<CachedCredential>>, Option<Error>) + Send + Sync + 'static>;

/// Handle returned by [`NotificationHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registered observers. Each publish runs every observer on its own task so
/// a slow or panicking observer holds up nobody else.
pub struct NotificationHub {
    handlers: RwLock<Vec<(SubscriptionId, CredentialHandler)>>,
    next_id: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self { handlers: RwLock::new(Vec::new()), next_id: AtomicU64::new(1) }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Option<Arc<CachedCredential>>, Option<Error>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Dispatch to every observer without waiting for any of them.
    pub fn publish(&self, credential: Option<Arc<CachedCredential>>, error: Option<Error>) {
        let handlers: Vec<CredentialHandler> =
            self.handlers.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in handlers {
            let credential = credential.clone();
            let error = error.clone();
            tokio::spawn(async move {
                handler(credential, error);
            });
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
