//! Wiring for one signed-in account
//!
//! Builds the overlay, reconciler and coordinator over a shared store and
//! API, and hands out a presence tracker bound to the same backend.

use crate::api::{ConnectionApi, PresenceApi, SuggestionQuery};
use crate::config::Config;
use crate::coordinator::ConnectionCoordinator;
use crate::error::Result;
use crate::overlay::PendingOverlay;
use crate::presence::{LocationProvider, PresenceTracker};
use crate::reconcile::{AnnotatedSuggestion, Reconciler};
use crate::store::KeyValueStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Entry point for the sync layer
///
/// # Example
///
/// ```rust,no_run
/// use elohim_network_sync::{Config, NetworkSync};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sync = NetworkSync::from_config(Config::load("network-sync.toml")?)?;
///
/// // Load-time reconciliation
/// let pending = sync.load().await;
///
/// let outcome = sync.coordinator().send("user-42", Some("Hi!")).await?;
/// if let Some(request_id) = outcome.request_id {
///     sync.coordinator().cancel(&request_id).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct NetworkSync {
    config: Config,
    coordinator: ConnectionCoordinator,
    presence_api: Arc<dyn PresenceApi>,
}

impl NetworkSync {
    pub fn new(
        config: Config,
        connections: Arc<dyn ConnectionApi>,
        presence: Arc<dyn PresenceApi>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let overlay = PendingOverlay::new(store, config.store.scope.clone());
        let reconciler = Reconciler::new(
            Arc::clone(&connections),
            Arc::new(Mutex::new(overlay)),
            config.store.mapping_ttl(),
        );

        Self {
            coordinator: ConnectionCoordinator::new(connections, reconciler),
            presence_api: presence,
            config,
        }
    }

    /// HTTP backend with the JSON file store at `config.store.path`.
    #[cfg(feature = "client")]
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let http = Arc::new(crate::api::HttpApiClient::new(&config.api)?);
        let store = Arc::new(crate::store::FileStore::new(config.store.path.clone()));
        Ok(Self::new(config, http.clone(), http, store))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &ConnectionCoordinator {
        &self.coordinator
    }

    pub fn reconciler(&self) -> &Reconciler {
        self.coordinator.reconciler()
    }

    /// Reconcile with the server; call once after sign-in.
    pub async fn load(&self) -> BTreeSet<String> {
        self.reconciler().sync_pending_requests().await
    }

    pub async fn combined_pending(&self) -> BTreeSet<String> {
        self.coordinator.combined_pending().await
    }

    pub async fn suggestions(&self, query: &SuggestionQuery) -> Vec<AnnotatedSuggestion> {
        self.reconciler().annotate_suggestions(query).await
    }

    /// Drop this account's overlay, e.g. on sign-out.
    pub async fn reset(&self) -> Result<()> {
        self.reconciler().overlay().lock().await.reset().await
    }

    /// A tracker reporting through this account's presence endpoint.
    pub fn presence_tracker(&self, provider: Arc<dyn LocationProvider>) -> PresenceTracker {
        PresenceTracker::new(
            Arc::clone(&self.presence_api),
            provider,
            self.config.presence.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockConnectionApi, MockPresenceApi, PendingRequest};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_load_and_reset() {
        let api = Arc::new(MockConnectionApi::new().with_pending(vec![PendingRequest {
            id: "r1".into(),
            recipient_id: "u1".into(),
        }]));
        let sync = NetworkSync::new(
            Config::default(),
            api,
            Arc::new(MockPresenceApi::new()),
            Arc::new(MemoryStore::new()),
        );

        assert!(sync.load().await.contains("u1"));
        sync.reset().await.unwrap();
        assert!(sync.combined_pending().await.is_empty());
    }
}
