//! Persistent pending-connection overlay
//!
//! Two independent target collections plus a request-id mapping, all kept in
//! an injected [`KeyValueStore`] under a per-account scope:
//!
//! - session: targets this client sent a request to
//! - server-confirmed: the last authoritative pending snapshot
//! - request targets: backend request id → target id
//!
//! Consumers read the union of the two collections ([`PendingOverlay::combined_pending`]).
//! This type holds no policy; when to replace, clear or prune is decided by
//! the reconciler and the coordinator.
//!
//! Plain reads never fail: a missing key, a store error or a value of the
//! wrong shape all read as empty. Read-modify-write operations propagate
//! store errors instead, so a failed read is never written back over the
//! stored collections. A value of the wrong shape is still replaced.

use crate::error::Result;
use crate::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Which side asserted a pending target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingOrigin {
    /// Sent from this client, possibly not yet visible on the server
    Session,
    /// Present in the last authoritative snapshot
    ServerConfirmed,
}

/// A stored request-id mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub target_id: String,
    /// Unix millis when the mapping was last written
    pub recorded_at: u64,
}

pub struct PendingOverlay {
    store: Arc<dyn KeyValueStore>,
    scope: String,
}

impl PendingOverlay {
    pub fn new(store: Arc<dyn KeyValueStore>, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:pending:{}", self.scope, suffix)
    }

    fn origin_key(&self, origin: PendingOrigin) -> String {
        match origin {
            PendingOrigin::Session => self.key("session"),
            PendingOrigin::ServerConfirmed => self.key("confirmed"),
        }
    }

    fn mapping_key(&self) -> String {
        self.key("request-targets")
    }

    // ==================== Target collections ====================

    /// Idempotent insert into the session collection.
    pub async fn add_session_pending(&self, target_id: &str) -> Result<()> {
        let mut targets = self.try_read_targets(PendingOrigin::Session).await?;
        if targets.insert(target_id.to_string()) {
            self.write_targets(PendingOrigin::Session, &targets).await?;
        }
        Ok(())
    }

    /// Replace the server-confirmed collection with a fresh snapshot.
    ///
    /// Not a merge: targets absent from `target_ids` are dropped.
    pub async fn replace_server_confirmed<I, S>(&self, target_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets: BTreeSet<String> = target_ids.into_iter().map(Into::into).collect();
        self.write_targets(PendingOrigin::ServerConfirmed, &targets).await
    }

    /// Union of the session and server-confirmed collections.
    pub async fn combined_pending(&self) -> BTreeSet<String> {
        let mut combined = self.read_targets(PendingOrigin::Session).await;
        combined.extend(self.read_targets(PendingOrigin::ServerConfirmed).await);
        combined
    }

    pub async fn session_pending(&self) -> BTreeSet<String> {
        self.read_targets(PendingOrigin::Session).await
    }

    pub async fn server_confirmed(&self) -> BTreeSet<String> {
        self.read_targets(PendingOrigin::ServerConfirmed).await
    }

    pub async fn is_pending(&self, target_id: &str) -> bool {
        self.combined_pending().await.contains(target_id)
    }

    /// Origins currently asserting `target_id`
    pub async fn origins(&self, target_id: &str) -> Vec<PendingOrigin> {
        let mut origins = Vec::new();
        for origin in [PendingOrigin::Session, PendingOrigin::ServerConfirmed] {
            if self.read_targets(origin).await.contains(target_id) {
                origins.push(origin);
            }
        }
        origins
    }

    /// Remove `target_id` from both collections and evict every mapping
    /// that points at it.
    pub async fn clear_target(&self, target_id: &str) -> Result<()> {
        for origin in [PendingOrigin::Session, PendingOrigin::ServerConfirmed] {
            let mut targets = self.try_read_targets(origin).await?;
            if targets.remove(target_id) {
                self.write_targets(origin, &targets).await?;
            }
        }

        let mut mappings = self.try_read_mappings().await?;
        let before = mappings.len();
        mappings.retain(|_, entry| entry.target_id != target_id);
        if mappings.len() != before {
            self.write_mappings(&mappings).await?;
        }
        Ok(())
    }

    // ==================== Request-id mapping ====================

    pub async fn record_mapping(&self, request_id: &str, target_id: &str) -> Result<()> {
        self.record_mapping_at(request_id, target_id, now_millis()).await
    }

    /// Record several mappings with one write.
    pub async fn record_mappings<'a, I>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let now = now_millis();
        let mut mappings = self.try_read_mappings().await?;
        for (request_id, target_id) in pairs {
            mappings.insert(
                request_id.to_string(),
                MappingEntry {
                    target_id: target_id.to_string(),
                    recorded_at: now,
                },
            );
        }
        self.write_mappings(&mappings).await
    }

    pub(crate) async fn record_mapping_at(
        &self,
        request_id: &str,
        target_id: &str,
        recorded_at: u64,
    ) -> Result<()> {
        let mut mappings = self.try_read_mappings().await?;
        mappings.insert(
            request_id.to_string(),
            MappingEntry {
                target_id: target_id.to_string(),
                recorded_at,
            },
        );
        self.write_mappings(&mappings).await
    }

    pub async fn resolve_target(&self, request_id: &str) -> Option<String> {
        self.read_mappings()
            .await
            .remove(request_id)
            .map(|entry| entry.target_id)
    }

    pub async fn mapping_count(&self) -> usize {
        self.read_mappings().await.len()
    }

    /// Drop mappings not refreshed within `ttl`. Returns how many were removed.
    pub async fn prune_mappings(&self, ttl: Duration) -> Result<usize> {
        let cutoff = now_millis().saturating_sub(ttl.as_millis() as u64);
        self.prune_mappings_before(cutoff).await
    }

    pub(crate) async fn prune_mappings_before(&self, cutoff_millis: u64) -> Result<usize> {
        let mut mappings = self.try_read_mappings().await?;
        let before = mappings.len();
        mappings.retain(|_, entry| entry.recorded_at >= cutoff_millis);
        let removed = before - mappings.len();
        if removed > 0 {
            self.write_mappings(&mappings).await?;
            tracing::debug!(scope = %self.scope, removed, "Pruned expired request mappings");
        }
        Ok(removed)
    }

    /// Forget everything stored for this scope.
    pub async fn reset(&self) -> Result<()> {
        self.store.remove(&self.origin_key(PendingOrigin::Session)).await?;
        self.store.remove(&self.origin_key(PendingOrigin::ServerConfirmed)).await?;
        self.store.remove(&self.mapping_key()).await?;
        Ok(())
    }

    // ==================== Storage ====================

    async fn read_targets(&self, origin: PendingOrigin) -> BTreeSet<String> {
        self.try_read_targets(origin).await.unwrap_or_else(|e| {
            tracing::warn!(key = %self.origin_key(origin), error = %e, "Pending collection unreadable, reading as empty");
            BTreeSet::new()
        })
    }

    /// Store errors propagate; a corrupt value reads as empty.
    async fn try_read_targets(&self, origin: PendingOrigin) -> Result<BTreeSet<String>> {
        let key = self.origin_key(origin);
        match self.store.get(&key).await? {
            Some(value) => match serde_json::from_value::<Vec<String>>(value) {
                Ok(targets) => Ok(targets.into_iter().collect()),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Corrupt pending collection, reading as empty");
                    Ok(BTreeSet::new())
                }
            },
            None => Ok(BTreeSet::new()),
        }
    }

    async fn write_targets(&self, origin: PendingOrigin, targets: &BTreeSet<String>) -> Result<()> {
        let value = serde_json::to_value(targets)?;
        self.store.set(&self.origin_key(origin), value).await
    }

    async fn read_mappings(&self) -> HashMap<String, MappingEntry> {
        self.try_read_mappings().await.unwrap_or_else(|e| {
            tracing::warn!(key = %self.mapping_key(), error = %e, "Request mapping unreadable, reading as empty");
            HashMap::new()
        })
    }

    async fn try_read_mappings(&self) -> Result<HashMap<String, MappingEntry>> {
        let key = self.mapping_key();
        match self.store.get(&key).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(mappings) => Ok(mappings),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Corrupt request mapping, reading as empty");
                    Ok(HashMap::new())
                }
            },
            None => Ok(HashMap::new()),
        }
    }

    async fn write_mappings(&self, mappings: &HashMap<String, MappingEntry>) -> Result<()> {
        let value = serde_json::to_value(mappings)?;
        self.store.set(&self.mapping_key(), value).await
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
