//! Connection action coordinator
//!
//! Per-target lifecycle:
//!
//! ```text
//! NONE --send--> PENDING[session] --sync--> PENDING[confirmed] --accept|decline|cancel--> CLEARED
//!                       \_____________________cancel________________________________/
//! ```
//!
//! # At-least-once intent
//!
//! Sends and terminal actions are asymmetric:
//!
//! - `send` marks the target pending *before* calling the server and never
//!   rolls that back. A failed send leaves a possibly false "pending"
//!   indicator until a later send succeeds or the entry is cleared.
//! - `accept`, `decline` and `cancel` change local state only after the
//!   server confirms.

use crate::api::ConnectionApi;
use crate::error::{Result, SyncError};
use crate::reconcile::{Reconciler, SharedOverlay};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Operations that end a pending request's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalAction {
    Accept,
    Decline,
    Cancel,
}

impl fmt::Display for TerminalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// Local effect of a confirmed terminal action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    /// The request resolved to a target, which is no longer pending
    Cleared { target_id: String },
    /// No mapping for the request id; the overlay was resynced instead
    Unresolved,
}

/// Result of [`ConnectionCoordinator::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub target_id: String,
    /// Request id returned by the server, if the call succeeded and carried one
    pub request_id: Option<String>,
    /// Why the remote call failed; the target is still marked pending
    pub remote_error: Option<String>,
}

impl SendOutcome {
    pub fn delivered(&self) -> bool {
        self.remote_error.is_none()
    }
}

pub struct ConnectionCoordinator {
    api: Arc<dyn ConnectionApi>,
    overlay: SharedOverlay,
    reconciler: Reconciler,
}

impl ConnectionCoordinator {
    pub fn new(api: Arc<dyn ConnectionApi>, reconciler: Reconciler) -> Self {
        Self {
            api,
            overlay: reconciler.overlay().clone(),
            reconciler,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn combined_pending(&self) -> BTreeSet<String> {
        self.reconciler.combined_pending().await
    }

    /// Send a connection request.
    ///
    /// Only validation and local storage failures are returned as `Err`; a
    /// failed remote call is reported in [`SendOutcome::remote_error`].
    pub async fn send(&self, target_id: &str, message: Option<&str>) -> Result<SendOutcome> {
        let target_id = require_id(target_id, "target id")?;

        self.overlay.lock().await.add_session_pending(target_id).await?;

        match self.api.send_request(target_id, message).await {
            Ok(request_id) => {
                if let Some(ref request_id) = request_id {
                    self.overlay
                        .lock()
                        .await
                        .record_mapping(request_id, target_id)
                        .await?;
                }
                info!(target_id, request_id = ?request_id, "Connection request sent");
                Ok(SendOutcome {
                    target_id: target_id.to_string(),
                    request_id,
                    remote_error: None,
                })
            }
            Err(e) => {
                warn!(target_id, error = %e, "Connection request failed, keeping pending intent");
                Ok(SendOutcome {
                    target_id: target_id.to_string(),
                    request_id: None,
                    remote_error: Some(e.to_string()),
                })
            }
        }
    }

    pub async fn accept(&self, request_id: &str) -> Result<TerminalOutcome> {
        self.terminal(TerminalAction::Accept, request_id).await
    }

    pub async fn decline(&self, request_id: &str) -> Result<TerminalOutcome> {
        self.terminal(TerminalAction::Decline, request_id).await
    }

    pub async fn cancel(&self, request_id: &str) -> Result<TerminalOutcome> {
        self.terminal(TerminalAction::Cancel, request_id).await
    }

    /// Run a terminal action. Remote failures leave the overlay untouched.
    pub async fn terminal(&self, action: TerminalAction, request_id: &str) -> Result<TerminalOutcome> {
        let request_id = require_id(request_id, "request id")?;

        match action {
            TerminalAction::Accept => self.api.accept_request(request_id).await?,
            TerminalAction::Decline => self.api.decline_request(request_id).await?,
            TerminalAction::Cancel => self.api.cancel_request(request_id).await?,
        }

        let resolved = {
            let overlay = self.overlay.lock().await;
            match overlay.resolve_target(request_id).await {
                Some(target_id) => {
                    overlay.clear_target(&target_id).await?;
                    Some(target_id)
                }
                None => None,
            }
        };

        match resolved {
            Some(target_id) => {
                info!(%action, request_id, target_id = %target_id, "Pending request cleared");
                Ok(TerminalOutcome::Cleared { target_id })
            }
            None => {
                warn!(%action, request_id, "Request id has no known target, resyncing overlay");
                let pending = self.reconciler.sync_pending_requests().await;
                debug!(pending = pending.len(), "Resync after unresolved terminal action");
                Ok(TerminalOutcome::Unresolved)
            }
        }
    }
}

fn require_id<'a>(id: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(SyncError::Validation(format!("{} is required", what)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockConnectionApi, PendingRequest};
    use crate::overlay::PendingOverlay;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn setup(api: MockConnectionApi) -> (Arc<MockConnectionApi>, ConnectionCoordinator) {
        let api = Arc::new(api);
        let overlay = Arc::new(Mutex::new(PendingOverlay::new(Arc::new(MemoryStore::new()), "me")));
        let reconciler = Reconciler::new(api.clone(), overlay, Duration::from_secs(3600));
        (api.clone(), ConnectionCoordinator::new(api, reconciler))
    }

    #[tokio::test]
    async fn test_send_marks_pending_and_maps_request() {
        let (api, coordinator) = setup(MockConnectionApi::new());

        let outcome = coordinator.send("u1", Some("hello")).await.unwrap();
        assert!(outcome.delivered());
        assert_eq!(outcome.request_id.as_deref(), Some("req-1"));
        assert_eq!(api.send_calls(), 1);

        assert!(coordinator.combined_pending().await.contains("u1"));
        let overlay = coordinator.reconciler().overlay().lock().await;
        assert_eq!(overlay.resolve_target("req-1").await.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_send_failure_keeps_intent() {
        let (api, coordinator) = setup(MockConnectionApi::new());
        api.set_fail_send(true);

        let outcome = coordinator.send("u1", None).await.unwrap();
        assert!(!outcome.delivered());
        assert!(outcome.remote_error.is_some());
        assert!(coordinator.combined_pending().await.contains("u1"));
    }

    #[tokio::test]
    async fn test_validation_fails_before_network() {
        let (api, coordinator) = setup(MockConnectionApi::new());

        assert!(matches!(coordinator.send("  ", None).await, Err(SyncError::Validation(_))));
        assert!(matches!(coordinator.accept("").await, Err(SyncError::Validation(_))));
        assert_eq!(api.send_calls(), 0);
        assert_eq!(api.terminal_calls(), 0);
        assert!(coordinator.combined_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_sync_clears_session_entry() {
        let (_, coordinator) = setup(MockConnectionApi::new());
        let outcome = coordinator.send("u1", None).await.unwrap();
        let request_id = outcome.request_id.unwrap();

        let result = coordinator.cancel(&request_id).await.unwrap();
        assert_eq!(result, TerminalOutcome::Cleared { target_id: "u1".into() });
        assert!(coordinator.combined_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_overlay() {
        let (api, coordinator) = setup(MockConnectionApi::new());
        coordinator.send("u1", None).await.unwrap();
        api.set_fail_terminal(true);

        assert!(coordinator.decline("req-1").await.is_err());
        assert!(coordinator.combined_pending().await.contains("u1"));
    }

    #[tokio::test]
    async fn test_send_without_request_id_is_mapped_by_next_sync() {
        let (_, coordinator) = setup(
            MockConnectionApi::new()
                .with_send_returns_id(false)
                .with_send_visible(true),
        );

        let outcome = coordinator.send("u1", None).await.unwrap();
        assert!(outcome.delivered());
        assert_eq!(outcome.request_id, None);
        assert_eq!(coordinator.reconciler().overlay().lock().await.mapping_count().await, 0);

        coordinator.reconciler().sync_pending_requests().await;
        let result = coordinator.cancel("req-1").await.unwrap();
        assert_eq!(result, TerminalOutcome::Cleared { target_id: "u1".into() });
        assert!(coordinator.combined_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_request_triggers_resync() {
        let (api, coordinator) = setup(
            MockConnectionApi::new().with_pending(vec![PendingRequest {
                id: "r9".into(),
                recipient_id: "u9".into(),
            }]),
        );

        let outcome = coordinator.accept("unknown").await.unwrap();
        assert_eq!(outcome, TerminalOutcome::Unresolved);
        assert_eq!(api.list_calls(), 1);
        assert!(coordinator.combined_pending().await.contains("u9"));
    }
}
