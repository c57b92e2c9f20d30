//! Reconciliation of the pending overlay against the server
//!
//! Merge law: the server-confirmed collection is *replaced* by each
//! authoritative snapshot, then *unioned* with the session collection. A
//! just-sent request that the server does not list yet stays visible through
//! its session entry; a request that vanished server-side (the other party
//! answered it) drops out even though this client never cleared it.
//!
//! Read paths never fail. When the server is unreachable the last persisted
//! view is returned.

use crate::api::{ConnectionApi, ConnectionStatus, Suggestion, SuggestionQuery};
use crate::overlay::PendingOverlay;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Overlay shared between the reconciler and the coordinator.
///
/// The mutex serializes read-modify-write sequences; it is never held
/// across a network call.
pub type SharedOverlay = Arc<Mutex<PendingOverlay>>;

/// A candidate with the status this client displays for it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedSuggestion {
    #[serde(flatten)]
    pub suggestion: Suggestion,
    pub display_status: ConnectionStatus,
}

pub struct Reconciler {
    api: Arc<dyn ConnectionApi>,
    overlay: SharedOverlay,
    mapping_ttl: Duration,
}

impl Reconciler {
    pub fn new(api: Arc<dyn ConnectionApi>, overlay: SharedOverlay, mapping_ttl: Duration) -> Self {
        Self {
            api,
            overlay,
            mapping_ttl,
        }
    }

    pub fn overlay(&self) -> &SharedOverlay {
        &self.overlay
    }

    /// Current combined view without contacting the server
    pub async fn combined_pending(&self) -> BTreeSet<String> {
        self.overlay.lock().await.combined_pending().await
    }

    /// Refresh the server-confirmed collection and return the combined view.
    pub async fn sync_pending_requests(&self) -> BTreeSet<String> {
        let requests = match self.api.list_outgoing_pending().await {
            Ok(requests) => requests,
            Err(e) => {
                warn!(error = %e, "Pending request sync failed, using persisted overlay");
                return self.combined_pending().await;
            }
        };

        let overlay = self.overlay.lock().await;

        let pairs = requests
            .iter()
            .map(|r| (r.id.as_str(), r.recipient_id.as_str()));
        if let Err(e) = overlay.record_mappings(pairs).await {
            warn!(error = %e, "Failed to persist request mappings");
        }

        let targets = requests.iter().map(|r| r.recipient_id.clone());
        if let Err(e) = overlay.replace_server_confirmed(targets).await {
            warn!(error = %e, "Failed to persist server-confirmed pending targets");
        }

        if let Err(e) = overlay.prune_mappings(self.mapping_ttl).await {
            warn!(error = %e, "Failed to prune request mappings");
        }

        let combined = overlay.combined_pending().await;
        debug!(
            server = requests.len(),
            combined = combined.len(),
            "Pending requests synced"
        );
        combined
    }

    /// Fetch candidates and mark the ones with an outstanding request.
    ///
    /// Returns an empty list when the candidates cannot be fetched.
    pub async fn annotate_suggestions(&self, query: &SuggestionQuery) -> Vec<AnnotatedSuggestion> {
        let candidates = match self.api.suggestions(query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Failed to fetch suggestions");
                return Vec::new();
            }
        };

        let pending = self.combined_pending().await;
        annotate(candidates, &pending)
    }
}

/// Derive display statuses. The candidates' own `status` is left untouched.
pub fn annotate(candidates: Vec<Suggestion>, pending: &BTreeSet<String>) -> Vec<AnnotatedSuggestion> {
    candidates
        .into_iter()
        .map(|suggestion| {
            let display_status = if pending.contains(&suggestion.id) {
                ConnectionStatus::Pending
            } else {
                suggestion.status.clone()
            };
            AnnotatedSuggestion {
                suggestion,
                display_status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockConnectionApi, PendingRequest};
    use crate::store::MemoryStore;

    const TTL: Duration = Duration::from_secs(3600);

    fn setup(api: MockConnectionApi) -> (Arc<MockConnectionApi>, Reconciler) {
        let api = Arc::new(api);
        let overlay = PendingOverlay::new(Arc::new(MemoryStore::new()), "me");
        let reconciler = Reconciler::new(api.clone(), Arc::new(Mutex::new(overlay)), TTL);
        (api, reconciler)
    }

    fn request(id: &str, recipient: &str) -> PendingRequest {
        PendingRequest {
            id: id.into(),
            recipient_id: recipient.into(),
        }
    }

    #[tokio::test]
    async fn test_sync_records_mappings_and_confirmed() {
        let (_, reconciler) = setup(
            MockConnectionApi::new().with_pending(vec![request("r1", "u1"), request("r2", "u2")]),
        );

        let pending = reconciler.sync_pending_requests().await;
        assert_eq!(pending.len(), 2);

        let overlay = reconciler.overlay().lock().await;
        assert_eq!(overlay.resolve_target("r2").await.as_deref(), Some("u2"));
        assert!(overlay.session_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_replaces_but_keeps_session() {
        let (api, reconciler) = setup(MockConnectionApi::new().with_pending(vec![request("r1", "u1")]));
        reconciler.sync_pending_requests().await;

        reconciler.overlay().lock().await.add_session_pending("u5").await.unwrap();
        api.set_pending(vec![]);

        let pending = reconciler.sync_pending_requests().await;
        assert_eq!(pending.into_iter().collect::<Vec<_>>(), vec!["u5".to_string()]);
    }

    #[tokio::test]
    async fn test_sync_failure_falls_back_to_persisted() {
        let (api, reconciler) = setup(MockConnectionApi::new().with_pending(vec![request("r1", "u1")]));
        reconciler.sync_pending_requests().await;

        api.set_fail_list(true);
        api.set_pending(vec![]);
        let pending = reconciler.sync_pending_requests().await;
        assert!(pending.contains("u1"));
        assert_eq!(api.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_annotate_marks_pending_without_touching_status() {
        let mut connected = Suggestion::new("u3");
        connected.status = ConnectionStatus::Connected;

        let (_, reconciler) = setup(MockConnectionApi::new().with_suggestions(vec![
            Suggestion::new("u1"),
            Suggestion::new("u2"),
            connected,
        ]));
        reconciler.overlay().lock().await.add_session_pending("u2").await.unwrap();

        let annotated = reconciler.annotate_suggestions(&SuggestionQuery::new()).await;
        assert_eq!(annotated.len(), 3);
        assert_eq!(annotated[0].display_status, ConnectionStatus::None);
        assert_eq!(annotated[1].display_status, ConnectionStatus::Pending);
        assert_eq!(annotated[1].suggestion.status, ConnectionStatus::None);
        assert_eq!(annotated[2].display_status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_numeric_ids_match_pending_targets() {
        let candidates =
            crate::api::types::parse_suggestions(&serde_json::json!([{"id": 42}, {"id": 7}])).unwrap();
        let (api, reconciler) = setup(
            MockConnectionApi::new()
                .with_pending(vec![request("1", "42")])
                .with_suggestions(candidates),
        );
        reconciler.sync_pending_requests().await;

        let annotated = reconciler.annotate_suggestions(&SuggestionQuery::new()).await;
        assert_eq!(api.suggestion_calls(), 1);
        assert_eq!(annotated[0].suggestion.id, "42");
        assert_eq!(annotated[0].display_status, ConnectionStatus::Pending);
        assert_eq!(annotated[1].display_status, ConnectionStatus::None);
    }

    #[tokio::test]
    async fn test_annotate_failure_is_empty() {
        let (api, reconciler) = setup(MockConnectionApi::new().with_suggestions(vec![Suggestion::new("u1")]));
        api.set_fail_suggestions(true);
        assert!(reconciler.annotate_suggestions(&SuggestionQuery::new()).await.is_empty());
    }

    #[test]
    fn test_annotated_serialization_flattens() {
        let pending: BTreeSet<String> = ["u1".to_string()].into_iter().collect();
        let annotated = annotate(vec![Suggestion::new("u1")], &pending);
        let json = serde_json::to_value(&annotated[0]).unwrap();
        assert_eq!(json["id"], "u1");
        assert_eq!(json["displayStatus"], "PENDING");
        assert_eq!(json["connectionStatus"], "NONE");
    }
}
