//! Remote relationship and presence APIs
//!
//! Two trait seams so the sync layer can run against the real backend
//! ([`HttpApiClient`]) or an in-process mock ([`MockConnectionApi`],
//! [`MockPresenceApi`]).

#[cfg(feature = "client")]
mod http;
pub mod mock;
pub mod types;

#[cfg(feature = "client")]
pub use http::HttpApiClient;
pub use mock::{MockConnectionApi, MockPresenceApi};
pub use types::{
    ConnectionStatus, LocationUpdate, PendingRequest, Suggestion, SuggestionQuery,
};

use crate::error::Result;
use async_trait::async_trait;

/// Relationship endpoints consumed by the overlay.
#[async_trait]
pub trait ConnectionApi: Send + Sync {
    /// `POST /connections/requests`, returns the new request id if the server sent one
    async fn send_request(&self, target_id: &str, message: Option<&str>) -> Result<Option<String>>;

    /// `GET /connections/requests?status=pending&direction=outgoing`
    async fn list_outgoing_pending(&self) -> Result<Vec<PendingRequest>>;

    /// `POST /connections/accept`
    async fn accept_request(&self, request_id: &str) -> Result<()>;

    /// `POST /connections/requests/{id}/decline`
    async fn decline_request(&self, request_id: &str) -> Result<()>;

    /// `DELETE /connections/requests/{id}`
    async fn cancel_request(&self, request_id: &str) -> Result<()>;

    /// `GET /network/suggestions`
    async fn suggestions(&self, query: &SuggestionQuery) -> Result<Vec<Suggestion>>;
}

/// Presence endpoint consumed by the tracker.
#[async_trait]
pub trait PresenceApi: Send + Sync {
    /// `PUT /presence/location`
    async fn update_location(&self, update: &LocationUpdate) -> Result<()>;
}
