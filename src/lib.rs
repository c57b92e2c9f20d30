//! Elohim Network Sync - client-side social graph state
//!
//! Keeps the client's view of pending connection requests consistent with the
//! server, and reports the user's presence without flooding the backend.
//!
//! # Architecture
//!
//! - **Overlay** ([`PendingOverlay`]): session-asserted and server-confirmed
//!   pending targets plus a request-id → target-id mapping, persisted in an
//!   injected [`KeyValueStore`]
//! - **Reconciler** ([`Reconciler`]): replaces the server-confirmed side from
//!   the authoritative list and exposes the union of both sides
//! - **Coordinator** ([`ConnectionCoordinator`]): send/accept/decline/cancel
//!   with optimistic sends and confirmed-only clearing
//! - **Presence** ([`PresenceTracker`]): distance- and timer-throttled
//!   location reports
//!
//! # Example
//!
//! ```rust,ignore
//! use elohim_network_sync::{Config, NetworkSync, SuggestionQuery};
//!
//! let sync = NetworkSync::from_config(Config::load("network-sync.toml")?)?;
//! sync.load().await;
//!
//! sync.coordinator().send("user-42", Some("Met you at the meetup")).await?;
//!
//! for candidate in sync.suggestions(&SuggestionQuery::new().with_limit(20)).await {
//!     println!("{} {}", candidate.suggestion.id, candidate.display_status.as_str());
//! }
//!
//! let tracker = sync.presence_tracker(location_provider);
//! if !tracker.start().await.success {
//!     // tracking stays off until the next start()
//! }
//! ```

// Remote relationship + presence APIs
pub mod api;

// Configuration
pub mod config;

// Connection actions
pub mod coordinator;

// Error types
pub mod error;

// Account wiring
pub mod network;

// Pending overlay
pub mod overlay;

// Location reporting
pub mod presence;

// Overlay reconciliation
pub mod reconcile;

// Durable key/value stores
pub mod store;

// Re-export API types
#[cfg(feature = "client")]
pub use api::HttpApiClient;
pub use api::{
    ConnectionApi, ConnectionStatus, LocationUpdate, MockConnectionApi, MockPresenceApi,
    PendingRequest, PresenceApi, Suggestion, SuggestionQuery,
};

// Re-export config types
pub use config::{ApiConfig, Config, PresenceConfig, StoreConfig};

// Re-export sync types
pub use coordinator::{ConnectionCoordinator, SendOutcome, TerminalAction, TerminalOutcome};
pub use network::NetworkSync;
pub use overlay::{MappingEntry, PendingOrigin, PendingOverlay};
pub use reconcile::{annotate, AnnotatedSuggestion, Reconciler, SharedOverlay};

// Re-export presence types
pub use presence::{
    haversine_meters, LocationProvider, MockLocationProvider, PermissionStatus, PresenceSample,
    PresenceThrottle, PresenceTracker, StartResult,
};

// Re-export store types
#[cfg(feature = "native")]
pub use store::SqliteStore;
pub use store::{FileStore, KeyValueStore, MemoryStore};

// Re-export error types
pub use error::{Result, SyncError};
