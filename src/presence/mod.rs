//! Presence tracking
//!
//! Reports the user's location to the presence endpoint while suppressing
//! redundant reports: a sample is only sent when it is at least the
//! configured distance (100 m by default) from the last reported one, or
//! when the periodic interval (5 minutes by default) has elapsed. A timer
//! forces a report every interval even without movement.

mod geo;
mod location;
mod throttle;
mod tracker;

pub use geo::{haversine_meters, PresenceSample, EARTH_RADIUS_M};
pub use location::{LocationProvider, MockLocationProvider, PermissionStatus};
pub use throttle::PresenceThrottle;
pub use tracker::{PresenceTracker, StartResult};
