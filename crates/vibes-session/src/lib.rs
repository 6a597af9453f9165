//! # Vibes Session
//!
//! Everything that happens between joining a room and leaving it.
//!
//! This crate provides:
//! - The roster of remote participants and their validated metadata
//! - The room client abstraction and an in-memory room
//! - Proximity voice: subscribe within the radius, scale volume by distance
//! - Music parties: join at most one host's music regardless of distance
//! - Shared retry backoff for subscriptions
//! - Moderation handling and host-facing notices
//! - [`SpatialSession`], the facade tying them to one audio graph
//!
//! ## Driving a session
//!
//! The host calls [`SpatialSession::update`] once per frame with the elapsed
//! time. Retries and gesture expiry advance only there, so dropping the
//! session cancels every timer with it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod events;
pub mod party;
pub mod proximity;
pub mod retry;
pub mod roster;
pub mod session;
pub mod signaling;

#[cfg(test)]
mod e2e_tests;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::events::*;
    pub use crate::party::*;
    pub use crate::proximity::*;
    pub use crate::retry::*;
    pub use crate::roster::*;
    pub use crate::session::*;
    pub use crate::signaling::*;
}

pub use prelude::*;
