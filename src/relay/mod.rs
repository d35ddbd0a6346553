//! Relay core: identity aliasing, access control, rate limiting, reply
//! correlation and the router that ties them together.

pub mod access;
mod broadcast;
pub mod commands;
pub mod correlation;
mod directed;
pub mod gate;
pub mod identity;
pub mod notices;
pub mod rate_limit;
pub mod router;
pub mod session;
pub mod types;

pub use router::{RelayRouter, RelayState, RelayStats};
