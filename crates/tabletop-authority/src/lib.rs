//! Tabletop: GM authority and action queue.
//!
//! Tracks whether a session's Game Master is connected and holds player
//! actions that need GM resolution while no GM is there to receive them.
//! Connection transitions are reported by the transport layer; this crate
//! only records and reacts to them.

pub mod authority;
pub mod queue;
pub mod status;
