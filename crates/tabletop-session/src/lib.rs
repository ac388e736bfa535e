//! Tabletop: session aggregate.
//!
//! Owns the authoritative `CompleteSessionState` of one game session and
//! applies every change to it as a validated domain event: map and encounter
//! deltas, inventory changes, player actions and their results, and runtime
//! flags.

pub mod application;
pub mod domain;
