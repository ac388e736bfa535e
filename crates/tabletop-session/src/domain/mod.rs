//! Domain layer for the session context.

pub mod aggregates;
pub mod commands;
pub mod deltas;
pub mod events;
pub mod state;
