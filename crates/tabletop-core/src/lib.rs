//! Tabletop Core: shared domain abstractions.
//!
//! This crate defines the fundamental traits and types that the session,
//! authority and broadcast crates depend on: aggregates and events, the error
//! taxonomy, state integrity hashing, and the seams to external collaborators
//! (event persistence, campaign membership, transport). It contains no
//! infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod integrity;
pub mod membership;
pub mod repository;
pub mod transport;
pub mod validation;
