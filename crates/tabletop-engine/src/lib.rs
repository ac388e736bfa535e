//! Tabletop: session engine.
//!
//! Wires one session's aggregate, GM authority and state broadcaster into a
//! [`SessionRuntime`], and keeps every open runtime in a [`SessionHub`]
//! behind a session-level mutex.

pub mod config;
pub mod context;
pub mod hub;
pub mod runtime;
pub mod sink;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig};
pub use context::EngineContext;
pub use hub::SessionHub;
pub use runtime::SessionRuntime;
