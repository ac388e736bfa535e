//! Tabletop: state broadcaster.
//!
//! Decides who receives which session update, filters full snapshots per
//! recipient, and batches outbound messages so that bursts of deltas reach
//! clients as a few merged messages.

pub mod broadcaster;
pub mod config;
pub mod filter;
pub mod merge;
pub mod message;

pub use broadcaster::StateBroadcaster;
pub use config::BroadcasterConfig;
pub use message::{BroadcastKind, BroadcastTarget, OutboundMessage, QueuedBroadcast};
