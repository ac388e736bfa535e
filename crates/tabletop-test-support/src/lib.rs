//! Shared test mocks and utilities for the tabletop session engine.

mod clock;
mod directory;
mod repository;
mod transport;

pub use clock::FixedClock;
pub use directory::StaticCampaignDirectory;
pub use repository::{EmptyEventRepository, FailingEventRepository, RecordingEventRepository};
pub use transport::{Delivery, RecordingTransport};
