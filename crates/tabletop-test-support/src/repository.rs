//! Test repositories: mock `EventRepository` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tabletop_core::error::DomainError;
use tabletop_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

/// An event repository that returns a fixed history from `load_events` and
/// records every `append_events` call.
#[derive(Debug, Default)]
pub struct RecordingEventRepository {
    history: Vec<StoredEvent>,
    appended: Mutex<Vec<(Uuid, i64, Vec<StoredEvent>)>>,
}

impl RecordingEventRepository {
    /// Creates a recording repository whose `load_events` returns `history`.
    #[must_use]
    pub fn new(history: Vec<StoredEvent>) -> Self {
        Self {
            history,
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all `(aggregate_id, expected_version, events)`
    /// appends.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(Uuid, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }

    /// Returns every appended event, flattened in append order.
    pub fn all_appended(&self) -> Vec<StoredEvent> {
        self.appended_events()
            .into_iter()
            .flat_map(|(_, _, events)| events)
            .collect()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.history.clone())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }
}

/// An event repository that always returns an empty event list and silently
/// accepts appends. Useful for "aggregate not found" scenarios and for
/// sessions whose persistence is irrelevant to the test.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
