//! Aggregate root abstraction.
//!
//! An aggregate owns an [`AggregateCore`] holding its version counter, the
//! buffer of events not yet handed to persistence, and a synchronous observer
//! list keyed by event type. Concrete aggregates implement [`AggregateRoot::apply`]
//! and [`AggregateRoot::validate_invariants`]; the provided methods take care of
//! counting, buffering and notification.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::error::DomainError;
use crate::event::DomainEvent;

/// Callback invoked after an event of a subscribed type is applied.
pub type EventObserver<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Version counter, uncommitted buffer and observers shared by every aggregate.
pub struct AggregateCore<E> {
    version: i64,
    uncommitted_events: Vec<E>,
    observers: HashMap<&'static str, Vec<EventObserver<E>>>,
}

impl<E: DomainEvent> AggregateCore<E> {
    /// Creates an empty core at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: 0,
            uncommitted_events: Vec::new(),
            observers: HashMap::new(),
        }
    }

    /// Returns the number of events ever applied.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Registers an observer for events of `event_type`.
    pub fn subscribe<F>(&mut self, event_type: &'static str, observer: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.observers
            .entry(event_type)
            .or_default()
            .push(Box::new(observer));
    }

    fn notify(&self, event: &E) {
        if let Some(observers) = self.observers.get(event.event_type()) {
            for observer in observers {
                observer(event);
            }
        }
    }

    fn record(&mut self, event: E) {
        self.version += 1;
        self.notify(&event);
        self.uncommitted_events.push(event);
    }
}

impl<E: DomainEvent> Default for AggregateCore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for AggregateCore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateCore")
            .field("version", &self.version)
            .field("uncommitted_events", &self.uncommitted_events.len())
            .field("observed_event_types", &self.observers.len())
            .finish()
    }
}

/// Trait for event-sourced aggregate roots.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the aggregate type name used in validation errors.
    fn aggregate_type(&self) -> &'static str;

    /// Returns the shared version/buffer/observer core.
    fn core(&self) -> &AggregateCore<Self::Event>;

    /// Returns the shared core mutably.
    fn core_mut(&mut self) -> &mut AggregateCore<Self::Event>;

    /// Mutates internal state for one event. Must leave state untouched when
    /// it returns an error.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` if the event cannot be applied to the current
    /// state.
    fn apply(&mut self, event: &Self::Event) -> Result<(), DomainError>;

    /// Checks cross-field business rules after a batch of events.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` naming the first broken rule.
    fn validate_invariants(&self) -> Result<(), DomainError>;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64 {
        self.core().version()
    }

    /// Returns the sequence number the next event must carry.
    fn next_sequence_number(&self) -> i64 {
        self.version() + 1
    }

    /// Applies a new event: runs [`AggregateRoot::apply`], then counts,
    /// buffers and publishes it. A rejected event is neither counted nor
    /// buffered.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `apply`.
    fn apply_event(&mut self, event: Self::Event) -> Result<(), DomainError> {
        self.apply(&event)?;
        self.core_mut().record(event);
        Ok(())
    }

    /// Re-applies a historical event during reconstitution. Counts the event
    /// but does not buffer or publish it.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `apply`.
    fn replay(&mut self, event: &Self::Event) -> Result<(), DomainError> {
        self.apply(event)?;
        self.core_mut().version += 1;
        Ok(())
    }

    /// Returns events applied since the last commit.
    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.core().uncommitted_events
    }

    /// Clears uncommitted events after persistence.
    fn mark_events_as_committed(&mut self) {
        self.core_mut().uncommitted_events.clear();
    }
}
