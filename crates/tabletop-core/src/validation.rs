//! Field-level validation helpers for aggregates.

use std::fmt::Display;

use regex::Regex;

use crate::error::DomainError;

/// Values that can be checked for presence.
pub trait Presence {
    /// Returns `true` when the value counts as missing.
    fn is_missing(&self) -> bool;
}

impl Presence for str {
    fn is_missing(&self) -> bool {
        self.is_empty()
    }
}

impl Presence for String {
    fn is_missing(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Presence + ?Sized> Presence for &T {
    fn is_missing(&self) -> bool {
        (**self).is_missing()
    }
}

impl<T: Presence> Presence for Option<T> {
    fn is_missing(&self) -> bool {
        self.as_ref().is_none_or(Presence::is_missing)
    }
}

impl Presence for uuid::Uuid {
    fn is_missing(&self) -> bool {
        self.is_nil()
    }
}

/// Fails when `value` is absent, nil or an empty string.
///
/// # Errors
///
/// Returns `DomainError::Validation` naming `aggregate` and `field`.
pub fn ensure_required<T: Presence + ?Sized>(
    value: &T,
    aggregate: &str,
    field: &str,
) -> Result<(), DomainError> {
    if value.is_missing() {
        return Err(DomainError::validation(aggregate, field, "is required"));
    }
    Ok(())
}

/// Fails when `value` lies outside `[min, max]`.
///
/// # Errors
///
/// Returns `DomainError::Validation` naming `aggregate` and `field`.
pub fn ensure_in_range<T: PartialOrd + Display>(
    value: T,
    min: T,
    max: T,
    aggregate: &str,
    field: &str,
) -> Result<(), DomainError> {
    if value < min || value > max {
        return Err(DomainError::validation(
            aggregate,
            field,
            format!("{value} is outside [{min}, {max}]"),
        ));
    }
    Ok(())
}

/// Fails when `value` does not match `pattern`.
///
/// # Errors
///
/// Returns `DomainError::Validation` naming `aggregate` and `field`, carrying
/// `message` when given.
pub fn ensure_pattern(
    value: &str,
    pattern: &Regex,
    aggregate: &str,
    field: &str,
    message: Option<&str>,
) -> Result<(), DomainError> {
    if !pattern.is_match(value) {
        let message = message.map_or_else(
            || format!("{value:?} does not match {}", pattern.as_str()),
            str::to_owned,
        );
        return Err(DomainError::validation(aggregate, field, message));
    }
    Ok(())
}
