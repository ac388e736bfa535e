//! State integrity utilities: canonical hashing and version arithmetic.
//!
//! Hashes are SHA-256 digests over the canonical JSON form of a snapshot, in
//! which every object's keys are sorted recursively. Two snapshots with the
//! same content therefore hash identically regardless of field insertion
//! order. Nothing in this module logs; callers decide how to report a
//! mismatch (see [`StateSummary`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::DomainError;

/// Lowercase hex SHA-256 digest of a canonical state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateHash(String);

impl StateHash {
    /// Wraps an already-computed hex digest, e.g. one reported by a client.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short diagnostic description of a snapshot (counts of its major
/// sub-collections), logged by callers when hashes diverge.
pub trait StateSummary {
    /// Returns a one-line summary.
    fn summary(&self) -> String;
}

/// Recursively sorts object keys. Arrays keep their order; scalars pass
/// through.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = Map::new();
            for (key, child) in entries {
                sorted.insert(key, canonicalize(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        scalar => scalar,
    }
}

/// Computes the canonical hash of a state snapshot.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the state cannot be represented as
/// JSON (for example a map keyed by a non-string type).
pub fn hash_state<T: Serialize + ?Sized>(state: &T) -> Result<StateHash, DomainError> {
    let value =
        serde_json::to_value(state).map_err(|e| DomainError::Serialization(e.to_string()))?;
    let canonical = serde_json::to_string(&canonicalize(value))
        .map_err(|e| DomainError::Serialization(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(StateHash(hex::encode(hasher.finalize())))
}

/// Recomputes the hash of `state` and compares it with `expected`.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the state cannot be hashed.
pub fn validate_state<T: Serialize + ?Sized>(
    state: &T,
    expected: &StateHash,
) -> Result<bool, DomainError> {
    Ok(hash_state(state)? == *expected)
}

fn parse_version(version: Option<&str>) -> u64 {
    version
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Returns the version following `current`. Absent or non-numeric input is
/// treated as `0`.
#[must_use]
pub fn next_version(current: Option<&str>) -> String {
    parse_version(current).saturating_add(1).to_string()
}

/// Optimistic-lock precondition: `true` only when the caller's base version
/// equals the version the server is currently at.
#[must_use]
pub fn is_valid_next_version(server_version: Option<&str>, incoming_version: &str) -> bool {
    parse_version(server_version) == parse_version(Some(incoming_version))
}
