//! GM connection status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the session's GM can currently receive actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GmConnectionState {
    /// The GM is connected and receives actions directly.
    Connected,
    /// The GM is gone; actions are queued.
    Disconnected,
    /// The transport is re-establishing the GM's connection; actions are
    /// still queued.
    Reconnecting,
}

impl fmt::Display for GmConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Time-stamped connection state of one session's GM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmConnectionStatus {
    /// Current state.
    pub state: GmConnectionState,
    /// When the state last changed.
    pub changed_at: DateTime<Utc>,
    /// Actions queued since the GM last connected.
    pub queued_action_count: usize,
}

impl GmConnectionStatus {
    /// A status that has not observed any connection yet.
    #[must_use]
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            state: GmConnectionState::Disconnected,
            changed_at: now,
            queued_action_count: 0,
        }
    }

    /// Returns `true` if actions can be forwarded to the GM.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == GmConnectionState::Connected
    }
}
