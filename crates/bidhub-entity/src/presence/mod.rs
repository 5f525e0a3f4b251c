//! Presence domain entities.

pub mod model;

pub use model::{Participant, UserPresence};

use serde::{Deserialize, Serialize};

/// Presence status for a participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Watching.
    #[default]
    Online,
    /// Actively bidding.
    Bidding,
    /// Connected but inactive.
    Away,
}

impl PresenceStatus {
    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Bidding => "bidding",
            Self::Away => "away",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
