use serde::{Deserialize, Serialize};

/// Reachability of the remote backend as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Last probe reached the backend.
    Online,
    /// Backend unreachable, or not probed yet.
    #[default]
    Offline,
}

impl Connectivity {
    /// Maps a probe result.
    #[must_use]
    pub const fn from_reachable(reachable: bool) -> Self {
        if reachable { Self::Online } else { Self::Offline }
    }

    /// Returns true when the backend is reachable.
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A confirmed transition between reachable and unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Unreachable to reachable.
    BecameOnline,
    /// Reachable to unreachable.
    BecameOffline,
}

impl ConnectivityEvent {
    /// State after the transition.
    #[must_use]
    pub const fn connectivity(self) -> Connectivity {
        match self {
            Self::BecameOnline => Connectivity::Online,
            Self::BecameOffline => Connectivity::Offline,
        }
    }

    /// Event that moves the state from `from` to `to`, if they differ.
    #[must_use]
    pub const fn between(from: Connectivity, to: Connectivity) -> Option<Self> {
        match (from, to) {
            (Connectivity::Offline, Connectivity::Online) => Some(Self::BecameOnline),
            (Connectivity::Online, Connectivity::Offline) => Some(Self::BecameOffline),
            _ => None,
        }
    }
}
