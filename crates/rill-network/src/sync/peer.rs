//! Per-peer substate and disconnect reasons for the sync core.

use std::fmt;

/// Per-peer substate driven by [`super::manager::SyncManager`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    /// Not currently assigned any sync work.
    Idle,
    /// Walking the peer's chain backward to enumerate hashes.
    HashRetrieving,
    /// Fetching block bodies for already-enumerated hashes.
    BlockRetrieving,
    /// This peer's hash enumeration has finished (only meaningful while it
    /// was the master).
    DoneHashes,
    /// Terminal substate once the whole pool has reached `DONE_SYNC`.
    DoneSync,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerState::Idle => "IDLE",
            PeerState::HashRetrieving => "HASH_RETRIEVING",
            PeerState::BlockRetrieving => "BLOCK_RETRIEVING",
            PeerState::DoneHashes => "DONE_HASHES",
            PeerState::DoneSync => "DONE_SYNC",
        };
        f.write_str(s)
    }
}

/// Reason code passed to a peer handler's `disconnect`.
///
/// Kept as a small closed enum rather than a free-form string so policy
/// decisions (which reasons imply a ban) stay exhaustive-matchable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer stalled as master and made no hash-retrieval progress past
    /// `MASTER_STUCK_TIME_THRESHOLD`.
    UselessPeer,
    /// The peer misbehaved at the protocol level; reason is collaborator-supplied.
    ProtocolViolation(String),
    /// Too many disconnects from this peer in a short span.
    Banned,
    /// Local shutdown, not a fault of the peer.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::UselessPeer => write!(f, "useless peer"),
            DisconnectReason::ProtocolViolation(reason) => write!(f, "protocol violation: {reason}"),
            DisconnectReason::Banned => write!(f, "banned"),
            DisconnectReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_state_display_matches_spec_names() {
        assert_eq!(PeerState::Idle.to_string(), "IDLE");
        assert_eq!(PeerState::HashRetrieving.to_string(), "HASH_RETRIEVING");
        assert_eq!(PeerState::BlockRetrieving.to_string(), "BLOCK_RETRIEVING");
        assert_eq!(PeerState::DoneHashes.to_string(), "DONE_HASHES");
        assert_eq!(PeerState::DoneSync.to_string(), "DONE_SYNC");
    }

    #[test]
    fn disconnect_reason_display() {
        assert_eq!(DisconnectReason::UselessPeer.to_string(), "useless peer");
        assert_eq!(DisconnectReason::Banned.to_string(), "banned");
    }
}
