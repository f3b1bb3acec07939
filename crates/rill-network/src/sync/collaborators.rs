//! Collaborator contracts the sync core depends on.
//!
//! Each trait is a narrow, object-safe seam (no associated types, no generic
//! methods) following the pattern in `rill_core::traits` — concrete adapters
//! are implemented by the node composition root, never by this crate.

use libp2p::PeerId;
use rill_core::types::Hash256;

use super::peer::{DisconnectReason, PeerState};

/// FIFO of hashes still to fetch, and the queue of downloaded-but-unimported
/// blocks. Implemented by the block-download pipeline, out of scope here.
pub trait BlockQueue: Send + Sync {
    /// True when there are no pending hashes left to walk.
    fn is_hashes_empty(&self) -> bool;
    /// True when the queue holds at least one already-validated backlog block.
    fn has_solid_blocks(&self) -> bool;
    /// Drop all pending hashes.
    fn clear_hash_store(&self);
    /// Push a hash to the front of the pending-hash queue.
    fn add_first_hash(&self, hash: Hash256);
    /// Record the hash the current walk is targeting.
    fn set_best_hash(&self, hash: Hash256);
}

/// Read-only view of the local chain, used for difficulty comparisons.
pub trait Blockchain: Send + Sync {
    /// Height of the local best block.
    fn best_block_number(&self) -> u64;
    /// Cumulative proof-of-work weight of the local chain.
    fn total_difficulty(&self) -> u128;
    /// Hash of the local best block.
    fn best_block_hash(&self) -> Hash256;
}

/// One per connected peer; bridges sync decisions to the actual wire session.
pub trait PeerHandle: Send + Sync {
    /// Stable identity of this peer.
    fn peer_id(&self) -> PeerId;
    /// Most recently reported total difficulty.
    fn total_difficulty(&self) -> u128;
    /// Most recently reported chain tip hash.
    fn best_hash(&self) -> Hash256;
    /// Total difficulty captured at handshake time (does not change afterward).
    fn handshake_total_difficulty(&self) -> u128;
    /// Number of hashes this peer has handed back while acting as master.
    fn hashes_loaded_cnt(&self) -> u64;
    /// Current substate predicates.
    fn is_idle(&self) -> bool;
    fn is_hash_retrieving(&self) -> bool;
    fn is_hash_retrieving_done(&self) -> bool;
    fn has_no_more_blocks(&self) -> bool;
    /// Drive this peer into a new substate.
    fn change_state(&self, state: PeerState);
    /// Cap the next hash-retrieval batch this peer may be asked for.
    fn set_max_hashes_ask(&self, max: u32);
    /// Tear down the connection with a reason.
    fn disconnect(&self, reason: DisconnectReason);
    /// Stop forwarding mempool transactions to/from this peer.
    fn prohibit_transactions(&self);
    /// Emit periodic sync progress stats for this peer (stats tick).
    fn log_sync_stats(&self);
}

/// A node reported by the discovery layer, with enough data to decide
/// whether it's worth connecting to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredNode {
    pub peer_id: PeerId,
    /// `None` if the node hasn't sent a status/handshake message yet.
    pub total_difficulty: Option<u128>,
    pub reputation: i64,
}

/// Ordering requested from [`NodeDiscovery::get_nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrdering {
    /// Primary query: candidates must clear a difficulty floor, ranked by
    /// difficulty descending.
    ByDifficultyDescending,
    /// Fallback query (used only when the pool is empty and the primary
    /// query returned nothing): no difficulty floor, ranked by reputation.
    ByReputationDescending,
}

/// Node discovery collaborator — subscription and on-demand candidate queries.
pub trait NodeDiscovery: Send + Sync {
    /// Return up to `limit` candidate nodes matching `ordering`.
    ///
    /// For [`NodeOrdering::ByDifficultyDescending`] the implementation filters
    /// to nodes with a status message and `total_difficulty > min_difficulty`;
    /// `min_difficulty` is ignored for [`NodeOrdering::ByReputationDescending`].
    fn get_nodes(
        &self,
        min_difficulty: u128,
        ordering: NodeOrdering,
        limit: usize,
    ) -> Vec<DiscoveredNode>;
}

/// Non-blocking connection initiator.
pub trait Transport: Send + Sync {
    /// Dispatch a connection attempt; must return without waiting for the
    /// handshake to complete.
    fn connect(&self, node: &DiscoveredNode);
}

/// Fired exactly once, the first time the manager reaches `DONE_SYNC`.
pub trait EventSink: Send + Sync {
    fn on_sync_done(&self);
}
