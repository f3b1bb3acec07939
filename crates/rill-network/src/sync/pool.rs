//! The active peer pool.
//!
//! Snapshot-on-write: maintenance takes a short read lock to clone the
//! current membership into a `Vec`, then iterates the clone lock-free so a
//! long maintenance pass never blocks an event thread adding or removing a
//! peer (§5).

use std::collections::HashMap;
use std::sync::Arc;

use libp2p::PeerId;
use parking_lot::RwLock;

use super::collaborators::PeerHandle;
use super::peer::PeerState;

/// Holds active peers and supports bulk/filtered substate transitions.
#[derive(Default)]
pub struct PeerPool {
    peers: RwLock<HashMap<PeerId, Arc<dyn PeerHandle>>>,
}

impl PeerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, peer: Arc<dyn PeerHandle>) {
        self.peers.write().insert(peer.peer_id(), peer);
    }

    pub fn remove(&self, peer_id: &PeerId) -> Option<Arc<dyn PeerHandle>> {
        self.peers.write().remove(peer_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<Arc<dyn PeerHandle>> {
        self.peers.read().get(peer_id).cloned()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.read().contains_key(peer_id)
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn peer_ids(&self) -> std::collections::HashSet<PeerId> {
        self.peers.read().keys().copied().collect()
    }

    /// Clone the current membership out from under the lock for iteration.
    pub fn snapshot(&self) -> Vec<Arc<dyn PeerHandle>> {
        self.peers.read().values().cloned().collect()
    }

    /// The peer with the greatest reported total difficulty, or `None` if
    /// the pool is empty. Ties are broken arbitrarily (first encountered).
    pub fn max_by_total_difficulty(&self) -> Option<Arc<dyn PeerHandle>> {
        self.snapshot()
            .into_iter()
            .max_by_key(|p| p.total_difficulty())
    }

    /// Transition every peer in the pool to `state`.
    pub fn transition_all(&self, state: PeerState) {
        for peer in self.snapshot() {
            peer.change_state(state);
        }
    }

    /// Transition every peer matching `predicate` to `state`.
    pub fn transition_where(&self, state: PeerState, predicate: impl Fn(&dyn PeerHandle) -> bool) {
        for peer in self.snapshot() {
            if predicate(peer.as_ref()) {
                peer.change_state(state);
            }
        }
    }
}
