//! Connection bookkeeping: in-flight connect attempts, bans, and disconnect
//! hit counters.
//!
//! Guarded by a single "registry mutex", distinct from the manager lock that
//! serializes `changeState`/`addPeer` — see SPEC_FULL.md §5A.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use libp2p::PeerId;
use parking_lot::Mutex;
use tracing::debug;

/// A pending `connect` is abandoned after this long without an `addPeer`.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);
/// A ban lasts this long before the peer may be reconsidered.
pub const BAN_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Ban fires once `disconnectHits` exceeds this count (i.e. on the 6th hit).
pub const DISCONNECT_HITS_THRESHOLD: u32 = 5;

#[derive(Default)]
struct RegistryInner {
    connect_attempts: HashMap<PeerId, Instant>,
    bans: HashMap<PeerId, Instant>,
    disconnect_hits: HashMap<PeerId, u32>,
}

/// Tracks the three timestamped peerId-keyed sets from §3.
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(RegistryInner::default()) }
    }

    /// True if `peer_id` is currently banned (ban not yet released).
    pub fn is_banned(&self, peer_id: &PeerId) -> bool {
        self.inner.lock().bans.contains_key(peer_id)
    }

    /// True if a `connect` for `peer_id` is already outstanding.
    pub fn has_attempt(&self, peer_id: &PeerId) -> bool {
        self.inner.lock().connect_attempts.contains_key(peer_id)
    }

    /// Record a new outstanding connect attempt, stamped `now`.
    pub fn record_attempt(&self, peer_id: PeerId) {
        self.inner.lock().connect_attempts.insert(peer_id, Instant::now());
    }

    /// Clear any outstanding attempt for `peer_id` (e.g. on successful `addPeer`).
    pub fn clear_attempt(&self, peer_id: &PeerId) {
        self.inner.lock().connect_attempts.remove(peer_id);
    }

    /// Record a disconnect for `peer_id`. Returns `true` if this disconnect
    /// caused the peer to be banned (counter strictly exceeded the threshold).
    pub fn record_disconnect(&self, peer_id: PeerId) -> bool {
        let mut inner = self.inner.lock();
        let hits = inner.disconnect_hits.entry(peer_id).or_insert(0);
        *hits += 1;
        if *hits > DISCONNECT_HITS_THRESHOLD {
            inner.disconnect_hits.remove(&peer_id);
            inner.bans.insert(peer_id, Instant::now());
            debug!(%peer_id, "registry: disconnect threshold exceeded, peer banned");
            true
        } else {
            false
        }
    }

    /// Directly ban `peer_id` (used by the maintenance loop's master-stuck path).
    pub fn ban(&self, peer_id: PeerId) {
        let mut inner = self.inner.lock();
        inner.disconnect_hits.remove(&peer_id);
        inner.bans.insert(peer_id, Instant::now());
    }

    /// Delete `connectAttempts` entries older than [`CONNECTION_TIMEOUT`].
    /// Returns the peer ids whose attempts were reclaimed.
    pub fn remove_outdated_connections(&self) -> Vec<PeerId> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let stale: Vec<PeerId> = inner
            .connect_attempts
            .iter()
            .filter(|(_, ts)| now.duration_since(**ts) > CONNECTION_TIMEOUT)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            inner.connect_attempts.remove(id);
        }
        stale
    }

    /// Delete `bans` entries older than [`BAN_TIMEOUT`]. Returns released ids.
    pub fn release_bans(&self) -> Vec<PeerId> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let expired: Vec<PeerId> = inner
            .bans
            .iter()
            .filter(|(_, ts)| now.duration_since(**ts) > BAN_TIMEOUT)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            inner.bans.remove(id);
        }
        expired
    }

    /// All peer ids currently tracked as an outstanding attempt or a ban
    /// (used by `askNewPeers` to build `inUse` together with the pool).
    pub fn attempts_and_bans(&self) -> std::collections::HashSet<PeerId> {
        let inner = self.inner.lock();
        inner
            .connect_attempts
            .keys()
            .chain(inner.bans.keys())
            .copied()
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
