//! Global sync state machine, master-peer selection, maintenance loop, and
//! event intake (§4).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use libp2p::PeerId;
use parking_lot::Mutex;
use rill_core::types::Hash256;
use tracing::{debug, info, info_span, warn};

use super::collaborators::{
    BlockQueue, Blockchain, DiscoveredNode, EventSink, NodeDiscovery, NodeOrdering, PeerHandle,
    Transport,
};
use super::config::SyncConfig;
use super::error::SyncError;
use super::peer::{DisconnectReason, PeerState};
use super::pool::PeerPool;
use super::registry::ConnectionRegistry;
use super::watermark::Watermarks;

/// A peer stalled as master this long without progress gets disconnected.
pub const MASTER_STUCK_TIME_THRESHOLD: Duration = Duration::from_secs(60);
/// Gaps larger than this trigger full `GAP_RECOVERY`; smaller ones are
/// absorbed by pushing the parent hash to the front of the hash store.
pub const LARGE_GAP_THRESHOLD: u64 = 5;
/// Maintenance tick period (fixed-delay, not fixed-rate — §9).
pub const SYNC_TICK: Duration = Duration::from_secs(3);
/// Stats tick period.
pub const STATS_TICK: Duration = Duration::from_secs(30);

/// Global synchronization state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Init,
    HashRetrieving,
    GapRecovery,
    BlockRetrieving,
    DoneGapRecovery,
    DoneSync,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Init => "INIT",
            SyncState::HashRetrieving => "HASH_RETRIEVING",
            SyncState::GapRecovery => "GAP_RECOVERY",
            SyncState::BlockRetrieving => "BLOCK_RETRIEVING",
            SyncState::DoneGapRecovery => "DONE_GAP_RECOVERY",
            SyncState::DoneSync => "DONE_SYNC",
        };
        f.write_str(s)
    }
}

/// Whether a block reported to `recoverGap`/`notifyNewBlockImported` is
/// already-queued backlog or a freshly gossiped block (glossary: "solid").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
    Solid,
    Fresh,
}

/// The block that triggered a gap-detection event (§4.3 `recoverGap`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapWrapper {
    pub number: u64,
    pub hash: Hash256,
    pub parent_hash: Hash256,
    pub origin: BlockOrigin,
}

struct SyncManagerInner {
    state: SyncState,
    prev_state: SyncState,
    master: Option<PeerId>,
    last_hashes_loaded_cnt: u64,
    master_stuck_at: Option<Instant>,
    max_hashes_ask: u32,
    best_hash: Hash256,
    on_sync_done_triggered: bool,
}

impl Default for SyncManagerInner {
    fn default() -> Self {
        Self {
            state: SyncState::Init,
            prev_state: SyncState::Init,
            master: None,
            last_hashes_loaded_cnt: 0,
            master_stuck_at: None,
            max_hashes_ask: 0,
            best_hash: Hash256::ZERO,
            on_sync_done_triggered: false,
        }
    }
}

/// Coordinates peer admission, master-peer selection, and the global sync
/// state machine. See SPEC_FULL.md §4–§6 for the full contract.
pub struct SyncManager {
    inner: Mutex<SyncManagerInner>,
    pool: Arc<PeerPool>,
    registry: Arc<ConnectionRegistry>,
    watermarks: Arc<Watermarks>,
    blockchain: Arc<dyn Blockchain>,
    block_queue: Arc<dyn BlockQueue>,
    discovery: Arc<dyn NodeDiscovery>,
    transport: Arc<dyn Transport>,
    event_sink: Arc<dyn EventSink>,
    config: SyncConfig,
    running: AtomicBool,
}

impl SyncManager {
    pub fn new(
        config: SyncConfig,
        blockchain: Arc<dyn Blockchain>,
        block_queue: Arc<dyn BlockQueue>,
        discovery: Arc<dyn NodeDiscovery>,
        transport: Arc<dyn Transport>,
        event_sink: Arc<dyn EventSink>,
    ) -> Result<Arc<Self>, SyncError> {
        if config.sync_peer_count == 0 {
            return Err(SyncError::InvalidConfig("sync_peer_count must be > 0".into()));
        }

        Ok(Arc::new(Self {
            inner: Mutex::new(SyncManagerInner::default()),
            pool: Arc::new(PeerPool::new()),
            registry: Arc::new(ConnectionRegistry::new()),
            watermarks: Arc::new(Watermarks::new()),
            blockchain,
            block_queue,
            discovery,
            transport,
            event_sink,
            config,
            running: AtomicBool::new(false),
        }))
    }

    /// Current global state.
    pub fn state(&self) -> SyncState {
        self.inner.lock().state
    }

    /// Current master, if any.
    pub fn master(&self) -> Option<PeerId> {
        self.inner.lock().master
    }

    pub fn pool(&self) -> &Arc<PeerPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn watermarks(&self) -> &Arc<Watermarks> {
        &self.watermarks
    }

    /// Create a [`super::discovery::DiscoverySubscriber`] sharing this
    /// manager's registry and watermarks (§4.5).
    pub fn discovery_subscriber(&self) -> super::discovery::DiscoverySubscriber {
        super::discovery::DiscoverySubscriber::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.watermarks),
            Arc::clone(&self.transport),
        )
    }

    /// Start the maintenance (3s) and stats (30s) background workers.
    ///
    /// A no-op when `config.is_sync_enabled` is `false`.
    pub fn spawn(self: &Arc<Self>) {
        if !self.config.is_sync_enabled {
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let maintenance = Arc::clone(self);
        tokio::spawn(async move {
            let _span = info_span!("sync_manager_maintenance").entered();
            while maintenance.running.load(Ordering::SeqCst) {
                maintenance.run_maintenance_tick();
                tokio::time::sleep(SYNC_TICK).await;
            }
        });

        let stats = Arc::clone(self);
        tokio::spawn(async move {
            while stats.running.load(Ordering::SeqCst) {
                stats.log_sync_stats();
                tokio::time::sleep(STATS_TICK).await;
            }
        });
    }

    /// Stop both background workers. In-flight event-intake calls made after
    /// this observe the same `running` flag and keep behaving normally —
    /// only the periodic loops stop.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run one maintenance pass. Exposed directly so tests can drive the
    /// seven steps deterministically without waiting on real time.
    pub fn run_maintenance_tick(&self) {
        self.update_watermarks();
        self.check_gap_recovery();
        self.check_master();
        self.check_peers();
        for peer_id in self.registry.remove_outdated_connections() {
            debug!(%peer_id, "sync: reclaimed stale connection attempt");
        }
        self.ask_new_peers();
        for peer_id in self.registry.release_bans() {
            debug!(%peer_id, "sync: ban expired");
        }
    }

    fn log_sync_stats(&self) {
        for peer in self.pool.snapshot() {
            peer.log_sync_stats();
        }
    }

    // -- maintenance steps (§4.1) --------------------------------------

    fn update_watermarks(&self) {
        let total_difficulty = self.blockchain.total_difficulty();
        self.watermarks.raise_lower_useful(total_difficulty);
        self.watermarks.raise_highest_known(total_difficulty);
    }

    fn check_gap_recovery(&self) {
        let (state, prev_state, master) = {
            let inner = self.inner.lock();
            (inner.state, inner.prev_state, inner.master)
        };
        if state != SyncState::GapRecovery {
            return;
        }
        let master_still_retrieving = master
            .and_then(|id| self.pool.get(&id))
            .map(|p| p.is_hash_retrieving())
            .unwrap_or(false);
        if master_still_retrieving {
            return;
        }
        if !self.block_queue.is_hashes_empty() {
            return;
        }
        let target = if prev_state == SyncState::BlockRetrieving {
            SyncState::BlockRetrieving
        } else {
            SyncState::DoneGapRecovery
        };
        self.change_state(target);
    }

    fn check_master(&self) {
        let (state, master_id) = {
            let inner = self.inner.lock();
            (inner.state, inner.master)
        };
        let Some(master_id) = master_id else { return };
        let Some(master) = self.pool.get(&master_id) else { return };

        if state == SyncState::HashRetrieving && master.is_hash_retrieving_done() {
            self.change_state(SyncState::BlockRetrieving);
        } else if state == SyncState::GapRecovery && master.is_hash_retrieving_done() {
            master.change_state(PeerState::BlockRetrieving);
        }

        if !master.is_hash_retrieving() {
            return;
        }

        let mut inner = self.inner.lock();
        let loaded = master.hashes_loaded_cnt();
        if loaded > inner.last_hashes_loaded_cnt {
            inner.last_hashes_loaded_cnt = loaded;
            inner.master_stuck_at = None;
            return;
        }

        let now = Instant::now();
        let stuck_since = *inner.master_stuck_at.get_or_insert(now);
        if now.duration_since(stuck_since) > MASTER_STUCK_TIME_THRESHOLD {
            drop(inner);
            warn!(%master_id, "sync: master stuck, disconnecting and banning");
            master.disconnect(DisconnectReason::UselessPeer);
            self.registry.ban(master_id);
        }
    }

    fn check_peers(&self) {
        for peer in self.pool.snapshot() {
            if peer.has_no_more_blocks() {
                peer.change_state(PeerState::Idle);
                self.watermarks.raise_lower_useful(peer.handshake_total_difficulty());
            }
        }

        let (state, master) = {
            let inner = self.inner.lock();
            (inner.state, inner.master)
        };

        if matches!(state, SyncState::HashRetrieving | SyncState::GapRecovery) {
            if let Some(master_id) = master {
                if !self.pool.contains(&master_id) {
                    info!(%master_id, state = %state, "sync: master lost from pool, re-electing");
                    self.change_state(state);
                }
            }
        }

        if matches!(state, SyncState::BlockRetrieving | SyncState::DoneSync | SyncState::DoneGapRecovery)
            && !self.block_queue.is_hashes_empty()
        {
            self.pool.transition_where(PeerState::BlockRetrieving, |p| p.is_idle());
        }
    }

    fn ask_new_peers(&self) {
        let lack = self.config.sync_peer_count as i64 - self.pool.len() as i64;
        if lack <= 0 {
            return;
        }
        let lack = lack as usize;

        let mut in_use = self.pool.peer_ids();
        in_use.extend(self.registry.attempts_and_bans());

        let lower_useful = self.watermarks.lower_useful_difficulty();
        let mut candidates: Vec<DiscoveredNode> = self
            .discovery
            .get_nodes(lower_useful, NodeOrdering::ByDifficultyDescending, lack)
            .into_iter()
            .filter(|n| !in_use.contains(&n.peer_id))
            .collect();

        if self.pool.is_empty() && candidates.is_empty() {
            candidates = self
                .discovery
                .get_nodes(0, NodeOrdering::ByReputationDescending, lack)
                .into_iter()
                .filter(|n| !in_use.contains(&n.peer_id))
                .collect();
        }

        for node in &candidates {
            self.initiate_connection(node);
        }
    }

    // -- global state machine (§4.2) -----------------------------------

    /// The single chokepoint for global state transitions (the "manager lock"
    /// serializes this against `add_peer`).
    pub fn change_state(&self, new_state: SyncState) {
        let mut fire_sync_done = false;
        {
            let mut inner = self.inner.lock();
            match new_state {
                SyncState::HashRetrieving => {
                    let Some(master) = self.pool.max_by_total_difficulty() else { return };
                    self.watermarks.raise_highest_known(master.total_difficulty());
                    inner.best_hash = master.best_hash();
                    self.block_queue.clear_hash_store();
                    self.pool.transition_all(PeerState::Idle);
                    inner.max_hashes_ask = self.config.max_hashes_ask;
                    inner.master = Some(master.peer_id());
                    Self::hash_retrieving_on_master(&self.block_queue, &mut *inner, master.as_ref());
                }
                SyncState::GapRecovery => {
                    let Some(master) = self.pool.max_by_total_difficulty() else { return };
                    inner.master = Some(master.peer_id());
                    Self::hash_retrieving_on_master(&self.block_queue, &mut *inner, master.as_ref());
                }
                SyncState::BlockRetrieving => {
                    self.pool.transition_all(PeerState::BlockRetrieving);
                }
                SyncState::DoneGapRecovery => {
                    self.pool.transition_all(PeerState::BlockRetrieving);
                }
                SyncState::DoneSync => {
                    if inner.on_sync_done_triggered {
                        return;
                    }
                    inner.on_sync_done_triggered = true;
                    self.pool.transition_all(PeerState::DoneSync);
                    fire_sync_done = true;
                }
                SyncState::Init => {}
            }

            if new_state != inner.state {
                debug!(old = %inner.state, new = %new_state, "sync: state transition");
                inner.prev_state = inner.state;
                inner.state = new_state;
            }
        }

        if fire_sync_done {
            info!("sync: reached DONE_SYNC");
            self.event_sink.on_sync_done();
        }
    }

    /// Reset master-progress tracking and point the master at `best_hash`.
    ///
    /// Called from both the `HASH_RETRIEVING` and `GAP_RECOVERY` arms of
    /// `change_state` so the reset logic exists exactly once (§9 open
    /// question 1).
    fn hash_retrieving_on_master(
        block_queue: &Arc<dyn BlockQueue>,
        inner: &mut SyncManagerInner,
        master: &dyn PeerHandle,
    ) {
        inner.last_hashes_loaded_cnt = 0;
        inner.master_stuck_at = None;
        block_queue.set_best_hash(inner.best_hash);
        master.set_max_hashes_ask(inner.max_hashes_ask);
        master.change_state(PeerState::HashRetrieving);
    }

    // -- event intake (§4.3) -------------------------------------------

    /// A peer completed its handshake and should be admitted (or rejected).
    pub fn add_peer(&self, peer: Arc<dyn PeerHandle>) {
        if !self.config.is_sync_enabled {
            return;
        }
        let peer_id = peer.peer_id();
        let total_difficulty = peer.total_difficulty();

        self.registry.clear_attempt(&peer_id);
        if total_difficulty < self.watermarks.lower_useful_difficulty() {
            debug!(%peer_id, total_difficulty, "sync: rejected peer below lowerUsefulDifficulty");
            return;
        }
        self.pool.insert(Arc::clone(&peer));

        if !self.inner.lock().on_sync_done_triggered {
            peer.prohibit_transactions();
        }

        let state = self.inner.lock().state;
        match state {
            SyncState::Init => {
                if self.block_queue.has_solid_blocks() {
                    self.change_state(SyncState::BlockRetrieving);
                } else if total_difficulty > self.watermarks.highest_known_difficulty() {
                    self.change_state(SyncState::HashRetrieving);
                }
            }
            SyncState::HashRetrieving => {
                if self.watermarks.substantially_exceeds_known(total_difficulty) {
                    self.change_state(SyncState::HashRetrieving);
                }
            }
            _ => {}
        }
    }

    /// A peer disconnected (voluntarily or by us).
    pub fn on_disconnect(&self, peer_id: PeerId) {
        if !self.config.is_sync_enabled {
            return;
        }
        self.pool.remove(&peer_id);
        self.registry.clear_attempt(&peer_id);
        self.registry.record_disconnect(peer_id);
    }

    /// The validator detected a block whose parent is unknown.
    pub fn recover_gap(&self, wrapper: GapWrapper) {
        if !self.config.is_sync_enabled {
            return;
        }
        let state = self.state();
        if state == SyncState::GapRecovery {
            return;
        }

        let eligible = match wrapper.origin {
            BlockOrigin::Solid => !matches!(state, SyncState::Init | SyncState::HashRetrieving),
            BlockOrigin::Fresh => {
                (state == SyncState::BlockRetrieving && self.block_queue.is_hashes_empty())
                    || state == SyncState::DoneSync
                    || state == SyncState::DoneGapRecovery
            }
        };
        if !eligible {
            return;
        }

        let local_best = self.blockchain.best_block_number();
        let gap = wrapper.number.saturating_sub(local_best);

        if gap > LARGE_GAP_THRESHOLD {
            {
                let mut inner = self.inner.lock();
                inner.max_hashes_ask = gap.min(self.config.max_hashes_ask as u64) as u32;
                inner.best_hash = wrapper.hash;
            }
            self.change_state(SyncState::GapRecovery);
        } else {
            self.block_queue.add_first_hash(wrapper.parent_hash);
        }
    }

    /// The validator successfully connected a block to the chain.
    pub fn notify_new_block_imported(&self, freshness: BlockOrigin) {
        if !self.config.is_sync_enabled {
            return;
        }
        let state = self.state();
        if matches!(state, SyncState::DoneSync | SyncState::GapRecovery | SyncState::DoneGapRecovery) {
            return;
        }
        match freshness {
            BlockOrigin::Fresh => self.change_state(SyncState::DoneSync),
            BlockOrigin::Solid => {
                debug!("sync: imported block exceeded freshness window, continuing");
            }
        }
    }

    // -- connection initiation (§4.6) -----------------------------------

    fn initiate_connection(&self, node: &DiscoveredNode) {
        if self.pool.contains(&node.peer_id) || self.registry.has_attempt(&node.peer_id) {
            return;
        }
        self.transport.connect(node);
        self.registry.record_attempt(node.peer_id);
    }
}
