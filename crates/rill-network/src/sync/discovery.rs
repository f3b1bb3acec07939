//! Subscribes to node-appeared events and opportunistically connects to
//! peers that look substantially better than what we already know (§4.5).

use std::sync::Arc;

use tracing::debug;

use super::collaborators::{DiscoveredNode, Transport};
use super::registry::ConnectionRegistry;
use super::watermark::Watermarks;

/// Filters discovery events by reported total difficulty and initiates
/// connections for qualifying nodes.
pub struct DiscoverySubscriber {
    registry: Arc<ConnectionRegistry>,
    watermarks: Arc<Watermarks>,
    transport: Arc<dyn Transport>,
}

impl DiscoverySubscriber {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        watermarks: Arc<Watermarks>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self { registry, watermarks, transport }
    }

    /// Called for every node-appeared event. Node-disappeared events are
    /// ignored entirely, per §4.5.
    pub fn on_node_appeared(&self, node: DiscoveredNode, already_peer: bool) {
        let Some(total_difficulty) = node.total_difficulty else {
            debug!(peer = %node.peer_id, "discovery: node has no status message yet, skipping");
            return;
        };

        if !self.watermarks.substantially_exceeds_known(total_difficulty) {
            return;
        }

        if self.registry.is_banned(&node.peer_id) {
            return;
        }
        if already_peer || self.registry.has_attempt(&node.peer_id) {
            return;
        }

        self.initiate_connection(&node);
    }

    /// Non-blocking connection attempt, recording intent in the registry.
    ///
    /// Shared logic with `SyncManager::initiate_connection`; this copy takes
    /// only the registry (not the pool) because the `already_peer` check
    /// above already covers pool membership for discovery-triggered connects.
    fn initiate_connection(&self, node: &DiscoveredNode) {
        if self.registry.has_attempt(&node.peer_id) {
            return;
        }
        self.transport.connect(node);
        self.registry.record_attempt(node.peer_id);
    }
}
