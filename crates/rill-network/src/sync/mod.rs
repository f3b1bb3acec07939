//! Chain synchronization core: peer pool coordination, master-peer hash/block
//! retrieval, gap recovery, peer admission/banning, and discovery filtering.

pub mod collaborators;
pub mod config;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod peer;
pub mod pool;
pub mod registry;
pub mod watermark;

pub use collaborators::{
    BlockQueue, Blockchain, DiscoveredNode, EventSink, NodeDiscovery, NodeOrdering, PeerHandle,
    Transport,
};
pub use config::SyncConfig;
pub use discovery::DiscoverySubscriber;
pub use error::SyncError;
pub use manager::{BlockOrigin, GapWrapper, SyncManager, SyncState};
pub use peer::{DisconnectReason, PeerState};
pub use pool::PeerPool;
pub use registry::ConnectionRegistry;
pub use watermark::Watermarks;
