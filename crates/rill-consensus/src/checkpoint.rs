//! Header checkpoint verification.
//!
//! Provides functions to verify that blocks at checkpoint heights match the
//! expected hash, and to reject reorgs that would unwind past a checkpoint.
//!
//! # Attack vectors
//!
//! - **Long-range rewrite:** Without checkpoints an attacker with sufficient
//!   hash power could rewrite arbitrarily deep history. Checkpoints pin known-
//!   good blocks so that reorgs below the last checkpoint are rejected outright.
//!
//! - **Checkpoint spoofing:** The checkpoint list is compiled into the binary.
//!   An attacker would need to distribute a modified binary to exploit this,
//!   which is outside our threat model.
//!
//! # Usage
//!
//! The node layer should call [`check_checkpoint`] (or
//! [`check_checkpoint_with`] for testing) when connecting a new block whose
//! height is known. It should call [`is_below_checkpoint`] before accepting a
//! reorg that would disconnect blocks at or below the last checkpoint height.
//!
//! The [`SyncManager`](crate::engine) does **not** call these functions
//! directly because it does not track block heights. The node is responsible
//! for invoking checkpoint validation during sync header processing.

use rill_core::constants::CHECKPOINTS;
use rill_core::error::BlockError;
use rill_core::types::Hash256;

/// Verify that a block at the given `height` has the expected checkpoint hash.
///
/// If `height` matches a checkpoint height, the block hash must match exactly.
/// If there is no checkpoint at `height`, the function succeeds unconditionally.
///
/// # Errors
///
/// Returns [`BlockError::CheckpointMismatch`] when the hash does not match
/// the checkpoint at the given height.
pub fn check_checkpoint(height: u64, hash: &Hash256) -> Result<(), BlockError> {
    check_checkpoint_with(CHECKPOINTS, height, hash)
}

/// Like [`check_checkpoint`] but takes an explicit checkpoint list.
///
/// This is the testable core: production code passes [`CHECKPOINTS`], while
/// tests can supply their own list.
pub fn check_checkpoint_with(
    checkpoints: &[(u64, [u8; 32])],
    height: u64,
    hash: &Hash256,
) -> Result<(), BlockError> {
    for &(cp_height, cp_hash) in checkpoints {
        if cp_height == height {
            if hash.0 != cp_hash {
                return Err(BlockError::CheckpointMismatch);
            }
            return Ok(());
        }
    }
    Ok(())
}

/// Return the height of the most recent checkpoint, or 0 if there are none.
pub fn last_checkpoint_height() -> u64 {
    last_checkpoint_height_with(CHECKPOINTS)
}

/// Like [`last_checkpoint_height`] but with an explicit checkpoint list.
pub fn last_checkpoint_height_with(checkpoints: &[(u64, [u8; 32])]) -> u64 {
    checkpoints.iter().map(|(h, _)| *h).max().unwrap_or(0)
}

/// Returns `true` if `height` is at or below the last checkpoint height.
///
/// The node should reject any reorg that would disconnect blocks at or below
/// this height, because those blocks are pinned by a checkpoint.
pub fn is_below_checkpoint(height: u64) -> bool {
    is_below_checkpoint_with(CHECKPOINTS, height)
}

/// Like [`is_below_checkpoint`] but with an explicit checkpoint list.
pub fn is_below_checkpoint_with(checkpoints: &[(u64, [u8; 32])], height: u64) -> bool {
    let last = last_checkpoint_height_with(checkpoints);
    last > 0 && height <= last
}
