//! Difficulty adjustment algorithm.
//!
//! Adjusts the proof-of-work difficulty every block using a rolling window
//! of the most recent [`DIFFICULTY_WINDOW`](crate::constants::DIFFICULTY_WINDOW)
//! block intervals.
//!
//! The algorithm compares actual elapsed time against expected time and adjusts
//! the difficulty target proportionally. Per-window adjustments are clamped to
//! [`MAX_ADJUSTMENT_FACTOR`] (4×) to prevent wild swings from timestamp
//! manipulation or sudden hashrate changes.
//!
//! # Difficulty target semantics
//!
//! The `difficulty_target` field in [`BlockHeader`](crate::types::BlockHeader)
//! is a u64 where **higher = easier**. The PoW check interprets the first 8
//! bytes of the header hash as a little-endian u64 and requires it to be
//! ≤ `difficulty_target`. A target of [`MAX_TARGET`] (`u64::MAX`) accepts any
//! hash (genesis difficulty).
//!
//! # Window sizing
//!
//! At steady state the window contains `DIFFICULTY_WINDOW` intervals
//! (`DIFFICULTY_WINDOW + 1` timestamps). During the early chain (height <
//! `DIFFICULTY_WINDOW + 1`), all available blocks are used, giving a growing
//! window that smoothly transitions to the full size.

use crate::constants::{BLOCK_TIME_SECS, DIFFICULTY_WINDOW};

/// Maximum difficulty adjustment factor per window.
///
/// The target cannot change by more than this factor in a single adjustment.
/// Prevents extreme swings from timestamp manipulation or hashrate spikes.
pub const MAX_ADJUSTMENT_FACTOR: u64 = 4;

/// Minimum difficulty target (hardest possible difficulty).
///
/// A target of 1 requires the LE u64 of the first 8 hash bytes to be ≤ 1,
/// which is astronomically difficult.
pub const MIN_TARGET: u64 = 1;

/// Maximum (easiest) difficulty target. Used for the genesis block.
///
/// A target of `u64::MAX` accepts any hash.
pub const MAX_TARGET: u64 = u64::MAX;

/// Compute the next difficulty target from a window of recent timestamps.
///
/// `timestamps` must be ordered oldest to newest. `current_target` is the
/// difficulty target of the most recent block in the window.
///
/// Returns `current_target` unchanged if fewer than 2 timestamps are provided
/// (not enough data for adjustment). Otherwise computes:
///
/// 1. `actual_time = timestamps.last() - timestamps.first()`
/// 2. `expected_time = (timestamps.len() - 1) * BLOCK_TIME_SECS`
/// 3. Clamp actual time to `[expected / 4, expected * 4]`
/// 4. `new_target = current_target * clamped_actual / expected`
/// 5. Clamp result to `[MIN_TARGET, MAX_TARGET]`
pub fn next_target(timestamps: &[u64], current_target: u64) -> u64 {
    if timestamps.len() < 2 {
        return current_target;
    }

    let actual_time = timestamps[timestamps.len() - 1].saturating_sub(timestamps[0]);
    let intervals = (timestamps.len() - 1) as u64;
    let expected_time = intervals * BLOCK_TIME_SECS;

    // Guard: zero expected time can only happen if BLOCK_TIME_SECS is 0 (impossible
    // with current constants) or intervals is 0 (already guarded by len < 2 check).
    if expected_time == 0 {
        return current_target;
    }

    // Clamp actual time to prevent extreme adjustments (max 4× change).
    let min_time = expected_time / MAX_ADJUSTMENT_FACTOR;
    let max_time = expected_time.saturating_mul(MAX_ADJUSTMENT_FACTOR);
    let clamped = actual_time.max(min_time).min(max_time);

    // new_target = current_target * clamped / expected_time
    // Use u128 to avoid overflow. Max product:
    //   u64::MAX * (60 * 60 * 4) ≈ 2.6e23, well within u128 range.
    let result =
        (current_target as u128).saturating_mul(clamped as u128) / (expected_time as u128);

    // Clamp to valid u64 range.
    (result.min(MAX_TARGET as u128) as u64).max(MIN_TARGET)
}

/// Compute the expected difficulty target for the block at `height`.
///
/// `parent_target` is the difficulty target of the block at `height - 1`.
/// `get_timestamp` returns the timestamp of the block at a given height
/// (must be valid for all heights in the selected window).
///
/// Returns [`MAX_TARGET`] for heights 0 and 1 (genesis and first mined block,
/// before sufficient data exists). For height ≥ 2, computes the adjustment
/// using all available timestamps (up to `DIFFICULTY_WINDOW + 1`).
pub fn target_for_height(
    height: u64,
    parent_target: u64,
    get_timestamp: impl Fn(u64) -> u64,
) -> u64 {
    target_for_height_with_initial(height, parent_target, get_timestamp, MAX_TARGET)
}

/// Like [`target_for_height`] but allows overriding the initial (genesis) target.
///
/// Use [`TESTNET_INITIAL_TARGET`](crate::constants::TESTNET_INITIAL_TARGET) for
/// testnet deployments to prevent instant-mining of early blocks.
pub fn target_for_height_with_initial(
    height: u64,
    parent_target: u64,
    get_timestamp: impl Fn(u64) -> u64,
    initial_target: u64,
) -> u64 {
    if height <= 1 {
        return initial_target;
    }

    // We want DIFFICULTY_WINDOW intervals = DIFFICULTY_WINDOW + 1 timestamps.
    // Early chain: use all available blocks (minimum 2 timestamps = 1 interval).
    let num_timestamps = height.min(DIFFICULTY_WINDOW + 1);
    let start = height - num_timestamps;

    let timestamps: Vec<u64> = (start..height).map(&get_timestamp).collect();

    next_target(&timestamps, parent_target)
}

/// Expected total time for the full difficulty window (in seconds).
///
/// Equals `DIFFICULTY_WINDOW * BLOCK_TIME_SECS`.
pub const fn expected_window_time() -> u64 {
    DIFFICULTY_WINDOW * BLOCK_TIME_SECS
}

/// The number of timestamp entries used in a full difficulty window.
///
/// Equals `DIFFICULTY_WINDOW + 1` (one more than the number of intervals).
pub const fn full_window_size() -> u64 {
    DIFFICULTY_WINDOW + 1
}

/// A single block's contribution to cumulative chain work.
///
/// Since `difficulty_target` is "higher = easier" (see module docs), work is
/// the inverse: `(MAX_TARGET + 1) / (target + 1)`. Widened to `u128` so a sum
/// over an entire chain's blocks cannot overflow.
pub fn block_work(difficulty_target: u64) -> u128 {
    (MAX_TARGET as u128 + 1) / (difficulty_target as u128 + 1)
}

/// Sum [`block_work`] over a sequence of difficulty targets, oldest first.
///
/// Used to (re)compute total chain work from scratch, e.g. when a node first
/// opens its block store and has no cached running total.
pub fn total_work<I: IntoIterator<Item = u64>>(targets: I) -> u128 {
    targets.into_iter().map(block_work).sum()
}
