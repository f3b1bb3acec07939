//! UTXO lineage-based clustering for decay calculation.
//!
//! Clusters group UTXOs that share ownership lineage. The cluster balance
//! determines the concentration used for decay rate computation.
//!
//! Rules:
//! 1. All outputs from a single transaction belong to the same cluster.
//! 2. Mixed inputs from different clusters cause a deterministic merge.
//! 3. Lineage weakens over time: 50% after [`LINEAGE_HALF_LIFE`] blocks,
//!    full reset after [`LINEAGE_FULL_RESET`] blocks.

use rill_core::constants::{CONCENTRATION_PRECISION, LINEAGE_FULL_RESET, LINEAGE_HALF_LIFE};
use rill_core::types::Hash256;

/// Determine the cluster ID for outputs of a transaction.
///
/// - Coinbase (empty `input_cluster_ids`): new cluster derived from `txid`.
/// - Single input cluster: outputs inherit that cluster.
/// - Multiple input clusters: deterministic merge via BLAKE3 hash of sorted IDs.
pub fn determine_output_cluster(input_cluster_ids: &[Hash256], txid: &Hash256) -> Hash256 {
    if input_cluster_ids.is_empty() {
        return *txid;
    }

    // Deduplicate and sort for determinism
    let mut unique: Vec<Hash256> = input_cluster_ids.to_vec();
    unique.sort();
    unique.dedup();

    if unique.len() == 1 {
        return unique[0];
    }

    // Multiple clusters: merge by hashing sorted cluster IDs
    let mut hasher = blake3::Hasher::new();
    for id in &unique {
        hasher.update(id.as_bytes());
    }
    Hash256(hasher.finalize().into())
}

/// Compute the lineage factor for a UTXO held for `blocks_held` blocks.
///
/// Returns a value in `[0, CONCENTRATION_PRECISION]` representing the fraction
/// of the original cluster association that remains:
/// - At 0 blocks: full association ([`CONCENTRATION_PRECISION`])
/// - At [`LINEAGE_HALF_LIFE`] blocks: half association
/// - At [`LINEAGE_FULL_RESET`] blocks and beyond: no association (0)
///
/// Uses piecewise linear decay:
/// - `[0, HALF_LIFE]`: linearly from 1.0 to 0.5
/// - `[HALF_LIFE, FULL_RESET]`: linearly from 0.5 to 0.0
pub fn lineage_factor(blocks_held: u64) -> u64 {
    if blocks_held == 0 {
        return CONCENTRATION_PRECISION;
    }
    if blocks_held >= LINEAGE_FULL_RESET {
        return 0;
    }

    let half = CONCENTRATION_PRECISION / 2;

    if blocks_held <= LINEAGE_HALF_LIFE {
        // Linear from CONCENTRATION_PRECISION to half over HALF_LIFE blocks
        CONCENTRATION_PRECISION - half * blocks_held / LINEAGE_HALF_LIFE
    } else {
        // Linear from half to 0 over (FULL_RESET - HALF_LIFE) blocks
        let remaining = LINEAGE_FULL_RESET - blocks_held;
        let range = LINEAGE_FULL_RESET - LINEAGE_HALF_LIFE;
        half * remaining / range
    }
}

/// Compute the effective cluster balance considering lineage weakening.
///
/// The UTXO's contribution to its cluster balance is reduced by the
/// lineage factor, simulating the weakening of ownership association over time.
///
/// Returns `nominal_balance * lineage_factor(blocks_held) / CONCENTRATION_PRECISION`.
pub fn lineage_adjusted_balance(nominal_balance: u64, blocks_held: u64) -> u64 {
    let factor = lineage_factor(blocks_held);
    (nominal_balance as u128 * factor as u128 / CONCENTRATION_PRECISION as u128) as u64
}
