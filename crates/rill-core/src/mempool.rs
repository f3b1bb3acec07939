//! In-memory pool of unconfirmed transactions (mempool).
//!
//! The mempool stores validated transactions awaiting inclusion in blocks.
//! It provides:
//! - O(1) lookup by txid
//! - O(1) conflict detection via spent-outpoint index
//! - O(log n) fee-rate-ordered selection for block templates
//! - Size-limited storage with lowest-fee-rate eviction
//!
//! Transactions must be validated by the caller before insertion (using
//! [`validate_transaction`](crate::validation::validate_transaction)).
//! The mempool only checks for duplicates and input conflicts.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::constants::MIN_TX_FEE;
use crate::error::MempoolError;
use crate::types::{Block, Hash256, OutPoint, Transaction};

/// Default maximum number of transactions in the mempool.
pub const DEFAULT_MAX_COUNT: usize = 5_000;

/// Default maximum total serialized bytes in the mempool (5 MiB).
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Fee rate precision multiplier.
///
/// Fee rate is stored as `fee * FEE_RATE_PRECISION / size`, giving
/// milli-rills per byte for fine-grained ordering.
const FEE_RATE_PRECISION: u128 = 1_000;

/// Compute fee rate in milli-rills per byte.
///
/// Uses u128 intermediate to prevent overflow for large fees.
fn compute_fee_rate(fee: u64, size: usize) -> u64 {
    if size == 0 {
        return u64::MAX;
    }
    let rate = (fee as u128) * FEE_RATE_PRECISION / (size as u128);
    rate.min(u64::MAX as u128) as u64
}

/// A transaction stored in the mempool with precomputed metadata.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    /// The unconfirmed transaction.
    pub tx: Transaction,
    /// Precomputed transaction ID.
    pub txid: Hash256,
    /// Transaction fee in rills (`total_input - total_output`).
    pub fee: u64,
    /// Serialized size in bytes.
    pub size: usize,
    /// Fee rate in milli-rills per byte.
    fee_rate: u64,
}

impl MempoolEntry {
    /// Fee rate in milli-rills per byte.
    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }
}

/// In-memory pool of unconfirmed transactions.
///
/// Stores pre-validated transactions indexed by txid and spent outpoints.
/// Maintains a fee-rate-ordered index for efficient block template selection
/// and lowest-priority eviction.
///
/// Not thread-safe — callers should wrap in a `Mutex` or `RwLock` if
/// concurrent access is needed.
pub struct Mempool {
    /// Primary storage: txid → entry.
    entries: HashMap<Hash256, MempoolEntry>,
    /// Spent outpoint → txid of the pool transaction that spends it.
    by_outpoint: HashMap<OutPoint, Hash256>,
    /// Fee-rate-ordered index: `(fee_rate, txid)`.
    /// Ascending order: lowest fee rate first (for eviction), iterate in
    /// reverse for highest-first (block template selection).
    by_fee_rate: BTreeSet<(u64, Hash256)>,
    /// Maximum transaction count.
    max_count: usize,
    /// Maximum total serialized bytes.
    max_bytes: usize,
    /// Current total serialized bytes in the pool.
    total_bytes: usize,
}

impl Mempool {
    /// Create a new mempool with the given size limits.
    pub fn new(max_count: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_outpoint: HashMap::new(),
            by_fee_rate: BTreeSet::new(),
            max_count,
            max_bytes,
            total_bytes: 0,
        }
    }

    /// Create a new mempool with default size limits.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_COUNT, DEFAULT_MAX_BYTES)
    }

    /// Insert a validated transaction into the mempool.
    ///
    /// The transaction must have been validated by the caller (structural +
    /// contextual). The mempool checks for duplicates, input conflicts,
    /// and size limits.
    ///
    /// `fee` is the transaction fee in rills (from
    /// [`ValidatedTransaction::fee`](crate::validation::ValidatedTransaction::fee)).
    ///
    /// Returns the txid on success. If the pool is full, attempts to evict
    /// the lowest-fee-rate entry (only if the new transaction has a strictly
    /// higher fee rate). Eviction continues until space is available or the
    /// new transaction's fee rate is not higher than the lowest entry.
    pub fn insert(&mut self, tx: Transaction, fee: u64) -> Result<Hash256, MempoolError> {
        if fee < MIN_TX_FEE {
            return Err(MempoolError::FeeTooLow { fee, minimum: MIN_TX_FEE });
        }

        // Compute txid and size from a single serialization.
        let encoded = bincode::encode_to_vec(&tx, bincode::config::standard())
            .map_err(|e| MempoolError::Internal(e.to_string()))?;
        let txid = Hash256(blake3::hash(&encoded).into());
        let size = encoded.len();

        if self.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyExists(txid.to_string()));
        }

        // Check for input conflicts with existing pool entries.
        for input in &tx.inputs {
            if let Some(conflicting) = self.by_outpoint.get(&input.previous_output) {
                return Err(MempoolError::Conflict {
                    new_txid: txid.to_string(),
                    existing_txid: conflicting.to_string(),
                    outpoint: input.previous_output.to_string(),
                });
            }
        }

        let fee_rate = compute_fee_rate(fee, size);

        // Evict lowest-fee-rate entries if the pool is full.
        while (self.entries.len() >= self.max_count || self.total_bytes + size > self.max_bytes)
            && !self.entries.is_empty()
        {
            if let Some(&(lowest_rate, lowest_txid)) = self.by_fee_rate.iter().next() {
                if lowest_rate >= fee_rate {
                    return Err(MempoolError::PoolFull);
                }
                self.remove_entry(lowest_txid);
            } else {
                break;
            }
        }

        // Final capacity check.
        if self.entries.len() >= self.max_count || self.total_bytes + size > self.max_bytes {
            return Err(MempoolError::PoolFull);
        }

        // Insert into all indices.
        for input in &tx.inputs {
            self.by_outpoint
                .insert(input.previous_output.clone(), txid);
        }
        self.by_fee_rate.insert((fee_rate, txid));
        self.total_bytes += size;
        self.entries.insert(
            txid,
            MempoolEntry {
                tx,
                txid,
                fee,
                size,
                fee_rate,
            },
        );

        Ok(txid)
    }

    /// Remove a transaction from the mempool by txid.
    ///
    /// Returns the removed entry, or `None` if not found.
    pub fn remove(&mut self, txid: &Hash256) -> Option<MempoolEntry> {
        self.remove_entry(*txid)
    }

    /// Internal: remove an entry and clean up all indices.
    fn remove_entry(&mut self, txid: Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(&txid)?;
        for input in &entry.tx.inputs {
            self.by_outpoint.remove(&input.previous_output);
        }
        self.by_fee_rate.remove(&(entry.fee_rate, txid));
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// Check if a transaction with the given txid is in the pool.
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    /// Get a mempool entry by txid.
    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    /// Check whether any of a transaction's inputs conflict with pool entries.
    ///
    /// Returns `true` if any input outpoint is already spent by a pool
    /// transaction.
    pub fn has_conflict(&self, tx: &Transaction) -> bool {
        tx.inputs
            .iter()
            .any(|input| self.by_outpoint.contains_key(&input.previous_output))
    }

    /// Get the txids of pool entries that conflict with the given transaction.
    ///
    /// Returns a deduplicated list of txids whose inputs overlap with `tx`.
    pub fn conflicting_txids(&self, tx: &Transaction) -> Vec<Hash256> {
        let mut seen = HashSet::new();
        tx.inputs
            .iter()
            .filter_map(|input| self.by_outpoint.get(&input.previous_output).copied())
            .filter(|txid| seen.insert(*txid))
            .collect()
    }

    /// Select transactions for a block template, ordered by fee rate (highest first).
    ///
    /// Greedily fills up to `max_block_bytes` of serialized transaction data,
    /// skipping individual transactions that are too large for the remaining
    /// space (smaller transactions may still fit).
    pub fn select_transactions(&self, max_block_bytes: usize) -> Vec<&MempoolEntry> {
        let mut selected = Vec::new();
        let mut remaining = max_block_bytes;

        for (_, txid) in self.by_fee_rate.iter().rev() {
            if remaining == 0 {
                break;
            }
            if let Some(entry) = self.entries.get(txid) {
                if entry.size <= remaining {
                    selected.push(entry);
                    remaining -= entry.size;
                }
            }
        }

        selected
    }

    /// Remove transactions confirmed in a block and any that conflict.
    ///
    /// Call this when a new block is accepted into the chain. Removes:
    /// 1. Transactions whose txids appear in the block
    /// 2. Pool transactions whose inputs are now spent by block transactions
    pub fn remove_confirmed_block(&mut self, block: &Block) {
        let mut confirmed_txids = HashSet::new();
        let mut spent = HashSet::new();

        for tx in &block.transactions {
            if let Ok(txid) = tx.txid() {
                confirmed_txids.insert(txid);
            }
            for input in &tx.inputs {
                if !input.previous_output.is_null() {
                    spent.insert(input.previous_output.clone());
                }
            }
        }

        // Remove confirmed transactions.
        for txid in &confirmed_txids {
            self.remove_entry(*txid);
        }

        // Remove pool transactions that conflict with the block's spent outpoints.
        let conflicting: Vec<Hash256> = spent
            .iter()
            .filter_map(|op| self.by_outpoint.get(op).copied())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        for txid in conflicting {
            self.remove_entry(txid);
        }
    }

    /// Number of transactions in the pool.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total serialized bytes of all transactions in the pool.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Maximum transaction count limit.
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Maximum total bytes limit.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Total fees of all transactions in the pool.
    pub fn total_fees(&self) -> u64 {
        self.entries.values().map(|e| e.fee).sum()
    }

    /// Iterate over all entries (arbitrary order).
    pub fn iter(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.entries.values()
    }

    /// Collect all txids in the pool.
    pub fn txids(&self) -> Vec<Hash256> {
        self.entries.keys().copied().collect()
    }
}
