//! Genesis block definition for the Rill network.
//!
//! The genesis block is the first block in the chain (height 0). It contains
//! a single coinbase transaction with the dev fund premine (5% of total supply).
//! The regular mining reward schedule starts at height 1.
//!
//! All values are hardcoded and deterministic — every node computes the
//! identical genesis block.

use std::sync::LazyLock;

use crate::constants::{BPS_PRECISION, DEV_FUND_BPS, MAX_SUPPLY};
use crate::merkle;
use crate::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput};

/// Genesis block timestamp: January 1, 2026 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: u64 = 1_767_225_600;

/// Message embedded in the genesis coinbase (like Bitcoin's "The Times" headline).
pub const GENESIS_MESSAGE: &[u8] = b"Wealth should flow like water. Rill genesis 2026.";

/// Dev fund premine: 5% of MAX_SUPPLY (1,050,000 RILL = 105,000,000,000,000 rills).
pub const DEV_FUND_PREMINE: u64 = MAX_SUPPLY / BPS_PRECISION * DEV_FUND_BPS;

/// Cached genesis data, computed once on first access.
struct GenesisData {
    block: Block,
    hash: Hash256,
    coinbase_txid: Hash256,
}

static GENESIS: LazyLock<GenesisData> = LazyLock::new(build_genesis);

/// Build the genesis block and cache derived values.
fn build_genesis() -> GenesisData {
    let coinbase = build_genesis_coinbase();
    // Hardcoded coinbase — serialization cannot fail.
    let coinbase_txid = coinbase
        .txid()
        .expect("genesis coinbase is hardcoded valid data");
    let mr = merkle::merkle_root(&[coinbase_txid]);

    let block = Block {
        header: BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: mr,
            timestamp: GENESIS_TIMESTAMP,
            difficulty_target: u64::MAX,
            nonce: 0,
        },
        transactions: vec![coinbase],
    };
    let hash = block.header.hash();

    GenesisData {
        block,
        hash,
        coinbase_txid,
    }
}

/// Build the genesis coinbase transaction.
///
/// Contains the genesis message in the coinbase input and a single output
/// paying the dev fund premine.
fn build_genesis_coinbase() -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            signature: GENESIS_MESSAGE.to_vec(),
            public_key: vec![],
        }],
        outputs: vec![TxOutput {
            value: DEV_FUND_PREMINE,
            pubkey_hash: dev_fund_pubkey_hash(),
        }],
        lock_time: 0,
    }
}

/// The dev fund pubkey hash.
///
/// Derived deterministically as `BLAKE3(b"rill genesis dev fund")` for
/// transparency. In production, this would be replaced with a real
/// multisig key hash.
pub fn dev_fund_pubkey_hash() -> Hash256 {
    Hash256(blake3::hash(b"rill genesis dev fund").into())
}

/// The genesis block (height 0).
pub fn genesis_block() -> &'static Block {
    &GENESIS.block
}

/// The genesis block header hash.
pub fn genesis_hash() -> Hash256 {
    GENESIS.hash
}

/// The transaction ID of the genesis coinbase.
pub fn genesis_coinbase_txid() -> Hash256 {
    GENESIS.coinbase_txid
}

/// Check whether a block is the genesis block by comparing header hashes.
pub fn is_genesis(block: &Block) -> bool {
    block.header.hash() == GENESIS.hash
}
