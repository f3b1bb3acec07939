//! Wallet composition: key management, UTXO tracking, transaction creation.
//!
//! The [`Wallet`] struct ties together key derivation, coin selection,
//! transaction building, and encrypted file persistence. It maintains an
//! in-memory set of owned UTXOs discovered by scanning the chain.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rill_core::address::{Address, Network};
use rill_core::constants::COIN;
use rill_core::traits::{ChainState, DecayCalculator};
use rill_core::types::{Hash256, OutPoint, Transaction, UtxoEntry};

use crate::builder::TransactionBuilder;
use crate::encryption;
use crate::error::WalletError;
use crate::keys::{KeyChain, KeyChainData, Seed};

/// Magic bytes identifying a Rill wallet file.
pub const WALLET_MAGIC: &[u8; 4] = b"RIWL";

/// Current wallet file format version.
pub const WALLET_VERSION: u32 = 1;

/// Balance summary with decay-adjusted values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletBalance {
    /// Total nominal (pre-decay) value in rills.
    pub nominal: u64,
    /// Total effective (post-decay) value in rills.
    pub effective: u64,
    /// Total decay amount in rills.
    pub decay: u64,
    /// Number of UTXOs.
    pub utxo_count: usize,
}

impl WalletBalance {
    /// Nominal balance in RILL (display helper, not for consensus).
    pub fn nominal_rill(&self) -> f64 {
        self.nominal as f64 / COIN as f64
    }

    /// Effective balance in RILL (display helper, not for consensus).
    pub fn effective_rill(&self) -> f64 {
        self.effective as f64 / COIN as f64
    }

    /// Decay amount in RILL (display helper, not for consensus).
    pub fn decay_rill(&self) -> f64 {
        self.decay as f64 / COIN as f64
    }
}

/// Wallet file header serialized as JSON.
#[derive(serde::Serialize, serde::Deserialize)]
struct WalletFileHeader {
    magic: String,
    version: u32,
}

/// HD wallet with decay-aware transaction support.
///
/// Manages a deterministic keychain, tracks owned UTXOs, and provides
/// high-level operations for sending and receiving funds.
pub struct Wallet {
    keychain: KeyChain,
    /// Owned UTXOs: outpoint -> entry.
    utxos: HashMap<OutPoint, UtxoEntry>,
    /// Set of pubkey hashes owned by this wallet (for UTXO scanning).
    owned_pubkey_hashes: HashSet<Hash256>,
}

impl Wallet {
    /// Create a new wallet with a random seed.
    pub fn create(network: Network) -> Self {
        let seed = Seed::generate();
        Self::from_seed(seed, network)
    }

    /// Create a wallet from an existing seed (deterministic recovery).
    pub fn from_seed(seed: Seed, network: Network) -> Self {
        let keychain = KeyChain::new(seed, network);
        Self {
            keychain,
            utxos: HashMap::new(),
            owned_pubkey_hashes: HashSet::new(),
        }
    }

    /// Derive the next receive address and register its pubkey hash.
    pub fn next_address(&mut self) -> Address {
        let addr = self.keychain.next_address();
        self.owned_pubkey_hashes.insert(addr.pubkey_hash());
        addr
    }

    /// The network this wallet is configured for.
    pub fn network(&self) -> Network {
        self.keychain.network()
    }

    /// Number of derived addresses.
    pub fn address_count(&self) -> u32 {
        self.keychain.next_index()
    }

    /// Scan a UTXO set and update the wallet's owned UTXOs.
    ///
    /// Phase 1: takes an explicit list. Production: bloom filter / indexer.
    pub fn scan_utxos(&mut self, utxo_set: &[(OutPoint, UtxoEntry)]) {
        self.utxos.clear();
        for (outpoint, entry) in utxo_set {
            if self.owned_pubkey_hashes.contains(&entry.output.pubkey_hash) {
                self.utxos.insert(outpoint.clone(), entry.clone());
            }
        }
    }

    /// Compute the current wallet balance with decay adjustments.
    pub fn balance(
        &self,
        decay_calc: &dyn DecayCalculator,
        chain_state: &dyn ChainState,
        height: u64,
    ) -> Result<WalletBalance, WalletError> {
        let supply = chain_state
            .circulating_supply()
            .map_err(|e| WalletError::BuildError(e.to_string()))?;

        let mut nominal: u64 = 0;
        let mut effective: u64 = 0;
        let mut decay: u64 = 0;

        for entry in self.utxos.values() {
            let val = entry.output.value;
            let blocks_held = height.saturating_sub(entry.block_height);

            let cluster_bal = chain_state
                .cluster_balance(&entry.cluster_id)
                .map_err(|e| WalletError::BuildError(e.to_string()))?;
            let concentration = if supply > 0 {
                ((cluster_bal as u128)
                    * (rill_core::constants::CONCENTRATION_PRECISION as u128)
                    / (supply as u128)) as u64
            } else {
                0
            };

            let eff = decay_calc
                .effective_value(val, concentration, blocks_held)
                .map_err(WalletError::Decay)?;
            let dec = val.saturating_sub(eff);

            nominal = nominal.saturating_add(val);
            effective = effective.saturating_add(eff);
            decay = decay.saturating_add(dec);
        }

        Ok(WalletBalance {
            nominal,
            effective,
            decay,
            utxo_count: self.utxos.len(),
        })
    }

    /// Number of owned UTXOs.
    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }

    /// Access the keychain (for signing operations).
    pub fn keychain(&self) -> &KeyChain {
        &self.keychain
    }

    /// Access the keychain mutably (for address derivation).
    pub fn keychain_mut(&mut self) -> &mut KeyChain {
        &mut self.keychain
    }

    /// Get all owned UTXOs as a vector.
    pub fn owned_utxos(&self) -> Vec<(OutPoint, UtxoEntry)> {
        self.utxos.iter().map(|(op, entry)| (op.clone(), entry.clone())).collect()
    }

    /// Build and sign a transaction sending to the given recipients.
    ///
    /// Returns the signed transaction ready for broadcast.
    pub fn send(
        &mut self,
        recipients: &[(Address, u64)],
        decay_calc: &dyn DecayCalculator,
        chain_state: &dyn ChainState,
        height: u64,
    ) -> Result<Transaction, WalletError> {
        if recipients.is_empty() {
            return Err(WalletError::BuildError("no recipients".into()));
        }

        let utxo_list: Vec<(OutPoint, UtxoEntry)> = self.utxos.clone().into_iter().collect();
        let change_addr = self.next_address();

        let mut builder = TransactionBuilder::new();
        for (addr, amount) in recipients {
            builder.add_recipient(addr.clone(), *amount);
        }

        let unsigned = builder.build(&utxo_list, &change_addr, decay_calc, chain_state, height)?;
        TransactionBuilder::sign(unsigned, &self.keychain)
    }

    /// Register this wallet as an agent wallet.
    ///
    /// Constructs and signs a `TxType::AgentRegister` transaction that sends
    /// at least [`AGENT_REGISTRATION_STAKE`](rill_core::constants::AGENT_REGISTRATION_STAKE)
    /// to the wallet's own address as the stake output.
    pub fn register_as_agent(
        &mut self,
        decay_calc: &dyn DecayCalculator,
        chain_state: &dyn ChainState,
        height: u64,
    ) -> Result<Transaction, WalletError> {
        use rill_core::constants::AGENT_REGISTRATION_STAKE;
        use rill_core::types::TxType;

        let stake_addr = self.next_address();
        let stake_amount = AGENT_REGISTRATION_STAKE;

        // Build the transaction using the normal send flow (coin selection + change).
        let utxo_list: Vec<(OutPoint, UtxoEntry)> = self.utxos.clone().into_iter().collect();
        let change_addr = self.next_address();

        let mut builder = TransactionBuilder::new();
        builder.add_recipient(stake_addr, stake_amount);

        let mut unsigned = builder.build(&utxo_list, &change_addr, decay_calc, chain_state, height)?;

        // Override tx_type to AgentRegister.
        unsigned.tx.tx_type = TxType::AgentRegister;

        TransactionBuilder::sign(unsigned, &self.keychain)
    }

    /// Save the wallet to an encrypted file.
    ///
    /// # File format
    /// ```text
    /// header_len (4 bytes LE) || header_json || encrypted_payload
    /// ```
    /// The header is unencrypted JSON containing magic bytes and version.
    /// The payload is AES-256-GCM encrypted keychain data.
    pub fn save_to_file(&self, path: &Path, password: &[u8]) -> Result<(), WalletError> {
        let header = WalletFileHeader {
            magic: String::from_utf8_lossy(WALLET_MAGIC).to_string(),
            version: WALLET_VERSION,
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| WalletError::Serialization(e.to_string()))?;

        let kc_data = KeyChainData::from_keychain(&self.keychain);
        let payload_json =
            serde_json::to_vec(&kc_data).map_err(|e| WalletError::Serialization(e.to_string()))?;

        let encrypted = encryption::encrypt(&payload_json, password)?;

        let header_len = header_json.len() as u32;
        let mut file_data =
            Vec::with_capacity(4 + header_json.len() + encrypted.len());
        file_data.extend_from_slice(&header_len.to_le_bytes());
        file_data.extend_from_slice(&header_json);
        file_data.extend_from_slice(&encrypted);

        std::fs::write(path, &file_data).map_err(|e| WalletError::IoError(e.to_string()))
    }

    /// Load a wallet from an encrypted file.
    pub fn load_from_file(path: &Path, password: &[u8]) -> Result<Self, WalletError> {
        let file_data =
            std::fs::read(path).map_err(|e| WalletError::IoError(e.to_string()))?;

        if file_data.len() < 4 {
            return Err(WalletError::CorruptedFile("file too short".into()));
        }

        let header_len =
            u32::from_le_bytes(file_data[..4].try_into().unwrap()) as usize;
        if file_data.len() < 4 + header_len {
            return Err(WalletError::CorruptedFile("header truncated".into()));
        }

        let header_json = &file_data[4..4 + header_len];
        let header: WalletFileHeader = serde_json::from_slice(header_json)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid header: {e}")))?;

        if header.magic != String::from_utf8_lossy(WALLET_MAGIC).as_ref() {
            return Err(WalletError::CorruptedFile("invalid magic bytes".into()));
        }
        if header.version != WALLET_VERSION {
            return Err(WalletError::CorruptedFile(format!(
                "unsupported version: {}",
                header.version
            )));
        }

        let encrypted = &file_data[4 + header_len..];
        let payload_json = encryption::decrypt(encrypted, password)?;

        let kc_data: KeyChainData = serde_json::from_slice(&payload_json)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid payload: {e}")))?;

        let keychain = kc_data.to_keychain();

        // Rebuild owned pubkey hashes from restored keychain
        let mut owned = HashSet::new();
        for pkh in keychain.known_pubkey_hashes() {
            owned.insert(*pkh);
        }

        Ok(Self {
            keychain,
            utxos: HashMap::new(),
            owned_pubkey_hashes: owned,
        })
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("network", &self.keychain.network())
            .field("addresses", &self.keychain.next_index())
            .field("utxos", &self.utxos.len())
            .finish()
    }
}
