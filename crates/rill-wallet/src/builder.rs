//! Transaction builder with decay-aware coin selection and signing.
//!
//! Provides a builder pattern for constructing transactions:
//! 1. Add recipients (address + amount)
//! 2. Build an unsigned transaction (performs coin selection)
//! 3. Sign all inputs with the wallet's keychain

use rill_core::address::Address;
use rill_core::crypto::sign_transaction_input;
use rill_core::traits::{ChainState, DecayCalculator};
use rill_core::types::{Hash256, OutPoint, Transaction, TxInput, TxOutput, UtxoEntry};

use crate::coin_selection::{CoinSelection, CoinSelector};
use crate::error::WalletError;
use crate::keys::KeyChain;

/// Default base fee in rills (fixed per transaction).
pub const DEFAULT_BASE_FEE: u64 = 1_000;

/// Default additional fee per input in rills.
pub const DEFAULT_FEE_PER_INPUT: u64 = 500;

/// A transaction recipient: address and amount.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Destination address.
    pub address: Address,
    /// Amount in rills.
    pub amount: u64,
}

/// An unsigned transaction ready for signing.
#[derive(Debug)]
pub struct UnsignedTransaction {
    /// The transaction with empty signatures.
    pub tx: Transaction,
    /// The coin selection result used to build this transaction.
    pub selection: CoinSelection,
    /// Pubkey hashes for each input (for signing key lookup).
    pub input_pubkey_hashes: Vec<Hash256>,
}

/// Builder for constructing and signing transactions.
///
/// # Example
/// ```ignore
/// let tx = TransactionBuilder::new()
///     .add_recipient(address, 5 * COIN)
///     .build(utxos, change_addr, &decay_calc, &chain_state, height)?;
/// let signed = TransactionBuilder::sign(tx, &keychain)?;
/// ```
pub struct TransactionBuilder {
    recipients: Vec<Recipient>,
    base_fee: u64,
    fee_per_input: u64,
    lock_time: u64,
}

impl TransactionBuilder {
    /// Create a new transaction builder with default fees.
    pub fn new() -> Self {
        Self {
            recipients: Vec::new(),
            base_fee: DEFAULT_BASE_FEE,
            fee_per_input: DEFAULT_FEE_PER_INPUT,
            lock_time: 0,
        }
    }

    /// Add a recipient to the transaction.
    pub fn add_recipient(&mut self, address: Address, amount: u64) -> &mut Self {
        self.recipients.push(Recipient { address, amount });
        self
    }

    /// Override the base fee (default: [`DEFAULT_BASE_FEE`]).
    pub fn set_base_fee(&mut self, fee: u64) -> &mut Self {
        self.base_fee = fee;
        self
    }

    /// Override the per-input fee (default: [`DEFAULT_FEE_PER_INPUT`]).
    pub fn set_fee_per_input(&mut self, fee: u64) -> &mut Self {
        self.fee_per_input = fee;
        self
    }

    /// Set the transaction lock time.
    pub fn set_lock_time(&mut self, lock_time: u64) -> &mut Self {
        self.lock_time = lock_time;
        self
    }

    /// Build an unsigned transaction by selecting coins and constructing outputs.
    ///
    /// # Arguments
    /// - `wallet_utxos` — available UTXOs owned by the wallet
    /// - `change_address` — address to receive change
    /// - `decay_calc` — decay calculator for effective value computation
    /// - `chain_state` — chain state for cluster balance and supply lookups
    /// - `height` — current block height
    pub fn build(
        &self,
        wallet_utxos: &[(OutPoint, UtxoEntry)],
        change_address: &Address,
        decay_calc: &dyn DecayCalculator,
        chain_state: &dyn ChainState,
        height: u64,
    ) -> Result<UnsignedTransaction, WalletError> {
        if self.recipients.is_empty() {
            return Err(WalletError::BuildError("no recipients".into()));
        }

        // Validate recipients
        let mut total_send: u64 = 0;
        for r in &self.recipients {
            if r.amount == 0 {
                return Err(WalletError::InvalidAmount("recipient amount is zero".into()));
            }
            total_send = total_send
                .checked_add(r.amount)
                .ok_or_else(|| WalletError::InvalidAmount("total amount overflow".into()))?;
        }

        // Coin selection
        let selection = CoinSelector::select(
            wallet_utxos,
            total_send,
            self.base_fee,
            self.fee_per_input,
            decay_calc,
            chain_state,
            height,
        )?;

        // Build inputs
        let mut inputs = Vec::with_capacity(selection.selected.len());
        let mut input_pubkey_hashes = Vec::with_capacity(selection.selected.len());
        for utxo in &selection.selected {
            inputs.push(TxInput {
                previous_output: utxo.outpoint.clone(),
                signature: vec![],
                public_key: vec![],
            });
            input_pubkey_hashes.push(utxo.entry.output.pubkey_hash);
        }

        // Build outputs: recipients + optional change
        let mut outputs = Vec::with_capacity(self.recipients.len() + 1);
        for r in &self.recipients {
            outputs.push(TxOutput {
                value: r.amount,
                pubkey_hash: r.address.pubkey_hash(),
            });
        }

        if selection.change > 0 {
            outputs.push(TxOutput {
                value: selection.change,
                pubkey_hash: change_address.pubkey_hash(),
            });
        }

        let tx = Transaction {
            version: 1,
            inputs,
            outputs,
            lock_time: self.lock_time,
        };

        Ok(UnsignedTransaction {
            tx,
            selection,
            input_pubkey_hashes,
        })
    }

    /// Sign all inputs of an unsigned transaction using the keychain.
    ///
    /// Looks up each input's signing key by pubkey hash. Returns an error
    /// if any required key is not found in the keychain.
    pub fn sign(
        unsigned: UnsignedTransaction,
        keychain: &KeyChain,
    ) -> Result<Transaction, WalletError> {
        let mut tx = unsigned.tx;

        for (i, pkh) in unsigned.input_pubkey_hashes.iter().enumerate() {
            let kp = keychain
                .keypair_for_pubkey_hash(pkh)
                .ok_or_else(|| WalletError::KeyNotFound(format!("pubkey hash {pkh}")))?;

            sign_transaction_input(&mut tx, i, kp)?;
        }

        Ok(tx)
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
