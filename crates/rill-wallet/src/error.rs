//! Wallet error types.

use rill_core::error::{CryptoError, DecayError, TransactionError};
use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Insufficient funds to cover the transaction amount plus fees.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Available balance in rills.
        have: u64,
        /// Required amount in rills.
        need: u64,
    },

    /// No UTXOs available for spending.
    #[error("no UTXOs available")]
    NoUtxos,

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid address string.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Key derivation failure.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// Encryption failure.
    #[error("encryption: {0}")]
    Encryption(String),

    /// Decryption failure.
    #[error("decryption: {0}")]
    Decryption(String),

    /// Wrong password for wallet file.
    #[error("invalid password")]
    InvalidPassword,

    /// Wallet file is corrupted or has invalid format.
    #[error("corrupted file: {0}")]
    CorruptedFile(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Required key not found in keychain.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Transaction build error.
    #[error("build error: {0}")]
    BuildError(String),

    /// Cryptographic error from rill-core.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Transaction validation error from rill-core.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Decay computation error from rill-core.
    #[error(transparent)]
    Decay(#[from] DecayError),

    /// Serialization error.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
}
