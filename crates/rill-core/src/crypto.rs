//! Ed25519 cryptographic operations for the Rill protocol.
//!
//! Provides key generation, transaction signing, and signature verification.
//! Uses ed25519-dalek for the underlying Ed25519 implementation and BLAKE3
//! for pubkey hashing and signing hashes.
//!
//! # Signing scheme
//!
//! Transaction inputs are signed using a **sighash** that commits to:
//! - Transaction version and lock_time
//! - All input outpoints (txid + index)
//! - All outputs (value + pubkey_hash)
//! - The index of the input being signed
//!
//! Signatures and public keys are excluded from the sighash to avoid
//! circularity and allow inputs to be signed independently in any order.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::CryptoError;
use crate::types::{Hash256, Transaction};

/// Ed25519 keypair for signing transactions.
///
/// Wraps [`ed25519_dalek::SigningKey`]. The secret key is zeroized on drop
/// by the underlying library. Use [`KeyPair::generate`] for random keys or
/// [`KeyPair::from_secret_bytes`] for deterministic derivation from a seed.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from 32-byte secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&bytes),
        }
    }

    /// Derive the public key from this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Get the raw secret key bytes (32 bytes). Handle with care.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign a message, returning the raw 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.secret_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key for verifying signatures and deriving addresses.
///
/// The pubkey hash (BLAKE3 of the raw 32-byte key) is used in [`TxOutput`](crate::types::TxOutput)
/// to identify the recipient.
#[derive(Clone)]
pub struct PublicKey {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    /// Create a public key from raw bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying_key: vk })
    }

    /// Get the raw public key bytes (32 bytes).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Compute the BLAKE3 pubkey hash used in transaction outputs.
    pub fn pubkey_hash(&self) -> Hash256 {
        pubkey_hash(&self.to_bytes())
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<(), CryptoError> {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Compute the BLAKE3 pubkey hash from raw public key bytes.
///
/// This is the hash stored in [`TxOutput::pubkey_hash`](crate::types::TxOutput::pubkey_hash)
/// to identify the owner of an output.
pub fn pubkey_hash(pubkey_bytes: &[u8; 32]) -> Hash256 {
    Hash256(blake3::hash(pubkey_bytes).into())
}

/// Compute the signing hash (sighash) for a transaction input.
///
/// Commits to all inputs (outpoints only), all outputs, version, lock_time,
/// and the index of the input being signed. Signatures and public keys are
/// excluded to allow independent signing of each input.
pub fn signing_hash(tx: &Transaction, input_index: usize) -> Result<Hash256, CryptoError> {
    if input_index >= tx.inputs.len() {
        return Err(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        });
    }

    let mut data = Vec::new();

    // Version
    data.extend_from_slice(&tx.version.to_le_bytes());

    // All input outpoints (no signatures/pubkeys)
    data.extend_from_slice(&(tx.inputs.len() as u64).to_le_bytes());
    for input in &tx.inputs {
        data.extend_from_slice(input.previous_output.txid.as_bytes());
        data.extend_from_slice(&input.previous_output.index.to_le_bytes());
    }

    // All outputs
    data.extend_from_slice(&(tx.outputs.len() as u64).to_le_bytes());
    for output in &tx.outputs {
        data.extend_from_slice(&output.value.to_le_bytes());
        data.extend_from_slice(output.pubkey_hash.as_bytes());
    }

    // Lock time
    data.extend_from_slice(&tx.lock_time.to_le_bytes());

    // Input index being signed
    data.extend_from_slice(&(input_index as u64).to_le_bytes());

    Ok(Hash256(blake3::hash(&data).into()))
}

/// Sign a transaction input in place.
///
/// Computes the signing hash for the given input, signs it with the keypair,
/// and writes the signature and public key bytes into the input.
/// Inputs can be signed in any order since the sighash excludes signatures.
pub fn sign_transaction_input(
    tx: &mut Transaction,
    input_index: usize,
    keypair: &KeyPair,
) -> Result<(), CryptoError> {
    let sighash = signing_hash(tx, input_index)?;
    let signature = keypair.sign(sighash.as_bytes());
    let pubkey_bytes = keypair.public_key().to_bytes();

    tx.inputs[input_index].signature = signature.to_vec();
    tx.inputs[input_index].public_key = pubkey_bytes.to_vec();
    Ok(())
}

/// Verify a transaction input's signature against an expected pubkey hash.
///
/// Checks that:
/// 1. The input contains a valid 64-byte signature and 32-byte public key
/// 2. The public key's BLAKE3 hash matches `expected_pubkey_hash` (the UTXO owner)
/// 3. The Ed25519 signature verifies against the sighash
pub fn verify_transaction_input(
    tx: &Transaction,
    input_index: usize,
    expected_pubkey_hash: &Hash256,
) -> Result<(), CryptoError> {
    if input_index >= tx.inputs.len() {
        return Err(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        });
    }

    let input = &tx.inputs[input_index];

    // Parse public key (must be exactly 32 bytes)
    let pk_bytes: [u8; 32] = input
        .public_key
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let pk = PublicKey::from_bytes(&pk_bytes)?;

    // Verify pubkey hash matches the UTXO owner
    if pk.pubkey_hash() != *expected_pubkey_hash {
        return Err(CryptoError::PubkeyHashMismatch);
    }

    // Parse signature (must be exactly 64 bytes)
    let sig_bytes: [u8; 64] = input
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;

    // Compute sighash and verify signature
    let sighash = signing_hash(tx, input_index)?;
    pk.verify(sighash.as_bytes(), &sig_bytes)
}
