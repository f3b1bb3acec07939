//! AES-256-GCM wallet file encryption.
//!
//! Phase 1 uses BLAKE3 for password-based key derivation. This is fast but
//! not memory-hard, making it less resistant to brute-force attacks than
//! argon2. Production wallets should upgrade to argon2id in Phase 2.
//!
//! # Wire format
//! ```text
//! salt (32 bytes) || nonce (12 bytes) || ciphertext + auth_tag
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::WalletError;

/// BLAKE3 KDF context for password-derived encryption keys.
const PASSWORD_KDF_CONTEXT: &str = "rill-wallet-password-kdf-v1";

/// Salt length in bytes.
const SALT_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Minimum encrypted payload size (salt + nonce + auth tag).
const MIN_ENCRYPTED_LEN: usize = SALT_LEN + NONCE_LEN + 16;

/// Derive a 256-bit encryption key from a password and salt using BLAKE3.
///
/// Phase 1: BLAKE3 derive_key is fast but not memory-hard.
/// TODO: Replace with argon2id for production wallet files.
pub fn derive_key(password: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(password.len() + salt.len());
    ikm.extend_from_slice(password);
    ikm.extend_from_slice(salt);
    blake3::derive_key(PASSWORD_KDF_CONTEXT, &ikm)
}

/// Encrypt plaintext with a password using AES-256-GCM.
///
/// Generates a random 32-byte salt and 12-byte nonce. Returns
/// `salt || nonce || ciphertext+tag`.
pub fn encrypt(plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data that was encrypted with [`encrypt`].
///
/// Parses the salt and nonce from the header, derives the key from the
/// password, and decrypts the ciphertext. Returns [`WalletError::InvalidPassword`]
/// if the password is wrong (authentication tag mismatch).
pub fn decrypt(encrypted: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    if encrypted.len() < MIN_ENCRYPTED_LEN {
        return Err(WalletError::CorruptedFile(format!(
            "encrypted data too short: {} < {MIN_ENCRYPTED_LEN}",
            encrypted.len()
        )));
    }

    let salt = &encrypted[..SALT_LEN];
    let nonce_bytes = &encrypted[SALT_LEN..SALT_LEN + NONCE_LEN];
    let ciphertext = &encrypted[SALT_LEN + NONCE_LEN..];

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| WalletError::Decryption(e.to_string()))?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| WalletError::InvalidPassword)
}
