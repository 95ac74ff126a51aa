//! Authenticated encryption: AES-256-GCM.
//!
//! Key size: 32 bytes. IV: 12 bytes (random, carried alongside the
//! ciphertext on the wire). Tag: 16 bytes, appended to the ciphertext.
//!
//! Unlike a nonce-prefixed wire format, the IV here is explicit: the
//! envelope payloads carry it as a separate field, so encrypt/decrypt
//! take it as an argument. IVs MUST never be reused under the same key;
//! [`random_iv`] draws fresh bytes from the OS CSPRNG per operation.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Fresh random 12-byte IV.
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext`; returns ciphertext with the 16-byte tag appended.
pub fn encrypt(key: &[u8; 32], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::AeadEncrypt);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Decrypt `ciphertext` (tag appended). Every failure, a wrong-length IV
/// included, surfaces as `AeadDecrypt`.
pub fn decrypt(
    key: &[u8; 32],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}
