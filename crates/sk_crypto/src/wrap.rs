//! Password-based key wrapping: PBKDF2-HMAC-SHA256 + AES-256-GCM.
//!
//! Private JWKs at rest (the identity signing key and the storage
//! agreement key) are wrapped under the user's password. The opaque blob
//! is `base64url(salt || iv || ciphertext+tag)` with a fresh 32-byte salt
//! and 12-byte IV per wrap, so wrapping the same key twice never yields
//! the same blob.
//!
//! A wrong password surfaces as `BadPassword` (the GCM tag cannot
//! authenticate under a key derived from the wrong password).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::aead::{self, IV_LEN};
use crate::error::CryptoError;
use crate::jwk::EcJwk;

pub const SALT_LEN: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 210_000;

fn derive_wrapping_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::KeyDerivation(
            "Password must not be empty".into(),
        ));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key);
    Ok(key)
}

/// Wrap arbitrary secret bytes under a password.
pub fn wrap_bytes(plaintext: &[u8], password: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let key = derive_wrapping_key(password, &salt)?;
    let iv = aead::random_iv();
    let ciphertext = aead::encrypt(&key, &iv, plaintext)?;

    let mut blob = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(blob))
}

/// Reverse of [`wrap_bytes`]. Fails `BadPassword` when the password does
/// not authenticate the blob.
pub fn unwrap_bytes(blob: &str, password: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let bytes = URL_SAFE_NO_PAD.decode(blob)?;
    if bytes.len() < SALT_LEN + IV_LEN {
        return Err(CryptoError::InvalidKey("Wrapped key blob too short".into()));
    }
    let (salt, rest) = bytes.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);

    let key = derive_wrapping_key(password, salt)?;
    aead::decrypt(&key, iv, ciphertext).map_err(|_| CryptoError::BadPassword)
}

/// Wrap a private JWK (must carry `d`) under a password.
pub fn wrap_private(jwk: &EcJwk, password: &str) -> Result<String, CryptoError> {
    if !jwk.is_private() {
        return Err(CryptoError::InvalidKey(
            "Refusing to wrap a public JWK".into(),
        ));
    }
    let serialized = Zeroizing::new(serde_json::to_vec(jwk)?);
    wrap_bytes(&serialized, password)
}

/// Reverse of [`wrap_private`].
pub fn unwrap_private(blob: &str, password: &str) -> Result<EcJwk, CryptoError> {
    let plaintext = unwrap_bytes(blob, password)?;
    let jwk: EcJwk = serde_json::from_slice(&plaintext)
        .map_err(|_| CryptoError::InvalidKey("Wrapped blob is not a JWK".into()))?;
    Ok(jwk)
}
