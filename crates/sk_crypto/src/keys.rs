//! P-384 keypairs: ECDSA signing and ECDH agreement.
//!
//! Signatures are raw 96-byte `r || s` values over SHA-384 (the ES384
//! JWS algorithm). Agreement keys feed [`derive_shared`], which turns an
//! ECDH shared secret into a 256-bit AES-GCM key via HKDF-SHA256 with a
//! fixed domain-separation string, so both sides of an exchange derive
//! the same key from swapped (private, public) halves.

use hkdf::Hkdf;
use p384::ecdsa::signature::{Signer, Verifier};
use p384::ecdsa::{Signature, SigningKey, VerifyingKey};
use p384::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::jwk::EcJwk;

/// Domain separation for thread key derivation.
const SHARED_KEY_INFO: &[u8] = b"sk-thread-key-v1";

/// Raw ECDSA P-384 signature length (r || s).
pub const SIGNATURE_LEN: usize = 96;

// ── Signing keypair ──────────────────────────────────────────────────────────

/// Long-term ECDSA P-384 signing key. The secret scalar zeroizes on drop.
pub struct SigningKeyPair {
    secret: SecretKey,
    signing: SigningKey,
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let signing = SigningKey::from(secret.clone());
        Self { secret, signing }
    }

    pub fn from_jwk(jwk: &EcJwk) -> Result<Self, CryptoError> {
        let secret = jwk.to_secret_key()?;
        let signing = SigningKey::from(secret.clone());
        Ok(Self { secret, signing })
    }

    pub fn public_jwk(&self) -> Result<EcJwk, CryptoError> {
        EcJwk::from_public_key(&self.secret.public_key())
    }

    pub fn private_jwk(&self) -> Result<EcJwk, CryptoError> {
        EcJwk::from_secret_key(&self.secret)
    }

    /// Sign arbitrary bytes; returns the raw 96-byte `r || s` signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing.sign(msg);
        signature.to_bytes().to_vec()
    }

    /// Verify a raw signature made by any P-384 public key.
    pub fn verify(public: &EcJwk, msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
        let key = VerifyingKey::from(public.to_public_key()?);
        let signature = Signature::from_slice(sig_bytes).map_err(|_| {
            CryptoError::InvalidKey(format!("Signature must be {} bytes (r||s)", SIGNATURE_LEN))
        })?;
        key.verify(msg, &signature)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

// ── Agreement keypair ────────────────────────────────────────────────────────

/// ECDH P-384 keypair. Used for the long-term storage key and for the
/// ephemeral per-thread and self-encryption keys.
pub struct AgreementKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl AgreementKeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn from_jwk(jwk: &EcJwk) -> Result<Self, CryptoError> {
        let secret = jwk.to_secret_key()?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    pub fn public_jwk(&self) -> Result<EcJwk, CryptoError> {
        EcJwk::from_public_key(&self.public)
    }

    pub fn private_jwk(&self) -> Result<EcJwk, CryptoError> {
        EcJwk::from_secret_key(&self.secret)
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

// ── Shared secret ────────────────────────────────────────────────────────────

/// 256-bit AES-GCM key derived from an ECDH exchange. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SharedKey(pub [u8; 32]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Derive the symmetric key for a DH pair.
///
/// `derive_shared(a_priv, b_pub)` equals `derive_shared(b_priv, a_pub)`.
pub fn derive_shared(secret: &SecretKey, public: &PublicKey) -> Result<SharedKey, CryptoError> {
    let shared = p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let hk = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());
    let mut key = [0u8; 32];
    hk.expand(SHARED_KEY_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(SharedKey(key))
}
