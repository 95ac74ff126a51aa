//! sk_crypto — Skein cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Public APIs return opaque newtypes to prevent accidental misuse.
//!
//! # Module layout
//! - `keys`  — P-384 ECDSA signing keypairs, ECDH agreement keypairs,
//!             shared-secret derivation
//! - `jwk`   — EC JWK import/export + RFC 7638 thumbprints
//! - `aead`  — AES-256-GCM encrypt/decrypt helpers
//! - `wrap`  — password-based private key wrapping (PBKDF2 + AES-GCM)
//! - `error` — unified error type

pub mod aead;
pub mod error;
pub mod jwk;
pub mod keys;
pub mod wrap;

pub use error::CryptoError;
pub use jwk::EcJwk;
pub use keys::{AgreementKeyPair, SharedKey, SigningKeyPair};
