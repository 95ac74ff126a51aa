//! Compact JWS envelopes (RFC 7515), ES384 only.
//!
//! Wire form: `base64url(header) . base64url(payload) . base64url(sig)`
//! where the signature is the raw 96-byte P-384 `r || s` over the ASCII
//! signing input (the first two segments joined by a dot).
//!
//! Verification modes:
//! - a supplied public JWK always wins;
//! - otherwise the `jwk` embedded in the header, if any;
//! - otherwise the envelope can only be decoded, not verified.
//!
//! Decoding without verification is deliberate: the thread engine must
//! read the `re` field of an incoming reply before it can decide which
//! key verifies it. Callers MUST verify before persisting anything
//! derived from the payload.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use sk_crypto::{CryptoError, EcJwk, SigningKeyPair};

use crate::error::ProtoError;

/// The only algorithm this protocol signs with.
pub const ALG_ES384: &str = "ES384";

/// JWS protected header. `jwk` is embedded on self-signed envelopes
/// (invitations, first replies, self-encrypted records).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<EcJwk>,
}

impl Header {
    pub fn bare() -> Self {
        Self {
            alg: ALG_ES384.into(),
            jwk: None,
        }
    }

    /// Header with an embedded public key, always stripped of any `d`.
    pub fn with_key(jwk: &EcJwk) -> Self {
        Self {
            alg: ALG_ES384.into(),
            jwk: Some(jwk.to_public()),
        }
    }
}

/// A decoded envelope. Holds the signing input and signature so it can
/// be verified after inspection.
#[derive(Debug, Clone)]
pub struct Jws<T> {
    pub header: Header,
    pub payload: T,
    signing_input: String,
    signature: Vec<u8>,
}

impl<T> Jws<T> {
    /// Verify against an explicit public key.
    pub fn verify_with(&self, public: &EcJwk) -> Result<(), ProtoError> {
        match SigningKeyPair::verify(public, self.signing_input.as_bytes(), &self.signature) {
            Ok(()) => Ok(()),
            Err(CryptoError::SignatureVerification) => Err(ProtoError::Signature),
            Err(other) => Err(ProtoError::Crypto(other)),
        }
    }

    /// Verify against the header's embedded `jwk`.
    pub fn verify_embedded(&self) -> Result<(), ProtoError> {
        let jwk = self
            .header
            .jwk
            .as_ref()
            .ok_or(ProtoError::NoVerificationKey)?;
        self.verify_with(jwk)
    }

    /// Verify with `public` when supplied, else the embedded key.
    pub fn verify(&self, public: Option<&EcJwk>) -> Result<(), ProtoError> {
        match public {
            Some(key) => self.verify_with(key),
            None => self.verify_embedded(),
        }
    }
}

/// Sign `payload` under `header`, producing the compact wire string.
pub fn sign<T: Serialize>(
    header: &Header,
    payload: &T,
    key: &SigningKeyPair,
) -> Result<String, ProtoError> {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).map_err(CryptoError::from)?);
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).map_err(CryptoError::from)?);
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// Decode a compact JWS without verifying it.
pub fn decode<T: DeserializeOwned>(jws: &str) -> Result<Jws<T>, ProtoError> {
    let mut parts = jws.split('.');
    let (header_b64, payload_b64, sig_b64) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => {
            return Err(ProtoError::Malformed(
                "Expected three dot-separated segments".into(),
            ))
        }
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| ProtoError::Malformed(format!("Bad header encoding: {e}")))?;
    let header: Header = serde_json::from_slice(&header_bytes)
        .map_err(|e| ProtoError::Malformed(format!("Bad header JSON: {e}")))?;
    if header.alg != ALG_ES384 {
        return Err(ProtoError::Malformed(format!(
            "Unsupported alg {:?}",
            header.alg
        )));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| ProtoError::Malformed(format!("Bad payload encoding: {e}")))?;
    let payload: T = serde_json::from_slice(&payload_bytes)
        .map_err(|e| ProtoError::Malformed(format!("Bad payload JSON: {e}")))?;

    let signature = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| ProtoError::Malformed(format!("Bad signature encoding: {e}")))?;

    Ok(Jws {
        header,
        payload,
        signing_input: format!("{header_b64}.{payload_b64}"),
        signature,
    })
}

/// Decode and verify in one step.
///
/// With no key and no embedded `jwk`, the payload is returned
/// **unverified**; the caller takes over the verification obligation.
pub fn parse<T: DeserializeOwned>(
    jws: &str,
    public: Option<&EcJwk>,
) -> Result<Jws<T>, ProtoError> {
    let decoded = decode::<T>(jws)?;
    match public {
        Some(key) => decoded.verify_with(key)?,
        None => {
            if decoded.header.jwk.is_some() {
                decoded.verify_embedded()?;
            }
        }
    }
    Ok(decoded)
}

/// Boolean verification of an opaque envelope.
pub fn verify(jws: &str, public: Option<&EcJwk>) -> bool {
    match decode::<serde_json::Value>(jws) {
        Ok(decoded) => decoded.verify(public).is_ok(),
        Err(_) => false,
    }
}
