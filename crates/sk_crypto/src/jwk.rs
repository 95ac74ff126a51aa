//! EC JSON Web Keys (P-384) and RFC 7638 thumbprints.
//!
//! All public keys cross the wire as JWKs: `{kty:"EC", crv:"P-384", x, y}`
//! with base64url (no padding) 48-byte coordinates. Private keys carry an
//! additional `d` member and never leave the local store unwrapped.
//!
//! A key's **thumbprint** is base64url(SHA-256(canonical JSON of the
//! required members)) per RFC 7638. For EC keys the canonical form is
//! `{"crv","kty","x","y"}` in lexicographic member order with no
//! whitespace. Thumbprints are used as stable identifiers everywhere:
//! client ids, thread ids, storage keys.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p384::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p384::{EncodedPoint, FieldBytes, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;

/// Curve name on the wire.
pub const CRV_P384: &str = "P-384";
/// Key type on the wire.
pub const KTY_EC: &str = "EC";

/// P-384 field element size in bytes.
const FIELD_LEN: usize = 48;

/// An EC key in JWK form. `d` is present only on private keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct EcJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl EcJwk {
    /// Export a public key as a JWK.
    pub fn from_public_key(key: &PublicKey) -> Result<Self, CryptoError> {
        let point = key.to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| CryptoError::InvalidKey("Public key has no x coordinate".into()))?;
        let y = point
            .y()
            .ok_or_else(|| CryptoError::InvalidKey("Public key has no y coordinate".into()))?;
        Ok(Self {
            kty: KTY_EC.into(),
            crv: CRV_P384.into(),
            x: URL_SAFE_NO_PAD.encode(x),
            y: URL_SAFE_NO_PAD.encode(y),
            d: None,
        })
    }

    /// Export a secret key as a private JWK (includes `d`).
    pub fn from_secret_key(key: &SecretKey) -> Result<Self, CryptoError> {
        let mut jwk = Self::from_public_key(&key.public_key())?;
        let mut d = key.to_bytes();
        jwk.d = Some(URL_SAFE_NO_PAD.encode(d.as_slice()));
        d.as_mut_slice().zeroize();
        Ok(jwk)
    }

    /// Import the public half as a P-384 point.
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        self.check_curve()?;
        let x = decode_field(&self.x, "x")?;
        let y = decode_field(&self.y, "y")?;
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );
        Option::<PublicKey>::from(PublicKey::from_encoded_point(&point))
            .ok_or_else(|| CryptoError::InvalidKey("Coordinates are not a point on P-384".into()))
    }

    /// Import the private scalar. Fails if the JWK has no `d` member.
    pub fn to_secret_key(&self) -> Result<SecretKey, CryptoError> {
        self.check_curve()?;
        let d = self
            .d
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidKey("JWK has no private member".into()))?;
        let d = Zeroizing::new(decode_field(d, "d")?);
        SecretKey::from_bytes(FieldBytes::from_slice(&d))
            .map_err(|_| CryptoError::InvalidKey("Invalid P-384 private scalar".into()))
    }

    /// The public half of this key (strips `d`).
    pub fn to_public(&self) -> Self {
        Self {
            kty: self.kty.clone(),
            crv: self.crv.clone(),
            x: self.x.clone(),
            y: self.y.clone(),
            d: None,
        }
    }

    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// RFC 7638 thumbprint of the public members.
    ///
    /// The serde_json map sorts members lexicographically, which for EC
    /// keys is exactly the required `crv, kty, x, y` order.
    pub fn thumbprint(&self) -> Result<String, CryptoError> {
        self.check_curve()?;
        let canonical = serde_json::json!({
            "crv": self.crv,
            "kty": self.kty,
            "x": self.x,
            "y": self.y,
        });
        let bytes = serde_json::to_vec(&canonical)?;
        let digest = Sha256::digest(&bytes);
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    fn check_curve(&self) -> Result<(), CryptoError> {
        if self.kty != KTY_EC || self.crv != CRV_P384 {
            return Err(CryptoError::InvalidKey(format!(
                "Expected {}/{} JWK, got {}/{}",
                KTY_EC, CRV_P384, self.kty, self.crv
            )));
        }
        Ok(())
    }
}

fn decode_field(b64: &str, member: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = URL_SAFE_NO_PAD.decode(b64)?;
    if bytes.len() != FIELD_LEN {
        return Err(CryptoError::InvalidKey(format!(
            "JWK member {} must be {} bytes, got {}",
            member,
            FIELD_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn fixed_jwk() -> EcJwk {
        // Scalar 1 is a valid P-384 secret; gives a deterministic key.
        let mut d = [0u8; 48];
        d[47] = 1;
        let secret = SecretKey::from_bytes(FieldBytes::from_slice(&d)).unwrap();
        EcJwk::from_secret_key(&secret).unwrap()
    }

    #[test]
    fn public_key_roundtrip() {
        let jwk = fixed_jwk().to_public();
        let key = jwk.to_public_key().unwrap();
        let again = EcJwk::from_public_key(&key).unwrap();
        assert_eq!(jwk, again);
    }

    #[test]
    fn secret_key_roundtrip() {
        let jwk = fixed_jwk();
        let key = jwk.to_secret_key().unwrap();
        let again = EcJwk::from_secret_key(&key).unwrap();
        assert_eq!(jwk, again);
    }

    #[test]
    fn thumbprint_matches_canonical_form() {
        let jwk = fixed_jwk();
        // Independent construction of the RFC 7638 canonical JSON.
        let canonical = format!(
            r#"{{"crv":"P-384","kty":"EC","x":"{}","y":"{}"}}"#,
            jwk.x, jwk.y
        );
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()));
        assert_eq!(jwk.thumbprint().unwrap(), expected);
    }

    #[test]
    fn thumbprint_ignores_private_member() {
        let jwk = fixed_jwk();
        assert_eq!(
            jwk.thumbprint().unwrap(),
            jwk.to_public().thumbprint().unwrap()
        );
    }

    #[test]
    fn rejects_wrong_curve() {
        let mut jwk = fixed_jwk().to_public();
        jwk.crv = "P-256".into();
        assert!(jwk.to_public_key().is_err());
        assert!(jwk.thumbprint().is_err());
    }

    #[test]
    fn rejects_truncated_coordinate() {
        let mut jwk = fixed_jwk().to_public();
        jwk.x = URL_SAFE_NO_PAD.encode([0u8; 32]);
        assert!(jwk.to_public_key().is_err());
    }
}
