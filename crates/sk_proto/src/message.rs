//! Payload schemas carried inside JWS envelopes.
//!
//! Field names follow the wire format exactly (camelCase where
//! multi-word). Binary fields are base64url without padding; decoding of
//! the `iv` field additionally tolerates standard base64 for artifacts
//! written by older encoders, and always requires exactly 12 decoded
//! bytes.
//!
//! Message ids are hex-encoded non-negative integers below
//! [`MAX_MESSAGE_ID`], strictly increasing by 1 along a thread.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use sk_crypto::aead::IV_LEN;
use sk_crypto::EcJwk;

use crate::error::ProtoError;

/// Exclusive ceiling for message ids: 2^53 / 2.
///
/// Ids never wrap; a thread whose counter would reach this value can no
/// longer produce messages.
pub const MAX_MESSAGE_ID: u64 = 1 << 52;

pub fn format_message_id(id: u64) -> String {
    format!("{id:x}")
}

pub fn parse_message_id(hex: &str) -> Result<u64, ProtoError> {
    u64::from_str_radix(hex, 16)
        .map_err(|e| ProtoError::Malformed(format!("Bad message id {hex:?}: {e}")))
}

fn decode_b64url(field: &str, value: &str) -> Result<Vec<u8>, ProtoError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| ProtoError::Malformed(format!("Bad base64 in {field}: {e}")))
}

/// Tolerant decode for `iv`: base64url first, standard base64 second.
/// Anything but 12 decoded bytes is a malformed envelope.
fn decode_iv(value: &str) -> Result<Vec<u8>, ProtoError> {
    let iv = URL_SAFE_NO_PAD
        .decode(value)
        .or_else(|_| STANDARD.decode(value))
        .map_err(|e| ProtoError::Malformed(format!("Bad base64 in iv: {e}")))?;
    if iv.len() != IV_LEN {
        return Err(ProtoError::Malformed(format!(
            "IV must be {IV_LEN} bytes, got {}",
            iv.len()
        )));
    }
    Ok(iv)
}

// ── Invitation ───────────────────────────────────────────────────────────────

/// Signed by the inviter's identity key; the header embeds the inviter's
/// identity public JWK. `epk` is the inviter's fresh per-thread key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationPayload {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub epk: EcJwk,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl InvitationPayload {
    pub fn message_id_value(&self) -> Result<u64, ProtoError> {
        parse_message_id(&self.message_id)
    }
}

// ── Thread reply ─────────────────────────────────────────────────────────────

/// One encrypted message on a thread.
///
/// `re` addresses the recipient's copy of the thread: the invitation
/// thumbprint on the first reply, the peer's thread thumbprint after
/// that. Only the first reply carries `epk` (and a self-signed header),
/// bootstrapping the replier's half of the DH exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub re: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// AES-GCM ciphertext, base64url.
    pub message: String,
    pub iv: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epk: Option<EcJwk>,
}

impl ReplyPayload {
    pub fn message_id_value(&self) -> Result<u64, ProtoError> {
        parse_message_id(&self.message_id)
    }

    pub fn ciphertext(&self) -> Result<Vec<u8>, ProtoError> {
        decode_b64url("message", &self.message)
    }

    pub fn iv_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        decode_iv(&self.iv)
    }
}

// ── Self-encrypted record ────────────────────────────────────────────────────

/// Data encrypted by a client to itself: a fresh `epk` paired with the
/// client's long-term storage key. Used to back up thread private keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfEncryptedPayload {
    pub message: String,
    pub iv: String,
    pub epk: EcJwk,
}

impl SelfEncryptedPayload {
    pub fn ciphertext(&self) -> Result<Vec<u8>, ProtoError> {
        decode_b64url("message", &self.message)
    }

    pub fn iv_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        decode_iv(&self.iv)
    }
}

// ── Identity backup ──────────────────────────────────────────────────────────

/// Offline backup of an identity record, wrapped under a password and
/// signed by the identity key it contains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupPayload {
    pub thumbprint: String,
    /// Password-wrapped JSON of the identity record.
    pub record: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_hex_roundtrip() {
        assert_eq!(format_message_id(0x1a2b), "1a2b");
        assert_eq!(parse_message_id("1a2b").unwrap(), 0x1a2b);
        assert!(parse_message_id("not-hex").is_err());
        assert!(parse_message_id("").is_err());
    }

    #[test]
    fn max_message_id_is_half_of_2_pow_53() {
        assert_eq!(MAX_MESSAGE_ID, 4_503_599_627_370_496);
    }

    #[test]
    fn reply_wire_names_are_camel_case() {
        let payload = ReplyPayload {
            re: "tp".into(),
            message_id: "ff".into(),
            message: URL_SAFE_NO_PAD.encode(b"ct"),
            iv: URL_SAFE_NO_PAD.encode([0u8; 12]),
            epk: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("messageId").is_some());
        assert!(json.get("message_id").is_none());
        // Absent epk is skipped entirely, not serialised as null.
        assert!(json.get("epk").is_none());
    }

    #[test]
    fn iv_decode_tolerates_standard_base64() {
        let iv = [0xfbu8; 12];
        let payload = SelfEncryptedPayload {
            message: URL_SAFE_NO_PAD.encode(b"ct"),
            iv: STANDARD.encode(iv),
            epk: placeholder_jwk(),
        };
        assert_eq!(payload.iv_bytes().unwrap(), iv.to_vec());

        let payload = SelfEncryptedPayload {
            iv: URL_SAFE_NO_PAD.encode(iv),
            ..payload
        };
        assert_eq!(payload.iv_bytes().unwrap(), iv.to_vec());
    }

    #[test]
    fn iv_decode_rejects_wrong_length() {
        for bad in [[0u8; 8].as_slice(), [0u8; 16].as_slice(), &[]] {
            let payload = SelfEncryptedPayload {
                message: URL_SAFE_NO_PAD.encode(b"ct"),
                iv: URL_SAFE_NO_PAD.encode(bad),
                epk: placeholder_jwk(),
            };
            assert!(matches!(
                payload.iv_bytes(),
                Err(ProtoError::Malformed(_))
            ));
        }
    }

    #[test]
    fn invitation_optional_fields() {
        let json = serde_json::json!({
            "messageId": "abc",
            "epk": serde_json::to_value(placeholder_jwk()).unwrap(),
        });
        let payload: InvitationPayload = serde_json::from_value(json).unwrap();
        assert!(payload.note.is_none());
        assert!(payload.nickname.is_none());
        assert_eq!(payload.message_id_value().unwrap(), 0xabc);
    }

    fn placeholder_jwk() -> EcJwk {
        EcJwk {
            kty: "EC".into(),
            crv: "P-384".into(),
            x: URL_SAFE_NO_PAD.encode([1u8; 48]),
            y: URL_SAFE_NO_PAD.encode([2u8; 48]),
            d: None,
        }
    }
}
