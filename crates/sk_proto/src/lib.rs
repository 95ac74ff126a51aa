//! sk_proto — Wire types and serialisation for Skein
//!
//! Every signed artifact in the protocol travels as a compact JWS string
//! (RFC 7515): invitations, thread replies, self-encrypted backups, and
//! identity backups. Payloads are JSON and versioned by shape; public
//! keys are embedded as EC JWKs.
//!
//! # Modules
//! - `jws`     — compact JWS envelope: sign, decode, verify
//! - `message` — invitation / reply / self-encrypted payload schemas
//! - `error`   — unified error type

pub mod error;
pub mod jws;
pub mod message;

pub use error::ProtoError;
pub use jws::{Header, Jws};
pub use message::{
    BackupPayload, InvitationPayload, ReplyPayload, SelfEncryptedPayload, MAX_MESSAGE_ID,
};
