//! sk_client — the Skein protocol engine
//!
//! A client owns one long-lived identity (ECDSA signing key + ECDH
//! storage key, both password-wrapped at rest) and any number of message
//! threads. Each thread is keyed by one ephemeral ECDH exchange, so
//! compromise of one thread never leaks another. All signed artifacts
//! travel as compact JWS strings; transport is the host's problem.
//!
//! The engine is synchronous and keeps no interior locks: operations on
//! the same thread must be issued serially by the caller (two concurrent
//! `reply_to_thread` calls race on the thread's message counter).
//!
//! # Modules
//! - `client`       — identity lifecycle: generate, load, backup
//! - `self_encrypt` — encrypting data to one's own storage key
//! - `thread`       — invitations, replies, ingest, thread state
//! - `error`        — unified error type

pub mod client;
pub mod error;
pub mod self_encrypt;
pub mod thread;

pub use client::Client;
pub use error::ClientError;
pub use thread::{InvitationOptions, ReceivedMessage, ThreadSecret, ThreadState};
