//! Namespaced storage keys.
//!
//! Every key is `<namespace>:<thumbprint>`. Call sites never concatenate
//! strings by hand.

/// `identity:<client thumbprint>` → [`crate::models::IdentityRecord`].
pub fn identity(thumbprint: &str) -> String {
    format!("identity:{thumbprint}")
}

/// `invitation:<epk thumbprint>` → signed invitation JWS.
/// Exists only on the inviter's side.
pub fn invitation(epk_thumbprint: &str) -> String {
    format!("invitation:{epk_thumbprint}")
}

/// `public-key:<thumbprint>` → counterparty identity public JWK.
pub fn public_key(thumbprint: &str) -> String {
    format!("public-key:{thumbprint}")
}

/// `thread-info:<thread thumbprint>` → [`crate::models::ThreadInfo`].
pub fn thread_info(thread_thumbprint: &str) -> String {
    format!("thread-info:{thread_thumbprint}")
}

/// `encrypted-thread-key:<thread thumbprint>` → self-encrypted JWS
/// holding the thread's ECDH keypair.
pub fn encrypted_thread_key(thread_thumbprint: &str) -> String {
    format!("encrypted-thread-key:{thread_thumbprint}")
}

/// `threads:<client thumbprint>` → list of thread thumbprints.
pub fn threads(client_thumbprint: &str) -> String {
    format!("threads:{client_thumbprint}")
}

/// `messages:<thread thumbprint>` → append-only list of JWS strings.
pub fn messages(thread_thumbprint: &str) -> String {
    format!("messages:{thread_thumbprint}")
}

/// `message-id:<thread thumbprint>` → current hex counter.
pub fn message_id(thread_thumbprint: &str) -> String {
    format!("message-id:{thread_thumbprint}")
}
