//! Configuration for the authenticated mutation pipeline (§6 of the
//! external interfaces).

use serde::{Deserialize, Serialize};

/// Core configuration, deserializable from whatever config format the
/// embedding application uses (file, env, etc — this crate only defines
/// the shape and the defaults).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// URL of the backing document store. Required — no default.
    pub backend_url: String,

    /// This server's origin, used as the `aud` claim in challenge
    /// payloads and receipt signature payloads.
    pub server_origin: String,

    /// Challenge lifetime in milliseconds.
    #[serde(default = "default_challenge_ttl_ms")]
    pub challenge_ttl_ms: u32,

    /// Maximum allowed clock skew between challenge issuance and proof,
    /// in milliseconds.
    #[serde(default = "default_challenge_skew_ms")]
    pub challenge_skew_ms: u32,

    /// Maximum allowed clock skew for per-request signatures, in
    /// milliseconds.
    #[serde(default = "default_signature_skew_ms")]
    pub signature_skew_ms: u32,

    /// Replay-ledger nonce retention, in milliseconds.
    #[serde(default = "default_nonce_ttl_ms")]
    pub nonce_ttl_ms: u32,

    /// Default envelope TTL when a sender does not specify one, in
    /// milliseconds.
    #[serde(default = "default_envelope_ttl_ms")]
    pub envelope_ttl_default_ms: u32,

    /// Key-state read-cache TTL, in milliseconds.
    #[serde(default = "default_keystate_cache_ttl_ms")]
    pub keystate_cache_ttl_ms: u32,
}

fn default_challenge_ttl_ms() -> u32 {
    120_000
}

fn default_challenge_skew_ms() -> u32 {
    120_000
}

fn default_signature_skew_ms() -> u32 {
    300_000
}

fn default_nonce_ttl_ms() -> u32 {
    600_000
}

fn default_envelope_ttl_ms() -> u32 {
    86_400_000
}

fn default_keystate_cache_ttl_ms() -> u32 {
    60_000
}

impl Config {
    /// Create a config with only the two required fields set and every
    /// other option at its spec-mandated default.
    pub fn new(backend_url: impl Into<String>, server_origin: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            server_origin: server_origin.into(),
            challenge_ttl_ms: default_challenge_ttl_ms(),
            challenge_skew_ms: default_challenge_skew_ms(),
            signature_skew_ms: default_signature_skew_ms(),
            nonce_ttl_ms: default_nonce_ttl_ms(),
            envelope_ttl_default_ms: default_envelope_ttl_ms(),
            keystate_cache_ttl_ms: default_keystate_cache_ttl_ms(),
        }
    }

    pub fn with_challenge_ttl_ms(mut self, ms: u32) -> Self {
        self.challenge_ttl_ms = ms;
        self
    }

    pub fn with_nonce_ttl_ms(mut self, ms: u32) -> Self {
        self.nonce_ttl_ms = ms;
        self
    }

    pub fn with_envelope_ttl_default_ms(mut self, ms: u32) -> Self {
        self.envelope_ttl_default_ms = ms;
        self
    }
}
