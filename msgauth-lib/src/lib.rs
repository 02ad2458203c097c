//! Core primitives for the AID-authenticated messaging core.
//!
//! This crate is the leaf layer: it has no knowledge of mutations,
//! challenges, or envelopes. It provides the building blocks the protocol
//! crate composes:
//!
//! - [`canonical`] — deterministic canonicalization, the bit-exact
//!   interop boundary every hash and signature payload is computed over.
//! - [`crypto`] — Ed25519 sign/verify, SHA-256, base64url.
//! - [`aid`] — the self-certifying `Aid` identifier type.
//! - [`keystate`] — the authoritative AID→key-state mapping and its
//!   storage seam.
//! - [`config`] — typed configuration for the options in the external
//!   interface.
//! - [`errors`] — the single structured error type shared by every layer.
//!
//! # Example
//!
//! ```
//! use msgauth_lib::prelude::*;
//!
//! let message = canonicalize(&serde_json::json!({"hello": "world"})).unwrap();
//! assert_eq!(message, r#"{"hello":"world"}"#);
//! ```

pub mod aid;
pub mod canonical;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod keystate;
pub mod prelude;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aid::Aid;
pub use config::Config;
pub use errors::{AuthError, AuthErrorCode};
pub use keystate::{CachedKeyStateStore, InMemoryKeyStateStore, KeyState, KeyStateStore};

/// Common result alias for this crate's operations.
pub type Result<T> = std::result::Result<T, AuthError>;
