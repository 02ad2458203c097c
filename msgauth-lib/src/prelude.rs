//! Convenience re-exports.
//!
//! ```
//! use msgauth_lib::prelude::*;
//! ```

pub use crate::aid::Aid;
pub use crate::canonical::{canonicalize, canonicalize_value, without_key};
pub use crate::config::Config;
pub use crate::crypto::{
    base64url_decode, base64url_encode, sha256, sha256_hex, verify, verify_b64,
};
pub use crate::errors::{
    AuthError, AuthErrorCode, AuthorizationReason, ChallengeReason, ResourceKind,
    ValidationReason,
};
pub use crate::keystate::{CachedKeyStateStore, InMemoryKeyStateStore, KeyState, KeyStateStore};
pub use crate::Result;
