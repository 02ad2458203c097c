//! AID — Autonomic Identifier.
//!
//! An AID is the self-certifying identifier prefix character `D` followed
//! by the base64url (unpadded) encoding of a 32-byte Ed25519 public key.
//! It is derivable offline from the public key alone; the server never
//! mints one, it only validates that a caller-declared AID matches the
//! public key presented alongside it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::{base64url_decode, base64url_encode};
use crate::errors::{AuthError, ValidationReason};

/// Non-transferable basic derivation prefix, matching the `D` code used
/// by self-certifying identifier schemes for Ed25519 public keys.
const AID_PREFIX: char = 'D';

/// A self-certifying autonomic identifier, `D||base64url(pubkey)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Aid(String);

impl Aid {
    /// Derive the AID for a raw 32-byte Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(format!("{AID_PREFIX}{}", base64url_encode(public_key)))
    }

    /// Parse and validate an AID string, checking the prefix and that the
    /// remainder decodes to exactly 32 bytes. Does not verify anything
    /// about the corresponding private key — an AID is just an encoding.
    pub fn parse(s: &str) -> Result<Self, AuthError> {
        let mut chars = s.chars();
        match chars.next() {
            Some(AID_PREFIX) => {}
            _ => {
                return Err(AuthError::validation_with_hint(
                    ValidationReason::SigMalformed,
                    "AID must start with 'D'",
                ))
            }
        }
        let rest = chars.as_str();
        let decoded = base64url_decode(rest)?;
        if decoded.len() != 32 {
            return Err(AuthError::validation_with_hint(
                ValidationReason::SigMalformed,
                "AID must encode a 32-byte Ed25519 public key",
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// The raw 32-byte Ed25519 public key this AID encodes.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        let decoded = base64url_decode(&self.0[1..]).expect("validated at construction");
        decoded.try_into().expect("validated at construction")
    }

    /// Returns true iff this AID is the one that would be derived from
    /// `public_key` — the core's one authentication-relevant identity
    /// check for self-certifying identifiers.
    pub fn matches_public_key(&self, public_key: &[u8; 32]) -> bool {
        *self == Self::from_public_key(public_key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Aid {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Aid {
    type Error = AuthError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Aid> for String {
    fn from(aid: Aid) -> Self {
        aid.0
    }
}

impl AsRef<str> for Aid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
