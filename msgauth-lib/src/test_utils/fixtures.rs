//! Deterministic keypair and AID fixtures for tests.

use ed25519_dalek::{Signer, SigningKey};

use crate::aid::Aid;
use crate::keystate::KeyState;

/// A deterministic Ed25519 keypair plus its derived AID, for tests that
/// need a stable identity across runs.
pub struct TestIdentity {
    pub signing_key: SigningKey,
    pub aid: Aid,
}

impl TestIdentity {
    /// Derive a deterministic identity from a seed byte. Different seeds
    /// yield different (but always the same, for the same seed) keys.
    pub fn from_seed(seed: u8) -> Self {
        let bytes = [seed; 32];
        let signing_key = SigningKey::from_bytes(&bytes);
        let aid = Aid::from_public_key(&signing_key.verifying_key().to_bytes());
        Self { signing_key, aid }
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// A single-key `KeyState` for this identity at the given `ksn`.
    pub fn key_state(&self, ksn: u64) -> KeyState {
        KeyState {
            aid: self.aid.clone(),
            ksn,
            keys: vec![self.signing_key.verifying_key().to_bytes()],
            threshold: "1".to_string(),
            last_event_said: format!("Esaid{ksn}"),
            updated_at: 0,
        }
    }
}

/// Two well-known test identities, named for readability in test bodies.
pub fn alice() -> TestIdentity {
    TestIdentity::from_seed(0xA1)
}

pub fn bob() -> TestIdentity {
    TestIdentity::from_seed(0xB0)
}

pub fn mallory() -> TestIdentity {
    TestIdentity::from_seed(0xFF)
}
