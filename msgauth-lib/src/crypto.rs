//! Cryptographic primitives: Ed25519 sign/verify, SHA-256, base64url.
//!
//! Everything here is a thin, testable wrapper around `ed25519-dalek` and
//! `sha2` — no protocol logic lives in this module, only the primitives
//! the protocol layer composes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::errors::AuthError;

/// SHA-256 of arbitrary bytes.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// SHA-256 of bytes, hex-encoded (used for `args-hash` on the wire).
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// Encode bytes as unpadded base64url, the encoding used for AIDs and
/// detached signatures on the wire.
pub fn base64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url bytes.
pub fn base64url_decode(s: &str) -> Result<Vec<u8>, AuthError> {
    URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| AuthError::validation_with_hint(
            crate::errors::ValidationReason::SigMalformed,
            format!("invalid base64url: {e}"),
        ))
}

/// Parse a 32-byte Ed25519 public key from raw bytes.
pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, AuthError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AuthError::signature_with_hint("public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|e| AuthError::signature_with_hint(format!("invalid public key: {e}")))
}

/// Parse a 64-byte Ed25519 signature from raw bytes.
pub fn signature_from_bytes(bytes: &[u8]) -> Result<Signature, AuthError> {
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| AuthError::signature_with_hint("signature must be 64 bytes"))?;
    Ok(Signature::from_bytes(&arr))
}

/// Verify an Ed25519 signature over `message` under `public_key_bytes`.
/// Returns `Ok(())` on success, `Err(AuthError::Signature)` otherwise —
/// never panics on malformed input.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(message, signature_bytes), fields(message_len = message.len())))]
pub fn verify(public_key_bytes: &[u8], message: &[u8], signature_bytes: &[u8]) -> Result<(), AuthError> {
    let key = verifying_key_from_bytes(public_key_bytes)?;
    let sig = signature_from_bytes(signature_bytes)?;
    key.verify(message, &sig)
        .map_err(|_| AuthError::signature())
}

/// Verify a base64url-encoded signature over `message` under a
/// base64url-encoded public key. Convenience wrapper for the common
/// on-the-wire case.
pub fn verify_b64(public_key_b64: &str, message: &[u8], signature_b64: &str) -> Result<(), AuthError> {
    let key_bytes = base64url_decode(public_key_b64)?;
    let sig_bytes = base64url_decode(signature_b64)?;
    verify(&key_bytes, message, &sig_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn test_keypair() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let signing_key = test_keypair();
        let verifying_key = signing_key.verifying_key();
        let msg = b"hello world";
        let sig = signing_key.sign(msg);

        verify(verifying_key.as_bytes(), msg, &sig.to_bytes()).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let signing_key = test_keypair();
        let verifying_key = signing_key.verifying_key();
        let sig = signing_key.sign(b"hello world");

        let err = verify(verifying_key.as_bytes(), b"goodbye world", &sig.to_bytes())
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::AuthErrorCode::Signature);
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let signing_key = test_keypair();
        let other = test_keypair();
        let msg = b"hello world";
        let sig = signing_key.sign(msg);

        assert!(verify(other.verifying_key().as_bytes(), msg, &sig.to_bytes()).is_err());
    }

    #[test]
    fn base64url_round_trip() {
        let bytes = [1u8, 2, 3, 250, 255];
        let encoded = base64url_encode(&bytes);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
        assert_eq!(base64url_decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"abc"), sha256(b"abc"));
        assert_ne!(sha256(b"abc"), sha256(b"abd"));
    }

    #[test]
    fn sha256_hex_known_vector() {
        // Well-known SHA-256 digest of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
