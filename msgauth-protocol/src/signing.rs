//! The two authenticated-mutation protocols (§4.2, §4.3): per-request
//! signature binding and challenge-response binding. Grounded on the
//! teacher's `sign_subscription_ed25519`/`verify_signature_ed25519` shape
//! (domain-separated payload, nonce, timestamp, expiry) but built around
//! the canonicalization and key-state primitives from `msgauth-lib`
//! instead of postcard-serialized subscription terms.

use msgauth_lib::canonical::{canonicalize_value, without_key};
use msgauth_lib::crypto::{base64url_decode, sha256_hex, verify};
use msgauth_lib::errors::{AuthorizationReason, ChallengeReason, ValidationReason};
use msgauth_lib::keystate::KeyStateStore;
use msgauth_lib::{Aid, AuthError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::challenge::ChallengeLedger;
use crate::nonce_store::ReplayLedger;
use crate::purpose::Purpose;

/// The detached per-request signature block (§6 "Mutation envelope
/// (per-request-signed)").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigBlock {
    pub signature: String,
    pub timestamp: i64,
    pub nonce: String,
    pub key_id: Aid,
    pub signed_fields: Vec<String>,
}

/// The challenge-response proof block (§6 "Mutation envelope
/// (challenge-response)").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthBlock {
    pub challenge_id: String,
    pub sigs: Vec<String>,
    pub ksn: u64,
}

/// The outcome of a successful verification under either protocol: the
/// authenticated AID and the key-state snapshot it was verified against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub aid: Aid,
    pub ksn: u64,
    pub evt_said: String,
}

/// Parse one indexed signature of the form `"{index}-{base64url-sig}"`.
/// Splits on the first `-` only, matching §4.3 step 7 — base64url itself
/// never contains `-` so this is unambiguous for well-formed input, but a
/// signature with more than one `-` in its own encoding (impossible for
/// base64url) is not what this guards; it guards a multi-digit index.
pub fn parse_indexed_signature(raw: &str) -> Result<(usize, Vec<u8>), AuthError> {
    let (idx_str, sig_str) = raw.split_once('-').ok_or_else(|| {
        AuthError::validation_with_hint(
            ValidationReason::SigMalformed,
            format!("indexed signature missing '-' separator: {raw}"),
        )
    })?;
    let idx: usize = idx_str.parse().map_err(|_| {
        AuthError::validation_with_hint(
            ValidationReason::SigMalformed,
            format!("indexed signature has non-numeric index: {idx_str}"),
        )
    })?;
    let sig = base64url_decode(sig_str)?;
    Ok((idx, sig))
}

/// Verify a set of indexed signatures over `message` against `keys`,
/// returning the count that verified successfully. Used by the
/// challenge-response protocol (§4.3 step 7) and by receipt-signature
/// verification on the ack path (§4.6 step 5) — both are "count valid
/// indexed sigs against a key set" with no other shared state.
pub fn count_valid_indexed_signatures(sigs: &[String], keys: &[[u8; 32]], message: &[u8]) -> usize {
    let mut valid = 0;
    for raw in sigs {
        let Ok((idx, sig)) = parse_indexed_signature(raw) else {
            continue;
        };
        let Some(key) = keys.get(idx) else { continue };
        if verify(key, message, &sig).is_ok() {
            valid += 1;
        }
    }
    valid
}

/// Verify a per-request-signed mutation (§4.2).
///
/// `args` is the full argument map including the `sig` field under
/// `sig_field_name` (normally `"sig"`); it is stripped before
/// canonicalization. The replay-ledger insert (step 8) is performed here,
/// inside this call, so callers must treat a successful return as having
/// already consumed the nonce — there is no separate commit step.
pub async fn verify_per_request(
    args: &Value,
    sig: &SigBlock,
    sig_field_name: &str,
    store: &dyn KeyStateStore,
    ledger: &ReplayLedger,
    now_ms: u64,
    skew_ms: u64,
    nonce_ttl_ms: u64,
) -> Result<VerifiedIdentity, AuthError> {
    let stripped = without_key(args, sig_field_name);
    let canonical_args = canonicalize_value(&stripped);
    let payload = format!(
        "timestamp: {}\nnonce: {}\nkeyId: {}\nargs: {}",
        sig.timestamp, sig.nonce, sig.key_id, canonical_args
    );

    let key_state = store.lookup(&sig.key_id).await?;

    let skew = (now_ms as i64 - sig.timestamp).unsigned_abs();
    if skew > skew_ms {
        return Err(AuthError::validation_with_hint(
            ValidationReason::Timestamp,
            format!("timestamp skew {skew}ms exceeds {skew_ms}ms"),
        ));
    }

    if ledger.has_nonce(&sig.key_id, &sig.nonce).await {
        return Err(AuthError::validation(ValidationReason::NonceReplay));
    }

    let signature_bytes = base64url_decode(&sig.signature)?;
    let signer_key = key_state
        .keys
        .first()
        .ok_or_else(|| AuthError::internal("key state has no keys"))?;
    verify(signer_key, payload.as_bytes(), &signature_bytes)?;

    let accepted = ledger
        .check_and_mark(&sig.key_id, &sig.nonce, now_ms, now_ms + nonce_ttl_ms)
        .await;
    if !accepted {
        return Err(AuthError::validation(ValidationReason::NonceReplay));
    }

    Ok(VerifiedIdentity {
        aid: sig.key_id.clone(),
        ksn: key_state.ksn,
        evt_said: key_state.last_event_said,
    })
}

/// Issue a challenge for a prospective mutation (§4.3 "Issue").
pub async fn issue_challenge(
    ledger: &dyn ChallengeLedger,
    aid: Aid,
    purpose: Purpose,
    args_hash: String,
    now_ms: u64,
    ttl_ms: u64,
    server_origin: &str,
) -> (String, Value) {
    let challenge = ledger.issue(aid.clone(), purpose, args_hash.clone(), now_ms, ttl_ms).await;
    let payload = json!({
        "ver": "msg-auth/1",
        "aud": server_origin,
        "ts": challenge.created_at,
        "nonce": challenge.nonce,
        "aid": aid.as_str(),
        "purpose": purpose.as_str(),
        "argsHash": args_hash,
    });
    (challenge.id, payload)
}

/// Verify a challenge-response proof against a mutation's own arguments
/// (§4.3 "Prove").
pub async fn verify_challenge_response(
    auth: &AuthBlock,
    args: &Value,
    expected_purpose: Purpose,
    challenges: &dyn ChallengeLedger,
    store: &dyn KeyStateStore,
    server_origin: &str,
    now_ms: u64,
    skew_ms: u64,
) -> Result<VerifiedIdentity, AuthError> {
    let challenge = challenges.fetch(&auth.challenge_id).await?;

    if challenge.used {
        return Err(AuthError::challenge(ChallengeReason::Used));
    }
    if challenge.expires_at <= now_ms {
        return Err(AuthError::challenge(ChallengeReason::Expired));
    }
    let skew = (now_ms as i64 - challenge.created_at as i64).unsigned_abs();
    if skew > skew_ms {
        return Err(AuthError::challenge(ChallengeReason::Skew));
    }
    if challenge.purpose != expected_purpose {
        return Err(AuthError::validation(ValidationReason::Purpose));
    }

    let recomputed_hash = sha256_hex(canonicalize_value(args).as_bytes());
    if recomputed_hash != challenge.args_hash {
        return Err(AuthError::validation(ValidationReason::ArgsHash));
    }

    let key_state = store.lookup(&challenge.aid).await?;
    if auth.ksn != key_state.ksn {
        return Err(AuthError::validation(ValidationReason::KsnMismatch));
    }

    let payload = canonicalize_value(&json!({
        "ver": "msg-auth/1",
        "aud": server_origin,
        "ts": challenge.created_at,
        "nonce": challenge.nonce,
        "aid": challenge.aid.as_str(),
        "purpose": challenge.purpose.as_str(),
        "argsHash": challenge.args_hash,
    }));

    let threshold = key_state.threshold_value()?;
    let valid = count_valid_indexed_signatures(&auth.sigs, &key_state.keys, payload.as_bytes());
    if (valid as u64) < threshold {
        return Err(AuthError::signature_with_hint(format!(
            "{valid} of {threshold} required signatures verified"
        )));
    }

    challenges.mark_used(&auth.challenge_id, now_ms).await?;

    Ok(VerifiedIdentity {
        aid: challenge.aid,
        ksn: key_state.ksn,
        evt_said: key_state.last_event_said,
    })
}

/// Verify receipt signatures on the ack path (§4.6 step 5): indexed
/// signatures over `canonicalize({envelopeHash, aud})` meeting the
/// receiver's current threshold.
pub fn verify_receipt_signatures(
    receipt_sigs: &[String],
    envelope_hash: &str,
    server_origin: &str,
    keys: &[[u8; 32]],
    threshold: u64,
) -> Result<(), AuthError> {
    let payload = canonicalize_value(&json!({
        "envelopeHash": envelope_hash,
        "aud": server_origin,
    }));
    let valid = count_valid_indexed_signatures(receipt_sigs, keys, payload.as_bytes());
    if (valid as u64) < threshold {
        return Err(AuthError::signature_with_hint(format!(
            "{valid} of {threshold} required receipt signatures verified"
        )));
    }
    Ok(())
}

/// Reject access-control failures with the right [`AuthorizationReason`];
/// kept here (rather than duplicated in `access_control`) since both the
/// send path and the manager's dispatcher need the same mapping.
pub fn authorization_error(reason: AuthorizationReason) -> AuthError {
    AuthError::authorization(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::InMemoryChallengeLedger;
    use msgauth_lib::keystate::InMemoryKeyStateStore;
    use msgauth_lib::test_utils::alice;

    fn build_sig(args: &Value, identity: &msgauth_lib::test_utils::TestIdentity, key_id: Aid, timestamp: i64, nonce: &str) -> SigBlock {
        let canonical_args = canonicalize_value(args);
        let payload = format!("timestamp: {timestamp}\nnonce: {nonce}\nkeyId: {key_id}\nargs: {canonical_args}");
        let sig_bytes = identity.sign(payload.as_bytes());
        SigBlock {
            signature: msgauth_lib::crypto::base64url_encode(&sig_bytes),
            timestamp,
            nonce: nonce.to_string(),
            key_id,
            signed_fields: vec![],
        }
    }

    #[tokio::test]
    async fn per_request_round_trip_succeeds() {
        let identity = alice();
        let store = InMemoryKeyStateStore::new();
        store.register(identity.key_state(0)).await.unwrap();
        let ledger = ReplayLedger::new();

        let args = json!({"recipientAid": "Dbob", "ct": "YWJj"});
        let sig = build_sig(&args, &identity, identity.aid.clone(), 1_000, "n1");
        let mut full_args = args.clone();
        full_args["sig"] = serde_json::to_value(&sig).unwrap();

        let verified = verify_per_request(&full_args, &sig, "sig", &store, &ledger, 1_000, 300_000, 600_000)
            .await
            .unwrap();
        assert_eq!(verified.aid, identity.aid);
        assert_eq!(verified.ksn, 0);
    }

    #[tokio::test]
    async fn per_request_rejects_stale_timestamp() {
        let identity = alice();
        let store = InMemoryKeyStateStore::new();
        store.register(identity.key_state(0)).await.unwrap();
        let ledger = ReplayLedger::new();

        let args = json!({"recipientAid": "Dbob"});
        let sig = build_sig(&args, &identity, identity.aid.clone(), 0, "n1");
        let mut full_args = args.clone();
        full_args["sig"] = serde_json::to_value(&sig).unwrap();

        let err = verify_per_request(&full_args, &sig, "sig", &store, &ledger, 1_000_000, 300_000, 600_000)
            .await
            .unwrap_err();
        assert_eq!(err.code(), msgauth_lib::AuthErrorCode::Validation);
    }

    #[tokio::test]
    async fn per_request_rejects_replayed_nonce() {
        let identity = alice();
        let store = InMemoryKeyStateStore::new();
        store.register(identity.key_state(0)).await.unwrap();
        let ledger = ReplayLedger::new();

        let args = json!({"recipientAid": "Dbob"});
        let sig = build_sig(&args, &identity, identity.aid.clone(), 1_000, "n1");
        let mut full_args = args.clone();
        full_args["sig"] = serde_json::to_value(&sig).unwrap();

        verify_per_request(&full_args, &sig, "sig", &store, &ledger, 1_000, 300_000, 600_000)
            .await
            .unwrap();
        let err = verify_per_request(&full_args, &sig, "sig", &store, &ledger, 1_100, 300_000, 600_000)
            .await
            .unwrap_err();
        assert_eq!(err.code(), msgauth_lib::AuthErrorCode::Validation);
    }

    #[tokio::test]
    async fn per_request_rejects_tampered_args() {
        let identity = alice();
        let store = InMemoryKeyStateStore::new();
        store.register(identity.key_state(0)).await.unwrap();
        let ledger = ReplayLedger::new();

        let args = json!({"recipientAid": "Dbob"});
        let sig = build_sig(&args, &identity, identity.aid.clone(), 1_000, "n1");
        let mut tampered = args.clone();
        tampered["recipientAid"] = json!("Dmallory");
        tampered["sig"] = serde_json::to_value(&sig).unwrap();

        let err = verify_per_request(&tampered, &sig, "sig", &store, &ledger, 1_000, 300_000, 600_000)
            .await
            .unwrap_err();
        assert_eq!(err.code(), msgauth_lib::AuthErrorCode::Signature);
    }

    #[tokio::test]
    async fn challenge_response_round_trip_succeeds() {
        let identity = alice();
        let store = InMemoryKeyStateStore::new();
        store.register(identity.key_state(0)).await.unwrap();
        let challenges = InMemoryChallengeLedger::new();

        let args = json!({"recipientAid": "Dbob", "ct": "YWJj"});
        let args_hash = sha256_hex(canonicalize_value(&args).as_bytes());
        let (challenge_id, payload) = issue_challenge(
            &challenges,
            identity.aid.clone(),
            Purpose::Send,
            args_hash,
            0,
            120_000,
            "https://msg.example.com",
        )
        .await;
        let payload_bytes = canonicalize_value(&payload);
        let sig_bytes = identity.sign(payload_bytes.as_bytes());
        let sig_str = format!("0-{}", msgauth_lib::crypto::base64url_encode(&sig_bytes));

        let auth = AuthBlock {
            challenge_id,
            sigs: vec![sig_str],
            ksn: 0,
        };

        let verified = verify_challenge_response(
            &auth,
            &args,
            Purpose::Send,
            &challenges,
            &store,
            "https://msg.example.com",
            1_000,
            120_000,
        )
        .await
        .unwrap();
        assert_eq!(verified.aid, identity.aid);
    }

    #[tokio::test]
    async fn challenge_response_rejects_wrong_purpose() {
        let identity = alice();
        let store = InMemoryKeyStateStore::new();
        store.register(identity.key_state(0)).await.unwrap();
        let challenges = InMemoryChallengeLedger::new();

        let args = json!({"messageId": "E123"});
        let args_hash = sha256_hex(canonicalize_value(&args).as_bytes());
        let (challenge_id, payload) = issue_challenge(
            &challenges,
            identity.aid.clone(),
            Purpose::Send,
            args_hash,
            0,
            120_000,
            "https://msg.example.com",
        )
        .await;
        let payload_bytes = canonicalize_value(&payload);
        let sig_bytes = identity.sign(payload_bytes.as_bytes());
        let auth = AuthBlock {
            challenge_id,
            sigs: vec![format!("0-{}", msgauth_lib::crypto::base64url_encode(&sig_bytes))],
            ksn: 0,
        };

        let err = verify_challenge_response(
            &auth,
            &args,
            Purpose::Ack,
            &challenges,
            &store,
            "https://msg.example.com",
            1_000,
            120_000,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), msgauth_lib::AuthErrorCode::Validation);
    }

    #[tokio::test]
    async fn challenge_response_cannot_be_reused() {
        let identity = alice();
        let store = InMemoryKeyStateStore::new();
        store.register(identity.key_state(0)).await.unwrap();
        let challenges = InMemoryChallengeLedger::new();

        let args = json!({"messageId": "E123"});
        let args_hash = sha256_hex(canonicalize_value(&args).as_bytes());
        let (challenge_id, payload) = issue_challenge(
            &challenges,
            identity.aid.clone(),
            Purpose::Ack,
            args_hash,
            0,
            120_000,
            "https://msg.example.com",
        )
        .await;
        let payload_bytes = canonicalize_value(&payload);
        let sig_bytes = identity.sign(payload_bytes.as_bytes());
        let auth = AuthBlock {
            challenge_id,
            sigs: vec![format!("0-{}", msgauth_lib::crypto::base64url_encode(&sig_bytes))],
            ksn: 0,
        };

        verify_challenge_response(&auth, &args, Purpose::Ack, &challenges, &store, "https://msg.example.com", 1_000, 120_000)
            .await
            .unwrap();
        let err = verify_challenge_response(&auth, &args, Purpose::Ack, &challenges, &store, "https://msg.example.com", 2_000, 120_000)
            .await
            .unwrap_err();
        assert_eq!(err.code(), msgauth_lib::AuthErrorCode::Challenge);
    }

    #[test]
    fn parse_indexed_signature_splits_on_first_dash_only() {
        let (idx, sig) = parse_indexed_signature("2-YWJj").unwrap();
        assert_eq!(idx, 2);
        assert_eq!(sig, base64url_decode("YWJj").unwrap());
    }

    #[test]
    fn parse_indexed_signature_rejects_missing_separator() {
        assert!(parse_indexed_signature("YWJj").is_err());
    }

    #[test]
    fn parse_indexed_signature_rejects_non_numeric_index() {
        assert!(parse_indexed_signature("abc-YWJj").is_err());
    }
}
