//! `MessageCore`: the mutation dispatcher that ties the ledgers, the
//! envelope store, and the two authentication protocols together
//! (§4.5-4.10). Grounded on the teacher's `SubscriptionManager` — a
//! single struct holding `Arc`s to every storage seam, with one method
//! per operation — but authenticating every mutation instead of trusting
//! a pre-established Noise channel.

use std::sync::Arc;

use msgauth_lib::canonical::canonicalize_value;
use msgauth_lib::crypto::sha256_hex;
use msgauth_lib::errors::{AuthorizationReason, ResourceKind, ValidationReason};
use msgauth_lib::keystate::KeyStateStore;
use msgauth_lib::{Aid, AuthError, Config, KeyState};
use serde_json::{json, Value};

use crate::access_control::{check_send_allowed, AccessControlStore, PermissionTag};
use crate::challenge::ChallengeLedger;
use crate::nonce_store::ReplayLedger;
use crate::purpose::Purpose;
use crate::signing::{
    count_valid_indexed_signatures, issue_challenge, verify_challenge_response,
    verify_per_request, verify_receipt_signatures, AuthBlock, SigBlock, VerifiedIdentity,
};
use crate::storage::{EnvelopeStore, MessageEnvelope};
use crate::subscription::SubscriptionRegistry;

/// Either of the two ways a mutation can be authenticated (§9 "a single
/// `Authenticator` capability with two variants"). Never both at once —
/// the caller picks one when building the request.
pub enum Credential {
    PerRequest(SigBlock),
    ChallengeResponse(AuthBlock),
}

pub struct MessageCore {
    pub key_states: Arc<dyn KeyStateStore>,
    pub challenges: Arc<dyn ChallengeLedger>,
    pub nonces: Arc<ReplayLedger>,
    pub envelopes: Arc<dyn EnvelopeStore>,
    pub access_control: Arc<dyn AccessControlStore>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub config: Config,
}

impl MessageCore {
    pub fn new(
        key_states: Arc<dyn KeyStateStore>,
        challenges: Arc<dyn ChallengeLedger>,
        envelopes: Arc<dyn EnvelopeStore>,
        access_control: Arc<dyn AccessControlStore>,
        subscriptions: Arc<SubscriptionRegistry>,
        config: Config,
    ) -> Self {
        Self {
            key_states,
            challenges,
            nonces: Arc::new(ReplayLedger::new()),
            envelopes,
            access_control,
            subscriptions,
            config,
        }
    }

    /// Authenticate `args` (the mutation's logical fields, excluding
    /// whichever binding block `credential` carries) under `purpose`
    /// (§9 dispatcher: selects the protocol based on which block the
    /// request carries).
    async fn authenticate(
        &self,
        args_with_sig: &Value,
        args_without_binding: &Value,
        credential: &Credential,
        purpose: Purpose,
        now_ms: u64,
    ) -> Result<VerifiedIdentity, AuthError> {
        match credential {
            Credential::PerRequest(sig) => {
                verify_per_request(
                    args_with_sig,
                    sig,
                    "sig",
                    self.key_states.as_ref(),
                    &self.nonces,
                    now_ms,
                    self.config.signature_skew_ms as u64,
                    self.config.nonce_ttl_ms as u64,
                )
                .await
            }
            Credential::ChallengeResponse(auth) => {
                verify_challenge_response(
                    auth,
                    args_without_binding,
                    purpose,
                    self.challenges.as_ref(),
                    self.key_states.as_ref(),
                    &self.config.server_origin,
                    now_ms,
                    self.config.challenge_skew_ms as u64,
                )
                .await
            }
        }
    }

    /// Issue a challenge for a prospective mutation (§4.3 "Issue"). For
    /// every purpose but `registerUser`, a key state must already exist
    /// for `aid` — `registerUser` is the one purpose that authenticates a
    /// not-yet-registered identity (§4.10).
    pub async fn issue_challenge_for(
        &self,
        aid: Aid,
        purpose: Purpose,
        args: &Value,
        now_ms: u64,
    ) -> Result<(String, Value), AuthError> {
        if purpose != Purpose::RegisterUser {
            self.key_states.lookup(&aid).await?;
        } else if self.key_states.lookup(&aid).await.is_ok() {
            return Err(AuthError::already_exists(ResourceKind::User, aid.as_str()));
        }

        let args_hash = sha256_hex(canonicalize_value(args).as_bytes());
        Ok(issue_challenge(
            self.challenges.as_ref(),
            aid,
            purpose,
            args_hash,
            now_ms,
            self.config.challenge_ttl_ms as u64,
            &self.config.server_origin,
        )
        .await)
    }

    /// First-time registration (§4.10). `public_key` must be the key that
    /// derives `aid`; the challenge must have been issued for
    /// `purpose=registerUser` against this exact `aid`.
    pub async fn register_user(
        &self,
        aid: Aid,
        public_key: [u8; 32],
        auth: AuthBlock,
        now_ms: u64,
    ) -> Result<VerifiedIdentity, AuthError> {
        if !aid.matches_public_key(&public_key) {
            return Err(AuthError::validation_with_hint(
                ValidationReason::SigMalformed,
                "declared AID does not derive from the supplied public key",
            ));
        }
        if self.key_states.lookup(&aid).await.is_ok() {
            return Err(AuthError::already_exists(ResourceKind::User, aid.as_str()));
        }

        let args = json!({ "aid": aid.as_str(), "publicKey": msgauth_lib::crypto::base64url_encode(&public_key) });
        let args_hash = sha256_hex(canonicalize_value(&args).as_bytes());

        let challenge = self.challenges.fetch(&auth.challenge_id).await?;
        if challenge.aid != aid || challenge.purpose != Purpose::RegisterUser {
            return Err(AuthError::validation(ValidationReason::Purpose));
        }
        if !challenge.is_live(now_ms) {
            return Err(AuthError::challenge(msgauth_lib::errors::ChallengeReason::Expired));
        }
        if challenge.args_hash != args_hash {
            return Err(AuthError::validation(ValidationReason::ArgsHash));
        }

        let payload = canonicalize_value(&json!({
            "ver": "msg-auth/1",
            "aud": self.config.server_origin,
            "ts": challenge.created_at,
            "nonce": challenge.nonce,
            "aid": aid.as_str(),
            "purpose": Purpose::RegisterUser.as_str(),
            "argsHash": args_hash,
        }));
        let valid = count_valid_indexed_signatures(&auth.sigs, &[public_key], payload.as_bytes());
        if valid < 1 {
            return Err(AuthError::signature_with_hint("registration proof did not verify"));
        }

        self.challenges.mark_used(&auth.challenge_id, now_ms).await?;

        let key_state = KeyState {
            aid: aid.clone(),
            ksn: 0,
            keys: vec![public_key],
            threshold: "1".to_string(),
            last_event_said: "E0".to_string(),
            updated_at: now_ms,
        };
        self.key_states.register(key_state).await?;

        Ok(VerifiedIdentity { aid, ksn: 0, evt_said: "E0".to_string() })
    }

    /// `send` (§4.5): authenticate the sender, run access control, store
    /// the envelope idempotently by its SAID, and notify the recipient's
    /// live subscription if any.
    pub async fn send(
        &self,
        args_with_sig: Value,
        credential: &Credential,
        require_permission: Option<PermissionTag>,
        now_ms: u64,
    ) -> Result<String, AuthError> {
        let args = msgauth_lib::canonical::without_key(&args_with_sig, "sig");
        let identity = self
            .authenticate(&args_with_sig, &args, credential, Purpose::Send, now_ms)
            .await?;

        let recipient_aid: Aid = args["recipientAid"]
            .as_str()
            .ok_or_else(|| AuthError::validation(ValidationReason::SigMalformed))?
            .parse()?;
        let ct = args["ct"]
            .as_str()
            .ok_or_else(|| AuthError::validation(ValidationReason::SigMalformed))?
            .to_string();
        let typ = args.get("typ").and_then(Value::as_str).map(str::to_string);
        let alg = args.get("alg").and_then(Value::as_str).map(str::to_string);
        let ek = args.get("ek").and_then(Value::as_str).map(str::to_string);
        let ttl_ms = args.get("ttl").and_then(Value::as_u64);

        check_send_allowed(
            self.access_control.as_ref(),
            &identity.aid,
            &recipient_aid,
            require_permission,
        )
        .await?;

        let ct_hash = sha256_hex(ct.as_bytes());
        let created_at = now_ms;
        let expires_at = now_ms + ttl_ms.unwrap_or(self.config.envelope_ttl_default_ms as u64);

        // Content-only: createdAt/expiresAt are wall-clock and must not
        // affect envelope identity, or a retried send with a fresh
        // timestamp would materialize a second envelope (§8 scenario #3).
        let header = json!({
            "ver": "envelope/1",
            "recpAid": recipient_aid.as_str(),
            "senderAid": identity.aid.as_str(),
            "ctHash": ct_hash,
            "alg": alg.clone().unwrap_or_default(),
            "ek": ek.clone().unwrap_or_default(),
        });
        let envelope_hash = sha256_hex(canonicalize_value(&header).as_bytes());

        let used_challenge_id = match credential {
            Credential::PerRequest(sig) => sig.nonce.clone(),
            Credential::ChallengeResponse(auth) => auth.challenge_id.clone(),
        };

        let envelope = MessageEnvelope {
            id: envelope_hash.clone(),
            sender_aid: identity.aid,
            recipient_aid: recipient_aid.clone(),
            ct,
            ct_hash,
            typ,
            alg,
            ek,
            created_at,
            expires_at,
            retrieved: false,
            sender_sig: vec![],
            sender_ksn: identity.ksn,
            sender_evt_said: identity.evt_said,
            envelope_hash,
            used_challenge_id,
            receipt_sig: None,
            receipt_ksn: None,
            receipt_evt_said: None,
        };

        let (id, was_new) = self.envelopes.insert(envelope.clone()).await?;
        if was_new {
            self.subscriptions.notify(&recipient_aid, envelope).await;
        }
        Ok(id)
    }

    /// `ack` (§4.6): authenticate the receiver, verify the receipt
    /// signatures meet the receiver's own threshold, and atomically mark
    /// the envelope retrieved. Re-acking an already-retrieved envelope
    /// succeeds without rewriting the receipt fields.
    pub async fn ack(
        &self,
        message_id: &str,
        receipt_sigs: Vec<String>,
        credential: &Credential,
        now_ms: u64,
    ) -> Result<MessageEnvelope, AuthError> {
        let args = json!({ "messageId": message_id });
        let identity = self.authenticate(&args, &args, credential, Purpose::Ack, now_ms).await?;

        let envelope = self.envelopes.load(message_id).await?;
        if envelope.recipient_aid != identity.aid {
            return Err(AuthError::authorization(AuthorizationReason::NotAllowed));
        }
        if envelope.retrieved {
            return Ok(envelope);
        }

        let receiver_state = self.key_states.lookup(&identity.aid).await?;
        verify_receipt_signatures(
            &receipt_sigs,
            &envelope.envelope_hash,
            &self.config.server_origin,
            &receiver_state.keys,
            receiver_state.threshold_value()?,
        )?;

        self.envelopes
            .mark_retrieved(message_id, receipt_sigs, receiver_state.ksn, receiver_state.last_event_said)
            .await
    }

    /// `read-unread` (§4.7).
    pub async fn read_unread(
        &self,
        credential: &Credential,
        limit: Option<usize>,
        now_ms: u64,
    ) -> Result<Vec<MessageEnvelope>, AuthError> {
        let args = json!({});
        let identity = self.authenticate(&args, &args, credential, Purpose::Receive, now_ms).await?;
        let limit = limit.unwrap_or(100).min(1000);
        Ok(self.envelopes.list_unread(&identity.aid, limit, now_ms).await)
    }

    /// Subscribe the caller to its own future envelopes (§4.7). Requires
    /// the caller to already be authenticated as `recipient` by whatever
    /// transport-level session establishment sits above this core.
    pub async fn subscribe(&self, recipient: Aid) -> crate::subscription::Subscription {
        self.subscriptions.subscribe(recipient).await
    }

    /// Allow/deny-list mutations (§4.8): per-request-signed by the list
    /// owner only — `credential` must authenticate as `owner`.
    pub async fn mutate_access_list(
        &self,
        owner: Aid,
        target: Option<Aid>,
        purpose: Purpose,
        credential: &Credential,
        now_ms: u64,
    ) -> Result<(), AuthError> {
        let args = json!({
            "owner": owner.as_str(),
            "target": target.as_ref().map(Aid::as_str),
        });
        let identity = self.authenticate(&args, &args, credential, purpose, now_ms).await?;
        if identity.aid != owner {
            return Err(AuthError::authorization(AuthorizationReason::NotAllowed));
        }

        match purpose {
            Purpose::AllowListAdd => {
                let target = target.ok_or_else(|| AuthError::validation(ValidationReason::SigMalformed))?;
                self.access_control.add_to_allow_list(&owner, target).await;
            }
            Purpose::AllowListRemove => {
                let target = target.ok_or_else(|| AuthError::validation(ValidationReason::SigMalformed))?;
                self.access_control.remove_from_allow_list(&owner, &target).await;
            }
            Purpose::AllowListClear => self.access_control.clear_allow_list(&owner).await,
            Purpose::DenyListAdd => {
                let target = target.ok_or_else(|| AuthError::validation(ValidationReason::SigMalformed))?;
                self.access_control.add_to_deny_list(&owner, target).await;
            }
            Purpose::DenyListRemove => {
                let target = target.ok_or_else(|| AuthError::validation(ValidationReason::SigMalformed))?;
                self.access_control.remove_from_deny_list(&owner, &target).await;
            }
            Purpose::DenyListClear => self.access_control.clear_deny_list(&owner).await,
            _ => return Err(AuthError::validation(ValidationReason::Purpose)),
        }
        Ok(())
    }

    /// Rotate a key state (§4.4). The rotation proof is a set of indexed
    /// signatures from the *old* key set over the canonicalized rotation
    /// tuple; verified here before the store is asked to enforce the
    /// sequencing invariant.
    pub async fn rotate_key(
        &self,
        aid: &Aid,
        new_ksn: u64,
        new_keys: Vec<[u8; 32]>,
        new_threshold: String,
        proof_sigs: Vec<String>,
        now_ms: u64,
    ) -> Result<KeyState, AuthError> {
        let current = self.key_states.lookup(aid).await?;
        let tuple = canonicalize_value(&json!({
            "aid": aid.as_str(),
            "newKsn": new_ksn,
            "newKeys": new_keys.iter().map(|k| msgauth_lib::crypto::base64url_encode(k)).collect::<Vec<_>>(),
            "newThreshold": new_threshold,
        }));
        let valid = count_valid_indexed_signatures(&proof_sigs, &current.keys, tuple.as_bytes());
        if (valid as u64) < current.threshold_value()? {
            return Err(AuthError::signature_with_hint(format!(
                "{valid} of {} required rotation signatures verified",
                current.threshold_value()?
            )));
        }

        let new_event_said = format!("E{new_ksn}");
        self.key_states
            .rotate(aid, new_ksn, new_keys, new_threshold, new_event_said, now_ms)
            .await
    }
}
