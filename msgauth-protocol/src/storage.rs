//! The message envelope store (§3 "Message envelope", §4.5-4.7).
//!
//! Grounded on the teacher's `SubscriptionStorage` trait shape (a single
//! async trait covering every persistent record the protocol touches,
//! with an in-memory implementation backing the test suite) but modelling
//! ciphertext envelopes and their delivery state machine instead of
//! payment requests and subscription agreements.

use std::collections::HashMap;

use async_trait::async_trait;
use msgauth_lib::errors::ResourceKind;
use msgauth_lib::{Aid, AuthError};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A persisted ciphertext envelope (§3 "Message envelope").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// SAID: sha256 over the canonicalized content header (recipient,
    /// sender, ciphertext hash, alg, ek). Deliberately excludes
    /// `created_at`/`expires_at` so a retried send with a fresh
    /// timestamp still resolves to the same id (§4.5 step 6).
    pub id: String,
    pub sender_aid: Aid,
    pub recipient_aid: Aid,
    /// Opaque ciphertext, base64-encoded on the wire; the core never
    /// inspects it.
    pub ct: String,
    pub ct_hash: String,
    pub typ: Option<String>,
    pub alg: Option<String>,
    pub ek: Option<String>,
    pub created_at: u64,
    pub expires_at: u64,
    pub retrieved: bool,
    pub sender_sig: Vec<String>,
    pub sender_ksn: u64,
    pub sender_evt_said: String,
    pub envelope_hash: String,
    pub used_challenge_id: String,
    pub receipt_sig: Option<Vec<String>>,
    pub receipt_ksn: Option<u64>,
    pub receipt_evt_said: Option<String>,
}

impl MessageEnvelope {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Storage seam for envelopes. `insert` must be idempotent by `id` (§4.5
/// step 6: "at-least-once send, exactly-once storage"); `mark_retrieved`
/// must be atomic with respect to concurrent acks of the same envelope
/// (§4.6 step 6, §5 ordering guarantee).
#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    /// Insert `envelope`. Returns `(id, true)` if this is the first time
    /// `id` was stored, or `(id, false)` if an envelope with this id
    /// already existed — in which case the existing one is left untouched
    /// (idempotent retry, §4.5 step 6). The caller uses the flag to avoid
    /// re-notifying subscribers of a resend.
    async fn insert(&self, envelope: MessageEnvelope) -> Result<(String, bool), AuthError>;

    async fn load(&self, id: &str) -> Result<MessageEnvelope, AuthError>;

    /// Unread envelopes for `recipient`, ordered by `created_at` ascending,
    /// already filtered of expired ones (§4.7).
    async fn list_unread(&self, recipient: &Aid, limit: usize, now_ms: u64) -> Vec<MessageEnvelope>;

    /// Atomically transition `retrieved` false→true and populate the
    /// receipt fields together. No-op (returning the existing envelope)
    /// if already retrieved (§4.6 step 4, idempotent re-ack).
    async fn mark_retrieved(
        &self,
        id: &str,
        receipt_sig: Vec<String>,
        receipt_ksn: u64,
        receipt_evt_said: String,
    ) -> Result<MessageEnvelope, AuthError>;

    /// Delete envelopes past `expires-at ∧ retrieved` (§4.9). Returns the
    /// number removed.
    async fn sweep_expired_retrieved(&self, now_ms: u64) -> usize;
}

/// In-memory `EnvelopeStore`.
#[derive(Default)]
pub struct InMemoryEnvelopeStore {
    envelopes: RwLock<HashMap<String, MessageEnvelope>>,
}

impl InMemoryEnvelopeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnvelopeStore for InMemoryEnvelopeStore {
    async fn insert(&self, envelope: MessageEnvelope) -> Result<(String, bool), AuthError> {
        let mut envelopes = self.envelopes.write().await;
        if let Some(existing) = envelopes.get(&envelope.id) {
            return Ok((existing.id.clone(), false));
        }
        let id = envelope.id.clone();
        envelopes.insert(id.clone(), envelope);
        Ok((id, true))
    }

    async fn load(&self, id: &str) -> Result<MessageEnvelope, AuthError> {
        self.envelopes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::not_found(ResourceKind::Envelope, id))
    }

    async fn list_unread(&self, recipient: &Aid, limit: usize, now_ms: u64) -> Vec<MessageEnvelope> {
        let envelopes = self.envelopes.read().await;
        let mut matching: Vec<MessageEnvelope> = envelopes
            .values()
            .filter(|e| &e.recipient_aid == recipient && !e.retrieved && !e.is_expired(now_ms))
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.created_at);
        matching.truncate(limit.min(1000));
        matching
    }

    async fn mark_retrieved(
        &self,
        id: &str,
        receipt_sig: Vec<String>,
        receipt_ksn: u64,
        receipt_evt_said: String,
    ) -> Result<MessageEnvelope, AuthError> {
        let mut envelopes = self.envelopes.write().await;
        let envelope = envelopes
            .get_mut(id)
            .ok_or_else(|| AuthError::not_found(ResourceKind::Envelope, id))?;

        if envelope.retrieved {
            return Ok(envelope.clone());
        }

        envelope.retrieved = true;
        envelope.receipt_sig = Some(receipt_sig);
        envelope.receipt_ksn = Some(receipt_ksn);
        envelope.receipt_evt_said = Some(receipt_evt_said);
        Ok(envelope.clone())
    }

    async fn sweep_expired_retrieved(&self, now_ms: u64) -> usize {
        let mut envelopes = self.envelopes.write().await;
        let before = envelopes.len();
        envelopes.retain(|_, e| !(e.retrieved && e.is_expired(now_ms)));
        before - envelopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgauth_lib::test_utils::{alice, bob};

    fn envelope(id: &str, recipient: Aid, created_at: u64, expires_at: u64) -> MessageEnvelope {
        MessageEnvelope {
            id: id.to_string(),
            sender_aid: alice().aid,
            recipient_aid: recipient,
            ct: "YWJj".to_string(),
            ct_hash: "hash".to_string(),
            typ: None,
            alg: None,
            ek: None,
            created_at,
            expires_at,
            retrieved: false,
            sender_sig: vec![],
            sender_ksn: 0,
            sender_evt_said: "E0".to_string(),
            envelope_hash: id.to_string(),
            used_challenge_id: "nonce".to_string(),
            receipt_sig: None,
            receipt_ksn: None,
            receipt_evt_said: None,
        }
    }

    #[tokio::test]
    async fn insert_then_load_round_trips() {
        let store = InMemoryEnvelopeStore::new();
        let e = envelope("E1", bob().aid, 0, 86_400_000);
        store.insert(e.clone()).await.unwrap();
        let loaded = store.load("E1").await.unwrap();
        assert_eq!(loaded, e);
    }

    #[tokio::test]
    async fn duplicate_insert_is_idempotent() {
        let store = InMemoryEnvelopeStore::new();
        let e = envelope("E1", bob().aid, 0, 86_400_000);
        let (id1, was_new1) = store.insert(e.clone()).await.unwrap();
        let mut different_ct = e.clone();
        different_ct.ct = "ZGlmZmVyZW50".to_string();
        let (id2, was_new2) = store.insert(different_ct).await.unwrap();
        assert_eq!(id1, id2);
        assert!(was_new1);
        assert!(!was_new2);
        assert_eq!(store.load("E1").await.unwrap().ct, "YWJj");
    }

    #[tokio::test]
    async fn list_unread_orders_by_created_at_and_filters_expired() {
        let store = InMemoryEnvelopeStore::new();
        store.insert(envelope("E2", bob().aid, 200, 86_400_000)).await.unwrap();
        store.insert(envelope("E1", bob().aid, 100, 86_400_000)).await.unwrap();
        store.insert(envelope("Eexpired", bob().aid, 50, 60)).await.unwrap();

        let unread = store.list_unread(&bob().aid, 100, 1_000).await;
        assert_eq!(unread.len(), 2);
        assert_eq!(unread[0].id, "E1");
        assert_eq!(unread[1].id, "E2");
    }

    #[tokio::test]
    async fn list_unread_respects_limit_cap() {
        let store = InMemoryEnvelopeStore::new();
        for i in 0..5 {
            store
                .insert(envelope(&format!("E{i}"), bob().aid, i as u64, 86_400_000))
                .await
                .unwrap();
        }
        let unread = store.list_unread(&bob().aid, 2, 1_000).await;
        assert_eq!(unread.len(), 2);
    }

    #[tokio::test]
    async fn mark_retrieved_populates_receipt_once() {
        let store = InMemoryEnvelopeStore::new();
        store.insert(envelope("E1", bob().aid, 0, 86_400_000)).await.unwrap();

        let updated = store
            .mark_retrieved("E1", vec!["0-sig".to_string()], 0, "E0".to_string())
            .await
            .unwrap();
        assert!(updated.retrieved);
        assert_eq!(updated.receipt_ksn, Some(0));

        // Second ack is a no-op that does not overwrite receipt fields.
        let second = store
            .mark_retrieved("E1", vec!["1-other".to_string()], 5, "E5".to_string())
            .await
            .unwrap();
        assert_eq!(second.receipt_ksn, Some(0));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_and_retrieved() {
        let store = InMemoryEnvelopeStore::new();
        store.insert(envelope("E1", bob().aid, 0, 60)).await.unwrap();
        store.mark_retrieved("E1", vec![], 0, "E0".to_string()).await.unwrap();
        store.insert(envelope("E2", bob().aid, 0, 60)).await.unwrap(); // expired but unretrieved
        store.insert(envelope("E3", bob().aid, 0, 86_400_000)).await.unwrap();

        let removed = store.sweep_expired_retrieved(1_000).await;
        assert_eq!(removed, 1);
        assert!(store.load("E1").await.is_err());
        assert!(store.load("E2").await.is_ok());
        assert!(store.load("E3").await.is_ok());
    }
}
