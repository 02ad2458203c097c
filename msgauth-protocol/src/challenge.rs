//! Challenge ledger: single-use, purpose-bound, args-bound challenges
//! (§3 "Challenge", §4.3 challenge-response protocol).

use std::collections::HashMap;

use async_trait::async_trait;
use msgauth_lib::errors::{ChallengeReason, ResourceKind};
use msgauth_lib::{Aid, AuthError};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::purpose::Purpose;

/// Default challenge lifetime (§6 `challenge.ttl-ms`).
pub const DEFAULT_CHALLENGE_TTL_MS: u64 = 120_000;

/// An issued, as-yet-unproven (or already-proven) challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub id: String,
    pub aid: Aid,
    pub purpose: Purpose,
    pub args_hash: String,
    pub nonce: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub used: bool,
}

impl Challenge {
    pub fn is_live(&self, now_ms: u64) -> bool {
        !self.used && self.expires_at > now_ms
    }
}

/// Storage seam for challenges. `mark_used` must be atomic with respect to
/// concurrent `mark_used` calls on the same id — two concurrent proofs of
/// the same challenge must not both succeed (§5 "Challenge `used←true` is
/// atomic under the verifier transaction").
#[async_trait]
pub trait ChallengeLedger: Send + Sync {
    async fn issue(
        &self,
        aid: Aid,
        purpose: Purpose,
        args_hash: String,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Challenge;

    async fn fetch(&self, id: &str) -> Result<Challenge, AuthError>;

    /// Atomically transition `used` false→true. Returns `Err(Challenge)`
    /// if the challenge is missing, already used, or expired — a failed
    /// proof attempt must never consume the challenge (§4.3 step 9).
    async fn mark_used(&self, id: &str, now_ms: u64) -> Result<Challenge, AuthError>;

    async fn sweep_expired(&self, now_ms: u64) -> usize;
}

/// In-memory `ChallengeLedger`, mirroring the `RwLock<HashMap<...>>` shape
/// of the teacher's `NonceStore`.
#[derive(Default)]
pub struct InMemoryChallengeLedger {
    challenges: RwLock<HashMap<String, Challenge>>,
}

impl InMemoryChallengeLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeLedger for InMemoryChallengeLedger {
    async fn issue(
        &self,
        aid: Aid,
        purpose: Purpose,
        args_hash: String,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Challenge {
        let challenge = Challenge {
            id: Uuid::new_v4().to_string(),
            aid,
            purpose,
            args_hash,
            nonce: Uuid::new_v4().to_string(),
            created_at: now_ms,
            expires_at: now_ms + ttl_ms,
            used: false,
        };
        self.challenges
            .write()
            .await
            .insert(challenge.id.clone(), challenge.clone());
        challenge
    }

    async fn fetch(&self, id: &str) -> Result<Challenge, AuthError> {
        self.challenges
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::not_found(ResourceKind::Challenge, id))
    }

    async fn mark_used(&self, id: &str, now_ms: u64) -> Result<Challenge, AuthError> {
        let mut challenges = self.challenges.write().await;
        let challenge = challenges
            .get_mut(id)
            .ok_or_else(|| AuthError::not_found(ResourceKind::Challenge, id))?;

        if challenge.used {
            return Err(AuthError::challenge(ChallengeReason::Used));
        }
        if challenge.expires_at <= now_ms {
            return Err(AuthError::challenge(ChallengeReason::Expired));
        }

        challenge.used = true;
        Ok(challenge.clone())
    }

    async fn sweep_expired(&self, now_ms: u64) -> usize {
        let mut challenges = self.challenges.write().await;
        let before = challenges.len();
        challenges.retain(|_, c| c.expires_at > now_ms);
        before - challenges.len()
    }
}
