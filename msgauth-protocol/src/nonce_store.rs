//! Replay ledger: per-(AID, nonce) seen-set with time-based expiry.
//!
//! Grounded on the teacher's `NonceStore` (`RwLock<HashMap<[u8;32], i64>>`
//! with `check_and_mark`/`cleanup_expired`), generalized from a raw
//! 32-byte nonce keyed alone to the `(key-id, nonce)` pair the per-request
//! signature protocol requires (§4.2 steps 6/8).

use std::collections::HashMap;

use msgauth_lib::Aid;
use tokio::sync::RwLock;

/// Default nonce retention window (§6 `nonce.ttl-ms`).
pub const DEFAULT_NONCE_TTL_MS: u64 = 600_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NonceKey {
    key_id: Aid,
    nonce: String,
}

/// Per-`(key-id, nonce)` replay ledger. `check_and_mark` is the single
/// entry point: it atomically tests membership and inserts, so callers
/// never get a window between the two.
#[derive(Default)]
pub struct ReplayLedger {
    seen: RwLock<HashMap<NonceKey, u64>>,
}

impl ReplayLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check whether `(key_id, nonce)` has been seen before and,
    /// if not, record it with the given expiry. Returns `true` if this is
    /// the first use (accept), `false` if it is a replay (reject).
    pub async fn check_and_mark(&self, key_id: &Aid, nonce: &str, now_ms: u64, expires_at_ms: u64) -> bool {
        let key = NonceKey {
            key_id: key_id.clone(),
            nonce: nonce.to_string(),
        };
        let mut seen = self.seen.write().await;
        if let Some(&expiry) = seen.get(&key) {
            if expiry > now_ms {
                return false;
            }
        }
        seen.insert(key, expires_at_ms);
        true
    }

    /// Remove all entries whose expiry has passed `now_ms`. Idempotent,
    /// bounded only by the number of expired entries (§4.9).
    pub async fn sweep_expired(&self, now_ms: u64) -> usize {
        let mut seen = self.seen.write().await;
        let before = seen.len();
        seen.retain(|_, &mut expiry| expiry > now_ms);
        before - seen.len()
    }

    pub async fn count(&self) -> usize {
        self.seen.read().await.len()
    }

    pub async fn has_nonce(&self, key_id: &Aid, nonce: &str) -> bool {
        let key = NonceKey {
            key_id: key_id.clone(),
            nonce: nonce.to_string(),
        };
        self.seen.read().await.contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgauth_lib::test_utils::alice;

    #[tokio::test]
    async fn first_use_is_accepted() {
        let ledger = ReplayLedger::new();
        let aid = alice().aid;
        assert!(ledger.check_and_mark(&aid, "n1", 0, 600_000).await);
        assert!(ledger.has_nonce(&aid, "n1").await);
    }

    #[tokio::test]
    async fn reuse_within_ttl_is_rejected() {
        let ledger = ReplayLedger::new();
        let aid = alice().aid;
        assert!(ledger.check_and_mark(&aid, "n1", 0, 600_000).await);
        assert!(!ledger.check_and_mark(&aid, "n1", 1_000, 601_000).await);
    }

    #[tokio::test]
    async fn reuse_after_expiry_is_accepted_again() {
        let ledger = ReplayLedger::new();
        let aid = alice().aid;
        assert!(ledger.check_and_mark(&aid, "n1", 0, 100).await);
        assert!(ledger.check_and_mark(&aid, "n1", 200, 600_200).await);
    }

    #[tokio::test]
    async fn same_nonce_distinct_keys_do_not_collide() {
        let ledger = ReplayLedger::new();
        let a = alice().aid;
        let b = msgauth_lib::test_utils::bob().aid;
        assert!(ledger.check_and_mark(&a, "n1", 0, 600_000).await);
        assert!(ledger.check_and_mark(&b, "n1", 0, 600_000).await);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let ledger = ReplayLedger::new();
        let aid = alice().aid;
        ledger.check_and_mark(&aid, "old", 0, 100).await;
        ledger.check_and_mark(&aid, "fresh", 0, 10_000).await;
        let removed = ledger.sweep_expired(5_000).await;
        assert_eq!(removed, 1);
        assert_eq!(ledger.count().await, 1);
        assert!(ledger.has_nonce(&aid, "fresh").await);
    }

    #[tokio::test]
    async fn concurrent_check_and_mark_admits_exactly_one_winner() {
        use std::sync::Arc;
        let ledger = Arc::new(ReplayLedger::new());
        let aid = Arc::new(alice().aid);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let aid = aid.clone();
            handles.push(tokio::spawn(async move {
                ledger.check_and_mark(&aid, "shared", 0, 600_000).await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
