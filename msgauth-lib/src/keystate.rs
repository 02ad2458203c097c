//! Key-state: the authoritative AID → (ksn, keys, threshold) mapping.
//!
//! The store is a trait so the protocol crate can be built against an
//! in-memory implementation in tests and against a real document store in
//! production, matching the `PrivateEndpointStore` seam in the teacher
//! crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::aid::Aid;
use crate::errors::{AuthError, ResourceKind};

/// Default TTL for the read-through cache in front of a `KeyStateStore`.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// The authoritative key state for one AID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    pub aid: Aid,
    pub ksn: u64,
    /// Raw 32-byte Ed25519 public keys, base64url-encoded on the wire.
    pub keys: Vec<[u8; 32]>,
    /// Signature threshold, stored as the hex string the wire protocol
    /// uses (`threshold-parsed-as-hex-integer`).
    pub threshold: String,
    pub last_event_said: String,
    pub updated_at: u64,
}

impl KeyState {
    /// Parse `threshold` as a hex integer. Malformed threshold strings are
    /// a storage-layer bug, not a caller error, so this only fails on
    /// state that should never have been written.
    pub fn threshold_value(&self) -> Result<u64, AuthError> {
        u64::from_str_radix(self.threshold.trim_start_matches("0x"), 16)
            .map_err(|e| AuthError::internal(format!("malformed threshold: {e}")))
    }

    pub fn is_consistent(&self) -> bool {
        !self.keys.is_empty()
            && self
                .threshold_value()
                .map(|t| t >= 1 && (t as usize) <= self.keys.len())
                .unwrap_or(false)
    }
}

/// Storage seam for key state. Implementations must guarantee that
/// `rotate` is atomic with respect to concurrent `lookup`/`rotate` calls
/// on the same AID.
#[async_trait]
pub trait KeyStateStore: Send + Sync {
    async fn register(&self, state: KeyState) -> Result<(), AuthError>;

    async fn lookup(&self, aid: &Aid) -> Result<KeyState, AuthError>;

    /// Replace the key state for `aid`, enforcing `new_ksn == old_ksn + 1`.
    /// Callers are responsible for verifying the rotation proof signatures
    /// before calling this — the store only enforces the sequencing
    /// invariant.
    async fn rotate(
        &self,
        aid: &Aid,
        new_ksn: u64,
        new_keys: Vec<[u8; 32]>,
        new_threshold: String,
        new_event_said: String,
        now_ms: u64,
    ) -> Result<KeyState, AuthError>;
}

/// In-memory `KeyStateStore`, useful for tests and single-process
/// deployments.
#[derive(Default)]
pub struct InMemoryKeyStateStore {
    states: RwLock<HashMap<Aid, KeyState>>,
}

impl InMemoryKeyStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStateStore for InMemoryKeyStateStore {
    async fn register(&self, state: KeyState) -> Result<(), AuthError> {
        let mut states = self.states.write().await;
        if states.contains_key(&state.aid) {
            return Err(AuthError::already_exists(
                ResourceKind::User,
                state.aid.as_str(),
            ));
        }
        states.insert(state.aid.clone(), state);
        Ok(())
    }

    async fn lookup(&self, aid: &Aid) -> Result<KeyState, AuthError> {
        let states = self.states.read().await;
        states
            .get(aid)
            .cloned()
            .ok_or_else(|| AuthError::not_found(ResourceKind::KeyState, aid.as_str()))
    }

    async fn rotate(
        &self,
        aid: &Aid,
        new_ksn: u64,
        new_keys: Vec<[u8; 32]>,
        new_threshold: String,
        new_event_said: String,
        now_ms: u64,
    ) -> Result<KeyState, AuthError> {
        let mut states = self.states.write().await;
        let current = states
            .get(aid)
            .ok_or_else(|| AuthError::not_found(ResourceKind::KeyState, aid.as_str()))?;

        if new_ksn != current.ksn + 1 {
            return Err(AuthError::validation_with_hint(
                crate::errors::ValidationReason::KsnStale,
                format!(
                    "rotation to ksn {new_ksn} must follow current ksn {}",
                    current.ksn
                ),
            ));
        }

        let updated = KeyState {
            aid: aid.clone(),
            ksn: new_ksn,
            keys: new_keys,
            threshold: new_threshold,
            last_event_said: new_event_said,
            updated_at: now_ms,
        };
        states.insert(aid.clone(), updated.clone());
        Ok(updated)
    }
}

/// A read-through cache in front of any `KeyStateStore`, matching the "60s
/// TTL, any write invalidates the cache line" requirement. Wraps an
/// `Arc<dyn KeyStateStore>` so it can be shared across the dispatcher and
/// the sweep task.
pub struct CachedKeyStateStore {
    inner: Arc<dyn KeyStateStore>,
    ttl: Duration,
    cache: RwLock<HashMap<Aid, (KeyState, Instant)>>,
}

impl CachedKeyStateStore {
    pub fn new(inner: Arc<dyn KeyStateStore>) -> Self {
        Self::with_ttl(inner, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(inner: Arc<dyn KeyStateStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn invalidate(&self, aid: &Aid) {
        self.cache.write().await.remove(aid);
    }
}

#[async_trait]
impl KeyStateStore for CachedKeyStateStore {
    async fn register(&self, state: KeyState) -> Result<(), AuthError> {
        let aid = state.aid.clone();
        self.inner.register(state).await?;
        self.invalidate(&aid).await;
        Ok(())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(aid = aid.as_str())))]
    async fn lookup(&self, aid: &Aid) -> Result<KeyState, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some((state, fetched_at)) = cache.get(aid) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(state.clone());
                }
            }
        }
        let state = self.inner.lookup(aid).await?;
        let mut cache = self.cache.write().await;
        cache.insert(aid.clone(), (state.clone(), Instant::now()));
        Ok(state)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, new_keys, new_threshold, new_event_said), fields(aid = aid.as_str(), new_ksn)))]
    async fn rotate(
        &self,
        aid: &Aid,
        new_ksn: u64,
        new_keys: Vec<[u8; 32]>,
        new_threshold: String,
        new_event_said: String,
        now_ms: u64,
    ) -> Result<KeyState, AuthError> {
        let updated = self
            .inner
            .rotate(aid, new_ksn, new_keys, new_threshold, new_event_said, now_ms)
            .await?;
        self.invalidate(aid).await;
        Ok(updated)
    }
}
