//! Cursor-based push delivery to subscribed recipients (§4.7 "Subscription",
//! §5 "bounded backlog, drop-oldest on overflow").
//!
//! Grounded on the "pluggable sink" framing in §1 (the WebSocket push layer
//! is an abstract collaborator) and the `tokio::sync::mpsc` realization
//! prescribed by §5: one bounded channel per subscriber, with drop-oldest
//! semantics on overflow logged via `tracing::warn!`.

use std::collections::HashMap;

use msgauth_lib::Aid;
use tokio::sync::{mpsc, RwLock};

use crate::storage::MessageEnvelope;

/// Default per-subscriber backlog capacity.
pub const DEFAULT_BACKLOG_CAPACITY: usize = 256;

/// Handle returned to a new subscriber. Dropping it releases the
/// subscription slot, matching "cancellation releases the subscription
/// slot" (§4.7).
pub struct Subscription {
    pub recipient: Aid,
    pub receiver: mpsc::Receiver<MessageEnvelope>,
    registry: std::sync::Weak<SubscriptionRegistry>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let recipient = self.recipient.clone();
            tokio::spawn(async move {
                registry.unsubscribe(&recipient).await;
            });
        }
    }
}

/// Registry of live subscribers, one bounded `mpsc` channel each.
#[derive(Default)]
pub struct SubscriptionRegistry {
    capacity: usize,
    senders: RwLock<HashMap<Aid, mpsc::Sender<MessageEnvelope>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> std::sync::Arc<Self> {
        Self::with_capacity(DEFAULT_BACKLOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            capacity,
            senders: RwLock::new(HashMap::new()),
        })
    }

    /// Subscribe `recipient` to new envelopes. Replacing an existing
    /// subscription for the same AID drops the previous channel, matching
    /// single-subscriber-per-AID semantics for this reference
    /// implementation.
    pub async fn subscribe(self: &std::sync::Arc<Self>, recipient: Aid) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.write().await.insert(recipient.clone(), tx);
        Subscription {
            recipient,
            receiver: rx,
            registry: std::sync::Arc::downgrade(self),
        }
    }

    pub async fn unsubscribe(&self, recipient: &Aid) {
        self.senders.write().await.remove(recipient);
    }

    pub async fn is_subscribed(&self, recipient: &Aid) -> bool {
        self.senders.read().await.contains_key(recipient)
    }

    /// Push a newly-delivered envelope to `recipient`'s subscriber, if
    /// any. On backlog overflow, the oldest buffered envelope is dropped
    /// to make room and a warning is logged — new envelopes are never
    /// silently discarded in favor of old ones.
    pub async fn notify(&self, recipient: &Aid, envelope: MessageEnvelope) {
        let senders = self.senders.read().await;
        let Some(sender) = senders.get(recipient) else {
            return;
        };

        if let Err(mpsc::error::TrySendError::Full(envelope)) = sender.try_send(envelope) {
            tracing::warn!(recipient = %recipient, "subscription backlog full, dropping oldest");
            let _ = sender.try_recv();
            let _ = sender.try_send(envelope);
        }
    }
}
