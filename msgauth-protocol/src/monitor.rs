//! Periodic garbage-collection sweep (§4.9): expired challenges, expired
//! replay-nonce entries, and retrieved-and-expired envelopes. Grounded on
//! the teacher's `SubscriptionMonitor` — a struct holding an `Arc` to the
//! thing it sweeps plus a check interval, with a `start` loop around
//! `tokio::time::sleep` — but driven by a shutdown signal instead of
//! running forever, matching §9's "graceful-shutdown barrier is required".

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;

use crate::challenge::ChallengeLedger;
use crate::nonce_store::ReplayLedger;
use crate::storage::EnvelopeStore;

/// Counts of records removed by one sweep pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub challenges_removed: usize,
    pub nonces_removed: usize,
    pub envelopes_removed: usize,
}

/// Background sweeper for the three time-bounded ledgers. Sweeping is
/// idempotent and bounded only by what is currently expired — repeated
/// runs over an unchanged store remove nothing further.
pub struct GcMonitor {
    challenges: Arc<dyn ChallengeLedger>,
    nonces: Arc<ReplayLedger>,
    envelopes: Arc<dyn EnvelopeStore>,
    sweep_interval: Duration,
}

impl GcMonitor {
    pub fn new(
        challenges: Arc<dyn ChallengeLedger>,
        nonces: Arc<ReplayLedger>,
        envelopes: Arc<dyn EnvelopeStore>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            challenges,
            nonces,
            envelopes,
            sweep_interval,
        }
    }

    pub fn with_default_interval(
        challenges: Arc<dyn ChallengeLedger>,
        nonces: Arc<ReplayLedger>,
        envelopes: Arc<dyn EnvelopeStore>,
    ) -> Self {
        Self::new(challenges, nonces, envelopes, Duration::from_secs(60))
    }

    /// Run one sweep pass at `now_ms`.
    pub async fn sweep_once(&self, now_ms: u64) -> SweepReport {
        SweepReport {
            challenges_removed: self.challenges.sweep_expired(now_ms).await,
            nonces_removed: self.nonces.sweep_expired(now_ms).await,
            envelopes_removed: self.envelopes.sweep_expired_retrieved(now_ms).await,
        }
    }

    /// Run the sweep loop until `shutdown` is signalled true. Each tick
    /// uses wall-clock milliseconds since the epoch — the caller supplies
    /// the clock via `now_ms_fn` so the loop stays testable without a
    /// forbidden `SystemTime::now()` call baked into the monitor itself.
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>, now_ms_fn: impl Fn() -> u64) {
        let mut ticker = interval(self.sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep_once(now_ms_fn()).await;
                    if report.challenges_removed > 0 || report.nonces_removed > 0 || report.envelopes_removed > 0 {
                        tracing::info!(
                            challenges = report.challenges_removed,
                            nonces = report.nonces_removed,
                            envelopes = report.envelopes_removed,
                            "gc sweep completed"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("gc monitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}
