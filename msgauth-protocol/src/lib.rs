//! # Message Authentication Protocol
//!
//! The authenticated mutation pipeline built on top of `msgauth-lib`'s
//! primitives: the two binding protocols (per-request signature and
//! challenge-response), the replay and challenge ledgers, the envelope
//! store and its subscription fan-out, the access-control filter, and
//! the `MessageCore` dispatcher that ties them together.
//!
//! ## Security model
//!
//! - Every mutation is authenticated before it touches storage — there is
//!   no unauthenticated write path.
//! - Replay and challenge ledgers enforce at-most-once consumption of a
//!   nonce or challenge; a failed proof never consumes either.
//! - Canonicalization (`msgauth_lib::canonical`) is the single source of
//!   truth for what bytes get signed; this crate never re-serializes a
//!   payload a second way.

pub mod access_control;
pub mod challenge;
pub mod manager;
pub mod monitor;
pub mod nonce_store;
pub mod purpose;
pub mod signing;
pub mod storage;
pub mod subscription;

pub use access_control::{AccessControlStore, InMemoryAccessControlStore, PermissionTag};
pub use challenge::{Challenge, ChallengeLedger, InMemoryChallengeLedger};
pub use manager::{Credential, MessageCore};
pub use monitor::{GcMonitor, SweepReport};
pub use nonce_store::ReplayLedger;
pub use purpose::Purpose;
pub use signing::{AuthBlock, SigBlock, VerifiedIdentity};
pub use storage::{EnvelopeStore, InMemoryEnvelopeStore, MessageEnvelope};
pub use subscription::{Subscription, SubscriptionRegistry};

pub type Result<T> = std::result::Result<T, msgauth_lib::AuthError>;
