//! Error types for the authenticated mutation pipeline.
//!
//! This module provides a single, structured error type shared by every
//! layer of the core — the canonicalizer, the key-state store, both
//! signature protocols, the access-control filter, and the envelope
//! engine all fail into this type, so callers never have to match on
//! more than one error hierarchy.

use std::fmt;

/// Error codes for telemetry correlation and FFI boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AuthErrorCode {
    /// Requested resource does not exist.
    NotFound = 1000,
    /// Resource already exists (e.g. duplicate registration).
    AlreadyExists = 1001,
    /// Argument or protocol-state validation failed.
    Validation = 2000,
    /// A cryptographic signature failed to verify.
    Signature = 3000,
    /// A challenge record is invalid, expired, or reused.
    Challenge = 3001,
    /// The request is well-formed but not permitted.
    Authorization = 4000,
    /// Verification could not complete in time.
    Timeout = 5000,
    /// Internal/unexpected failure (storage, etc).
    Internal = 9999,
}

/// What kind of resource a `NotFound`/`AlreadyExists` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    KeyState,
    Challenge,
    Envelope,
    User,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::KeyState => "keyState",
            Self::Challenge => "challenge",
            Self::Envelope => "envelope",
            Self::User => "user",
        };
        write!(f, "{s}")
    }
}

/// Sub-reason for a `Validation` error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    /// `timestamp-ms` fell outside the allowed clock skew.
    Timestamp,
    /// `(keyId, nonce)` was already consumed (replay).
    NonceReplay,
    /// `nonce` was malformed.
    NonceFormat,
    /// Recomputed `args-hash` did not match the challenge's.
    ArgsHash,
    /// `ksn` in the mutation did not match the key state's `ksn`.
    KsnMismatch,
    /// A rotation's `new-ksn` was not exactly `old-ksn + 1`.
    KsnStale,
    /// A challenge's `purpose` did not match the mutation being proved.
    Purpose,
    /// The `sig`/`auth` block was missing.
    SigMissing,
    /// The `sig`/`auth` block was present but malformed.
    SigMalformed,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timestamp => "timestamp",
            Self::NonceReplay => "nonce replay",
            Self::NonceFormat => "nonce format",
            Self::ArgsHash => "argsHash mismatch",
            Self::KsnMismatch => "ksn mismatch",
            Self::KsnStale => "ksn stale",
            Self::Purpose => "purpose mismatch",
            Self::SigMissing => "sig missing",
            Self::SigMalformed => "sig malformed",
        };
        write!(f, "{s}")
    }
}

/// Why an `Authorization` error was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationReason {
    /// Sender is on the recipient's deny-list.
    Denied,
    /// Recipient's allow-list is active and sender is not on it.
    NotAllowed,
    /// Sender lacks a required role permission.
    Permission(String),
}

impl fmt::Display for AuthorizationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied => write!(f, "denied"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::Permission(p) => write!(f, "missing permission {p}"),
        }
    }
}

/// Why a `Challenge` error was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeReason {
    Used,
    Expired,
    Skew,
}

impl fmt::Display for ChallengeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Used => "used",
            Self::Expired => "expired",
            Self::Skew => "skew",
        };
        write!(f, "{s}")
    }
}

/// The error type returned by every fallible operation in the core.
#[derive(Debug)]
pub enum AuthError {
    /// Resource not found.
    NotFound {
        kind: ResourceKind,
        identifier: String,
    },

    /// Resource already exists.
    AlreadyExists {
        kind: ResourceKind,
        identifier: String,
    },

    /// Argument or protocol-state validation failed.
    Validation {
        reason: ValidationReason,
        hint: Option<String>,
    },

    /// A signature failed to verify, or a multi-sig threshold was not met.
    Signature { hint: Option<String> },

    /// A challenge record could not be consumed.
    Challenge { reason: ChallengeReason },

    /// The request is well-formed but not permitted.
    Authorization { reason: AuthorizationReason },

    /// Verification could not complete within the allotted budget.
    Timeout { operation: String, budget_ms: u64 },

    /// Internal/unexpected error (storage, etc), with a correlation id.
    Internal {
        message: String,
        correlation_id: String,
    },
}

impl AuthError {
    /// Get the error code for FFI/telemetry correlation.
    pub fn code(&self) -> AuthErrorCode {
        match self {
            Self::NotFound { .. } => AuthErrorCode::NotFound,
            Self::AlreadyExists { .. } => AuthErrorCode::AlreadyExists,
            Self::Validation { .. } => AuthErrorCode::Validation,
            Self::Signature { .. } => AuthErrorCode::Signature,
            Self::Challenge { .. } => AuthErrorCode::Challenge,
            Self::Authorization { .. } => AuthErrorCode::Authorization,
            Self::Timeout { .. } => AuthErrorCode::Timeout,
            Self::Internal { .. } => AuthErrorCode::Internal,
        }
    }

    /// Whether retrying the same request might succeed (e.g. after ledger
    /// expiry or clock resync). Security-relevant failures are never
    /// retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Internal { .. })
    }

    pub fn not_found(kind: ResourceKind, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn already_exists(kind: ResourceKind, identifier: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn validation(reason: ValidationReason) -> Self {
        Self::Validation { reason, hint: None }
    }

    pub fn validation_with_hint(reason: ValidationReason, hint: impl Into<String>) -> Self {
        Self::Validation {
            reason,
            hint: Some(hint.into()),
        }
    }

    pub fn signature() -> Self {
        Self::Signature { hint: None }
    }

    pub fn signature_with_hint(hint: impl Into<String>) -> Self {
        Self::Signature {
            hint: Some(hint.into()),
        }
    }

    pub fn challenge(reason: ChallengeReason) -> Self {
        Self::Challenge { reason }
    }

    pub fn authorization(reason: AuthorizationReason) -> Self {
        Self::Authorization { reason }
    }

    /// Wrap an opaque internal failure. Never pass key material or raw
    /// signatures here — only a human-readable summary.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            correlation_id: correlation_id(),
        }
    }
}

/// Tiny dependency-free correlation id (a UUID crate is not pulled into
/// this leaf crate solely for log correlation ids).
fn correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("corr-{nanos:x}")
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, identifier } => {
                write!(f, "{kind} not found: {identifier}")
            }
            Self::AlreadyExists { kind, identifier } => {
                write!(f, "{kind} already exists: {identifier}")
            }
            Self::Validation { reason, hint } => {
                if let Some(hint) = hint {
                    write!(f, "validation failed ({reason}): {hint}")
                } else {
                    write!(f, "validation failed ({reason})")
                }
            }
            Self::Signature { hint } => {
                if let Some(hint) = hint {
                    write!(f, "signature verification failed: {hint}")
                } else {
                    write!(f, "signature verification failed")
                }
            }
            Self::Challenge { reason } => write!(f, "challenge {reason}"),
            Self::Authorization { reason } => write!(f, "authorization failed: {reason}"),
            Self::Timeout {
                operation,
                budget_ms,
            } => write!(f, "{operation} timed out after {budget_ms}ms"),
            Self::Internal {
                message,
                correlation_id,
            } => write!(f, "internal error [{correlation_id}]: {message}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("serialization error: {err}"))
    }
}
