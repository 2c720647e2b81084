//! Ledger error taxonomy.
//!
//! Read failures (`Unavailable`, `Query`) are absorbed by the reconciliation
//! loop and retried on the next cycle. `Rejected` is the ledger refusing a
//! submitted operation by its own rules; it is surfaced verbatim to whoever
//! submitted and never retried automatically.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for ledger boundary calls
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Errors reported across the ledger boundary
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Transport or connectivity failure, including adapter timeouts
    #[error("Ledger unavailable: {reason}")]
    Unavailable { reason: String },

    /// A specific read failed
    #[error("Ledger query `{operation}` failed: {reason}")]
    Query { operation: String, reason: String },

    /// The ledger refused a submitted operation
    #[error("Ledger rejected operation ({kind}): {reason}")]
    Rejected { kind: RejectionKind, reason: String },
}

impl LedgerError {
    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a query error for the named read
    pub fn query(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Query {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a rejection, classifying the reason text
    pub fn rejected(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Rejected {
            kind: RejectionKind::classify(&reason),
            reason,
        }
    }

    /// Whether the ledger could not be reached at all.
    ///
    /// A `Query` error means the ledger answered badly for one read and may
    /// keep doing so; only connectivity failures clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Whether this came from a read rather than a submission.
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Query { .. })
    }

    /// Rejection classification, if this is a rejection.
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            Self::Rejected { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Stable code for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "ledger_unavailable",
            Self::Query { .. } => "ledger_query_error",
            Self::Rejected { .. } => "ledger_rejected",
        }
    }
}

/// Why the ledger refused an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionKind {
    /// Caller lacks authorization (e.g. not the creator)
    Unauthorized,
    /// Campaign status does not permit the action
    WrongStatus,
    /// Action requires the deadline to have passed
    DeadlineNotReached,
    /// Action is no longer allowed after the deadline
    DeadlinePassed,
    /// Funds were already released
    AlreadyReleased,
    /// No outstanding contribution to return
    NothingToRefund,
    /// Transaction was mined but reverted
    Reverted,
    /// Anything the classifier does not recognise
    Other,
}

impl RejectionKind {
    /// Classify a free-form rejection reason.
    pub fn classify(reason: &str) -> Self {
        let reason = reason.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| reason.contains(n));

        if has(&["unauthorized", "not authorized", "only creator", "not the creator"]) {
            Self::Unauthorized
        } else if has(&["already released"]) {
            Self::AlreadyReleased
        } else if has(&["deadline not reached", "not ended", "not yet ended", "still running"]) {
            Self::DeadlineNotReached
        } else if has(&["deadline passed", "deadline has passed", "campaign ended"]) {
            Self::DeadlinePassed
        } else if has(&[
            "no contribution",
            "nothing to refund",
            "already refunded",
            "no funds",
        ]) {
            Self::NothingToRefund
        } else if has(&["revert"]) {
            Self::Reverted
        } else if has(&[
            "status",
            "not active",
            "not failed",
            "not completed",
            "invalid state",
            "goal",
        ]) {
            Self::WrongStatus
        } else {
            Self::Other
        }
    }

    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::WrongStatus => "wrong status",
            Self::DeadlineNotReached => "deadline not reached",
            Self::DeadlinePassed => "deadline passed",
            Self::AlreadyReleased => "already released",
            Self::NothingToRefund => "nothing to refund",
            Self::Reverted => "reverted",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
