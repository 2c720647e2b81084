//! Errors raised by the engine itself.
//!
//! Ledger failures keep their [`LedgerError`] shape; these types only add the
//! purely local refusals (busy slots, bad input, bad configuration).

use pledge_core::{LedgerError, RejectionKind};
use thiserror::Error;

use crate::actions::ActionSlot;

/// Why a user-triggered submission did not go through
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The slot already has a submission in flight; nothing was sent
    #[error("Operation already in progress on the {slot} slot")]
    OperationInProgress { slot: ActionSlot },

    /// Rejected before contacting the ledger
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The ledger refused the operation or could not be reached
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ActionError {
    /// Whether this is a local busy-slot refusal
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::OperationInProgress { .. })
    }

    /// Ledger rejection classification, when the ledger refused
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            Self::Ledger(err) => err.rejection_kind(),
            _ => None,
        }
    }

    /// Stable code for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            Self::OperationInProgress { .. } => "operation_in_progress",
            Self::InvalidInput(_) => "invalid_input",
            Self::Ledger(err) => err.code(),
        }
    }
}

/// Engine configuration could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    /// The file could not be read
    Read { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    /// The file is not valid TOML for this config
    Parse(String),

    #[error("Invalid config: {0}")]
    /// Parsed values failed validation
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_rejections_pass_through() {
        let err: ActionError = LedgerError::rejected("Campaign not completed").into();
        assert_eq!(err.rejection_kind(), Some(RejectionKind::WrongStatus));
        assert_eq!(err.code(), "ledger_rejected");
        assert!(err.to_string().contains("Campaign not completed"));
    }

    #[test]
    fn busy_slot_is_local() {
        let err = ActionError::OperationInProgress {
            slot: ActionSlot::Contribute,
        };
        assert!(err.is_in_progress());
        assert_eq!(err.rejection_kind(), None);
        assert_eq!(
            err.to_string(),
            "Operation already in progress on the contribute slot"
        );
    }
}
