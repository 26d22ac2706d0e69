//! Error taxonomy for the purchase flow.

use crate::types::{EventId, PurchaseStatus};
use chainpass_runtime::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Why a purchase operation was rejected or failed
///
/// None of these is fatal: a failed attempt can always be reset and retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// Unknown event id
    #[error("Event {0} not found")]
    NotFound(EventId),

    /// Every ticket is sold or held by another purchase
    #[error("Event {0} is sold out")]
    SoldOut(EventId),

    /// Missing or malformed user input
    #[error("{0}")]
    InvalidInput(String),

    /// The wallet refused or could not complete the payment
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// The payment did not complete in time
    #[error("Payment timed out after {0:?}")]
    Timeout(Duration),

    /// The operation is not allowed from the attempt's current status
    #[error("Cannot {operation} while the purchase is {status}")]
    InvalidState {
        /// Rejected operation
        operation: &'static str,
        /// Status at the time of the call
        status: PurchaseStatus,
    },

    /// The ticket ledger rejected the issued ticket
    #[error("Ticket issuance failed: {0}")]
    Ledger(String),

    /// The session no longer accepts operations
    #[error("Purchase session is closed")]
    SessionClosed,
}

impl PurchaseError {
    /// Short snake_case label, used as a metric dimension
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::SoldOut(_) => "sold_out",
            Self::InvalidInput(_) => "invalid_input",
            Self::PaymentFailed(_) => "payment_failed",
            Self::Timeout(_) => "timeout",
            Self::InvalidState { .. } => "invalid_state",
            Self::Ledger(_) => "ledger",
            Self::SessionClosed => "session_closed",
        }
    }
}

impl From<StoreError> for PurchaseError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Timeout(elapsed) => Self::Timeout(elapsed),
            StoreError::ChannelClosed | StoreError::ShutdownInProgress => Self::SessionClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(PurchaseError::SoldOut(EventId::new(3)).to_string(), "Event 3 is sold out");
        assert_eq!(
            PurchaseError::InvalidState {
                operation: "reset",
                status: PurchaseStatus::Processing,
            }
            .to_string(),
            "Cannot reset while the purchase is processing"
        );
    }

    #[test]
    fn test_store_errors_map_to_purchase_errors() {
        assert_eq!(
            PurchaseError::from(StoreError::ShutdownInProgress),
            PurchaseError::SessionClosed
        );
        assert_eq!(
            PurchaseError::from(StoreError::Timeout(Duration::from_secs(1))),
            PurchaseError::Timeout(Duration::from_secs(1))
        );
    }
}
