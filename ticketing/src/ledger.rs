//! Ticket issuance ledger.
//!
//! Every successful purchase is recorded here before its sale is committed.
//! [`TicketLedger`] is the seam for a durable store; [`InMemoryTicketLedger`]
//! keeps tickets in process memory.

use crate::types::{Address, Amount, EventId, TicketHash, TransactionReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// An issued ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub hash: TicketHash,
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Buyer
    pub purchaser: Address,
    /// Payment that bought it
    pub transaction: TransactionReference,
    /// Price paid
    pub price: Amount,
    /// When it was issued
    pub issued_at: DateTime<Utc>,
}

/// Ledger error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A ticket with this hash is already recorded
    #[error("Ticket {0} already issued")]
    DuplicateHash(TicketHash),

    /// The backing store could not be reached
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Boxed future returned by [`TicketLedger`] methods
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Append-only record of issued tickets, unique by hash
pub trait TicketLedger: Send + Sync {
    /// Record a newly issued ticket
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateHash`] if the hash is taken, or
    /// [`LedgerError::Unavailable`] if the store cannot be written.
    fn record(&self, ticket: Ticket) -> LedgerFuture<'_, Result<(), LedgerError>>;

    /// Look up a ticket by hash
    fn find(&self, hash: &TicketHash) -> LedgerFuture<'_, Option<Ticket>>;

    /// Tickets `purchaser` holds for `event_id`, in issue order
    fn tickets_for(&self, event_id: EventId, purchaser: &Address) -> LedgerFuture<'_, Vec<Ticket>>;
}

/// In-memory ledger
#[derive(Debug, Default)]
pub struct InMemoryTicketLedger {
    tickets: RwLock<HashMap<TicketHash, Ticket>>,
}

impl InMemoryTicketLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded tickets
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no ticket has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TicketLedger for InMemoryTicketLedger {
    fn record(&self, ticket: Ticket) -> LedgerFuture<'_, Result<(), LedgerError>> {
        let result = {
            let mut tickets = self.tickets.write().unwrap_or_else(PoisonError::into_inner);
            if tickets.contains_key(&ticket.hash) {
                Err(LedgerError::DuplicateHash(ticket.hash))
            } else {
                tracing::debug!(
                    hash = %ticket.hash,
                    event_id = %ticket.event_id,
                    purchaser = %ticket.purchaser,
                    "Ticket recorded"
                );
                tickets.insert(ticket.hash.clone(), ticket);
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn find(&self, hash: &TicketHash) -> LedgerFuture<'_, Option<Ticket>> {
        let ticket = self
            .tickets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned();
        Box::pin(async move { ticket })
    }

    fn tickets_for(&self, event_id: EventId, purchaser: &Address) -> LedgerFuture<'_, Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|t| t.event_id == event_id && &t.purchaser == purchaser)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.issued_at);
        Box::pin(async move { tickets })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chainpass_testing::mocks::test_epoch;

    fn ticket(hash: &str, seconds: i64) -> Ticket {
        Ticket {
            hash: TicketHash::new(hash.to_string()),
            event_id: EventId::new(1),
            purchaser: Address::parse("0x1234567890abcdef1234567890abcdef12345678").unwrap(),
            transaction: TransactionReference::new(format!("0x{}", "ab".repeat(32))),
            price: "0.05".parse().unwrap(),
            issued_at: test_epoch() + chrono::Duration::seconds(seconds),
        }
    }

    #[tokio::test]
    async fn test_record_and_find() {
        let ledger = InMemoryTicketLedger::new();

        ledger.record(ticket("a", 0)).await.unwrap();

        let found = ledger.find(&TicketHash::new("a".to_string())).await.unwrap();
        assert_eq!(found.event_id, EventId::new(1));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let ledger = InMemoryTicketLedger::new();
        ledger.record(ticket("a", 0)).await.unwrap();

        let result = ledger.record(ticket("a", 5)).await;

        assert_eq!(
            result,
            Err(LedgerError::DuplicateHash(TicketHash::new("a".to_string())))
        );
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_tickets_for_purchaser_in_issue_order() {
        let ledger = InMemoryTicketLedger::new();
        ledger.record(ticket("late", 10)).await.unwrap();
        ledger.record(ticket("early", 1)).await.unwrap();

        let purchaser = Address::parse("0x1234567890abcdef1234567890abcdef12345678").unwrap();
        let tickets = ledger.tickets_for(EventId::new(1), &purchaser).await;

        let hashes: Vec<&str> = tickets.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["early", "late"]);
        assert!(ledger.tickets_for(EventId::new(2), &purchaser).await.is_empty());
    }
}
