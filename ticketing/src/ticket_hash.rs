//! Ticket identifiers.
//!
//! # Security
//!
//! - Every hash mixes 256 bits from the OS-seeded CSPRNG (`rand::thread_rng`)
//!   into SHA-256, so identical inputs never produce the same hash
//! - Hashes are 256-bit digests encoded as base64url without padding (43 characters)
//! - Event, purchaser and issue time are bound into the digest but cannot be
//!   recovered from it

use crate::types::{Address, EventId, TicketHash};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces the identifier of a newly issued ticket
pub trait TicketHashGenerator: Send + Sync {
    /// Generate a hash for a ticket to `event_id` bought by `purchaser` at `issued_at`
    fn generate(&self, event_id: EventId, purchaser: &Address, issued_at: DateTime<Utc>)
    -> TicketHash;
}

/// Production generator: SHA-256 over the ticket fields and fresh randomness
#[derive(Clone, Copy, Debug, Default)]
pub struct SecureTicketHashGenerator;

impl SecureTicketHashGenerator {
    /// Create a new generator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TicketHashGenerator for SecureTicketHashGenerator {
    fn generate(
        &self,
        event_id: EventId,
        purchaser: &Address,
        issued_at: DateTime<Utc>,
    ) -> TicketHash {
        use base64::Engine;
        use rand::RngCore;
        use sha2::{Digest, Sha256};

        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut hasher = Sha256::new();
        hasher.update(event_id.get().to_be_bytes());
        hasher.update(purchaser.as_str().as_bytes());
        hasher.update(issued_at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
        hasher.update(nonce);

        TicketHash::new(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }
}

/// Deterministic generator for tests and demos
///
/// Yields `ticket-<event>-<n>` with a counter private to the generator.
#[derive(Debug)]
pub struct SequentialTicketHashGenerator {
    next: AtomicU64,
}

impl SequentialTicketHashGenerator {
    /// Create a generator starting at 1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialTicketHashGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketHashGenerator for SequentialTicketHashGenerator {
    fn generate(&self, event_id: EventId, _purchaser: &Address, _issued_at: DateTime<Utc>) -> TicketHash {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        TicketHash::new(format!("ticket-{event_id}-{n:06}"))
    }
}
