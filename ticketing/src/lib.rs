//! chainpass ticketing - wallet-paid event tickets
//!
//! Buyers browse a shared event catalog, select an event and pay the
//! organizer from an embedded wallet. A successful payment issues a ticket
//! identified by an unguessable hash and counts one sale against the event's
//! capacity.
//!
//! # Architecture
//!
//! ```text
//!  PurchaseSession (one per buyer)
//!  ┌──────────────────────────────────────────────┐
//!  │ Store ── PurchaseReducer ── PurchaseState    │
//!  │              │                               │
//!  │              ▼ cancellable purchase job      │
//!  └──────────────┼───────────────────────────────┘
//!                 │
//!     ┌───────────┼──────────────┬────────────────┐
//!     ▼           ▼              ▼                ▼
//! EventCatalog  WalletProvider  TicketHash     TicketLedger
//! (shared,      (payment with   Generator      (issued tickets,
//!  seat holds)   timeout/retry)                 unique by hash)
//! ```
//!
//! # Overselling
//!
//! Capacity is checked when an event is selected and again, atomically, when
//! the purchase job takes its seat hold:
//!
//! ```text
//! available = max_tickets - sold_tickets - held
//!
//! if available == 0 {
//!     return SoldOut // one wins, others fail gracefully
//! }
//! ```
//!
//! The hold becomes a sale only after the ledger accepted the ticket, so the
//! sold count and the issued hashes never disagree. Every other path drops the
//! hold and releases the seat.
//!
//! # Usage
//!
//! See [`session::PurchaseSession`] for the buyer-facing operations and the
//! `demo` binary for a complete walk through.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod payment;
pub mod purchase;
pub mod session;
pub mod ticket_hash;
pub mod types;
pub mod wallet;

pub use catalog::{EventCatalog, SeatHold};
pub use config::Config;
pub use error::PurchaseError;
pub use ledger::{InMemoryTicketLedger, Ticket, TicketLedger};
pub use purchase::{PurchaseAction, PurchaseAttempt, PurchaseEnvironment, PurchaseReducer, PurchaseState};
pub use session::{PurchaseSession, WalletSession};
pub use ticket_hash::{SecureTicketHashGenerator, SequentialTicketHashGenerator, TicketHashGenerator};
pub use types::*;
pub use wallet::{MockWallet, WalletProvider};
