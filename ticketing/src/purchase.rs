//! Purchase state machine for one session.
//!
//! ```text
//! Idle ──initiate──▶ AwaitingPayment ──confirm──▶ Processing ──▶ Succeeded
//!  ▲                    │    ▲                        │      └──▶ Failed
//!  └──────cancel────────┘    └───initiate (reselect)  │
//!  ▲                                                  │
//!  └──────────────cancel (aborts the purchase job)────┘
//!  ▲
//!  └──reset / initiate── Succeeded | Failed
//! ```
//!
//! Confirming payment starts one cancellable purchase job:
//!
//! 1. take a seat hold (capacity is re-checked here, counting other holds)
//! 2. submit the payment (timeout + bounded retry)
//! 3. generate the ticket hash
//! 4. record the ticket in the ledger
//! 5. commit the hold into a sale
//!
//! A failure at any step drops the hold, releasing the seat. Once the
//! payment went through, steps 3-5 run detached so a cancelled attempt still
//! issues the ticket it paid for. Outcomes carry the attempt id and are
//! ignored unless they belong to the attempt that is still processing.

use crate::catalog::{EventCatalog, SeatHold};
use crate::error::PurchaseError;
use crate::ledger::{Ticket, TicketLedger};
use crate::payment::{PaymentPolicy, submit_payment};
use crate::ticket_hash::{SecureTicketHashGenerator, TicketHashGenerator};
use crate::types::{
    Address, AttemptId, Event, EventId, Network, PurchaseStatus, TicketHash, TransactionReference,
};
use crate::wallet::{PaymentRequest, WalletProvider};
use chainpass_core::effect::{Effect, EffectId};
use chainpass_core::environment::{Clock, SystemClock};
use chainpass_core::reducer::Reducer;
use chainpass_core::{SmallVec, smallvec};
use std::sync::Arc;

/// Id of the in-flight purchase job within a session's store
pub const PURCHASE_EFFECT: &str = "purchase";

fn purchase_effect_id() -> EffectId {
    EffectId::new(PURCHASE_EFFECT)
}

// ============================================================================
// State
// ============================================================================

/// The session's single purchase attempt
///
/// Terminal fields: `ticket_hash` and `transaction_reference` are set iff
/// the status is `Succeeded`; `error` is set iff it is `Failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseAttempt {
    /// Attempt id, redrawn on every initiate
    pub id: AttemptId,
    /// Selected event
    pub event_id: Option<EventId>,
    /// Current status
    pub status: PurchaseStatus,
    /// Issued ticket
    pub ticket_hash: Option<TicketHash>,
    /// Payment reference
    pub transaction_reference: Option<TransactionReference>,
    /// Why the attempt failed
    pub error: Option<PurchaseError>,
}

impl PurchaseAttempt {
    /// An attempt with nothing selected
    #[must_use]
    pub fn idle() -> Self {
        Self {
            id: AttemptId::new(),
            event_id: None,
            status: PurchaseStatus::Idle,
            ticket_hash: None,
            transaction_reference: None,
            error: None,
        }
    }

    /// A fresh attempt for `event_id`, waiting for payment
    #[must_use]
    pub fn awaiting_payment(event_id: EventId) -> Self {
        Self {
            event_id: Some(event_id),
            status: PurchaseStatus::AwaitingPayment,
            ..Self::idle()
        }
    }

    /// A cancelled attempt: nothing selected, id kept
    fn cancelled(id: AttemptId) -> Self {
        Self { id, ..Self::idle() }
    }

    /// This processing attempt with `outcome` applied
    ///
    /// `None` unless the attempt is processing and `outcome` concludes it.
    #[must_use]
    pub fn concluded_by(&self, outcome: &PurchaseAction) -> Option<Self> {
        if !self.is_processing() || !outcome.concludes(self.id) {
            return None;
        }

        let attempt = match outcome {
            PurchaseAction::PurchaseSucceeded { ticket, .. } => Self {
                status: PurchaseStatus::Succeeded,
                ticket_hash: Some(ticket.hash.clone()),
                transaction_reference: Some(ticket.transaction.clone()),
                error: None,
                ..self.clone()
            },
            PurchaseAction::PurchaseFailed { error, .. } => Self {
                status: PurchaseStatus::Failed,
                ticket_hash: None,
                transaction_reference: None,
                error: Some(error.clone()),
                ..self.clone()
            },
            PurchaseAction::PurchaseCancelled { .. } => Self::cancelled(self.id),
            _ => return None,
        };
        Some(attempt)
    }

    /// Failure message, if the attempt failed
    #[must_use]
    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Whether the attempt is in flight
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.status == PurchaseStatus::Processing
    }
}

impl Default for PurchaseAttempt {
    fn default() -> Self {
        Self::idle()
    }
}

/// State of one purchase session
#[derive(Clone, Debug)]
pub struct PurchaseState {
    /// Buyer's wallet address
    pub purchaser: Address,
    /// The current attempt
    pub attempt: PurchaseAttempt,
    /// Why the most recent command was rejected, cleared by the next command
    pub rejection: Option<PurchaseError>,
}

impl PurchaseState {
    /// Idle state for `purchaser`
    #[must_use]
    pub fn new(purchaser: Address) -> Self {
        Self {
            purchaser,
            attempt: PurchaseAttempt::idle(),
            rejection: None,
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Actions for the purchase reducer
#[derive(Clone, Debug)]
pub enum PurchaseAction {
    // Commands
    /// Select an event
    Initiate {
        /// Event to buy a ticket for
        event_id: EventId,
    },

    /// Pay for the selected event
    ConfirmPayment,

    /// Abandon the attempt
    Cancel,

    /// Clear a finished attempt
    Reset,

    // Events
    /// The purchase job issued a ticket
    PurchaseSucceeded {
        /// Attempt the job belonged to
        attempt_id: AttemptId,
        /// Issued ticket
        ticket: Ticket,
    },

    /// The purchase job failed
    PurchaseFailed {
        /// Attempt the job belonged to
        attempt_id: AttemptId,
        /// Failure
        error: PurchaseError,
    },

    /// A processing attempt was cancelled
    PurchaseCancelled {
        /// Cancelled attempt
        attempt_id: AttemptId,
    },
}

impl PurchaseAction {
    /// Whether this action is a user command
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::Initiate { .. } | Self::ConfirmPayment | Self::Cancel | Self::Reset
        )
    }

    /// Whether this action ends the attempt `id`
    #[must_use]
    pub fn concludes(&self, id: AttemptId) -> bool {
        match self {
            Self::PurchaseSucceeded { attempt_id, .. }
            | Self::PurchaseFailed { attempt_id, .. }
            | Self::PurchaseCancelled { attempt_id } => *attempt_id == id,
            _ => false,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the purchase reducer
#[derive(Clone)]
pub struct PurchaseEnvironment {
    /// Shared event catalog
    pub catalog: Arc<EventCatalog>,
    /// Buyer's wallet
    pub wallet: Arc<dyn WalletProvider>,
    /// Issued tickets
    pub ledger: Arc<dyn TicketLedger>,
    /// Ticket id generator
    pub hasher: Arc<dyn TicketHashGenerator>,
    /// Clock for issue timestamps
    pub clock: Arc<dyn Clock>,
    /// Organizer's wallet receiving payments
    pub payee: Address,
    /// Chain payments are sent on
    pub network: Network,
    /// Payment timeout and retry
    pub payment: PaymentPolicy,
}

impl PurchaseEnvironment {
    /// Creates a new `PurchaseEnvironment` with the secure hash generator,
    /// the system clock, Sepolia and the default payment policy
    #[must_use]
    pub fn new(
        catalog: Arc<EventCatalog>,
        wallet: Arc<dyn WalletProvider>,
        ledger: Arc<dyn TicketLedger>,
        payee: Address,
    ) -> Self {
        Self {
            catalog,
            wallet,
            ledger,
            hasher: Arc::new(SecureTicketHashGenerator::new()),
            clock: Arc::new(SystemClock),
            payee,
            network: Network::default(),
            payment: PaymentPolicy::default(),
        }
    }

    /// Replace the ticket hash generator
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn TicketHashGenerator>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the payment network
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set the payment policy
    #[must_use]
    pub fn with_payment_policy(mut self, payment: PaymentPolicy) -> Self {
        self.payment = payment;
        self
    }

    /// Payment for one ticket to `event`
    #[must_use]
    pub fn payment_request(&self, event: &Event) -> PaymentRequest {
        PaymentRequest {
            to: self.payee.clone(),
            amount: event.price,
            network: self.network,
        }
    }
}

// ============================================================================
// Purchase job
// ============================================================================

/// Everything the purchase effect needs, detached from the reducer
struct PurchaseJob {
    attempt_id: AttemptId,
    event_id: EventId,
    purchaser: Address,
    env: PurchaseEnvironment,
}

impl PurchaseJob {
    async fn run(self) -> PurchaseAction {
        let hold = match self.env.catalog.hold(self.event_id) {
            Ok(hold) => hold,
            Err(error) => return self.failed(error),
        };

        let request = PaymentRequest {
            to: self.env.payee.clone(),
            amount: hold.price(),
            network: self.env.network,
        };
        let transaction =
            match submit_payment(self.env.wallet.as_ref(), &request, &self.env.payment).await {
                Ok(transaction) => transaction,
                Err(error) => return self.failed(error),
            };

        // Issuance survives cancellation once the payment went through
        let attempt_id = self.attempt_id;
        match tokio::spawn(self.issue(hold, transaction)).await {
            Ok(action) => action,
            Err(join_error) => PurchaseAction::PurchaseFailed {
                attempt_id,
                error: PurchaseError::Ledger(join_error.to_string()),
            },
        }
    }

    async fn issue(self, hold: SeatHold, transaction: TransactionReference) -> PurchaseAction {
        let issued_at = self.env.clock.now();
        let ticket = Ticket {
            hash: self.env.hasher.generate(self.event_id, &self.purchaser, issued_at),
            event_id: self.event_id,
            purchaser: self.purchaser.clone(),
            transaction,
            price: hold.price(),
            issued_at,
        };

        if let Err(error) = self.env.ledger.record(ticket.clone()).await {
            tracing::error!(
                error = %error,
                event_id = %self.event_id,
                transaction = %ticket.transaction,
                "Paid ticket could not be recorded, seat released"
            );
            return self.failed(PurchaseError::Ledger(error.to_string()));
        }

        let event = hold.commit();
        tracing::info!(
            attempt_id = %self.attempt_id,
            event_id = %self.event_id,
            ticket = %ticket.hash,
            sold = event.sold_tickets,
            max = event.max_tickets,
            "Ticket issued"
        );

        PurchaseAction::PurchaseSucceeded {
            attempt_id: self.attempt_id,
            ticket,
        }
    }

    fn failed(&self, error: PurchaseError) -> PurchaseAction {
        tracing::warn!(
            attempt_id = %self.attempt_id,
            event_id = %self.event_id,
            error = %error,
            "Purchase failed"
        );
        PurchaseAction::PurchaseFailed {
            attempt_id: self.attempt_id,
            error,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for a purchase session
#[derive(Clone, Debug, Default)]
pub struct PurchaseReducer;

impl PurchaseReducer {
    /// Creates a new `PurchaseReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(
        state: &mut PurchaseState,
        error: PurchaseError,
    ) -> SmallVec<[Effect<PurchaseAction>; 4]> {
        tracing::debug!(error = %error, status = %state.attempt.status, "Purchase command rejected");
        state.rejection = Some(error);
        SmallVec::new()
    }

    fn reject_invalid(
        state: &mut PurchaseState,
        operation: &'static str,
    ) -> SmallVec<[Effect<PurchaseAction>; 4]> {
        let error = PurchaseError::InvalidState {
            operation,
            status: state.attempt.status,
        };
        Self::reject(state, error)
    }
}

impl Reducer for PurchaseReducer {
    type State = PurchaseState;
    type Action = PurchaseAction;
    type Environment = PurchaseEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.is_command() {
            state.rejection = None;
        }

        match action {
            // ========== Commands ==========
            PurchaseAction::Initiate { event_id } => {
                if state.attempt.is_processing() {
                    return Self::reject_invalid(state, "initiate");
                }

                let event = match env.catalog.get(event_id) {
                    Ok(event) => event,
                    Err(error) => return Self::reject(state, error),
                };
                if event.is_sold_out() {
                    return Self::reject(state, PurchaseError::SoldOut(event_id));
                }

                state.attempt = PurchaseAttempt::awaiting_payment(event_id);
                tracing::info!(
                    attempt_id = %state.attempt.id,
                    event_id = %event_id,
                    price = %event.price,
                    "Purchase initiated"
                );
                SmallVec::new()
            },

            PurchaseAction::ConfirmPayment => {
                let (PurchaseStatus::AwaitingPayment, Some(event_id)) =
                    (state.attempt.status, state.attempt.event_id)
                else {
                    return Self::reject_invalid(state, "confirm payment");
                };

                state.attempt.status = PurchaseStatus::Processing;
                tracing::info!(attempt_id = %state.attempt.id, event_id = %event_id, "Payment confirmed by user");

                let job = PurchaseJob {
                    attempt_id: state.attempt.id,
                    event_id,
                    purchaser: state.purchaser.clone(),
                    env: env.clone(),
                };
                smallvec![Effect::future(async move { Some(job.run().await) }).cancellable(purchase_effect_id())]
            },

            PurchaseAction::Cancel => match state.attempt.status {
                PurchaseStatus::AwaitingPayment => {
                    state.attempt = PurchaseAttempt::idle();
                    SmallVec::new()
                },
                PurchaseStatus::Processing => {
                    let attempt_id = state.attempt.id;
                    state.attempt = PurchaseAttempt::cancelled(attempt_id);
                    crate::metrics::record_purchase_cancelled();
                    tracing::info!(%attempt_id, "Processing purchase cancelled");

                    smallvec![
                        Effect::Cancel(purchase_effect_id()),
                        Effect::future(async move { Some(PurchaseAction::PurchaseCancelled { attempt_id }) }),
                    ]
                },
                PurchaseStatus::Idle | PurchaseStatus::Succeeded | PurchaseStatus::Failed => {
                    Self::reject_invalid(state, "cancel")
                },
            },

            PurchaseAction::Reset => match state.attempt.status {
                PurchaseStatus::Idle => SmallVec::new(),
                PurchaseStatus::Succeeded | PurchaseStatus::Failed => {
                    state.attempt = PurchaseAttempt::idle();
                    SmallVec::new()
                },
                PurchaseStatus::AwaitingPayment | PurchaseStatus::Processing => {
                    Self::reject_invalid(state, "reset")
                },
            },

            // ========== Events (from the purchase job) ==========
            outcome @ (PurchaseAction::PurchaseSucceeded { .. } | PurchaseAction::PurchaseFailed { .. }) => {
                match state.attempt.concluded_by(&outcome) {
                    Some(attempt) => {
                        match &attempt.error {
                            Some(error) => crate::metrics::record_purchase_failed(error.kind()),
                            None => crate::metrics::record_purchase_succeeded(),
                        }
                        state.attempt = attempt;
                    },
                    None => {
                        tracing::debug!(current = %state.attempt.id, "Ignoring outcome of a stale attempt");
                    },
                }
                SmallVec::new()
            },

            // Already applied by Cancel
            PurchaseAction::PurchaseCancelled { .. } => SmallVec::new(),
        }
    }
}
