//! Session boundaries consumed by the UI.
//!
//! [`PurchaseSession`] owns a [`Store`] running the purchase reducer for one
//! buyer. Commands are serialised per session; [`PurchaseSession::confirm_payment`]
//! resolves once the purchase job reports back.
//!
//! [`WalletSession`] wraps the wallet provider for the wallet panel: connect,
//! show the balance and send a direct transfer.

use crate::error::PurchaseError;
use crate::payment::map_wallet_error;
use crate::purchase::{
    PurchaseAction, PurchaseAttempt, PurchaseEnvironment, PurchaseReducer, PurchaseState,
};
use crate::types::{Address, Amount, EventId, Network, PurchaseStatus, TransactionReference};
use crate::wallet::{PaymentRequest, Wallet, WalletError, WalletProvider};
use chainpass_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Store running one purchase session
pub type PurchaseStore = Store<PurchaseState, PurchaseAction, PurchaseEnvironment, PurchaseReducer>;

/// Extra time granted to the purchase job beyond the payment timeout
const OUTCOME_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// Purchase session
// ============================================================================

/// One buyer's purchase session
pub struct PurchaseSession {
    store: PurchaseStore,
    env: PurchaseEnvironment,
    /// Serialises commands so each one observes its own rejection
    dispatch: Mutex<()>,
    outcome_timeout: Duration,
}

impl PurchaseSession {
    /// Open an idle session for `purchaser`
    #[must_use]
    pub fn new(purchaser: Address, env: PurchaseEnvironment) -> Self {
        let outcome_timeout = env.payment.timeout + OUTCOME_GRACE;
        tracing::debug!(%purchaser, "Purchase session opened");

        Self {
            store: Store::new(PurchaseState::new(purchaser), PurchaseReducer::new(), env.clone()),
            env,
            dispatch: Mutex::new(()),
            outcome_timeout,
        }
    }

    /// Select an event to buy a ticket for
    ///
    /// # Errors
    ///
    /// `NotFound`, `SoldOut`, or `InvalidState` while a purchase is processing.
    pub async fn initiate(&self, event_id: EventId) -> Result<PurchaseAttempt, PurchaseError> {
        let _guard = self.dispatch.lock().await;
        self.send_command(PurchaseAction::Initiate { event_id }).await
    }

    /// Buy a ticket to `event_id` and wait for the outcome
    ///
    /// Selects the event first unless it is already awaiting payment. The
    /// returned attempt is this purchase's outcome: `Succeeded` or `Failed`,
    /// or `Idle` if it was cancelled while processing. Commands sent after
    /// the outcome do not change it.
    ///
    /// # Errors
    ///
    /// - the rejections of [`PurchaseSession::initiate`]
    /// - `InvalidState` if a purchase is already processing
    /// - `Timeout` if the job did not report back in time
    /// - `SessionClosed` after [`PurchaseSession::shutdown`], including a
    ///   shutdown while the purchase is processing
    pub async fn confirm_payment(&self, event_id: EventId) -> Result<PurchaseAttempt, PurchaseError> {
        let mut outcomes = self.store.subscribe_actions();

        let processing = {
            let _guard = self.dispatch.lock().await;

            let selected = self
                .store
                .state(|s| {
                    s.attempt.status == PurchaseStatus::AwaitingPayment
                        && s.attempt.event_id == Some(event_id)
                })
                .await;
            if !selected {
                self.send_command(PurchaseAction::Initiate { event_id }).await?;
            }

            self.send_command(PurchaseAction::ConfirmPayment).await?
        };
        let attempt_id = processing.id;

        let outcome = self
            .store
            .wait_for(&mut outcomes, |action| action.concludes(attempt_id), self.outcome_timeout)
            .await
            .map_err(|error| {
                match error {
                    StoreError::Timeout(_) => {
                        tracing::warn!(%attempt_id, "No purchase outcome before the deadline");
                    },
                    StoreError::ShutdownInProgress | StoreError::ChannelClosed => {
                        tracing::info!(%attempt_id, "Session closed while the purchase was processing");
                    },
                }
                PurchaseError::from(error)
            })?;

        // The reduced attempt wins while it is still this one: an outcome the
        // reducer ignored (a job finishing as it is cancelled) is broadcast too.
        let reduced = self
            .store
            .state(|s| (s.attempt.id == attempt_id).then(|| s.attempt.clone()))
            .await;
        Ok(reduced
            .or_else(|| processing.concluded_by(&outcome))
            .unwrap_or(processing))
    }

    /// Abandon the current attempt
    ///
    /// A processing purchase is aborted; a payment that already went through
    /// still issues its ticket, but the attempt is not updated.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the attempt is awaiting payment or processing.
    pub async fn cancel(&self) -> Result<PurchaseAttempt, PurchaseError> {
        let _guard = self.dispatch.lock().await;
        self.send_command(PurchaseAction::Cancel).await
    }

    /// Clear a finished attempt
    ///
    /// # Errors
    ///
    /// `InvalidState` while awaiting payment or processing.
    pub async fn reset(&self) -> Result<PurchaseAttempt, PurchaseError> {
        let _guard = self.dispatch.lock().await;
        self.send_command(PurchaseAction::Reset).await
    }

    /// Snapshot of the current attempt
    pub async fn attempt(&self) -> PurchaseAttempt {
        self.store.state(|s| s.attempt.clone()).await
    }

    /// Payment the user is asked to approve, while awaiting payment
    pub async fn payment_request(&self) -> Option<PaymentRequest> {
        let attempt = self.attempt().await;
        if attempt.status != PurchaseStatus::AwaitingPayment {
            return None;
        }
        let event = self.env.catalog.get(attempt.event_id?).ok()?;
        Some(self.env.payment_request(&event))
    }

    /// Close the session, aborting a processing purchase
    pub fn shutdown(&self) {
        self.store.shutdown();
    }

    async fn send_command(&self, action: PurchaseAction) -> Result<PurchaseAttempt, PurchaseError> {
        self.store.send(action).await?;
        self.store
            .state(|s| match &s.rejection {
                Some(error) => Err(error.clone()),
                None => Ok(s.attempt.clone()),
            })
            .await
    }
}

impl std::fmt::Debug for PurchaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseSession")
            .field("outcome_timeout", &self.outcome_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Wallet session
// ============================================================================

/// Wallet panel operations
#[derive(Clone)]
pub struct WalletSession {
    provider: Arc<dyn WalletProvider>,
    network: Network,
}

impl WalletSession {
    /// Creates a new `WalletSession`
    #[must_use]
    pub fn new(provider: Arc<dyn WalletProvider>, network: Network) -> Self {
        Self { provider, network }
    }

    /// Read the signed-in user's address and balance
    ///
    /// # Errors
    ///
    /// [`WalletError::NotAuthenticated`] if nobody is signed in, or the
    /// provider's error.
    pub async fn connect(&self) -> Result<Wallet, WalletError> {
        let user = self.provider.current_user().await;
        if !user.is_authenticated {
            return Err(WalletError::NotAuthenticated);
        }

        let address = self.provider.get_address().await?;
        let balance = self.provider.get_balance().await?;
        tracing::info!(%address, balance = %balance, network = %self.network, "Wallet connected");

        Ok(Wallet { address, balance })
    }

    /// Send `amount` ETH to `recipient`
    ///
    /// # Errors
    ///
    /// `InvalidInput` when either field is blank or malformed,
    /// `PaymentFailed` when the provider refuses.
    pub async fn send(&self, recipient: &str, amount: &str) -> Result<TransactionReference, PurchaseError> {
        let (recipient, amount) = (recipient.trim(), amount.trim());
        if recipient.is_empty() || amount.is_empty() {
            return Err(PurchaseError::InvalidInput(
                "Please enter both amount and recipient address".to_string(),
            ));
        }

        let to = Address::parse(recipient).map_err(|e| PurchaseError::InvalidInput(e.to_string()))?;
        let amount: Amount = amount
            .parse()
            .map_err(|e: crate::types::AmountParseError| PurchaseError::InvalidInput(e.to_string()))?;

        let request = PaymentRequest {
            to,
            amount,
            network: self.network,
        };
        match self.provider.send_payment(request).await {
            Ok(reference) => {
                tracing::info!(transaction = %reference, amount = %amount, "Transfer sent");
                Ok(reference)
            },
            Err(error) => {
                tracing::error!(error = %error, "Transfer failed");
                Err(map_wallet_error(&error))
            },
        }
    }
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}
