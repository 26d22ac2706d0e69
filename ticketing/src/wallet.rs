//! Wallet provider boundary.
//!
//! The embedded wallet (authentication, key custody, chain RPC) is an
//! external service. The purchase flow only needs who is signed in, their
//! address and balance, and a way to send a payment. [`MockWallet`] stands in
//! for the real provider during development and tests.

use crate::types::{Address, Amount, Network, TransactionReference};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Wallet provider result
pub type WalletResult<T> = Result<T, WalletError>;

/// Boxed future returned by [`WalletProvider`] methods
pub type WalletFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Wallet provider error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Nobody is signed in
    #[error("Wallet is not connected")]
    NotAuthenticated,

    /// The provider has no chain configured
    #[error("Cannot send transaction: Chain not available")]
    ChainUnavailable,

    /// Balance lower than the payment
    #[error("Insufficient funds: need {needed} ETH, have {available} ETH")]
    InsufficientFunds {
        /// Payment amount
        needed: Amount,
        /// Current balance
        available: Amount,
    },

    /// The user or the chain rejected the transaction
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// RPC or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Provider temporarily unavailable
    #[error("Wallet provider unavailable")]
    Unavailable,
}

impl WalletError {
    /// Whether submitting the same payment again may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unavailable)
    }
}

/// Signed-in user as reported by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Embedded wallet address, once created
    pub address: Option<Address>,
    /// Whether a user is signed in
    pub is_authenticated: bool,
}

/// Connected wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Account address
    pub address: Address,
    /// Balance at connect time
    pub balance: Amount,
}

impl Wallet {
    /// Balance shown to 5 decimal places
    #[must_use]
    pub fn display_balance(&self) -> String {
        self.balance.format_eth(5)
    }
}

/// A payment to send
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Recipient
    pub to: Address,
    /// Value to transfer
    pub amount: Amount,
    /// Chain to send on
    pub network: Network,
}

/// Gas limit of a plain value transfer
pub const TRANSFER_GAS: &str = "21000";

#[derive(Serialize)]
struct QrPayload<'a> {
    to: &'a str,
    value: String,
    gas: &'a str,
    network: &'a str,
}

impl PaymentRequest {
    /// JSON payload encoded into the payment QR code
    ///
    /// `{"to":"0x…","value":"0.05","gas":"21000","network":"sepolia"}`
    ///
    /// # Errors
    ///
    /// Returns the serializer error if JSON encoding fails.
    pub fn qr_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&QrPayload {
            to: self.to.as_str(),
            value: self.amount.to_string(),
            gas: TRANSFER_GAS,
            network: self.network.as_str(),
        })
    }
}

/// Wallet provider trait
///
/// Abstraction over embedded wallet SDKs.
pub trait WalletProvider: Send + Sync {
    /// Currently signed-in user
    fn current_user(&self) -> WalletFuture<SessionUser>;

    /// Address of the connected wallet
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::NotAuthenticated`] if nobody is signed in.
    fn get_address(&self) -> WalletFuture<WalletResult<Address>>;

    /// Current balance
    ///
    /// # Errors
    ///
    /// Returns an error if the balance cannot be read.
    fn get_balance(&self) -> WalletFuture<WalletResult<Amount>>;

    /// Send a payment and return its transaction reference
    ///
    /// # Errors
    ///
    /// Returns the provider's error; see [`WalletError::is_transient`].
    fn send_payment(&self, request: PaymentRequest) -> WalletFuture<WalletResult<TransactionReference>>;
}

/// How [`MockWallet`] answers `send_payment`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MockFailureMode {
    /// Every payment succeeds (balance permitting)
    #[default]
    None,
    /// Every payment is rejected
    Reject,
    /// The provider is always unavailable
    Unavailable,
    /// The first `n` submissions fail with a network error
    Flaky(u32),
    /// Payments never complete
    Hang,
}

impl FromStr for MockFailureMode {
    type Err = String;

    /// Parses `none`, `reject`, `unavailable`, `hang` or `flaky:<n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "" | "none" => Ok(Self::None),
            "reject" => Ok(Self::Reject),
            "unavailable" => Ok(Self::Unavailable),
            "hang" => Ok(Self::Hang),
            other => other
                .strip_prefix("flaky:")
                .and_then(|n| n.parse().ok())
                .map(Self::Flaky)
                .ok_or_else(|| format!("Unknown mock failure mode: {other}")),
        }
    }
}

/// Address of [`MockWallet::fallback`]
pub const FALLBACK_ADDRESS: &str = "0x1234567890abcdef1234567890abcdef12345678";

/// Balance of [`MockWallet::fallback`]
pub const FALLBACK_BALANCE: &str = "1.234";

/// Mock wallet provider for development and tests
///
/// Simulates latency, debits its own balance on every successful payment
/// and fabricates `0x`-prefixed 32-byte transaction references.
#[derive(Clone, Debug)]
pub struct MockWallet {
    address: Address,
    balance: Arc<Mutex<Amount>>,
    authenticated: bool,
    latency: Duration,
    failure_mode: MockFailureMode,
    payment_calls: Arc<AtomicU32>,
}

impl MockWallet {
    /// Create a signed-in wallet with `balance`
    #[must_use]
    pub fn new(address: Address, balance: Amount) -> Self {
        Self {
            address,
            balance: Arc::new(Mutex::new(balance)),
            authenticated: true,
            latency: Duration::from_millis(100),
            failure_mode: MockFailureMode::None,
            payment_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The wallet the web front-end falls back to when no provider is present
    #[must_use]
    pub fn fallback() -> Self {
        let address = Address::parse(FALLBACK_ADDRESS).unwrap_or_else(|_| Address::zero());
        let balance = FALLBACK_BALANCE.parse().unwrap_or(Amount::ZERO);
        Self::new(address, balance)
    }

    /// A wallet with nobody signed in
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            authenticated: false,
            latency: Duration::ZERO,
            ..Self::new(Address::zero(), Amount::ZERO)
        }
    }

    /// Set simulated latency per call
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set how payments fail
    #[must_use]
    pub const fn with_failure_mode(mut self, failure_mode: MockFailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    /// Number of `send_payment` calls so far
    #[must_use]
    pub fn payment_calls(&self) -> u32 {
        self.payment_calls.load(Ordering::SeqCst)
    }

    /// Current balance
    #[must_use]
    pub fn balance(&self) -> Amount {
        *self.balance.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn WalletProvider> {
        Arc::new(self)
    }
}

fn random_transaction_reference() -> TransactionReference {
    use rand::RngCore;
    use std::fmt::Write;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex = bytes.iter().fold(String::with_capacity(66), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    });
    TransactionReference::new(format!("0x{hex}"))
}

impl WalletProvider for MockWallet {
    fn current_user(&self) -> WalletFuture<SessionUser> {
        let user = SessionUser {
            address: self.authenticated.then(|| self.address.clone()),
            is_authenticated: self.authenticated,
        };
        Box::pin(async move { user })
    }

    fn get_address(&self) -> WalletFuture<WalletResult<Address>> {
        let result = if self.authenticated {
            Ok(self.address.clone())
        } else {
            Err(WalletError::NotAuthenticated)
        };
        Box::pin(async move { result })
    }

    fn get_balance(&self) -> WalletFuture<WalletResult<Amount>> {
        let result = if self.authenticated {
            Ok(self.balance())
        } else {
            Err(WalletError::NotAuthenticated)
        };
        Box::pin(async move { result })
    }

    fn send_payment(&self, request: PaymentRequest) -> WalletFuture<WalletResult<TransactionReference>> {
        let wallet = self.clone();
        Box::pin(async move {
            let call = wallet.payment_calls.fetch_add(1, Ordering::SeqCst);

            // Simulate network delay
            tokio::time::sleep(wallet.latency).await;

            if !wallet.authenticated {
                return Err(WalletError::NotAuthenticated);
            }
            match wallet.failure_mode {
                MockFailureMode::None => {},
                MockFailureMode::Reject => {
                    return Err(WalletError::Rejected("User denied transaction signature".to_string()));
                },
                MockFailureMode::Unavailable => return Err(WalletError::Unavailable),
                MockFailureMode::Flaky(failures) if call < failures => {
                    return Err(WalletError::Network("connection reset by peer".to_string()));
                },
                MockFailureMode::Flaky(_) => {},
                MockFailureMode::Hang => std::future::pending::<()>().await,
            }

            {
                let mut balance = wallet.balance.lock().unwrap_or_else(PoisonError::into_inner);
                *balance = balance.checked_sub(request.amount).ok_or(WalletError::InsufficientFunds {
                    needed: request.amount,
                    available: *balance,
                })?;
            }

            let reference = random_transaction_reference();
            tracing::info!(
                to = %request.to,
                amount = %request.amount,
                network = %request.network,
                transaction = %reference,
                "Mock payment sent"
            );
            Ok(reference)
        })
    }
}
