//! Payment submission: timeout, bounded retry and error mapping.
//!
//! ```text
//! timeout(policy.timeout,
//!     retry(network/unavailable errors only,
//!         wallet.send_payment(request)))
//! ```
//!
//! Rejections, insufficient funds and authentication problems fail on the
//! first attempt.

use crate::error::PurchaseError;
use crate::types::TransactionReference;
use crate::wallet::{PaymentRequest, WalletError, WalletProvider};
use chainpass_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Timeout and retry settings for one payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentPolicy {
    /// Upper bound for the whole submission, retries included
    pub timeout: Duration,
    /// Backoff between attempts after transient errors
    pub retry: RetryPolicy,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(250))
                .max_delay(Duration::from_secs(5))
                .jitter(true)
                .build(),
        }
    }
}

impl PaymentPolicy {
    /// Create a policy
    #[must_use]
    pub const fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }
}

/// Map a wallet error into the purchase error taxonomy
#[must_use]
pub fn map_wallet_error(error: &WalletError) -> PurchaseError {
    PurchaseError::PaymentFailed(error.to_string())
}

/// Submit a payment through `wallet` under `policy`
///
/// # Errors
///
/// - [`PurchaseError::Timeout`]: no answer within `policy.timeout`
/// - [`PurchaseError::PaymentFailed`]: the wallet refused, or transient
///   errors outlasted the retry budget
pub async fn submit_payment(
    wallet: &dyn WalletProvider,
    request: &PaymentRequest,
    policy: &PaymentPolicy,
) -> Result<TransactionReference, PurchaseError> {
    let attempts = AtomicU32::new(0);

    let send = retry_with_predicate(
        &policy.retry,
        || {
            if attempts.fetch_add(1, Ordering::Relaxed) > 0 {
                crate::metrics::record_payment_retry();
            }
            wallet.send_payment(request.clone())
        },
        WalletError::is_transient,
    );

    match tokio::time::timeout(policy.timeout, send).await {
        Ok(Ok(reference)) => {
            tracing::info!(
                to = %request.to,
                amount = %request.amount,
                transaction = %reference,
                attempts = attempts.load(Ordering::Relaxed),
                "Payment confirmed"
            );
            Ok(reference)
        },
        Ok(Err(error)) => {
            tracing::warn!(error = %error, to = %request.to, "Payment failed");
            Err(map_wallet_error(&error))
        },
        Err(_) => {
            tracing::warn!(
                timeout_ms = u64::try_from(policy.timeout.as_millis()).unwrap_or(u64::MAX),
                "Payment timed out"
            );
            Err(PurchaseError::Timeout(policy.timeout))
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Address, Network};
    use crate::wallet::{MockFailureMode, MockWallet};

    fn request() -> PaymentRequest {
        PaymentRequest {
            to: Address::parse("0x742e9d9b1e2a4e7b8f3c2a1d9e8f7b6a5c4d3e2f").unwrap(),
            amount: "0.05".parse().unwrap(),
            network: Network::Sepolia,
        }
    }

    fn fast_policy(timeout: Duration) -> PaymentPolicy {
        PaymentPolicy::new(
            timeout,
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(5))
                .build(),
        )
    }

    #[tokio::test]
    async fn test_successful_payment() {
        let wallet = MockWallet::fallback().with_latency(Duration::ZERO);

        let reference = submit_payment(&wallet, &request(), &fast_policy(Duration::from_secs(1)))
            .await
            .unwrap();

        assert!(reference.as_str().starts_with("0x"));
        assert_eq!(wallet.payment_calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let wallet = MockWallet::fallback()
            .with_latency(Duration::ZERO)
            .with_failure_mode(MockFailureMode::Flaky(2));

        let result = submit_payment(&wallet, &request(), &fast_policy(Duration::from_secs(1))).await;

        assert!(result.is_ok());
        assert_eq!(wallet.payment_calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let wallet = MockWallet::fallback()
            .with_latency(Duration::ZERO)
            .with_failure_mode(MockFailureMode::Unavailable);

        let result = submit_payment(&wallet, &request(), &fast_policy(Duration::from_secs(1))).await;

        assert_eq!(
            result,
            Err(PurchaseError::PaymentFailed("Wallet provider unavailable".to_string()))
        );
        assert_eq!(wallet.payment_calls(), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let wallet = MockWallet::fallback()
            .with_latency(Duration::ZERO)
            .with_failure_mode(MockFailureMode::Reject);

        let result = submit_payment(&wallet, &request(), &fast_policy(Duration::from_secs(1))).await;

        assert!(matches!(result, Err(PurchaseError::PaymentFailed(msg)) if msg.contains("rejected")));
        assert_eq!(wallet.payment_calls(), 1);
    }

    #[tokio::test]
    async fn test_hanging_wallet_times_out() {
        let wallet = MockWallet::fallback().with_failure_mode(MockFailureMode::Hang);
        let timeout = Duration::from_millis(50);

        let result = submit_payment(&wallet, &request(), &fast_policy(timeout)).await;

        assert_eq!(result, Err(PurchaseError::Timeout(timeout)));
    }
}
