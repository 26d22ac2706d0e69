//! Configuration management for the ticketing application.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unparseable values fall back to their defaults; addresses and amounts are
//! checked by [`Config::validate`].

use crate::payment::PaymentPolicy;
use crate::types::{Address, AddressError, Amount, AmountParseError, Network};
use crate::wallet::{FALLBACK_ADDRESS, FALLBACK_BALANCE, MockFailureMode, MockWallet};
use chainpass_runtime::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Organizer wallet receiving ticket payments unless configured otherwise
pub const DEFAULT_PAYEE_ADDRESS: &str = "0x742e9d9b1e2a4e7b8f3c2a1d9e8f7b6a5c4d3e2f";

/// Tracing filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_LEVEL: &str = "info,chainpass_ticketing=debug";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Payment configuration
    pub payment: PaymentConfig,
    /// Mock wallet configuration
    pub wallet: WalletConfig,
    /// Tracing filter directives, e.g. `info,chainpass_ticketing=debug`
    pub log_level: String,
}

/// Payment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Organizer wallet receiving ticket payments
    pub payee_address: String,
    /// Chain payments are sent on
    pub network: Network,
    /// Upper bound for one payment, retries included (seconds)
    pub timeout_secs: u64,
    /// Retries after transient wallet errors
    pub max_retries: usize,
    /// Delay before the first retry in milliseconds, doubled each time
    pub retry_initial_delay_ms: u64,
}

/// Mock wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Signed-in address
    pub mock_address: String,
    /// Starting balance in ETH
    pub mock_balance: String,
    /// Simulated latency per call in milliseconds
    pub mock_latency_ms: u64,
    /// `none`, `reject`, `unavailable`, `hang` or `flaky:<n>`
    pub mock_failure_mode: String,
}

/// Invalid configuration value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An address setting is malformed
    #[error("{key}: {source}")]
    Address {
        /// Environment variable
        key: &'static str,
        /// Parse failure
        source: AddressError,
    },

    /// An amount setting is malformed
    #[error("{key}: {source}")]
    Amount {
        /// Environment variable
        key: &'static str,
        /// Parse failure
        source: AmountParseError,
    },

    /// The mock failure mode is unknown
    #[error("CHAINPASS_WALLET_FAILURE_MODE: {0}")]
    FailureMode(String),

    /// The payment timeout is zero
    #[error("CHAINPASS_PAYMENT_TIMEOUT_SECS must be greater than zero")]
    ZeroTimeout,

    /// `RUST_LOG` holds an invalid filter directive
    #[error("RUST_LOG: {0}")]
    LogFilter(String),
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            payment: PaymentConfig {
                payee_address: lookup("CHAINPASS_PAYEE_ADDRESS")
                    .unwrap_or_else(|| DEFAULT_PAYEE_ADDRESS.to_string()),
                network: parsed(&lookup, "CHAINPASS_NETWORK").unwrap_or_default(),
                timeout_secs: parsed(&lookup, "CHAINPASS_PAYMENT_TIMEOUT_SECS").unwrap_or(30),
                max_retries: parsed(&lookup, "CHAINPASS_PAYMENT_MAX_RETRIES").unwrap_or(2),
                retry_initial_delay_ms: parsed(&lookup, "CHAINPASS_PAYMENT_RETRY_DELAY_MS").unwrap_or(250),
            },
            wallet: WalletConfig {
                mock_address: lookup("CHAINPASS_WALLET_ADDRESS")
                    .unwrap_or_else(|| FALLBACK_ADDRESS.to_string()),
                mock_balance: lookup("CHAINPASS_WALLET_BALANCE")
                    .unwrap_or_else(|| FALLBACK_BALANCE.to_string()),
                mock_latency_ms: parsed(&lookup, "CHAINPASS_WALLET_LATENCY_MS").unwrap_or(100),
                mock_failure_mode: lookup("CHAINPASS_WALLET_FAILURE_MODE")
                    .unwrap_or_else(|| "none".to_string()),
            },
            log_level: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    /// Check every value that has no usable default
    ///
    /// # Errors
    ///
    /// Returns the first malformed setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.payee()?;
        self.mock_wallet()?;
        self.log_filter()?;
        if self.payment.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Tracing filter built from [`Config::log_level`]
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LogFilter`] if a directive does not parse.
    pub fn log_filter(&self) -> Result<EnvFilter, ConfigError> {
        EnvFilter::try_new(&self.log_level).map_err(|e| ConfigError::LogFilter(e.to_string()))
    }

    /// Parsed payee address
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Address`] if the address is malformed.
    pub fn payee(&self) -> Result<Address, ConfigError> {
        Address::parse(&self.payment.payee_address).map_err(|source| ConfigError::Address {
            key: "CHAINPASS_PAYEE_ADDRESS",
            source,
        })
    }

    /// Payment timeout and retry settings
    #[must_use]
    pub fn payment_policy(&self) -> PaymentPolicy {
        PaymentPolicy::new(
            Duration::from_secs(self.payment.timeout_secs),
            RetryPolicy::builder()
                .max_retries(self.payment.max_retries)
                .initial_delay(Duration::from_millis(self.payment.retry_initial_delay_ms))
                .max_delay(Duration::from_secs(5))
                .jitter(true)
                .build(),
        )
    }

    /// Mock wallet described by the wallet settings
    ///
    /// # Errors
    ///
    /// Returns the first malformed wallet setting.
    pub fn mock_wallet(&self) -> Result<MockWallet, ConfigError> {
        let address = Address::parse(&self.wallet.mock_address).map_err(|source| ConfigError::Address {
            key: "CHAINPASS_WALLET_ADDRESS",
            source,
        })?;
        let balance: Amount = self
            .wallet
            .mock_balance
            .parse()
            .map_err(|source| ConfigError::Amount {
                key: "CHAINPASS_WALLET_BALANCE",
                source,
            })?;
        let failure_mode: MockFailureMode = self
            .wallet
            .mock_failure_mode
            .parse()
            .map_err(ConfigError::FailureMode)?;

        Ok(MockWallet::new(address, balance)
            .with_latency(Duration::from_millis(self.wallet.mock_latency_ms))
            .with_failure_mode(failure_mode))
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
