//! Domain types for the chainpass ticketing system.
//!
//! Value objects shared by the catalog, the purchase flow and the wallet
//! boundary: identifiers, on-chain amounts and addresses, and event records.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable identifier of a catalog event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u32);

impl EventId {
    /// Create an `EventId`
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Numeric value of the id
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one purchase attempt within a session
///
/// A new id is drawn on every `initiate`, so outcomes of an abandoned
/// attempt can be told apart from the current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Creates a new random `AttemptId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an issued ticket
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketHash(String);

impl TicketHash {
    /// Wrap an already generated hash
    #[must_use]
    pub const fn new(hash: String) -> Self {
        Self(hash)
    }

    /// Hash as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference returned by the wallet for a submitted payment
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionReference(String);

impl TransactionReference {
    /// Wrap a provider reference
    #[must_use]
    pub const fn new(reference: String) -> Self {
        Self(reference)
    }

    /// Reference as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Amount
// ============================================================================

/// Decimal places of one ether
pub const ETH_DECIMALS: u32 = 18;

const WEI_PER_ETH: u128 = 10u128.pow(ETH_DECIMALS);

/// Error parsing a decimal ETH amount
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountParseError {
    /// Empty input
    #[error("Amount is empty")]
    Empty,

    /// Not a plain non-negative decimal number
    #[error("Invalid amount: {0}")]
    Invalid(String),

    /// More fractional digits than wei can represent
    #[error("Amount {0} has more than 18 decimal places")]
    TooPrecise(String),

    /// Larger than the representable range
    #[error("Amount {0} is too large")]
    Overflow(String),
}

/// Non-negative ETH amount held as an integer number of wei
///
/// Parsed from and displayed as a decimal ETH string (`"0.05"`), so prices
/// never pass through floating point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u128);

impl Amount {
    /// Zero ETH
    pub const ZERO: Self = Self(0);

    /// Create an amount from wei
    #[must_use]
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Amount in wei
    #[must_use]
    pub const fn wei(self) -> u128 {
        self.0
    }

    /// Subtract, returning `None` if the result would be negative
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(wei) => Some(Self(wei)),
            None => None,
        }
    }

    /// Format with exactly `decimals` fractional digits, rounding half up
    ///
    /// Used for wallet balances, which are shown to 5 places.
    #[must_use]
    pub fn format_eth(self, decimals: u32) -> String {
        let decimals = decimals.min(ETH_DECIMALS);
        let unit = 10u128.pow(ETH_DECIMALS - decimals);
        let scaled = self.0 / unit + u128::from(self.0 % unit >= unit.div_ceil(2));
        let divisor = 10u128.pow(decimals);
        let whole = scaled / divisor;

        if decimals == 0 {
            return whole.to_string();
        }
        let frac = scaled % divisor;
        format!("{whole}.{frac:0width$}", width = decimals as usize)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / WEI_PER_ETH;
        let frac = self.0 % WEI_PER_ETH;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(AmountParseError::Invalid(s.to_string()));
        }
        if frac.len() > ETH_DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(s.to_string()));
        }

        let overflow = || AmountParseError::Overflow(s.to_string());
        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(WEI_PER_ETH)
                .ok_or_else(overflow)?
        };
        let frac_wei = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<18}");
            padded.parse::<u128>().map_err(|_| overflow())?
        };

        whole_wei.checked_add(frac_wei).map(Self).ok_or_else(overflow)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

// ============================================================================
// Address
// ============================================================================

/// Error validating an account address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Missing `0x` prefix
    #[error("Address {0} must start with 0x")]
    MissingPrefix(String),

    /// Wrong number of hex digits
    #[error("Address {address} has {digits} hex digits, expected 40")]
    WrongLength {
        /// Rejected input
        address: String,
        /// Digits found after the prefix
        digits: usize,
    },

    /// Non-hex character
    #[error("Address {0} contains non-hex characters")]
    NotHex(String),
}

/// EVM account address: `0x` followed by 40 hex digits
///
/// Stored lowercase, so checksummed and plain spellings compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the prefix, length or digits are wrong.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(s.to_string()))?;

        if hex.len() != 40 {
            return Err(AddressError::WrongLength {
                address: s.to_string(),
                digits: hex.len(),
            });
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::NotHex(s.to_string()));
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// The all-zero address
    #[must_use]
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(40)))
    }

    /// Address as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

// ============================================================================
// Network
// ============================================================================

/// Chain a payment is sent on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Ethereum mainnet
    Mainnet,
    /// Sepolia testnet
    #[default]
    Sepolia,
    /// Holesky testnet
    Holesky,
}

impl Network {
    /// EIP-155 chain id
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::Mainnet => 1,
            Self::Sepolia => 11_155_111,
            Self::Holesky => 17_000,
        }
    }

    /// Lowercase network name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Sepolia => "sepolia",
            Self::Holesky => "holesky",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "ethereum" => Ok(Self::Mainnet),
            "sepolia" => Ok(Self::Sepolia),
            "holesky" => Ok(Self::Holesky),
            other => Err(format!("Unknown network: {other}")),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// An event tickets are sold for
///
/// Catalog snapshots are plain values; `sold_tickets` reflects committed
/// sales at the moment the snapshot was taken.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable id
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Short description
    pub description: String,
    /// Calendar date
    pub date: NaiveDate,
    /// Start time
    pub time: NaiveTime,
    /// Venue and city
    pub location: String,
    /// Organizer name
    pub organizer: String,
    /// Cover image URL
    pub image_url: String,
    /// Ticket price
    pub price: Amount,
    /// Capacity
    pub max_tickets: u32,
    /// Tickets sold so far
    pub sold_tickets: u32,
}

impl Event {
    /// Tickets not yet sold (ignores outstanding holds)
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.max_tickets.saturating_sub(self.sold_tickets)
    }

    /// Whether every ticket is sold
    #[must_use]
    pub const fn is_sold_out(&self) -> bool {
        self.sold_tickets >= self.max_tickets
    }

    /// Start time formatted like `09:00 AM`
    #[must_use]
    pub fn display_time(&self) -> String {
        self.time.format("%I:%M %p").to_string()
    }
}

// ============================================================================
// Purchase status
// ============================================================================

/// Lifecycle of a purchase attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseStatus {
    /// Nothing selected
    #[default]
    Idle,
    /// Event selected, waiting for the user to confirm payment
    AwaitingPayment,
    /// Payment and issuance in flight
    Processing,
    /// Ticket issued
    Succeeded,
    /// Attempt failed; see the attempt's error
    Failed,
}

impl PurchaseStatus {
    /// Whether the attempt reached an outcome
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingPayment => "awaiting payment",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_parses_decimal_eth() {
        assert_eq!("0.05".parse::<Amount>().unwrap().wei(), 50_000_000_000_000_000);
        assert_eq!("1".parse::<Amount>().unwrap().wei(), WEI_PER_ETH);
        assert_eq!(".5".parse::<Amount>().unwrap().wei(), WEI_PER_ETH / 2);
        assert_eq!("2.".parse::<Amount>().unwrap().wei(), 2 * WEI_PER_ETH);
    }

    #[test]
    fn test_amount_rejects_bad_input() {
        assert_eq!("".parse::<Amount>(), Err(AmountParseError::Empty));
        assert!(matches!("-1".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!("1.2.3".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!(".".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!(
            "0.0000000000000000001".parse::<Amount>(),
            Err(AmountParseError::TooPrecise(_))
        ));
    }

    #[test]
    fn test_amount_display_trims_trailing_zeros() {
        assert_eq!("0.050".parse::<Amount>().unwrap().to_string(), "0.05");
        assert_eq!("3".parse::<Amount>().unwrap().to_string(), "3");
        assert_eq!(Amount::from_wei(1).to_string(), "0.000000000000000001");
    }

    #[test]
    fn test_amount_format_eth_rounds() {
        let balance: Amount = "1.234".parse().unwrap();
        assert_eq!(balance.format_eth(5), "1.23400");

        let balance: Amount = "0.123456".parse().unwrap();
        assert_eq!(balance.format_eth(5), "0.12346");
        assert_eq!(Amount::ZERO.format_eth(5), "0.00000");
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let amount: Amount = "0.08".parse().unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"0.08\"");
        assert_eq!(serde_json::from_str::<Amount>(&json).unwrap(), amount);
    }

    #[test]
    fn test_address_validation() {
        let address = Address::parse("0x1234567890ABCDEF1234567890abcdef12345678").unwrap();
        assert_eq!(address.as_str(), "0x1234567890abcdef1234567890abcdef12345678");

        assert!(matches!(
            Address::parse("1234567890abcdef1234567890abcdef12345678"),
            Err(AddressError::MissingPrefix(_))
        ));
        assert!(matches!(
            Address::parse("0x742E9D9B1E2A4E7B8F3C2A1D9E8F7B6A5C4D3E2F1"),
            Err(AddressError::WrongLength { digits: 41, .. })
        ));
        assert!(matches!(
            Address::parse("0xzz34567890abcdef1234567890abcdef12345678"),
            Err(AddressError::NotHex(_))
        ));
    }

    #[test]
    fn test_network_parsing() {
        assert_eq!("Sepolia".parse::<Network>().unwrap(), Network::Sepolia);
        assert_eq!(Network::default(), Network::Sepolia);
        assert_eq!(Network::Sepolia.chain_id(), 11_155_111);
        assert!("goerli".parse::<Network>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(PurchaseStatus::Succeeded.is_terminal());
        assert!(PurchaseStatus::Failed.is_terminal());
        assert!(!PurchaseStatus::Processing.is_terminal());
    }
}
