//! # Chainpass Testing
//!
//! Testing utilities for chainpass reducers:
//! - deterministic clocks
//! - [`ReducerTest`], a Given-When-Then builder for reducer transitions
//! - effect assertion helpers
//!
//! ## Example
//!
//! ```ignore
//! use chainpass_testing::{ReducerTest, assertions};
//!
//! ReducerTest::new(PurchaseReducer::new())
//!     .with_env(test_env())
//!     .given_state(PurchaseState::new(purchaser))
//!     .when_action(PurchaseAction::Initiate { event_id })
//!     .then_state(|state| assert!(state.attempt.is_awaiting_payment()))
//!     .then_effects(assertions::assert_no_effects)
//!     .run();
//! ```

use chainpass_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod reducer_test;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use chainpass_testing::mocks::FixedClock;
    /// use chainpass_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Default fixed clock for tests (2025-07-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// The instant [`test_clock`] is frozen at
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_751_328_000, 0).unwrap_or_default()
    }
}

pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
