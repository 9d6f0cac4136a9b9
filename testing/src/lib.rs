//! # Checkin Testing
//!
//! Testing utilities and helpers for the guest check-in system.
//!
//! This crate provides:
//! - Deterministic implementations of the environment traits
//! - A Given-When-Then harness for reducers
//! - Helpers that drive effects without a running store
//!
//! ## Example
//!
//! ```ignore
//! use checkin_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(GuestReducer::new())
//!     .with_env(test_environment())
//!     .given_state(GuestState::default())
//!     .when_action(GuestAction::FetchGuests { request_id: 1 })
//!     .then_effects(|effects| assertions::assert_has_future_effect(effects))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use checkin_core::environment::{Clock, IdGenerator};


pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use checkin_testing::mocks::FixedClock;
    /// use checkin_core::environment::Clock;
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable, UUID-shaped identifiers
    ///
    /// The first eight characters encode the sequence number, so every
    /// generated id has a distinct short code.
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start counting at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
            format!("{n:08x}-0000-4000-8000-{n:012x}")
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use checkin_core::effect::Effect;
    use futures::future::BoxFuture;

    /// Drive effects to completion and collect the actions they produce
    ///
    /// Lets reducer tests follow an effect chain without a Store. Effects run
    /// one at a time, in the order given, and their actions come back in that
    /// order.
    #[must_use]
    pub fn run_effects<A>(effects: Vec<Effect<A>>) -> BoxFuture<'static, Vec<A>>
    where
        A: Send + 'static,
    {
        Box::pin(async move {
            let mut produced = Vec::new();
            for effect in effects {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => produced.extend(fut.await),
                    Effect::Sequential(children) => produced.extend(run_effects(children).await),
                }
            }
            produced
        })
    }
}

// Re-export commonly used items
pub use helpers::run_effects;
pub use mocks::{test_clock, FixedClock, SequentialIdGenerator};
