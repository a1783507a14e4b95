//! Shared test utilities for TMI engine tests.
//!
//! This crate provides:
//! - [`TestContext`]: A lifecycle manager wired to an in-memory store, a
//!   pinned clock and an audit outbox
//! - [`FlightBuilder`] and [`Scenario`]: Flight data with sensible defaults
//! - Custom assertion helpers for slot calendars and live state
//!
//! # Example
//!
//! ```rust,ignore
//! use tmi_test_utils::{at, Scenario, TestContext};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::new(at(17, 0), Scenario::steady_arrivals("KATL", 50));
//!     let result = ctx.manager.simulate(&Scenario::gdp_request("KATL")).await.unwrap();
//!     // ... assert on result ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tmi_flow=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
