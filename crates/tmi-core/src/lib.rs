//! # tmi-core
//!
//! Core primitives for the traffic management initiative (TMI) engine.
//!
//! This crate provides the foundational types shared by every TMI component:
//!
//! - **Identifiers**: Typed program identifiers, flight keys, and ULID row/event IDs
//! - **Time**: Normalization of operator-supplied timestamps to UTC
//! - **Codes**: Normalization of airport, facility, and carrier code lists
//! - **Geography**: Great-circle distance and the reference airport directory
//! - **Clock**: An injectable source of "now"
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `tmi-core` holds no program semantics. Anything that knows what a slot,
//! a ground stop, or a sandbox is lives in `tmi-flow`.
//!
//! ## Example
//!
//! ```rust
//! use tmi_core::prelude::*;
//!
//! let start = parse_utc("2026-03-14 18:00").unwrap();
//! let id = ProgramId::derive("GDP", "katl", start);
//! assert_eq!(id.as_str(), "GDP-KATL-202603141800");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod codes;
pub mod error;
pub mod geo;
pub mod id;
pub mod observability;
pub mod time;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use tmi_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::codes::{normalize_code, split_codes, CodeList};
    pub use crate::error::{Error, Result};
    pub use crate::geo::{haversine_nm, AirportDirectory, Coordinates, StaticAirportDirectory};
    pub use crate::id::{EventId, FlightKey, ProgramId, RowId};
    pub use crate::time::{floor_to_quarter_hour, parse_utc, whole_minutes_between};
}

pub use error::{Error, Result};
pub use id::{EventId, FlightKey, ProgramId, RowId};
