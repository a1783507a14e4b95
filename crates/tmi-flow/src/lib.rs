//! # tmi-flow
//!
//! Ground stop (GS) and ground delay program (GDP) engine.
//!
//! This crate turns an operator's program request into a plan of controlled
//! departure and arrival times, stages it for review, and commits it to live
//! flight data:
//!
//! - **Demand**: Selecting the flights a program applies to
//! - **Exemptions**: Ordered rules that keep flights out of control
//! - **Slots**: Arrival capacity per minute of the program window
//! - **Allocation**: Earliest-available slot assignment in arrival order
//! - **Delay**: Controlled times, delay limits and ground stop holds
//! - **Lifecycle**: Preview, simulate, apply, purge and local purge
//!
//! ## Core Concepts
//!
//! - **Program**: A GS or GDP at one control element over a time window
//! - **Sandbox**: Staging area holding a simulated plan until it is applied
//! - **Live state**: Flight records the rest of the system reads
//!
//! ## Guarantees
//!
//! - **Deterministic**: Same request and demand always produce the same plan
//! - **Atomic**: Each operation commits as one unit of work or not at all
//! - **Validated first**: Malformed requests fail before anything is read
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tmi_flow::prelude::*;
//!
//! # async fn demo() -> tmi_flow::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let manager = ProgramLifecycleManager::new(store, EngineConfig::default());
//!
//! let request = ProgramRequest::ground_delay("KATL", "2026-03-14 18:00", "2026-03-14 20:00")
//!     .with_rates(40, 0)
//!     .with_delay_limit(180);
//! let simulated = manager.simulate(&request).await?;
//! let applied = manager
//!     .apply(&simulated.program.program_id, Some("ops1"))
//!     .await?;
//! println!("{} flights controlled", applied.applied_count);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod allocation;
pub mod applier;
pub mod calendar;
pub mod config;
pub mod delay;
pub mod demand;
pub mod error;
pub mod exemption;
pub mod field_map;
pub mod flight;
pub mod lifecycle;
pub mod metrics;
pub mod outbox;
pub mod program;
pub mod request;
pub mod sandbox;
pub mod slot;
pub mod store;
pub mod strategy;
pub mod summary;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use tmi_flow::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::demand::{DemandScope, FlightDemandSource};
    pub use crate::error::{Error, Result};
    pub use crate::exemption::{ExemptionCategory, ExemptionReason, ExemptionRuleSet};
    pub use crate::flight::{
        AircraftCategory, ControlRecord, ControlType, Flight, FlightPhase, LiveFlight,
        SandboxFlight,
    };
    pub use crate::lifecycle::{
        ApplyResult, PreviewResult, ProgramLifecycleManager, PurgeLocalResult, PurgeResult,
        PurgeScope, SimulationResult,
    };
    pub use crate::outbox::{AuditAction, AuditEvent, EventSink, InMemoryOutbox, TracingSink};
    pub use crate::program::{Program, ProgramFamily, ProgramKind, ProgramStatus};
    pub use crate::request::ProgramRequest;
    pub use crate::sandbox::{SandboxKey, SandboxScope};
    pub use crate::slot::{Slot, SlotStatus, SlotType};
    pub use crate::store::memory::InMemoryStore;
    pub use crate::store::{ProgramFilter, Store};
    pub use crate::summary::{DelayStats, PreviewSummary, ProgramMetrics, SimulationSummary};
}

pub use error::{Error, Result};
