//! Logging initialization and span helpers.
//!
//! Every program operation runs inside a `program` span carrying the
//! operation name, program ID, and control element, so log lines from demand
//! selection, allocation, and the live commit can be correlated.

use std::str::FromStr;
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Filter used when neither a directive nor `RUST_LOG` is given.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Logs go to stderr. `directive` wins over `RUST_LOG`; with neither set the
/// filter is [`DEFAULT_LOG_FILTER`]. Safe to call multiple times; subsequent
/// calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `tmi_flow=debug`)
pub fn init_logging(format: LogFormat, directive: Option<&str>) {
    INIT.call_once(|| {
        let env_filter = match directive {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        };

        // try_init: a host process may already own the global subscriber.
        let _ = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .try_init(),
        };
    });
}

/// Creates a span for a program lifecycle operation.
///
/// # Example
///
/// ```rust
/// use tmi_core::observability::program_span;
///
/// let span = program_span("simulate", "GDP-KATL-202603141800", "KATL");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn program_span(operation: &str, program_id: &str, ctl_element: &str) -> Span {
    tracing::info_span!(
        "program",
        op = operation,
        program_id = program_id,
        ctl_element = ctl_element,
    )
}

/// Creates a span for an atomic store commit.
#[must_use]
pub fn commit_span(operation: &str, mutations: usize) -> Span {
    tracing::debug_span!("commit", op = operation, mutations = mutations)
}
