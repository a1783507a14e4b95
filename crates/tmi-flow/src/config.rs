//! Engine configuration.
//!
//! Defaults come from operational practice (40 arrivals/hour, 180 minute
//! delay limit, one hour fallback enroute time). Every value can be
//! overridden from the environment; invalid values are rejected rather than
//! silently replaced.

use chrono::Duration;

use crate::error::{Error, Result};
use crate::sandbox::SandboxScope;

const ENV_SANDBOX_SCOPE: &str = "TMI_SANDBOX_SCOPE";
const ENV_DEFAULT_ETE_MINUTES: &str = "TMI_DEFAULT_ETE_MINUTES";
const ENV_GS_DEPARTURE_GRACE_MINUTES: &str = "TMI_GS_DEPARTURE_GRACE_MINUTES";
const ENV_GS_TAXI_OUT_MINUTES: &str = "TMI_GS_TAXI_OUT_MINUTES";
const ENV_DEFAULT_PROGRAM_RATE: &str = "TMI_DEFAULT_PROGRAM_RATE";
const ENV_DEFAULT_RESERVE_RATE: &str = "TMI_DEFAULT_RESERVE_RATE";
const ENV_DEFAULT_DELAY_LIMIT_MINUTES: &str = "TMI_DEFAULT_DELAY_LIMIT_MINUTES";

const DEFAULT_ETE_MINUTES: u64 = 60;
const DEFAULT_GS_DEPARTURE_GRACE_MINUTES: u64 = 5;
const DEFAULT_GS_TAXI_OUT_MINUTES: u64 = 10;
const DEFAULT_PROGRAM_RATE: u64 = 40;
const DEFAULT_RESERVE_RATE: u64 = 0;
const DEFAULT_DELAY_LIMIT_MINUTES: u64 = 180;

/// Engine-wide defaults and policy switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How staging areas are keyed.
    pub sandbox_scope: SandboxScope,
    /// Enroute time used when a flight has none and none can be derived.
    pub default_ete_min: i64,
    /// GS holds only flights whose ETD is later than now minus this buffer.
    pub gs_departure_grace_min: i64,
    /// Taxi-out allowance subtracted from the GS schedule baseline.
    pub gs_taxi_out_min: i64,
    /// Program rate when a request gives none.
    pub default_program_rate: u32,
    /// Reserve rate when a request gives none.
    pub default_reserve_rate: u32,
    /// Delay limit when a request gives none.
    pub default_delay_limit_min: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sandbox_scope: SandboxScope::default(),
            default_ete_min: 60,
            gs_departure_grace_min: 5,
            gs_taxi_out_min: 10,
            default_program_rate: 40,
            default_reserve_rate: 0,
            default_delay_limit_min: 180,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a variable is present but invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a variable is present but invalid.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sandbox_scope = match get_env(ENV_SANDBOX_SCOPE) {
            None => SandboxScope::default(),
            Some(raw) => raw.parse().map_err(|_| {
                Error::configuration(format!(
                    "{ENV_SANDBOX_SCOPE} must be 'per_program' or 'per_program_type', got '{raw}'"
                ))
            })?,
        };

        Ok(Self {
            sandbox_scope,
            default_ete_min: to_i64(
                ENV_DEFAULT_ETE_MINUTES,
                parse_positive_u64_env(&get_env, ENV_DEFAULT_ETE_MINUTES, DEFAULT_ETE_MINUTES)?,
            )?,
            gs_departure_grace_min: to_i64(
                ENV_GS_DEPARTURE_GRACE_MINUTES,
                parse_u64_env(
                    &get_env,
                    ENV_GS_DEPARTURE_GRACE_MINUTES,
                    DEFAULT_GS_DEPARTURE_GRACE_MINUTES,
                )?,
            )?,
            gs_taxi_out_min: to_i64(
                ENV_GS_TAXI_OUT_MINUTES,
                parse_u64_env(&get_env, ENV_GS_TAXI_OUT_MINUTES, DEFAULT_GS_TAXI_OUT_MINUTES)?,
            )?,
            default_program_rate: to_u32(
                ENV_DEFAULT_PROGRAM_RATE,
                parse_positive_u64_env(&get_env, ENV_DEFAULT_PROGRAM_RATE, DEFAULT_PROGRAM_RATE)?,
            )?,
            default_reserve_rate: to_u32(
                ENV_DEFAULT_RESERVE_RATE,
                parse_u64_env(&get_env, ENV_DEFAULT_RESERVE_RATE, DEFAULT_RESERVE_RATE)?,
            )?,
            default_delay_limit_min: to_i64(
                ENV_DEFAULT_DELAY_LIMIT_MINUTES,
                parse_positive_u64_env(
                    &get_env,
                    ENV_DEFAULT_DELAY_LIMIT_MINUTES,
                    DEFAULT_DELAY_LIMIT_MINUTES,
                )?,
            )?,
        })
    }

    /// Sets the sandbox scope.
    #[must_use]
    pub fn with_sandbox_scope(mut self, scope: SandboxScope) -> Self {
        self.sandbox_scope = scope;
        self
    }

    /// The GS departure grace buffer as a duration.
    #[must_use]
    pub fn gs_departure_grace(&self) -> Duration {
        Duration::minutes(self.gs_departure_grace_min)
    }
}

fn parse_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };
    raw.trim().parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a non-negative integer, got '{raw}'"))
    })
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = parse_u64_env(get_env, key, default)?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

fn to_i64(key: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::configuration(format!("{key} value {value} exceeds supported range")))
}

fn to_u32(key: &str, value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::configuration(format!("{key} value {value} exceeds supported range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = EngineConfig::from_env_with(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sandbox_scope, SandboxScope::PerProgram);
    }

    #[test]
    fn overrides_are_applied() {
        let config = EngineConfig::from_env_with(lookup(&[
            ("TMI_SANDBOX_SCOPE", "per_program_type"),
            ("TMI_DEFAULT_ETE_MINUTES", "75"),
            ("TMI_GS_DEPARTURE_GRACE_MINUTES", "0"),
            ("TMI_DEFAULT_DELAY_LIMIT_MINUTES", "90"),
        ]))
        .unwrap();
        assert_eq!(config.sandbox_scope, SandboxScope::PerProgramType);
        assert_eq!(config.default_ete_min, 75);
        assert_eq!(config.gs_departure_grace_min, 0);
        assert_eq!(config.default_delay_limit_min, 90);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        for (key, value) in [
            ("TMI_SANDBOX_SCOPE", "shared"),
            ("TMI_DEFAULT_PROGRAM_RATE", "0"),
            ("TMI_DEFAULT_ETE_MINUTES", "-5"),
            ("TMI_GS_TAXI_OUT_MINUTES", "ten"),
            ("TMI_DEFAULT_RESERVE_RATE", "99999999999"),
        ] {
            let err = EngineConfig::from_env_with(lookup(&[(key, value)])).unwrap_err();
            assert!(
                matches!(err, Error::Configuration { .. }),
                "{key}={value} gave {err}"
            );
        }
    }
}
