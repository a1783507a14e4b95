//! Exemption rules.
//!
//! An [`ExemptionEvaluator`] is an ordered list of [`ExemptionRule`] objects.
//! Evaluation visits every rule, in priority order, and reports every match
//! for audit; the first match is the reported reason, and any match exempts
//! the flight.
//!
//! Priority:
//!
//! 1. origin airport
//! 2. origin TRACON
//! 3. origin center
//! 4. destination airport, TRACON, center (GDP only)
//! 5. carrier
//! 6. callsign
//! 7. aircraft category flags
//! 8. airborne status

use std::fmt;

use serde::{Deserialize, Serialize};

use tmi_core::codes::CodeList;

use crate::flight::{AircraftCategory, Flight};
use crate::program::ProgramFamily;

/// Operator-configured exemption criteria.
///
/// An empty list never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExemptionRuleSet {
    /// Exempt departures from these airports.
    #[serde(default)]
    pub origin_airports: CodeList,
    /// Exempt departures from these TRACONs.
    #[serde(default)]
    pub origin_tracons: CodeList,
    /// Exempt departures from these centers.
    #[serde(default)]
    pub origin_centers: CodeList,
    /// Exempt arrivals at these airports (GDP only).
    #[serde(default)]
    pub dest_airports: CodeList,
    /// Exempt arrivals into these TRACONs (GDP only).
    #[serde(default)]
    pub dest_tracons: CodeList,
    /// Exempt arrivals into these centers (GDP only).
    #[serde(default)]
    pub dest_centers: CodeList,
    /// Exempt these carriers.
    #[serde(default)]
    pub carriers: CodeList,
    /// Exempt these callsigns.
    #[serde(default)]
    pub callsigns: CodeList,
    /// Exempt jets.
    #[serde(default)]
    pub exempt_jets: bool,
    /// Exempt props.
    #[serde(default)]
    pub exempt_props: bool,
    /// Exempt flights already airborne.
    #[serde(default)]
    pub exempt_airborne: bool,
}

/// Which rule exempted a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExemptionCategory {
    /// Origin airport list.
    OriginAirport,
    /// Origin TRACON list.
    OriginTracon,
    /// Origin center list.
    OriginCenter,
    /// Destination airport list.
    DestinationAirport,
    /// Destination TRACON list.
    DestinationTracon,
    /// Destination center list.
    DestinationCenter,
    /// Carrier list.
    Carrier,
    /// Callsign list.
    Callsign,
    /// Aircraft category flag.
    AircraftCategory,
    /// Airborne flag.
    Airborne,
}

impl fmt::Display for ExemptionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::OriginAirport => "origin airport",
            Self::OriginTracon => "origin TRACON",
            Self::OriginCenter => "origin center",
            Self::DestinationAirport => "destination airport",
            Self::DestinationTracon => "destination TRACON",
            Self::DestinationCenter => "destination center",
            Self::Carrier => "carrier",
            Self::Callsign => "callsign",
            Self::AircraftCategory => "aircraft category",
            Self::Airborne => "airborne",
        };
        f.write_str(text)
    }
}

/// A tagged exemption reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExemptionReason {
    /// Rule that matched.
    pub category: ExemptionCategory,
    /// Value that matched (airport code, carrier, phase, ...).
    pub matched: String,
}

impl fmt::Display for ExemptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.matched)
    }
}

/// Outcome of evaluating one flight.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExemptionDecision {
    /// True if any rule matched.
    pub exempt: bool,
    /// The highest-priority match.
    pub reason: Option<ExemptionReason>,
    /// Every match, in priority order.
    pub matches: Vec<ExemptionReason>,
}

/// One exemption predicate.
pub trait ExemptionRule: Send + Sync + fmt::Debug {
    /// The category reported when the rule matches.
    fn category(&self) -> ExemptionCategory;

    /// Returns the matched value if the rule exempts `flight`.
    fn evaluate(&self, flight: &Flight) -> Option<String>;
}

type FieldReader = fn(&Flight) -> Option<&str>;

/// Matches one flight field against a code list.
struct CodeListRule {
    category: ExemptionCategory,
    codes: CodeList,
    field: FieldReader,
}

impl fmt::Debug for CodeListRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeListRule")
            .field("category", &self.category)
            .field("codes", &self.codes)
            .finish_non_exhaustive()
    }
}

impl ExemptionRule for CodeListRule {
    fn category(&self) -> ExemptionCategory {
        self.category
    }

    fn evaluate(&self, flight: &Flight) -> Option<String> {
        let value = (self.field)(flight)?;
        self.codes.find(value).map(str::to_string)
    }
}

#[derive(Debug)]
struct AircraftCategoryRule {
    jets: bool,
    props: bool,
}

impl ExemptionRule for AircraftCategoryRule {
    fn category(&self) -> ExemptionCategory {
        ExemptionCategory::AircraftCategory
    }

    fn evaluate(&self, flight: &Flight) -> Option<String> {
        let hit = match flight.aircraft_category {
            AircraftCategory::Jet => self.jets,
            AircraftCategory::Prop => self.props,
            AircraftCategory::Other => false,
        };
        hit.then(|| flight.aircraft_category.to_string())
    }
}

#[derive(Debug)]
struct AirborneRule;

impl ExemptionRule for AirborneRule {
    fn category(&self) -> ExemptionCategory {
        ExemptionCategory::Airborne
    }

    fn evaluate(&self, flight: &Flight) -> Option<String> {
        let phase = flight.effective_phase();
        phase.is_airborne().then(|| phase.to_string())
    }
}

/// Ordered exemption rule engine.
#[derive(Debug, Default)]
pub struct ExemptionEvaluator {
    rules: Vec<Box<dyn ExemptionRule>>,
}

impl ExemptionEvaluator {
    /// Builds the evaluator for a rule set and program family.
    ///
    /// Destination rules are only installed for ground delay programs.
    #[must_use]
    pub fn new(rule_set: &ExemptionRuleSet, family: ProgramFamily) -> Self {
        let mut rules: Vec<Box<dyn ExemptionRule>> = Vec::new();
        let mut push_list =
            |category: ExemptionCategory, codes: &CodeList, field: FieldReader| {
                if !codes.is_empty() {
                    rules.push(Box::new(CodeListRule {
                        category,
                        codes: codes.clone(),
                        field,
                    }));
                }
            };

        push_list(ExemptionCategory::OriginAirport, &rule_set.origin_airports, |f| {
            Some(f.origin.as_str())
        });
        push_list(ExemptionCategory::OriginTracon, &rule_set.origin_tracons, |f| {
            f.origin_tracon.as_deref()
        });
        push_list(ExemptionCategory::OriginCenter, &rule_set.origin_centers, |f| {
            f.origin_center.as_deref()
        });
        if family == ProgramFamily::GroundDelay {
            push_list(
                ExemptionCategory::DestinationAirport,
                &rule_set.dest_airports,
                |f| Some(f.destination.as_str()),
            );
            push_list(
                ExemptionCategory::DestinationTracon,
                &rule_set.dest_tracons,
                |f| f.dest_tracon.as_deref(),
            );
            push_list(
                ExemptionCategory::DestinationCenter,
                &rule_set.dest_centers,
                |f| f.dest_center.as_deref(),
            );
        }
        push_list(ExemptionCategory::Carrier, &rule_set.carriers, Flight::carrier_code);
        push_list(ExemptionCategory::Callsign, &rule_set.callsigns, |f| {
            Some(f.callsign.as_str())
        });

        if rule_set.exempt_jets || rule_set.exempt_props {
            rules.push(Box::new(AircraftCategoryRule {
                jets: rule_set.exempt_jets,
                props: rule_set.exempt_props,
            }));
        }
        if rule_set.exempt_airborne {
            rules.push(Box::new(AirborneRule));
        }

        Self { rules }
    }

    /// Builds an evaluator from explicit rules, evaluated in the given order.
    #[must_use]
    pub fn with_rules(rules: Vec<Box<dyn ExemptionRule>>) -> Self {
        Self { rules }
    }

    /// Evaluates every rule against `flight`.
    #[must_use]
    pub fn evaluate(&self, flight: &Flight) -> ExemptionDecision {
        let matches: Vec<ExemptionReason> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.evaluate(flight).map(|matched| ExemptionReason {
                    category: rule.category(),
                    matched,
                })
            })
            .collect();

        ExemptionDecision {
            exempt: !matches.is_empty(),
            reason: matches.first().cloned(),
            matches,
        }
    }

    /// Categories of the installed rules, in evaluation order.
    #[must_use]
    pub fn categories(&self) -> Vec<ExemptionCategory> {
        self.rules.iter().map(|r| r.category()).collect()
    }

    /// Returns true if no rules are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
