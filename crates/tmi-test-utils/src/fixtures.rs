//! Pre-built test fixtures for common test scenarios.
//!
//! Provides factory functions to create test data with sensible defaults.
//! All times fall on 2026-03-14 UTC.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use tmi_core::clock::FixedClock;
use tmi_core::geo::StaticAirportDirectory;
use tmi_core::FlightKey;
use tmi_flow::config::EngineConfig;
use tmi_flow::flight::{AircraftCategory, Flight, FlightPhase};
use tmi_flow::lifecycle::ProgramLifecycleManager;
use tmi_flow::outbox::InMemoryOutbox;
use tmi_flow::request::ProgramRequest;
use tmi_flow::store::memory::InMemoryStore;

/// A clock tests move by hand.
pub type SimulatedClock = FixedClock;

/// Returns `hour:minute` UTC on the fixture day.
#[must_use]
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0)
        .single()
        .expect("valid fixture time")
}

/// Formats a fixture time the way operators type it.
#[must_use]
pub fn text(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

/// Test context with a lifecycle manager over an in-memory store.
pub struct TestContext {
    /// Shared store.
    pub store: Arc<InMemoryStore>,
    /// Audit events recorded by the manager.
    pub outbox: Arc<InMemoryOutbox>,
    /// The manager's clock.
    pub clock: Arc<SimulatedClock>,
    /// The manager under test.
    pub manager: ProgramLifecycleManager<InMemoryStore>,
}

impl TestContext {
    /// Creates a context with default configuration and the given live flights.
    #[must_use]
    pub fn new(now: DateTime<Utc>, flights: Vec<Flight>) -> Self {
        Self::with_config(EngineConfig::default(), now, flights)
    }

    /// Creates a context with an explicit configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig, now: DateTime<Utc>, flights: Vec<Flight>) -> Self {
        let store = Arc::new(InMemoryStore::with_live_flights(flights, now));
        let outbox = Arc::new(InMemoryOutbox::new());
        let clock = Arc::new(SimulatedClock::new(now));
        let manager = ProgramLifecycleManager::new(Arc::clone(&store), config)
            .with_airports(Arc::new(Scenario::airports()))
            .with_event_sink(outbox.clone())
            .with_clock(clock.clone());
        Self {
            store,
            outbox,
            clock,
            manager,
        }
    }
}

/// Builds a [`Flight`] with sensible defaults.
#[derive(Debug, Clone)]
pub struct FlightBuilder {
    flight: Flight,
}

impl FlightBuilder {
    /// Starts a prefiled jet flight keyed `CALLSIGN-ORIGIN-DESTINATION`.
    #[must_use]
    pub fn new(callsign: &str, origin: &str, destination: &str) -> Self {
        let key = format!("{callsign}-{origin}-{destination}");
        Self {
            flight: Flight {
                flight_key: FlightKey::new(key).expect("valid flight key"),
                callsign: callsign.to_string(),
                origin: origin.to_string(),
                destination: destination.to_string(),
                origin_center: None,
                origin_tracon: None,
                dest_center: None,
                dest_tracon: None,
                aircraft_category: AircraftCategory::Jet,
                carrier: None,
                phase: Some(FlightPhase::Prefile),
                etd: None,
                eta: None,
                ete_minutes: None,
            },
        }
    }

    /// Sets the flight key.
    #[must_use]
    pub fn key(mut self, key: &str) -> Self {
        self.flight.flight_key = FlightKey::new(key).expect("valid flight key");
        self
    }

    /// Sets departure and enroute time; ETA follows.
    #[must_use]
    pub fn departs(mut self, etd: DateTime<Utc>, ete_minutes: i64) -> Self {
        self.flight.etd = Some(etd);
        self.flight.ete_minutes = Some(ete_minutes);
        self.flight.eta = Some(etd + Duration::minutes(ete_minutes));
        self
    }

    /// Sets arrival and enroute time; ETD follows.
    #[must_use]
    pub fn arrives(mut self, eta: DateTime<Utc>, ete_minutes: i64) -> Self {
        self.flight.eta = Some(eta);
        self.flight.ete_minutes = Some(ete_minutes);
        self.flight.etd = Some(eta - Duration::minutes(ete_minutes));
        self
    }

    /// Sets the ETA only.
    #[must_use]
    pub fn eta(mut self, eta: Option<DateTime<Utc>>) -> Self {
        self.flight.eta = eta;
        self
    }

    /// Sets the phase.
    #[must_use]
    pub fn phase(mut self, phase: FlightPhase) -> Self {
        self.flight.phase = Some(phase);
        self
    }

    /// Sets the aircraft category.
    #[must_use]
    pub fn category(mut self, category: AircraftCategory) -> Self {
        self.flight.aircraft_category = category;
        self
    }

    /// Sets the departure and arrival centers.
    #[must_use]
    pub fn centers(mut self, origin: &str, destination: &str) -> Self {
        self.flight.origin_center = Some(origin.to_string());
        self.flight.dest_center = Some(destination.to_string());
        self
    }

    /// Sets the carrier.
    #[must_use]
    pub fn carrier(mut self, carrier: &str) -> Self {
        self.flight.carrier = Some(carrier.to_string());
        self
    }

    /// Returns the flight.
    #[must_use]
    pub fn build(self) -> Flight {
        self.flight
    }
}

/// Factory for canned demand and requests.
pub struct Scenario;

impl Scenario {
    const ORIGINS: [(&'static str, &'static str); 5] = [
        ("KORD", "ZAU"),
        ("KDFW", "ZFW"),
        ("KBOS", "ZBW"),
        ("KMIA", "ZMA"),
        ("KDEN", "ZDV"),
    ];
    const CARRIERS: [&'static str; 3] = ["AAL", "DAL", "UAL"];

    /// `count` arrivals at `destination`, one every 2 minutes from 18:00,
    /// each 120 minutes enroute.
    #[must_use]
    pub fn steady_arrivals(destination: &str, count: u32) -> Vec<Flight> {
        (0..count)
            .map(|i| {
                let (origin, center) = Self::ORIGINS[i as usize % Self::ORIGINS.len()];
                let carrier = Self::CARRIERS[i as usize % Self::CARRIERS.len()];
                FlightBuilder::new(&format!("{carrier}{}", 100 + i), origin, destination)
                    .arrives(at(18, 0) + Duration::minutes(2 * i64::from(i)), 120)
                    .centers(center, "ZTL")
                    .build()
            })
            .collect()
    }

    /// `count` arrivals at `destination`, all with the same ETA.
    #[must_use]
    pub fn bunched_arrivals(destination: &str, count: u32, eta: DateTime<Utc>) -> Vec<Flight> {
        (0..count)
            .map(|i| {
                FlightBuilder::new(&format!("SWA{}", 200 + i), "KMDW", destination)
                    .arrives(eta, 90)
                    .centers("ZAU", "ZTL")
                    .build()
            })
            .collect()
    }

    /// GDP at `ctl_element`, 18:00 to 20:00, 40 per hour, no reserve.
    #[must_use]
    pub fn gdp_request(ctl_element: &str) -> ProgramRequest {
        ProgramRequest::ground_delay(ctl_element, &text(at(18, 0)), &text(at(20, 0)))
            .with_rates(40, 0)
    }

    /// GS at `ctl_element` releasing at 20:00.
    #[must_use]
    pub fn gs_request(ctl_element: &str) -> ProgramRequest {
        ProgramRequest::ground_stop(ctl_element, &text(at(20, 0)))
    }

    /// Airport locations used by distance-scoped tests.
    #[must_use]
    pub fn airports() -> StaticAirportDirectory {
        StaticAirportDirectory::new()
            .with_airport("KATL", 33.6367, -84.4281)
            .with_airport("KCLT", 35.2140, -80.9431)
            .with_airport("KBNA", 36.1245, -86.6782)
            .with_airport("KORD", 41.9786, -87.9048)
            .with_airport("KJFK", 40.6398, -73.7789)
            .with_airport("KBOS", 42.3643, -71.0052)
    }
}
