//! Great-circle geometry and the reference airport directory.
//!
//! Distance-scoped programs include every departure airport within a radius
//! of the control element. The radius is measured along the great circle
//! (haversine) in nautical miles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codes::normalize_code;

/// Mean Earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, north positive.
    pub lat: f64,
    /// Longitude in degrees, east positive.
    pub lon: f64,
}

impl Coordinates {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance between two points in nautical miles.
#[must_use]
pub fn haversine_nm(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Reference lookup of airport locations.
pub trait AirportDirectory: Send + Sync {
    /// Returns the location of an airport by code, if known.
    fn coordinates(&self, code: &str) -> Option<Coordinates>;

    /// Returns every known airport within `radius_nm` of `center`,
    /// sorted by code.
    fn airports_within(&self, center: Coordinates, radius_nm: f64) -> Vec<String>;
}

/// One entry of an airport directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportRecord {
    /// Airport code (ICAO preferred).
    pub code: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// An in-memory [`AirportDirectory`] backed by a sorted map.
#[derive(Debug, Clone, Default)]
pub struct StaticAirportDirectory {
    airports: BTreeMap<String, Coordinates>,
}

impl StaticAirportDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an airport.
    pub fn insert(&mut self, code: &str, location: Coordinates) {
        self.airports.insert(normalize_code(code), location);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_airport(mut self, code: &str, lat: f64, lon: f64) -> Self {
        self.insert(code, Coordinates::new(lat, lon));
        self
    }

    /// Returns the number of airports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.airports.len()
    }

    /// Returns true if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }
}

impl FromIterator<AirportRecord> for StaticAirportDirectory {
    fn from_iter<I: IntoIterator<Item = AirportRecord>>(iter: I) -> Self {
        let mut directory = Self::new();
        for record in iter {
            directory.insert(&record.code, Coordinates::new(record.lat, record.lon));
        }
        directory
    }
}

impl AirportDirectory for StaticAirportDirectory {
    fn coordinates(&self, code: &str) -> Option<Coordinates> {
        self.airports.get(&normalize_code(code)).copied()
    }

    fn airports_within(&self, center: Coordinates, radius_nm: f64) -> Vec<String> {
        self.airports
            .iter()
            .filter(|(_, loc)| haversine_nm(center, **loc) <= radius_nm)
            .map(|(code, _)| code.clone())
            .collect()
    }
}
