//! Geolocation types for listings and proximity search.

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters, matching the spherical model used for
/// 2-D sphere indexes.
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// Errors that can occur when validating a [`Location`] or [`GeoPoint`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    /// Coordinates must contain exactly `[lng, lat]`.
    #[error("coordinates must contain exactly two numbers (got {0})")]
    WrongArity(usize),
    /// A coordinate is NaN or infinite.
    #[error("coordinates must be finite numbers")]
    NotFinite,
    /// Longitude outside `[-180, 180]`.
    #[error("longitude {0} is out of range")]
    LongitudeOutOfRange(f64),
    /// Latitude outside `[-90, 90]`.
    #[error("latitude {0} is out of range")]
    LatitudeOutOfRange(f64),
    /// The address is empty.
    #[error("you must supply an address")]
    MissingAddress,
}

/// A validated `[lng, lat]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    lng: f64,
    lat: f64,
}

impl GeoPoint {
    /// Create a point from longitude and latitude in degrees.
    ///
    /// # Errors
    ///
    /// Returns a [`LocationError`] if either value is not finite or out of range.
    pub fn new(lng: f64, lat: f64) -> Result<Self, LocationError> {
        if !lng.is_finite() || !lat.is_finite() {
            return Err(LocationError::NotFinite);
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(LocationError::LongitudeOutOfRange(lng));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(LocationError::LatitudeOutOfRange(lat));
        }
        Ok(Self { lng, lat })
    }

    /// Build a point from a coordinate list, which must hold exactly `[lng, lat]`.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::WrongArity`] unless exactly two values are given.
    pub fn from_coordinates(coordinates: &[f64]) -> Result<Self, LocationError> {
        match coordinates {
            [lng, lat] => Self::new(*lng, *lat),
            other => Err(LocationError::WrongArity(other.len())),
        }
    }

    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }

    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Great-circle distance to `other` in meters (haversine formula).
    #[must_use]
    pub fn distance_meters(&self, other: &Self) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

impl TryFrom<[f64; 2]> for GeoPoint {
    type Error = LocationError;

    fn try_from([lng, lat]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(lng, lat)
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(point: GeoPoint) -> Self {
        [point.lng, point.lat]
    }
}

/// Marker for the only supported geometry type.
///
/// Serializes as `"Point"` and accepts any input, so stored locations are
/// always points regardless of what a client sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointKind;

impl Serialize for PointKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("Point")
    }
}

impl<'de> Deserialize<'de> for PointKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(Self)
    }
}

/// Where a product is offered: a point plus a human-readable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default)]
    kind: PointKind,
    coordinates: GeoPoint,
    address: String,
}

impl Location {
    /// Create a location. The address is trimmed and must not be empty.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::MissingAddress`] if the address is blank.
    pub fn new(coordinates: GeoPoint, address: &str) -> Result<Self, LocationError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(LocationError::MissingAddress);
        }
        Ok(Self {
            kind: PointKind,
            coordinates,
            address: address.to_owned(),
        })
    }

    #[must_use]
    pub const fn coordinates(&self) -> GeoPoint {
        self.coordinates
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}
