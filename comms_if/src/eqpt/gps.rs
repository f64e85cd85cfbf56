//! # GPS Equipment Interface

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt::Display;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A geographic coordinate in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north
    pub lat: f64,

    /// Longitude in degrees, positive east
    pub lon: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while reading a fix from a GPS receiver.
#[derive(Debug, thiserror::Error)]
pub enum GpsError {
    #[error("The GPS receiver has no fix")]
    NoFix,

    #[error("The GPS receiver did not respond in time")]
    Timeout,

    #[error("GPS device error: {0}")]
    Device(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of GPS fixes.
pub trait GpsSource: Send {
    /// Read the latest fix from the receiver.
    ///
    /// Implementations must return within a bounded time, either with a fix or an error.
    fn read_fix(&mut self) -> Result<GeoPoint, GpsError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lon)
    }
}

impl<T: GpsSource + ?Sized> GpsSource for Box<T> {
    fn read_fix(&mut self) -> Result<GeoPoint, GpsError> {
        (**self).read_fix()
    }
}
