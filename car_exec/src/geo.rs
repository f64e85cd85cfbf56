//! # Geographic helpers
//!
//! Great-circle distances, the angle between three points and which side of a line a point lies
//! on. These drive the waypoint navigator's steering decisions, so they work directly in decimal
//! degrees and metres rather than projecting into a local frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::GeoPoint;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Radius of the earth used in the haversine distance, in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A geographic rectangle in decimal degrees.
///
/// Always satisfies `left < right` and `bottom < top`, which is checked on construction and when
/// loaded from parameters through [`BoundingBox::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western-most longitude
    pub left: f64,

    /// Eastern-most longitude
    pub right: f64,

    /// Northern-most latitude
    pub top: f64,

    /// Southern-most latitude
    pub bottom: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Which side of a directed line a point lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
    Middle,
}

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Invalid bounding box, expected left < right and bottom < top, got {0:?}")]
    InvalidBoundingBox(BoundingBox),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BoundingBox {
    pub fn new(left: f64, right: f64, top: f64, bottom: f64) -> Result<Self, GeoError> {
        let bbox = Self {
            left,
            right,
            top,
            bottom,
        };

        bbox.validate()?;

        Ok(bbox)
    }

    /// Check the ordering invariant of the box.
    pub fn validate(&self) -> Result<(), GeoError> {
        // Written as negations so that NaNs are rejected too
        if !(self.left < self.right) || !(self.bottom < self.top) {
            return Err(GeoError::InvalidBoundingBox(*self));
        }

        Ok(())
    }

    /// Returns true if the point is inside the box, points on any edge are inside.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.bottom
            && point.lat <= self.top
            && point.lon >= self.left
            && point.lon <= self.right
    }

    /// The centre of the box.
    pub fn centre(&self) -> GeoPoint {
        GeoPoint::new(
            (self.top + self.bottom) / 2.0,
            (self.left + self.right) / 2.0,
        )
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Great-circle distance between two points in meters, using the haversine formula.
pub fn distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = lat_a - lat_b;
    let d_lon = a.lon.to_radians() - b.lon.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * h.sqrt().asin() * EARTH_RADIUS_M
}

/// The angle `AOB` at `o`, in degrees in the range `[0, 180]`.
///
/// The angle is found from the three great-circle distances with the law of cosines. If `o`
/// coincides with either `a` or `b` the angle is undefined and `0` is returned.
pub fn angle_deg(a: &GeoPoint, o: &GeoPoint, b: &GeoPoint) -> f64 {
    let oa = distance_m(o, a);
    let ob = distance_m(o, b);
    let ab = distance_m(a, b);

    if oa == 0.0 || ob == 0.0 {
        return 0.0;
    }

    // Rounding can push the cosine just outside [-1, 1] for near-colinear points
    let cos = ((ob * ob + oa * oa - ab * ab) / (2.0 * ob * oa)).max(-1.0).min(1.0);

    cos.acos().to_degrees()
}

/// Which side of the directed line `a -> b` the point `p` lies on.
///
/// Uses the sign of the cross product `ab x ap` in a (lon, lat) plane, so positive is to the left
/// when looking from `a` towards `b`.
pub fn side(a: &GeoPoint, b: &GeoPoint, p: &GeoPoint) -> Side {
    let ab = Vector2::new(b.lon - a.lon, b.lat - a.lat);
    let ap = Vector2::new(p.lon - a.lon, p.lat - a.lat);

    let m = ab.perp(&ap);

    if m > 0.0 {
        Side::Left
    } else if m < 0.0 {
        Side::Right
    } else {
        Side::Middle
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_distance() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);

        // One degree of latitude on a sphere of the WGS84 equatorial radius
        assert!((distance_m(&a, &b) - 111_319.49).abs() < 0.01);
        assert_eq!(distance_m(&a, &a), 0.0);
        assert!((distance_m(&a, &b) - distance_m(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn test_angle() {
        let o = GeoPoint::new(39.9560, 116.4440);
        let north = GeoPoint::new(39.9561, 116.4440);
        let east = GeoPoint::new(39.9560, 116.4441);
        let south = GeoPoint::new(39.9559, 116.4440);

        assert!((angle_deg(&north, &o, &east) - 90.0).abs() < 0.1);
        assert!((angle_deg(&north, &o, &south) - 180.0).abs() < 0.1);
        assert!(angle_deg(&north, &o, &north).abs() < 0.1);

        // Degenerate
        assert_eq!(angle_deg(&o, &o, &east), 0.0);
        assert_eq!(angle_deg(&north, &o, &o), 0.0);
    }

    #[test]
    fn test_side() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);

        // Heading north, west is on the left
        assert_eq!(side(&a, &b, &GeoPoint::new(2.0, -1.0)), Side::Left);
        assert_eq!(side(&a, &b, &GeoPoint::new(2.0, 1.0)), Side::Right);
        assert_eq!(side(&a, &b, &GeoPoint::new(2.0, 0.0)), Side::Middle);
    }

    #[test]
    fn test_bbox() -> Result<(), GeoError> {
        let bbox = BoundingBox::new(116.0, 117.0, 40.0, 39.0)?;

        // Edges are inclusive
        assert!(bbox.contains(&GeoPoint::new(40.0, 116.0)));
        assert!(bbox.contains(&GeoPoint::new(39.0, 117.0)));
        assert!(bbox.contains(&GeoPoint::new(39.5, 116.5)));
        assert!(!bbox.contains(&GeoPoint::new(40.000001, 116.5)));
        assert!(!bbox.contains(&GeoPoint::new(39.5, 115.999999)));

        assert_eq!(bbox.centre(), GeoPoint::new(39.5, 116.5));

        assert!(BoundingBox::new(117.0, 116.0, 40.0, 39.0).is_err());
        assert!(BoundingBox::new(116.0, 117.0, 39.0, 40.0).is_err());
        assert!(BoundingBox::new(116.0, 116.0, 40.0, 39.0).is_err());

        Ok(())
    }
}
