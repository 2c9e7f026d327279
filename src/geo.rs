//! Geographic primitives: bounding boxes, point geometries and the unit
//! web-mercator projection used by the clustering index.
//!
//! Longitudes and latitudes are in degrees. Projected coordinates live in the
//! unit square, `x` growing east and `y` growing south, which is the layout
//! map tiles use.

use std::f64::consts::PI;

use crate::equality::DeepEq;

/// Latitude limit of the web-mercator square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// A bounding box as `[west, south, east, north]`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds(pub [f64; 4]);

impl Bounds {
    /// Create a bounding box from its four edges.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Bounds {
        return Bounds([west, south, east, north]);
    }

    /// The whole world.
    pub fn world() -> Bounds {
        return Bounds([-180.0, -90.0, 180.0, 90.0]);
    }

    /// A square box of `delta` degrees around a point.
    pub fn around(lng: f64, lat: f64, delta: f64) -> Bounds {
        return Bounds([lng - delta, lat - delta, lng + delta, lat + delta]);
    }

    #[inline]
    pub fn west(&self) -> f64 {
        return self.0[0];
    }

    #[inline]
    pub fn south(&self) -> f64 {
        return self.0[1];
    }

    #[inline]
    pub fn east(&self) -> f64 {
        return self.0[2];
    }

    #[inline]
    pub fn north(&self) -> f64 {
        return self.0[3];
    }

    /// Whether a point lies inside the box, edges included.
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        return lng >= self.west() && lng <= self.east() && lat >= self.south() && lat <= self.north();
    }
}

impl DeepEq for Bounds {
    fn deep_eq(&self, other: &Self) -> bool {
        return self.0.deep_eq(&other.0);
    }
}

/// Corner pair reported by a map widget: south-west and north-east, each as
/// `[lng, lat]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LngLatBounds {
    pub sw: [f64; 2],
    pub ne: [f64; 2],
}

impl LngLatBounds {
    pub fn new(sw: [f64; 2], ne: [f64; 2]) -> LngLatBounds {
        return LngLatBounds { sw, ne };
    }

    /// Nested array form, `[[west, south], [east, north]]`.
    pub fn to_array(&self) -> [[f64; 2]; 2] {
        return [self.sw, self.ne];
    }

    /// Flattened form, `[west, south, east, north]`.
    pub fn flatten(&self) -> Bounds {
        let [[west, south], [east, north]] = self.to_array();
        return Bounds([west, south, east, north]);
    }
}

/// The kind of a geometry, as named by GeoJSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        return match self {
            GeometryKind::Point => "Point",
        };
    }
}

/// A feature geometry. Only points are clustered.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
}

impl Geometry {
    pub fn point(lng: f64, lat: f64) -> Geometry {
        return Geometry::Point { coordinates: [lng, lat] };
    }

    pub fn kind(&self) -> GeometryKind {
        return match self {
            Geometry::Point { .. } => GeometryKind::Point,
        };
    }

    /// Coordinates as `[lng, lat]`.
    pub fn coordinates(&self) -> &[f64; 2] {
        return match self {
            Geometry::Point { coordinates } => coordinates,
        };
    }

    /// Whether every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        return self.coordinates().iter().all(|c| c.is_finite());
    }
}

impl DeepEq for Geometry {
    fn deep_eq(&self, other: &Self) -> bool {
        return self.kind() == other.kind() && self.coordinates().deep_eq(other.coordinates());
    }
}

/// Project a longitude onto the unit square.
#[inline]
pub fn lng_x(lng: f64) -> f64 {
    return lng / 360.0 + 0.5;
}

/// Project a latitude onto the unit square, clamped to `[0, 1]`.
#[inline]
pub fn lat_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    return y.clamp(0.0, 1.0);
}

/// Inverse of [`lng_x`].
#[inline]
pub fn x_lng(x: f64) -> f64 {
    return (x - 0.5) * 360.0;
}

/// Inverse of [`lat_y`].
#[inline]
pub fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    return 360.0 * y2.exp().atan() / PI - 90.0;
}
