//! Point and cluster features, and the tagged union the index returns.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::equality::DeepEq;
use crate::geo::Geometry;

/// A GeoJSON feature id: either a number or a string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FeatureId {
    Number(u64),
    String(String),
}

impl From<u64> for FeatureId {
    fn from(id: u64) -> FeatureId {
        return FeatureId::Number(id);
    }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> FeatureId {
        return FeatureId::String(id.to_string());
    }
}

impl From<String> for FeatureId {
    fn from(id: String) -> FeatureId {
        return FeatureId::String(id);
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            FeatureId::Number(n) => write!(f, "{}", n),
            FeatureId::String(s) => write!(f, "{}", s),
        };
    }
}

/// Discriminant of a [`Cluster`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Point,
    Cluster,
}

/// An input location with caller-defined properties.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointFeature<P> {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id: Option<FeatureId>,
    pub geometry: Geometry,
    pub properties: P,
}

impl<P> PointFeature<P> {
    pub fn new(lng: f64, lat: f64, properties: P) -> PointFeature<P> {
        return PointFeature {
            id: None,
            geometry: Geometry::point(lng, lat),
            properties,
        };
    }

    pub fn with_id(mut self, id: impl Into<FeatureId>) -> PointFeature<P> {
        self.id = Some(id.into());
        return self;
    }

    pub fn coordinates(&self) -> &[f64; 2] {
        return self.geometry.coordinates();
    }
}

impl<P: PartialEq> DeepEq for PointFeature<P> {
    fn deep_eq(&self, other: &Self) -> bool {
        return self.id == other.id
            && self.geometry.deep_eq(&other.geometry)
            && self.properties == other.properties;
    }
}

/// A shared handle to one point of a caller-owned point array.
///
/// The index never copies input points: results refer back into the slice
/// the caller loaded, so two handles to the same input point are
/// pointer-equal.
pub struct PointRef<P> {
    points: Arc<[PointFeature<P>]>,
    index: usize,
}

impl<P> PointRef<P> {
    /// Refer to `points[index]`.
    ///
    /// Panics if `index` is out of bounds.
    pub fn new(points: Arc<[PointFeature<P>]>, index: usize) -> PointRef<P> {
        assert!(index < points.len(), "point index {} out of bounds", index);
        return PointRef { points, index };
    }

    /// Wrap a lone feature in its own allocation.
    pub fn single(feature: PointFeature<P>) -> PointRef<P> {
        return PointRef {
            points: Arc::from(vec![feature]),
            index: 0,
        };
    }

    /// Position of the point in the loaded array.
    pub fn index(&self) -> usize {
        return self.index;
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        return Arc::ptr_eq(&self.points, &other.points) && self.index == other.index;
    }
}

impl<P> Clone for PointRef<P> {
    fn clone(&self) -> Self {
        return PointRef {
            points: Arc::clone(&self.points),
            index: self.index,
        };
    }
}

impl<P> Deref for PointRef<P> {
    type Target = PointFeature<P>;

    fn deref(&self) -> &PointFeature<P> {
        return &self.points[self.index];
    }
}

impl<P: fmt::Debug> fmt::Debug for PointRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return fmt::Debug::fmt(&**self, f);
    }
}

/// A synthetic aggregate of nearby points at one zoom level.
///
/// `properties` holds the mapped-and-reduced aggregate and is `None` unless
/// the index was built with both a map and a reduce function.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterFeature<C> {
    pub id: Option<FeatureId>,
    pub geometry: Geometry,
    pub cluster_id: u64,
    pub point_count: usize,
    pub point_count_abbreviated: String,
    pub properties: Option<C>,
}

impl<C> ClusterFeature<C> {
    pub fn new(cluster_id: u64, point_count: usize, geometry: Geometry, properties: Option<C>) -> ClusterFeature<C> {
        return ClusterFeature {
            id: Some(FeatureId::Number(cluster_id)),
            geometry,
            cluster_id,
            point_count,
            point_count_abbreviated: abbreviate_count(point_count),
            properties,
        };
    }
}

/// Short label for a point count: `"950"`, `"1.2k"`, `"34k"`.
pub fn abbreviate_count(count: usize) -> String {
    if count >= 10_000 {
        return format!("{}k", (count as f64 / 1000.0).round());
    }
    if count >= 1000 {
        return format!("{}k", (count as f64 / 100.0).round() / 10.0);
    }
    return count.to_string();
}

/// A member of a clusters query: a single input point or an aggregate.
///
/// Point variants share the caller's allocation, so two results for the same
/// input point are pointer-equal.
#[derive(Debug)]
pub enum Cluster<P, C> {
    Point(PointRef<P>),
    Cluster(Arc<ClusterFeature<C>>),
}

impl<P, C> Clone for Cluster<P, C> {
    fn clone(&self) -> Self {
        return match self {
            Cluster::Point(p) => Cluster::Point(p.clone()),
            Cluster::Cluster(c) => Cluster::Cluster(Arc::clone(c)),
        };
    }
}

impl<P, C> Cluster<P, C> {
    pub fn kind(&self) -> FeatureKind {
        return match self {
            Cluster::Point(_) => FeatureKind::Point,
            Cluster::Cluster(_) => FeatureKind::Cluster,
        };
    }

    pub fn is_cluster(&self) -> bool {
        return matches!(self, Cluster::Cluster(_));
    }

    pub fn id(&self) -> Option<&FeatureId> {
        return match self {
            Cluster::Point(p) => p.id.as_ref(),
            Cluster::Cluster(c) => c.id.as_ref(),
        };
    }

    pub fn geometry(&self) -> &Geometry {
        return match self {
            Cluster::Point(p) => &p.geometry,
            Cluster::Cluster(c) => &c.geometry,
        };
    }

    pub fn coordinates(&self) -> &[f64; 2] {
        return self.geometry().coordinates();
    }

    /// Number of input points represented: 1 for a point feature.
    pub fn point_count(&self) -> usize {
        return match self {
            Cluster::Point(_) => 1,
            Cluster::Cluster(c) => c.point_count,
        };
    }

    pub fn as_point(&self) -> Option<&PointRef<P>> {
        return match self {
            Cluster::Point(p) => Some(p),
            Cluster::Cluster(_) => None,
        };
    }

    pub fn as_cluster(&self) -> Option<&Arc<ClusterFeature<C>>> {
        return match self {
            Cluster::Point(_) => None,
            Cluster::Cluster(c) => Some(c),
        };
    }

    /// Whether both values point at the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        return match (self, other) {
            (Cluster::Point(a), Cluster::Point(b)) => a.ptr_eq(b),
            (Cluster::Cluster(a), Cluster::Cluster(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
    }
}
