//! Clustering options and their defaults.

use std::fmt;
use std::sync::Arc;

use crate::equality::DeepEq;

/// Maps a point's properties to its initial aggregate value.
pub type MapFn<P, C> = Arc<dyn Fn(&P) -> C + Send + Sync>;

/// Folds a child aggregate into an accumulator.
pub type ReduceFn<C> = Arc<dyn Fn(&mut C, &C) + Send + Sync>;

/// Options controlling how an index groups points.
///
/// Every field carries a default, so `ClusterOptions::default()` is already
/// fully resolved. Two options values are considered the same (and share an
/// index) when their scalar fields are equal and their `map`/`reduce`
/// closures are the same allocations. Keep the `Arc`s around between calls:
/// wrapping a fresh closure each time forces a rebuild.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, bound = ""))]
pub struct ClusterOptions<P, C> {
    /// Minimum zoom level at which clusters are generated.
    ///
    /// Default: 0
    pub min_zoom: u8,

    /// Maximum zoom level at which clusters are generated. Queries above it
    /// return the raw points.
    ///
    /// Default: 16
    pub max_zoom: u8,

    /// Cluster radius, in pixels of a tile of size `extent`.
    ///
    /// Default: 40
    pub radius: f64,

    /// Minimum number of points needed to form a cluster.
    ///
    /// Default: 2
    pub min_points: usize,

    /// Tile extent; `radius` is measured relative to it.
    ///
    /// Default: 512
    pub extent: f64,

    /// Leaf size of the k-d trees backing each zoom level.
    ///
    /// Default: 64
    pub node_size: usize,

    /// Give unclustered points in tiles their input index as id.
    ///
    /// Default: false
    pub generate_id: bool,

    #[cfg_attr(feature = "serde", serde(skip))]
    pub map: Option<MapFn<P, C>>,

    #[cfg_attr(feature = "serde", serde(skip))]
    pub reduce: Option<ReduceFn<C>>,
}

impl<P, C> Default for ClusterOptions<P, C> {
    fn default() -> Self {
        return ClusterOptions {
            min_zoom: 0,
            max_zoom: 16,
            radius: 40.0,
            min_points: 2,
            extent: 512.0,
            node_size: 64,
            generate_id: false,
            map: None,
            reduce: None,
        };
    }
}

impl<P, C> Clone for ClusterOptions<P, C> {
    fn clone(&self) -> Self {
        return ClusterOptions {
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            radius: self.radius,
            min_points: self.min_points,
            extent: self.extent,
            node_size: self.node_size,
            generate_id: self.generate_id,
            map: self.map.clone(),
            reduce: self.reduce.clone(),
        };
    }
}

impl<P, C> fmt::Debug for ClusterOptions<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("ClusterOptions")
            .field("min_zoom", &self.min_zoom)
            .field("max_zoom", &self.max_zoom)
            .field("radius", &self.radius)
            .field("min_points", &self.min_points)
            .field("extent", &self.extent)
            .field("node_size", &self.node_size)
            .field("generate_id", &self.generate_id)
            .field("map", &self.map.as_ref().map(|_| "<fn>"))
            .field("reduce", &self.reduce.as_ref().map(|_| "<fn>"))
            .finish();
    }
}

impl<P, C> ClusterOptions<P, C> {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn with_min_zoom(mut self, min_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        return self;
    }

    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = max_zoom;
        return self;
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        return self;
    }

    pub fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        return self;
    }

    pub fn with_extent(mut self, extent: f64) -> Self {
        self.extent = extent;
        return self;
    }

    pub fn with_node_size(mut self, node_size: usize) -> Self {
        self.node_size = node_size;
        return self;
    }

    pub fn with_generate_id(mut self, generate_id: bool) -> Self {
        self.generate_id = generate_id;
        return self;
    }

    /// Set the map function from a shared closure.
    pub fn with_map(mut self, map: MapFn<P, C>) -> Self {
        self.map = Some(map);
        return self;
    }

    /// Set the reduce function from a shared closure.
    pub fn with_reduce(mut self, reduce: ReduceFn<C>) -> Self {
        self.reduce = Some(reduce);
        return self;
    }

    /// Whether clusters carry aggregate properties.
    pub fn aggregates(&self) -> bool {
        return self.map.is_some() && self.reduce.is_some();
    }
}

fn same_fn<F: ?Sized>(a: &Option<Arc<F>>, b: &Option<Arc<F>>) -> bool {
    return match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    };
}

impl<P, C> DeepEq for ClusterOptions<P, C> {
    fn deep_eq(&self, other: &Self) -> bool {
        return self.min_zoom == other.min_zoom
            && self.max_zoom == other.max_zoom
            && self.radius.deep_eq(&other.radius)
            && self.min_points == other.min_points
            && self.extent.deep_eq(&other.extent)
            && self.node_size == other.node_size
            && self.generate_id == other.generate_id
            && same_fn(&self.map, &other.map)
            && same_fn(&self.reduce, &other.reduce);
    }
}
