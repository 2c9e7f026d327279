//! Construction and memoized rebuilding of clustering indices.
//!
//! An index is a pure function of its points and resolved options, and it is
//! immutable once built. [`IndexManager`] keeps the last inputs and hands back
//! the same `Arc` until either of them changes, so callers that rebuild
//! structurally identical options on every pass do not pay for a rebuild.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::equality::DeepEq;
use crate::error::Result;
use crate::feature::{Cluster, PointFeature, PointRef};
use crate::geo::Bounds;
use crate::options::ClusterOptions;
use crate::supercluster::Supercluster;

/// A clustering algorithm: builds an immutable index over points and answers
/// viewport and expansion queries against it.
pub trait ClusterAlgorithm<P, C>: Sized {
    /// Build an index loaded with `points`.
    fn build(points: Arc<[PointFeature<P>]>, options: &ClusterOptions<P, C>) -> Result<Self>;

    /// Clusters and points visible in `bounds` at integer `zoom`.
    fn get_clusters(&self, bounds: &Bounds, zoom: i32) -> Vec<Cluster<P, C>>;

    /// Direct children of a cluster.
    fn get_children(&self, cluster_id: u64) -> Result<Vec<Cluster<P, C>>>;

    /// Input points under a cluster, paginated.
    fn get_leaves(&self, cluster_id: u64, limit: usize, offset: usize) -> Result<Vec<PointRef<P>>>;

    /// Zoom at which a cluster splits apart.
    fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Result<u8>;
}

/// Query `index` for the clusters visible in a viewport.
#[inline]
pub fn get_clusters<P, C, A: ClusterAlgorithm<P, C>>(index: &A, bounds: &Bounds, zoom: i32) -> Vec<Cluster<P, C>> {
    return index.get_clusters(bounds, zoom);
}

/// Owns the current index and rebuilds it only when its inputs change.
pub struct IndexManager<P, C, A = Supercluster<P, C>> {
    points: Option<Arc<[PointFeature<P>]>>,
    options: Option<ClusterOptions<P, C>>,
    index: Option<Arc<A>>,
    builds: u64,
}

impl<P, C, A> Default for IndexManager<P, C, A> {
    fn default() -> Self {
        return IndexManager {
            points: None,
            options: None,
            index: None,
            builds: 0,
        };
    }
}

impl<P, C, A> IndexManager<P, C, A>
where
    P: PartialEq,
    A: ClusterAlgorithm<P, C>,
{
    pub fn new() -> Self {
        return Self::default();
    }

    /// Build a fresh index, bypassing the cache.
    pub fn build(points: Arc<[PointFeature<P>]>, options: &ClusterOptions<P, C>) -> Result<Arc<A>> {
        return Ok(Arc::new(A::build(points, options)?));
    }

    /// The index for `points` and `options`: the cached one when both are
    /// unchanged, a new one otherwise.
    ///
    /// Points are unchanged when they are the same allocation or hold equal
    /// features; options when they are deep-equal. A failed build leaves the
    /// cache as it was.
    pub fn resolve(&mut self, points: &Arc<[PointFeature<P>]>, options: &ClusterOptions<P, C>) -> Result<Arc<A>> {
        if let Some(index) = &self.index {
            if self.same_points(points) && self.same_options(options) {
                trace!("cluster index inputs unchanged");
                // Equal but not identical: adopt the caller's array.
                if !self.points.as_ref().is_some_and(|current| Arc::ptr_eq(current, points)) {
                    self.points = Some(Arc::clone(points));
                }
                return Ok(Arc::clone(index));
            }
        }

        debug!(points = points.len(), rebuild = self.index.is_some(), "building cluster index");
        let index = Self::build(Arc::clone(points), options)?;

        self.points = Some(Arc::clone(points));
        if !self.same_options(options) {
            self.options = Some(options.clone());
        }
        self.index = Some(Arc::clone(&index));
        self.builds += 1;
        return Ok(index);
    }

    fn same_points(&self, points: &Arc<[PointFeature<P>]>) -> bool {
        return match &self.points {
            Some(current) => current.deep_eq(points),
            None => false,
        };
    }

    fn same_options(&self, options: &ClusterOptions<P, C>) -> bool {
        return match &self.options {
            Some(current) => current.deep_eq(options),
            None => false,
        };
    }
}

impl<P, C, A> IndexManager<P, C, A> {
    /// The most recently built index, if any.
    pub fn current(&self) -> Option<&Arc<A>> {
        return self.index.as_ref();
    }

    /// Number of indices built so far.
    pub fn build_count(&self) -> u64 {
        return self.builds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    type Manager = IndexManager<u32, u32>;

    fn points(n: usize) -> Arc<[PointFeature<u32>]> {
        let points: Vec<PointFeature<u32>> = (0..n)
            .map(|i| PointFeature::new(i as f64, (i % 10) as f64, i as u32))
            .collect();
        return Arc::from(points);
    }

    #[test]
    fn unchanged_inputs_reuse_index() {
        let mut manager = Manager::new();
        let pts = points(50);
        let first = manager.resolve(&pts, &ClusterOptions::default().with_radius(60.0)).unwrap();
        let second = manager.resolve(&pts, &ClusterOptions::default().with_radius(60.0)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.build_count(), 1);
    }

    #[test]
    fn equal_point_arrays_reuse_index() {
        let mut manager = Manager::new();
        let first = manager.resolve(&points(20), &ClusterOptions::default()).unwrap();
        let second = manager.resolve(&points(20), &ClusterOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn equal_points_hit_keeps_latest_array() {
        let mut manager = Manager::new();
        let original = points(20);
        let replacement = points(20);
        assert!(!Arc::ptr_eq(&original, &replacement));

        let first = manager.resolve(&original, &ClusterOptions::default()).unwrap();
        let second = manager.resolve(&replacement, &ClusterOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.build_count(), 1);
        assert!(Arc::ptr_eq(manager.points.as_ref().unwrap(), &replacement));
    }

    #[test]
    fn changed_inputs_rebuild() {
        let mut manager = Manager::new();
        let pts = points(20);
        let first = manager.resolve(&pts, &ClusterOptions::default()).unwrap();
        let second = manager.resolve(&pts, &ClusterOptions::default().with_extent(256.0)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        let third = manager.resolve(&points(21), &ClusterOptions::default().with_extent(256.0)).unwrap();
        assert!(!Arc::ptr_eq(&second, &third));
        assert_eq!(manager.build_count(), 3);
        assert!(Arc::ptr_eq(manager.current().unwrap(), &third));
    }

    #[test]
    fn failed_build_keeps_previous_index() {
        let mut manager = Manager::new();
        let good = manager.resolve(&points(5), &ClusterOptions::default()).unwrap();

        let bad: Arc<[PointFeature<u32>]> = Arc::from(vec![PointFeature::new(f64::NAN, 0.0, 0)]);
        let err = manager.resolve(&bad, &ClusterOptions::default()).err();
        assert!(matches!(err, Some(Error::InvalidGeometry { index: 0, .. })));

        assert!(Arc::ptr_eq(manager.current().unwrap(), &good));
        let again = manager.resolve(&points(5), &ClusterOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&good, &again));
    }
}
