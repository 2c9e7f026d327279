//! Viewcluster - point clustering kept in step with an interactive map.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use viewcluster::{Bounds, ClusterOptions, PointFeature, Supercluster};
//!
//! // Load some points
//! let points: Arc<[PointFeature<&str>]> = Arc::from(vec![
//!     PointFeature::new(-0.1276, 51.5072, "london"),
//!     PointFeature::new(-0.1270, 51.5080, "also london"),
//!     PointFeature::new(2.3522, 48.8566, "paris"),
//! ]);
//!
//! // Build an index
//! let index: Supercluster<&str, ()> = Supercluster::new(points, ClusterOptions::default()).unwrap();
//!
//! // Query the whole world at zoom 3: the two London points merge
//! let clusters = index.get_clusters(&Bounds::world(), 3);
//! assert_eq!(clusters.len(), 2);
//! ```
//!
//! To follow a map widget, implement [`MapWidget`] for it and hand it to a
//! [`ClusterSync`], which re-queries the index whenever the widget moves.

pub mod equality;
pub mod error;
pub mod feature;
pub mod geo;
pub mod index;
pub mod options;
pub mod supercluster;
pub mod sync;
pub mod viewport;

pub use equality::{clusters_shallow_equal, deep_equal, DeepEq};
pub use error::{Error, Result};
pub use feature::{Cluster, ClusterFeature, FeatureId, FeatureKind, PointFeature, PointRef};
pub use geo::{Bounds, Geometry, LngLatBounds};
pub use index::{get_clusters, ClusterAlgorithm, IndexManager};
pub use options::{ClusterOptions, MapFn, ReduceFn};
pub use supercluster::{Supercluster, Tile, TileFeature};
pub use sync::{ClusterSync, Observer, Snapshot, SyncState};
pub use viewport::{MapWidget, Subscription, ViewportState, MOVE_EVENT};
