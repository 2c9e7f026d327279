//! Error types for index construction and cluster queries.

use thiserror::Error;

/// Result type alias for clustering operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building or querying a clustering index.
///
/// Building an index is a pure function of its inputs, so none of these are
/// worth retrying without changing the inputs first.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An input point has a non-finite coordinate.
    #[error("point {index} has invalid coordinates {coordinates:?}")]
    InvalidGeometry {
        /// Position of the offending point in the input slice.
        index: usize,
        /// The coordinates as supplied.
        coordinates: [f64; 2],
    },

    /// No cluster with the given id exists in the index.
    #[error("no cluster with id {cluster_id}")]
    ClusterNotFound {
        /// The id that was looked up.
        cluster_id: u64,
    },

    /// A tile was requested at a zoom the index cannot address.
    #[error("zoom {zoom} is out of range for tile queries")]
    InvalidZoom {
        /// The requested zoom.
        zoom: i32,
    },
}
