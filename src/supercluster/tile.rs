//! Vector-tile shaped query results.

use crate::feature::{Cluster, FeatureId};

/// One feature of a tile, positioned in tile-local integer coordinates.
#[derive(Debug)]
pub struct TileFeature<P, C> {
    /// Cluster id for clusters; the input id, or the input index when ids
    /// are generated, for points.
    pub id: Option<FeatureId>,
    /// `[x, y]` in `0..extent` for features inside the tile, slightly
    /// outside for buffered neighbours.
    pub geometry: [i64; 2],
    pub feature: Cluster<P, C>,
}

/// The features of a single `(z, x, y)` tile.
#[derive(Debug)]
pub struct Tile<P, C> {
    pub features: Vec<TileFeature<P, C>>,
}

impl<P, C> Default for Tile<P, C> {
    fn default() -> Self {
        return Tile { features: Vec::new() };
    }
}
