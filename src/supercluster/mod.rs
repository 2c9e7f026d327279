//! Hierarchical greedy point clustering.
//!
//! Points are projected onto the unit web-mercator square and indexed once
//! per integer zoom level, from `max_zoom + 1` (every input point on its own)
//! down to `min_zoom`. Level `z` is derived from level `z + 1` by visiting
//! each node once and absorbing its unvisited neighbours within
//! `radius / (extent * 2^z)`; a group becomes a cluster when it reaches
//! `min_points`.
//!
//! Cluster ids encode where the cluster was formed:
//!
//! ```text
//! id = (node_index << 5) + (zoom + 1) + number_of_input_points
//! ```
//!
//! which lets [`Supercluster::get_children`] jump straight to the level and
//! node a cluster came from.
//!
//! Complexity:
//! - build: O(n log n) per level
//! - get_clusters: O(sqrt(n) + k)
//! - get_children: O(sqrt(n) + k)

mod kdtree;
mod tile;

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::{Error, Result};
use crate::feature::{Cluster, ClusterFeature, FeatureId, PointFeature, PointRef};
use crate::geo::{lat_y, lng_x, x_lng, y_lat, Bounds, Geometry};
use crate::index::ClusterAlgorithm;
use crate::options::{ClusterOptions, MapFn};

pub use kdtree::KdTree;
pub use tile::{Tile, TileFeature};

/// Marker for a node no level has visited yet.
const UNVISITED: i32 = i32::MAX;

/// One entry of a zoom level: an input point or a cluster.
#[derive(Clone, Copy, Debug)]
struct Node {
    /// Projected position (cluster centroid for clusters).
    x: f64,
    y: f64,
    /// Last zoom at which this node was visited.
    zoom: i32,
    /// Input index for points, cluster id for clusters.
    id: u64,
    /// Id of the cluster that absorbed this node, if any.
    parent: Option<u64>,
    num_points: usize,
    /// Index into `Supercluster::aggregates`.
    aggregate: Option<u32>,
}

impl Node {
    #[inline]
    fn is_cluster(&self) -> bool {
        return self.num_points > 1;
    }
}

/// The nodes of one zoom level and the tree indexing them.
#[derive(Clone, Debug)]
struct Level {
    nodes: Vec<Node>,
    tree: KdTree,
}

impl Level {
    fn new(nodes: Vec<Node>, node_size: usize) -> Level {
        let tree = KdTree::new(nodes.iter().map(|n| (n.x, n.y)), node_size);
        return Level { nodes, tree };
    }
}

/// A clustering index over a shared array of point features.
pub struct Supercluster<P, C> {
    options: ClusterOptions<P, C>,
    points: Arc<[PointFeature<P>]>,
    /// Indexed by zoom; `None` outside `min_zoom..=max_zoom + 1`.
    levels: Vec<Option<Level>>,
    aggregates: Vec<C>,
}

impl<P, C: Clone> Supercluster<P, C> {
    /// Build an index over `points`.
    ///
    /// Fails if any point has a non-finite coordinate.
    pub fn new(points: Arc<[PointFeature<P>]>, options: ClusterOptions<P, C>) -> Result<Supercluster<P, C>> {
        let start = Instant::now();

        let mut nodes = Vec::with_capacity(points.len());
        for (i, point) in points.iter().enumerate() {
            if !point.geometry.is_finite() {
                return Err(Error::InvalidGeometry {
                    index: i,
                    coordinates: *point.coordinates(),
                });
            }
            let [lng, lat] = *point.coordinates();
            nodes.push(Node {
                x: lng_x(lng),
                y: lat_y(lat),
                zoom: UNVISITED,
                id: i as u64,
                parent: None,
                num_points: 1,
                aggregate: None,
            });
        }

        let min_zoom = options.min_zoom as usize;
        let max_zoom = options.max_zoom as usize;
        let node_size = options.node_size;

        let mut index = Supercluster {
            options,
            points,
            levels: (0..max_zoom + 2).map(|_| None).collect(),
            aggregates: Vec::new(),
        };

        let mut current = Level::new(nodes, node_size);
        let mut zoom = max_zoom + 1;
        while zoom > min_zoom {
            let next = index.cluster(&mut current, zoom as i32 - 1);
            index.levels[zoom] = Some(std::mem::replace(&mut current, Level::new(next, node_size)));
            zoom -= 1;
        }
        index.levels[zoom] = Some(current);

        debug!(
            points = index.points.len(),
            min_zoom,
            max_zoom,
            elapsed = ?start.elapsed(),
            "built cluster index"
        );
        return Ok(index);
    }

    /// Derive the nodes of level `zoom` from `level` (level `zoom + 1`),
    /// marking absorbed nodes with their parent.
    fn cluster(&mut self, level: &mut Level, zoom: i32) -> Vec<Node> {
        let r = self.options.radius / (self.options.extent * 2f64.powi(zoom));
        let min_points = self.options.min_points;
        let total = self.points.len() as u64;
        let map = self.options.map.clone();
        let reduce = self.options.reduce.clone();

        let mut next = Vec::new();

        for i in 0..level.nodes.len() {
            if level.nodes[i].zoom <= zoom {
                continue;
            }
            level.nodes[i].zoom = zoom;

            let origin = level.nodes[i];
            let neighbors = level.tree.within(origin.x, origin.y, r);

            let mut num_points = origin.num_points;
            for &k in &neighbors {
                let neighbor = &level.nodes[k as usize];
                if neighbor.zoom > zoom {
                    num_points += neighbor.num_points;
                }
            }

            if num_points > origin.num_points && num_points >= min_points {
                let mut wx = origin.x * origin.num_points as f64;
                let mut wy = origin.y * origin.num_points as f64;
                let id = ((i as u64) << 5) + (zoom as u64 + 1) + total;
                let mut accumulated: Option<C> = None;

                for &k in &neighbors {
                    let neighbor = &mut level.nodes[k as usize];
                    if neighbor.zoom <= zoom {
                        continue;
                    }
                    neighbor.zoom = zoom;
                    neighbor.parent = Some(id);

                    let weight = neighbor.num_points as f64;
                    wx += neighbor.x * weight;
                    wy += neighbor.y * weight;

                    if let (Some(map), Some(reduce)) = (&map, &reduce) {
                        let neighbor = *neighbor;
                        let acc = accumulated.get_or_insert_with(|| self.mapped(&origin, map));
                        reduce(acc, &self.mapped(&neighbor, map));
                    }
                }

                level.nodes[i].parent = Some(id);
                let aggregate = accumulated.map(|value| {
                    self.aggregates.push(value);
                    return (self.aggregates.len() - 1) as u32;
                });

                next.push(Node {
                    x: wx / num_points as f64,
                    y: wy / num_points as f64,
                    zoom: UNVISITED,
                    id,
                    parent: None,
                    num_points,
                    aggregate,
                });
            } else {
                next.push(level.nodes[i]);

                if num_points > 1 {
                    for &k in &neighbors {
                        let neighbor = &mut level.nodes[k as usize];
                        if neighbor.zoom <= zoom {
                            continue;
                        }
                        neighbor.zoom = zoom;
                        next.push(*neighbor);
                    }
                }
            }
        }

        return next;
    }

    /// Aggregate value of a node: a copy of a cluster's aggregate, or the
    /// mapped properties of a point.
    fn mapped(&self, node: &Node, map: &MapFn<P, C>) -> C {
        if let Some(i) = node.aggregate {
            return self.aggregates[i as usize].clone();
        }
        return map(&self.points[node.id as usize].properties);
    }

    fn feature(&self, node: &Node) -> Cluster<P, C> {
        if !node.is_cluster() {
            return Cluster::Point(PointRef::new(Arc::clone(&self.points), node.id as usize));
        }
        return Cluster::Cluster(Arc::new(ClusterFeature::new(
            node.id,
            node.num_points,
            Geometry::point(x_lng(node.x), y_lat(node.y)),
            node.aggregate.map(|i| self.aggregates[i as usize].clone()),
        )));
    }
}

impl<P, C> Supercluster<P, C> {
    pub fn options(&self) -> &ClusterOptions<P, C> {
        return &self.options;
    }

    /// The point array the index was loaded with.
    pub fn points(&self) -> &Arc<[PointFeature<P>]> {
        return &self.points;
    }

    fn level(&self, zoom: usize) -> Option<&Level> {
        return self.levels.get(zoom).and_then(Option::as_ref);
    }

    fn limit_zoom(&self, zoom: i32) -> usize {
        let max = self.options.max_zoom as i32 + 1;
        return zoom.min(max).max(self.options.min_zoom as i32) as usize;
    }

    /// Split a cluster id into `(node_index, origin_zoom)`.
    fn origin(&self, cluster_id: u64) -> Result<(usize, usize)> {
        let offset = cluster_id
            .checked_sub(self.points.len() as u64)
            .ok_or(Error::ClusterNotFound { cluster_id })?;
        return Ok(((offset >> 5) as usize, (offset % 32) as usize));
    }

    /// Zoom level one above the one at which the cluster was formed.
    pub fn get_origin_zoom(&self, cluster_id: u64) -> Result<usize> {
        return Ok(self.origin(cluster_id)?.1);
    }
}

impl<P, C: Clone> Supercluster<P, C> {
    /// Clusters and points inside `bounds` at `zoom`.
    ///
    /// Longitudes are wrapped into `[-180, 180]`; a box crossing the
    /// antimeridian is answered as two queries, east half first.
    pub fn get_clusters(&self, bounds: &Bounds, zoom: i32) -> Vec<Cluster<P, C>> {
        let [west, south, east, north] = bounds.0;
        let mut min_lng = ((west + 180.0) % 360.0 + 360.0) % 360.0 - 180.0;
        let min_lat = south.clamp(-90.0, 90.0);
        let mut max_lng = if east == 180.0 {
            180.0
        } else {
            ((east + 180.0) % 360.0 + 360.0) % 360.0 - 180.0
        };
        let max_lat = north.clamp(-90.0, 90.0);

        if east - west >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            let mut clusters = self.get_clusters(&Bounds::new(min_lng, min_lat, 180.0, max_lat), zoom);
            clusters.extend(self.get_clusters(&Bounds::new(-180.0, min_lat, max_lng, max_lat), zoom));
            return clusters;
        }

        let Some(level) = self.level(self.limit_zoom(zoom)) else {
            return Vec::new();
        };
        let ids = level.tree.range(lng_x(min_lng), lat_y(max_lat), lng_x(max_lng), lat_y(min_lat));
        return ids.into_iter().map(|i| self.feature(&level.nodes[i as usize])).collect();
    }

    /// The clusters and points one level below a cluster.
    pub fn get_children(&self, cluster_id: u64) -> Result<Vec<Cluster<P, C>>> {
        let not_found = Error::ClusterNotFound { cluster_id };
        let (origin_id, origin_zoom) = self.origin(cluster_id)?;
        let level = self.level(origin_zoom).ok_or(not_found.clone())?;
        let origin = level.nodes.get(origin_id).ok_or(not_found.clone())?;

        let r = self.options.radius / (self.options.extent * 2f64.powi(origin_zoom as i32 - 1));
        let children: Vec<Cluster<P, C>> = level
            .tree
            .within(origin.x, origin.y, r)
            .iter()
            .map(|&k| &level.nodes[k as usize])
            .filter(|node| node.parent == Some(cluster_id))
            .map(|node| self.feature(node))
            .collect();

        if children.is_empty() {
            return Err(not_found);
        }
        return Ok(children);
    }

    /// Input points of a cluster, paginated. A `limit` of zero yields none.
    pub fn get_leaves(&self, cluster_id: u64, limit: usize, offset: usize) -> Result<Vec<PointRef<P>>> {
        let mut leaves = Vec::new();
        if limit == 0 {
            self.get_children(cluster_id)?;
            return Ok(leaves);
        }
        self.append_leaves(&mut leaves, cluster_id, limit, offset, 0)?;
        return Ok(leaves);
    }

    fn append_leaves(
        &self,
        leaves: &mut Vec<PointRef<P>>,
        cluster_id: u64,
        limit: usize,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize> {
        for child in self.get_children(cluster_id)? {
            match child {
                Cluster::Cluster(cluster) => {
                    if skipped + cluster.point_count <= offset {
                        skipped += cluster.point_count;
                    } else {
                        skipped = self.append_leaves(leaves, cluster.cluster_id, limit, offset, skipped)?;
                    }
                }
                Cluster::Point(point) => {
                    if skipped < offset {
                        skipped += 1;
                    } else {
                        leaves.push(point);
                    }
                }
            }
            if leaves.len() == limit {
                break;
            }
        }
        return Ok(skipped);
    }

    /// The zoom at which a cluster splits into more than one child.
    pub fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Result<u8> {
        let mut expansion_zoom = self.get_origin_zoom(cluster_id)? as i32 - 1;
        let mut cluster_id = cluster_id;

        while expansion_zoom <= self.options.max_zoom as i32 {
            let children = self.get_children(cluster_id)?;
            expansion_zoom += 1;
            if children.len() != 1 {
                break;
            }
            match &children[0] {
                Cluster::Cluster(child) => cluster_id = child.cluster_id,
                Cluster::Point(_) => break,
            }
        }

        return Ok(expansion_zoom.max(0) as u8);
    }

    /// Features of tile `(z, x, y)` in tile-local coordinates scaled to
    /// `extent`, including a `radius`-wide buffer around the tile. Returns
    /// `None` for an empty tile.
    pub fn get_tile(&self, z: i32, x: u32, y: u32) -> Result<Option<Tile<P, C>>> {
        if !(0..=30).contains(&z) {
            return Err(Error::InvalidZoom { zoom: z });
        }
        let Some(level) = self.level(self.limit_zoom(z)) else {
            return Ok(None);
        };

        let z2 = 2f64.powi(z);
        let p = self.options.radius / self.options.extent;
        let (x, y) = (x as f64, y as f64);
        let top = (y - p) / z2;
        let bottom = (y + 1.0 + p) / z2;

        let mut tile = Tile::default();
        let ids = level.tree.range((x - p) / z2, top, (x + 1.0 + p) / z2, bottom);
        self.add_tile_features(&mut tile, level, &ids, x, y, z2);

        if x == 0.0 {
            let ids = level.tree.range(1.0 - p / z2, top, 1.0, bottom);
            self.add_tile_features(&mut tile, level, &ids, z2, y, z2);
        }
        if x == z2 - 1.0 {
            let ids = level.tree.range(0.0, top, p / z2, bottom);
            self.add_tile_features(&mut tile, level, &ids, -1.0, y, z2);
        }

        if tile.features.is_empty() {
            return Ok(None);
        }
        return Ok(Some(tile));
    }

    fn add_tile_features(&self, tile: &mut Tile<P, C>, level: &Level, ids: &[u32], x: f64, y: f64, z2: f64) {
        let extent = self.options.extent;
        for &i in ids {
            let node = &level.nodes[i as usize];
            let (px, py, id) = if node.is_cluster() {
                (node.x, node.y, Some(FeatureId::Number(node.id)))
            } else {
                let point = &self.points[node.id as usize];
                let [lng, lat] = *point.coordinates();
                let id = if self.options.generate_id {
                    Some(FeatureId::Number(node.id))
                } else {
                    point.id.clone()
                };
                (lng_x(lng), lat_y(lat), id)
            };

            tile.features.push(TileFeature {
                id,
                geometry: [
                    (extent * (px * z2 - x) + 0.5).floor() as i64,
                    (extent * (py * z2 - y) + 0.5).floor() as i64,
                ],
                feature: self.feature(node),
            });
        }
    }
}

impl<P, C: Clone> ClusterAlgorithm<P, C> for Supercluster<P, C> {
    fn build(points: Arc<[PointFeature<P>]>, options: &ClusterOptions<P, C>) -> Result<Self> {
        return Supercluster::new(points, options.clone());
    }

    fn get_clusters(&self, bounds: &Bounds, zoom: i32) -> Vec<Cluster<P, C>> {
        return Supercluster::get_clusters(self, bounds, zoom);
    }

    fn get_children(&self, cluster_id: u64) -> Result<Vec<Cluster<P, C>>> {
        return Supercluster::get_children(self, cluster_id);
    }

    fn get_leaves(&self, cluster_id: u64, limit: usize, offset: usize) -> Result<Vec<PointRef<P>>> {
        return Supercluster::get_leaves(self, cluster_id, limit, offset);
    }

    fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Result<u8> {
        return Supercluster::get_cluster_expansion_zoom(self, cluster_id);
    }
}
