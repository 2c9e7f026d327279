//! Static k-d tree over 2D points.
//!
//! Items are sorted in place into an implicit tree: every range
//! `[left, right]` longer than `node_size` is split at its median along
//! alternating axes, so no child pointers are stored.
//!
//! Complexity:
//! - build: O(n log n)
//! - range / within: O(sqrt(n) + k)

use smallvec::SmallVec;

/// Traversal stack of `(left, right, axis)` triples.
type Stack = SmallVec<[(isize, isize, usize); 32]>;

/// A static k-d tree storing item ids alongside interleaved coordinates.
#[derive(Clone, Debug)]
pub struct KdTree {
    ids: Vec<u32>,
    coords: Vec<f64>,
    node_size: usize,
}

impl KdTree {
    /// Build a tree from `(x, y)` pairs. Item ids are their positions in the
    /// input.
    pub fn new(points: impl IntoIterator<Item = (f64, f64)>, node_size: usize) -> KdTree {
        let mut ids = Vec::new();
        let mut coords = Vec::new();
        for (i, (x, y)) in points.into_iter().enumerate() {
            ids.push(i as u32);
            coords.push(x);
            coords.push(y);
        }

        let mut tree = KdTree {
            ids,
            coords,
            node_size: node_size.max(1),
        };
        let right = tree.ids.len() as isize - 1;
        tree.sort(0, right, 0);
        return tree;
    }

    pub fn len(&self) -> usize {
        return self.ids.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.ids.is_empty();
    }

    #[inline(always)]
    fn coord(&self, i: isize, axis: usize) -> f64 {
        return self.coords[2 * i as usize + axis];
    }

    #[inline(always)]
    fn xy(&self, i: isize) -> (f64, f64) {
        return (self.coord(i, 0), self.coord(i, 1));
    }

    /// Ids of all items inside the axis-aligned box, edges included.
    pub fn range(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<u32> {
        let mut result = Vec::new();
        let mut stack: Stack = SmallVec::new();
        stack.push((0, self.ids.len() as isize - 1, 0));
        let inside = |x: f64, y: f64| x >= min_x && x <= max_x && y >= min_y && y <= max_y;

        while let Some((left, right, axis)) = stack.pop() {
            if right - left <= self.node_size as isize {
                for i in left..=right {
                    let (x, y) = self.xy(i);
                    if inside(x, y) {
                        result.push(self.ids[i as usize]);
                    }
                }
                continue;
            }

            let m = (left + right) >> 1;
            let (x, y) = self.xy(m);
            if inside(x, y) {
                result.push(self.ids[m as usize]);
            }

            let (lo, hi, v) = if axis == 0 { (min_x, max_x, x) } else { (min_y, max_y, y) };
            if lo <= v {
                stack.push((left, m - 1, 1 - axis));
            }
            if hi >= v {
                stack.push((m + 1, right, 1 - axis));
            }
        }

        return result;
    }

    /// Ids of all items within `r` of `(qx, qy)`.
    pub fn within(&self, qx: f64, qy: f64, r: f64) -> SmallVec<[u32; 16]> {
        let mut result = SmallVec::new();
        let mut stack: Stack = SmallVec::new();
        stack.push((0, self.ids.len() as isize - 1, 0));
        let r2 = r * r;
        let close = |x: f64, y: f64| (x - qx) * (x - qx) + (y - qy) * (y - qy) <= r2;

        while let Some((left, right, axis)) = stack.pop() {
            if right - left <= self.node_size as isize {
                for i in left..=right {
                    let (x, y) = self.xy(i);
                    if close(x, y) {
                        result.push(self.ids[i as usize]);
                    }
                }
                continue;
            }

            let m = (left + right) >> 1;
            let (x, y) = self.xy(m);
            if close(x, y) {
                result.push(self.ids[m as usize]);
            }

            let (q, v) = if axis == 0 { (qx, x) } else { (qy, y) };
            if q - r <= v {
                stack.push((left, m - 1, 1 - axis));
            }
            if q + r >= v {
                stack.push((m + 1, right, 1 - axis));
            }
        }

        return result;
    }

    fn sort(&mut self, left: isize, right: isize, axis: usize) {
        if right - left <= self.node_size as isize {
            return;
        }
        let m = (left + right) >> 1;
        self.select(m, left, right, axis);
        self.sort(left, m - 1, 1 - axis);
        self.sort(m + 1, right, 1 - axis);
    }

    /// Floyd-Rivest selection: reorder `[left, right]` so that item `k` is
    /// in its sorted position along `axis`, smaller items before it and
    /// larger after.
    fn select(&mut self, k: isize, mut left: isize, mut right: isize, axis: usize) {
        while right > left {
            if right - left > 600 {
                let n = (right - left + 1) as f64;
                let m = (k - left + 1) as f64;
                let z = n.ln();
                let s = 0.5 * (2.0 * z / 3.0).exp();
                let sign = if m - n / 2.0 < 0.0 { -1.0 } else { 1.0 };
                let sd = 0.5 * (z * s * (n - s) / n).sqrt() * sign;
                let new_left = left.max((k as f64 - m * s / n + sd).floor() as isize);
                let new_right = right.min((k as f64 + (n - m) * s / n + sd).floor() as isize);
                self.select(k, new_left, new_right, axis);
            }

            let t = self.coord(k, axis);
            let mut i = left;
            let mut j = right;

            self.swap(left, k);
            if self.coord(right, axis) > t {
                self.swap(left, right);
            }

            while i < j {
                self.swap(i, j);
                i += 1;
                j -= 1;
                while self.coord(i, axis) < t {
                    i += 1;
                }
                while self.coord(j, axis) > t {
                    j -= 1;
                }
            }

            if self.coord(left, axis) == t {
                self.swap(left, j);
            } else {
                j += 1;
                self.swap(j, right);
            }

            if j <= k {
                left = j + 1;
            }
            if k <= j {
                right = j - 1;
            }
        }
    }

    #[inline(always)]
    fn swap(&mut self, i: isize, j: isize) {
        let (i, j) = (i as usize, j as usize);
        self.ids.swap(i, j);
        self.coords.swap(2 * i, 2 * j);
        self.coords.swap(2 * i + 1, 2 * j + 1);
    }
}
