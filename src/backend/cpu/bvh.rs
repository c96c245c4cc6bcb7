//! SAH-based BVH over primitive bounds, plus traversal.
//!
//! The same structure indexes triangles inside a mesh, geometries inside a
//! group and groups inside a top-level hierarchy. Nodes are a flat array
//! with the root at index 0.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::util::{Aabb, Vec3};

/// Centroid buckets per axis when pricing splits.
const BINS: usize = 16;

/// Price of visiting a node, in primitive tests.
const TRAVERSAL_COST: f32 = 1.0;

/// Ranges this small always become leaves.
const MAX_LEAF_SIZE: usize = 4;

/// Flat BVH node (32 bytes). `count == 0` marks an interior node whose
/// children sit at `left_or_first` and `left_or_first + 1`; otherwise it is a
/// leaf over `prim_indices[left_or_first..left_or_first + count]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BvhNode {
    pub aabb_min: [f32; 3],
    pub left_or_first: u32,
    pub aabb_max: [f32; 3],
    pub count: u32,
}

impl BvhNode {
    fn new(bounds: &Aabb, left_or_first: usize, count: usize) -> Self {
        Self {
            aabb_min: bounds.min.to_array(),
            left_or_first: left_or_first as u32,
            aabb_max: bounds.max.to_array(),
            count: count as u32,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Vec3::from(self.aabb_min), Vec3::from(self.aabb_max))
    }
}

/// Built BVH.
#[derive(Debug, Clone)]
pub struct Bvh {
    /// Flat node array (index 0 = root).
    pub nodes: Vec<BvhNode>,
    /// Reordered primitive indices (leaves reference into this).
    pub prim_indices: Vec<usize>,
}

/// Bucket boundary picked for an interior node: the `left` primitives with
/// the smallest centroids on `axis` go to the first child.
struct Split {
    axis: usize,
    left: usize,
}

struct BvhBuilder<'a> {
    prims: &'a [Aabb],
    centroids: Vec<Vec3>,
    order: Vec<usize>,
    nodes: Vec<BvhNode>,
}

impl<'a> BvhBuilder<'a> {
    fn new(prims: &'a [Aabb]) -> Self {
        Self {
            prims,
            centroids: prims.iter().map(Aabb::center).collect(),
            order: (0..prims.len()).collect(),
            nodes: Vec::with_capacity(2 * prims.len().max(1)),
        }
    }

    fn finish(mut self) -> Bvh {
        self.nodes.push(BvhNode::new(&Aabb::EMPTY, 0, 0));
        if !self.prims.is_empty() {
            self.subdivide(0, 0..self.prims.len());
        }
        Bvh {
            nodes: self.nodes,
            prim_indices: self.order,
        }
    }

    fn subdivide(&mut self, root: usize, range: Range<usize>) {
        let mut pending = vec![(root, range)];
        while let Some((node, range)) = pending.pop() {
            let (bounds, centroid_bounds) = self.range_bounds(range.clone());
            let split = if range.len() > MAX_LEAF_SIZE {
                self.best_split(range.clone(), &bounds, &centroid_bounds)
            } else {
                None
            };
            let Some(split) = split else {
                self.nodes[node] = BvhNode::new(&bounds, range.start, range.len());
                continue;
            };

            let centroids = &self.centroids;
            self.order[range.clone()].select_nth_unstable_by(split.left, |&a, &b| {
                centroids[a][split.axis].total_cmp(&centroids[b][split.axis])
            });
            let mid = range.start + split.left;

            let first_child = self.push_children();
            self.nodes[node] = BvhNode::new(&bounds, first_child, 0);
            pending.push((first_child + 1, mid..range.end));
            pending.push((first_child, range.start..mid));
        }
    }

    /// Append two child slots, filled in when their ranges are processed.
    fn push_children(&mut self) -> usize {
        let first = self.nodes.len();
        self.nodes.extend([BvhNode::zeroed(); 2]);
        first
    }

    /// Primitive bounds and centroid bounds of `range`.
    fn range_bounds(&self, range: Range<usize>) -> (Aabb, Aabb) {
        let mut bounds = Aabb::EMPTY;
        let mut centroid_bounds = Aabb::EMPTY;
        for &i in &self.order[range] {
            bounds.expand_by_box(&self.prims[i]);
            centroid_bounds.expand_by_point(self.centroids[i]);
        }
        (bounds, centroid_bounds)
    }

    /// Cheapest bucket boundary over all three axes, or `None` when keeping
    /// the range as one leaf is at least as cheap.
    fn best_split(&self, range: Range<usize>, bounds: &Aabb, centroid_bounds: &Aabb) -> Option<Split> {
        let n = range.len();
        let node_area = bounds.area();
        let mut best: Option<Split> = None;
        let mut best_cost = n as f32 * node_area;

        for axis in 0..3 {
            let lo = centroid_bounds.min[axis];
            let extent = centroid_bounds.max[axis] - lo;
            if extent <= f32::EPSILON {
                continue;
            }
            let scale = BINS as f32 / extent;

            let mut bin_bounds = [Aabb::EMPTY; BINS];
            let mut bin_counts = [0usize; BINS];
            for &i in &self.order[range.clone()] {
                let bin = (((self.centroids[i][axis] - lo) * scale) as usize).min(BINS - 1);
                bin_bounds[bin].expand_by_box(&self.prims[i]);
                bin_counts[bin] += 1;
            }

            let mut right_area = [0.0f32; BINS];
            let mut right = Aabb::EMPTY;
            for bin in (1..BINS).rev() {
                right.expand_by_box(&bin_bounds[bin]);
                right_area[bin] = right.area();
            }

            let mut left = Aabb::EMPTY;
            let mut left_count = 0;
            for bin in 1..BINS {
                left.expand_by_box(&bin_bounds[bin - 1]);
                left_count += bin_counts[bin - 1];
                if left_count == 0 || left_count == n {
                    continue;
                }
                let cost = TRAVERSAL_COST * node_area
                    + left_count as f32 * left.area()
                    + (n - left_count) as f32 * right_area[bin];
                if cost < best_cost {
                    best_cost = cost;
                    best = Some(Split { axis, left: left_count });
                }
            }
        }
        best
    }
}

/// Build a BVH over primitive bounds using binned SAH.
///
/// Indices in the result map into `bounds`; the input is not reordered.
#[tracing::instrument(skip_all, fields(prim_count = bounds.len()))]
pub fn build_bvh(bounds: &[Aabb]) -> Bvh {
    let bvh = BvhBuilder::new(bounds).finish();
    log::trace!("bvh: {} node(s) over {} primitive(s)", bvh.nodes.len(), bounds.len());
    bvh
}

impl Bvh {
    pub fn build(bounds: &[Aabb]) -> Self {
        build_bvh(bounds)
    }

    pub fn is_empty(&self) -> bool {
        self.prim_indices.is_empty()
    }

    /// Bounds of everything in the tree.
    pub fn bounds(&self) -> Aabb {
        if self.is_empty() {
            return Aabb::EMPTY;
        }
        self.nodes[0].bounds()
    }

    /// Closest-hit traversal. `hit(prim, t_max)` returns the hit distance when
    /// the primitive is hit closer than `t_max`. Returns the final `t_max`.
    pub fn closest<F>(&self, origin: Vec3, dir: Vec3, t_min: f32, mut t_max: f32, mut hit: F) -> f32
    where
        F: FnMut(usize, f32) -> Option<f32>,
    {
        if self.is_empty() {
            return t_max;
        }
        let inv_dir = dir.recip();
        let mut stack = Vec::with_capacity(64);
        stack.push(0usize);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.bounds().intersect_ray(origin, inv_dir, t_min, t_max).is_none() {
                continue;
            }
            let first = node.left_or_first as usize;
            if node.is_leaf() {
                for &prim in &self.prim_indices[first..first + node.count as usize] {
                    if let Some(t) = hit(prim, t_max) {
                        t_max = t;
                    }
                }
            } else {
                stack.push(first + 1);
                stack.push(first);
            }
        }
        t_max
    }

    /// Any-hit traversal; stops at the first primitive for which `hit` is true.
    pub fn any<F>(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32, mut hit: F) -> bool
    where
        F: FnMut(usize) -> bool,
    {
        if self.is_empty() {
            return false;
        }
        let inv_dir = dir.recip();
        let mut stack = Vec::with_capacity(64);
        stack.push(0usize);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.bounds().intersect_ray(origin, inv_dir, t_min, t_max).is_none() {
                continue;
            }
            let first = node.left_or_first as usize;
            if node.is_leaf() {
                if self.prim_indices[first..first + node.count as usize].iter().any(|&p| hit(p)) {
                    return true;
                }
            } else {
                stack.push(first + 1);
                stack.push(first);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(cx: f32) -> Aabb {
        Aabb::from_center_half_extent(Vec3::new(cx, 0.0, 0.0), Vec3::splat(0.5))
    }

    #[test]
    fn test_empty_bvh() {
        let bvh = build_bvh(&[]);
        assert_eq!(bvh.nodes.len(), 1);
        assert!(bvh.is_empty());
        assert!(bvh.bounds().is_empty());
        assert!(!bvh.any(Vec3::ZERO, Vec3::X, 0.0, 10.0, |_| true));
    }

    #[test]
    fn test_single_primitive() {
        let bvh = build_bvh(&[unit_box(0.0)]);
        assert_eq!(bvh.nodes.len(), 1);
        assert_eq!(bvh.nodes[0].count, 1);
        assert_eq!(bvh.prim_indices, vec![0]);
    }

    #[test]
    fn test_many_primitives_builds_tree() {
        let boxes: Vec<Aabb> = (0..100).map(|i| unit_box(i as f32 * 2.0)).collect();
        let bvh = build_bvh(&boxes);
        assert!(bvh.nodes.len() > 1, "BVH should have internal nodes");

        let mut sorted = bvh.prim_indices.clone();
        sorted.sort();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());

        let root = bvh.bounds();
        assert!(root.min.x < 0.0);
        assert!(root.max.x > 198.0);
    }

    #[test]
    fn test_leaf_count_correct() {
        let bvh = build_bvh(&[unit_box(0.0), unit_box(1.0), unit_box(2.0)]);
        assert_eq!(bvh.nodes[0].count, 3);
    }

    #[test]
    fn test_split_separates_clusters() {
        // Two tight clusters far apart on Y: the root must cut between them
        let mut boxes: Vec<Aabb> = (0..6).map(|i| unit_box(i as f32 * 0.1)).collect();
        boxes.extend((0..6).map(|i| {
            Aabb::from_center_half_extent(Vec3::new(i as f32 * 0.1, 50.0, 0.0), Vec3::splat(0.5))
        }));
        let bvh = build_bvh(&boxes);
        let root = bvh.nodes[0];
        assert!(!root.is_leaf());

        let first = root.left_or_first as usize;
        for child in [first, first + 1] {
            let b = bvh.nodes[child].bounds();
            assert!(b.size().y < 2.0, "child {child} spans both clusters: {b:?}");
        }
    }

    #[test]
    fn test_leaves_cover_their_primitives() {
        let boxes: Vec<Aabb> = (0..40)
            .map(|i| unit_box((i * 7 % 40) as f32))
            .collect();
        let bvh = build_bvh(&boxes);
        for node in bvh.nodes.iter().filter(|n| n.is_leaf()) {
            let bounds = node.bounds();
            let first = node.left_or_first as usize;
            for &prim in &bvh.prim_indices[first..first + node.count as usize] {
                assert!(bounds.min.cmple(boxes[prim].min).all());
                assert!(bounds.max.cmpge(boxes[prim].max).all());
            }
        }
    }

    #[test]
    fn test_closest_visits_nearest() {
        let boxes: Vec<Aabb> = (0..50).map(|i| unit_box(i as f32 * 2.0)).collect();
        let bvh = build_bvh(&boxes);
        // Ray along +X from the far left: the hit distance is the box entry
        let origin = Vec3::new(-10.0, 0.0, 0.0);
        let mut nearest = None;
        let t = bvh.closest(origin, Vec3::X, 0.0, f32::INFINITY, |prim, t_max| {
            let (near, _) = boxes[prim].intersect_ray(origin, Vec3::X.recip(), 0.0, t_max)?;
            nearest = Some(prim);
            Some(near)
        });
        assert_eq!(nearest, Some(0));
        assert!((t - 9.5).abs() < 1e-5);
    }

    #[test]
    fn test_any_hit_respects_range() {
        let boxes = vec![unit_box(5.0)];
        let bvh = build_bvh(&boxes);
        assert!(bvh.any(Vec3::ZERO, Vec3::X, 0.0, 10.0, |_| true));
        assert!(!bvh.any(Vec3::ZERO, Vec3::X, 0.0, 2.0, |_| true));
        assert!(!bvh.any(Vec3::ZERO, Vec3::Y, 0.0, 10.0, |_| true));
    }
}
