//! # Quadtree Implementation
//!
//! This is an implementation of a point quadtree, as described in [the wikipedia
//! article](https://en.wikipedia.org/wiki/Quadtree), storing indexed points and answering
//! nearest-neighbour queries.
//!
//! Nearest-neighbour ties are always resolved towards the lowest point index, independent of the
//! order the tree is traversed in.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use nalgebra::Vector2;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Number of points per QuadTree node before it is subdivided
pub const CAPACITY: usize = 8;

/// Maximum depth of the tree. Nodes at this depth hold any number of points, which stops
/// coincident points from subdividing forever.
pub const MAX_DEPTH: usize = 24;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Represents a quad with a centre and half-width.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quad {
    centre: Vector2<f64>,
    half_width: f64
}

/// A point stored in the tree along with its index in the source sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedPoint {
    pub point: Vector2<f64>,
    pub index: usize
}

/// An implementation of a QuadTree
#[derive(Clone, Debug)]
pub struct QuadTree {
    /// The bounds of this node
    boundary: Quad,

    /// Depth of this node, the root is 0
    depth: usize,

    /// Points stored in this node
    points: Vec<IndexedPoint>,

    /// Children of the node, in the order north west, north east, south west, south east
    children: Option<Box<[QuadTree; 4]>>,
}

/// The result of a nearest-neighbour search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    /// Euclidean distance between the query and the point
    pub distance: f64,

    /// Index of the nearest point
    pub index: usize
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QuadTreeError {
    #[error("The given point {0} was not in the bounds of the quadtree {1:?}")]
    PointNotInBounds(Vector2<f64>, Quad),

    #[error("Point {0} at index {1} is not finite")]
    NonFinitePoint(Vector2<f64>, usize),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Quad {
    /// Creates a new quad with the given `centre` and `half_width`.
    pub fn new(centre: Vector2<f64>, half_width: f64) -> Self {
        Self {
            centre,
            half_width
        }
    }

    /// Smallest square enclosing all `points`, grown slightly so that no point lies on the
    /// boundary.
    ///
    /// Returns `None` if there are no points or any point isn't finite.
    pub fn bounding(points: &[Vector2<f64>]) -> Option<Self> {
        let first = points.first()?;
        let mut min = *first;
        let mut max = *first;

        for p in points {
            if !(p[0].is_finite() && p[1].is_finite()) {
                return None;
            }
            min = min.inf(p);
            max = max.sup(p);
        }

        let centre = (min + max) / 2.0;
        let half_width = (max - min).amax() / 2.0;

        // Margin keeps points off the boundary, and gives degenerate (single point) sets a size
        Some(Self::new(centre, half_width * 1.01 + 1e-6))
    }

    /// Returns `true` if `point` is inside this [`Quad`]
    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        (self.centre[0] - self.half_width) <= point[0]
        && (self.centre[0] + self.half_width) >= point[0]
        && (self.centre[1] - self.half_width) <= point[1]
        && (self.centre[1] + self.half_width) >= point[1]
    }

    /// Returns the squared distance between `point` and the closest point of this [`Quad`], which
    /// is zero if the point is inside.
    pub fn distance_sq(&self, point: &Vector2<f64>) -> f64 {
        let dx = ((point[0] - self.centre[0]).abs() - self.half_width).max(0.0);
        let dy = ((point[1] - self.centre[1]).abs() - self.half_width).max(0.0);

        dx * dx + dy * dy
    }

    /// Index of the child quadrant containing `point`, in the order north west, north east,
    /// south west, south east.
    fn quadrant(&self, point: &Vector2<f64>) -> usize {
        let east = point[0] >= self.centre[0];
        let north = point[1] >= self.centre[1];

        match (north, east) {
            (true, false) => 0,
            (true, true) => 1,
            (false, false) => 2,
            (false, true) => 3
        }
    }
}

impl QuadTree {
    pub fn new(boundary: Quad) -> Self {
        Self::with_depth(boundary, 0)
    }

    fn with_depth(boundary: Quad, depth: usize) -> Self {
        Self {
            boundary,
            depth,
            points: Vec::new(),
            children: None
        }
    }

    /// Build a tree holding all `points`, where each point's index is its position in the slice.
    pub fn from_points(points: &[Vector2<f64>]) -> Result<Self, QuadTreeError> {
        // Report the first non-finite point explicitly, since it can never be in bounds
        if let Some((i, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| !(p[0].is_finite() && p[1].is_finite()))
        {
            return Err(QuadTreeError::NonFinitePoint(*p, i));
        }

        let boundary = Quad::bounding(points).unwrap_or_default();
        let mut tree = Self::new(boundary);

        for (index, point) in points.iter().enumerate() {
            tree.insert(IndexedPoint { point: *point, index })?;
        }

        Ok(tree)
    }

    /// Insert a point into the QuadTree.
    pub fn insert(&mut self, point: IndexedPoint) -> Result<(), QuadTreeError> {

        // Check if it's in the tree
        if !self.boundary.contains(&point.point) {
            return Err(QuadTreeError::PointNotInBounds(point.point, self.boundary));
        }

        self.insert_unchecked(point);

        Ok(())
    }

    /// Insert a point known to be within the bounds of this node.
    fn insert_unchecked(&mut self, point: IndexedPoint) {
        // If there's a space in the node and it's not been divided add it to the points list. At
        // the maximum depth the node just keeps growing.
        if self.children.is_none()
            && (self.points.len() < CAPACITY || self.depth >= MAX_DEPTH)
        {
            self.points.push(point);
            return
        }

        // Otherwise subdivide if needed
        if self.children.is_none() {
            self.subdivide();
        }

        // And add the point to the quadrant it belongs to
        let quadrant = self.boundary.quadrant(&point.point);
        if let Some(ref mut children) = self.children {
            children[quadrant].insert_unchecked(point);
        }
    }

    /// Find the point nearest to `query`.
    ///
    /// Returns `None` only if the tree is empty.
    pub fn nearest(&self, query: &Vector2<f64>) -> Option<Nearest> {
        // Best candidate as (squared distance, index)
        let mut best: Option<(f64, usize)> = None;

        self.search_nearest(query, &mut best);

        best.map(|(dist_sq, index)| Nearest {
            distance: dist_sq.sqrt(),
            index
        })
    }

    fn search_nearest(&self, query: &Vector2<f64>, best: &mut Option<(f64, usize)>) {
        // Prune nodes that can't contain anything closer than the current best. Equal distances
        // are still visited as they may hold a lower index.
        if let Some((best_dist_sq, _)) = *best {
            if self.boundary.distance_sq(query) > best_dist_sq {
                return
            }
        }

        for p in self.points.iter() {
            let dist_sq = (p.point - query).norm_squared();

            let better = match *best {
                None => true,
                Some((best_dist_sq, best_index)) => {
                    dist_sq < best_dist_sq
                    || (dist_sq == best_dist_sq && p.index < best_index)
                }
            };

            if better {
                *best = Some((dist_sq, p.index));
            }
        }

        if let Some(ref children) = self.children {
            // Visit the closest children first so the pruning bites sooner
            let mut order: [(f64, usize); 4] = [(0.0, 0); 4];
            for (i, child) in children.iter().enumerate() {
                order[i] = (child.boundary.distance_sq(query), i);
            }
            order.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            for (_, i) in order.iter() {
                children[*i].search_nearest(query, best);
            }
        }
    }

    /// Total number of points stored in the tree.
    pub fn len(&self) -> usize {
        self.points.len()
            + self
                .children
                .as_ref()
                .map(|c| c.iter().map(|t| t.len()).sum())
                .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subdivide(&mut self) {
        let hw = self.boundary.half_width / 2.0;
        let centre = self.boundary.centre;
        let depth = self.depth + 1;

        self.children = Some(Box::new([
            QuadTree::with_depth(Quad::new(centre + Vector2::new(-hw, hw), hw), depth),
            QuadTree::with_depth(Quad::new(centre + Vector2::new(hw, hw), hw), depth),
            QuadTree::with_depth(Quad::new(centre + Vector2::new(-hw, -hw), hw), depth),
            QuadTree::with_depth(Quad::new(centre + Vector2::new(hw, -hw), hw), depth),
        ]));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Brute force nearest with lowest-index tie breaking.
    fn brute_nearest(points: &[Vector2<f64>], query: &Vector2<f64>) -> (f64, usize) {
        let mut best = (std::f64::INFINITY, 0);
        for (i, p) in points.iter().enumerate() {
            let d = (p - query).norm_squared();
            if d < best.0 {
                best = (d, i);
            }
        }
        (best.0.sqrt(), best.1)
    }

    #[test]
    fn test_nearest_matches_brute_force() -> Result<(), QuadTreeError> {
        // A spiral gives points at many scales
        let points: Vec<Vector2<f64>> = (0..500)
            .map(|i| {
                let t = i as f64 * 0.05;
                Vector2::new((1.0 + 0.3 * t) * t.cos(), (1.0 + 0.3 * t) * t.sin())
            })
            .collect();

        let tree = QuadTree::from_points(&points)?;
        assert_eq!(tree.len(), points.len());

        for qx in -10..10 {
            for qy in -10..10 {
                let query = Vector2::new(qx as f64 * 0.7 + 0.13, qy as f64 * 0.7 - 0.21);
                let nearest = tree.nearest(&query).unwrap();
                let (dist, index) = brute_nearest(&points, &query);

                assert_eq!(nearest.index, index);
                assert!((nearest.distance - dist).abs() < 1e-12);
            }
        }

        Ok(())
    }

    #[test]
    fn test_exact_match() -> Result<(), QuadTreeError> {
        let points: Vec<Vector2<f64>> = (0..100)
            .map(|i| Vector2::new(i as f64 * 0.1, 0.0))
            .collect();
        let tree = QuadTree::from_points(&points)?;

        for (k, p) in points.iter().enumerate() {
            let nearest = tree.nearest(p).unwrap();
            assert_eq!(nearest.index, k);
            assert_eq!(nearest.distance, 0.0);
        }

        Ok(())
    }

    #[test]
    fn test_ties_pick_lowest_index() -> Result<(), QuadTreeError> {
        // Many coincident points force the tree down to its maximum depth
        let mut points = vec![Vector2::new(1.0, 1.0); 40];
        points.push(Vector2::new(-1.0, -1.0));
        points.insert(0, Vector2::new(5.0, 5.0));

        let tree = QuadTree::from_points(&points)?;
        let nearest = tree.nearest(&Vector2::new(1.0, 1.0)).unwrap();
        assert_eq!(nearest.index, 1);

        // Equidistant from index 0 and the last point
        let points = vec![
            Vector2::new(-1.0, 0.0),
            Vector2::new(0.0, 5.0),
            Vector2::new(1.0, 0.0),
        ];
        let tree = QuadTree::from_points(&points)?;
        assert_eq!(tree.nearest(&Vector2::new(0.0, 0.0)).unwrap().index, 0);

        Ok(())
    }

    #[test]
    fn test_non_finite_rejected() {
        let points = vec![Vector2::new(0.0, 0.0), Vector2::new(std::f64::NAN, 1.0)];

        match QuadTree::from_points(&points) {
            Err(QuadTreeError::NonFinitePoint(_, 1)) => (),
            r => panic!("Expected NonFinitePoint error, got {:?}", r)
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = QuadTree::from_points(&[]).unwrap();
        assert!(tree.is_empty());
        assert!(tree.nearest(&Vector2::new(0.0, 0.0)).is_none());
    }
}
