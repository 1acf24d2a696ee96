//! # Path
//!
//! This module defines the reference path followed by the robot.
//!
//! A [`RefPath`] wraps a dense, ordered sequence of points and precomputes everything the rollout
//! needs to know about it: the gradient heading at each point, the cumulative arc length and a
//! quadtree for nearest-point queries. None of this changes once the path is built, so a single
//! path can be shared by reference between any number of rollouts.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod generators;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use crate::kin_model::Pose;
use util::{
    maths::{cumulative_distance, gradient},
    quadtree::{QuadTree, QuadTreeError},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A reference path with its derived heading, arc length and spatial index.
#[derive(Debug, Clone)]
pub struct RefPath {
    points_m: Vec<Vector2<f64>>,

    /// Gradient heading at each point
    headings_rad: Vec<f64>,

    /// Cumulative distance along the path at each point
    arc_lengths_m: Vec<f64>,

    index: QuadTree,
}

/// A single column of a reference window.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct RefPoint {
    pub position_m: Vector2<f64>,
    pub heading_rad: f64,
}

/// A contiguous run of reference points taken from a path, used as the controller's local
/// target.
#[derive(Debug, Copy, Clone)]
pub struct RefWindow<'a> {
    start_index: usize,
    points_m: &'a [Vector2<f64>],
    headings_rad: &'a [f64],
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PathError {
    #[error("A path needs at least 2 points, got {0}")]
    InvalidPath(usize),

    #[error("Path point {1} ({0}) is not finite")]
    NonFinitePoint(Vector2<f64>, usize),

    #[error("The x and y rows of the path have different lengths ({0} and {1})")]
    MismatchedRows(usize, usize),

    #[error("Reference window starting at {start} of a {len} point path would be empty")]
    DegenerateWindow { start: usize, len: usize },

    #[error("Could not build the spatial index: {0}")]
    SpatialIndex(QuadTreeError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RefPath {
    /// Build a new path from an ordered sequence of points.
    pub fn new(points_m: Vec<Vector2<f64>>) -> Result<Self, PathError> {
        if points_m.len() < 2 {
            return Err(PathError::InvalidPath(points_m.len()));
        }

        let index = QuadTree::from_points(&points_m)?;

        // Headings from the gradient of each coordinate
        let xs: Vec<f64> = points_m.iter().map(|p| p[0]).collect();
        let ys: Vec<f64> = points_m.iter().map(|p| p[1]).collect();
        let headings_rad = gradient(&xs)
            .iter()
            .zip(gradient(&ys).iter())
            .map(|(dx, dy)| dy.atan2(*dx))
            .collect();

        let arc_lengths_m = cumulative_distance(&points_m);

        Ok(Self {
            points_m,
            headings_rad,
            arc_lengths_m,
            index,
        })
    }

    /// Build a new path from separate x and y rows.
    pub fn from_rows(xs: &[f64], ys: &[f64]) -> Result<Self, PathError> {
        if xs.len() != ys.len() {
            return Err(PathError::MismatchedRows(xs.len(), ys.len()));
        }

        Self::new(
            xs.iter()
                .zip(ys.iter())
                .map(|(x, y)| Vector2::new(*x, *y))
                .collect(),
        )
    }

    /// Find the path point nearest to `point`, returning `(distance, index)`.
    ///
    /// Ties are broken towards the lowest index.
    pub fn nearest_index(&self, point: &Vector2<f64>) -> (f64, usize) {
        match self.index.nearest(point) {
            Some(n) => (n.distance, n.index),
            None => unreachable!("A RefPath always holds at least 2 points"),
        }
    }

    /// Arc length from the start of the path to the given point.
    ///
    /// # Panics
    /// - If `index` is out of bounds.
    pub fn arc_length(&self, index: usize) -> f64 {
        self.arc_lengths_m[index]
    }

    /// Total length of the path.
    pub fn total_arc_length(&self) -> f64 {
        self.arc_lengths_m[self.arc_lengths_m.len() - 1]
    }

    /// Reference heading at the given point.
    ///
    /// # Panics
    /// - If `index` is out of bounds.
    pub fn heading_at(&self, index: usize) -> f64 {
        self.headings_rad[index]
    }

    /// Position of the given point.
    ///
    /// # Panics
    /// - If `index` is out of bounds.
    pub fn point(&self, index: usize) -> Vector2<f64> {
        self.points_m[index]
    }

    pub fn num_points(&self) -> usize {
        self.points_m.len()
    }

    /// The pose at the start of the path, facing along the path.
    pub fn start_pose(&self) -> Pose {
        Pose {
            position_m: self.points_m[0],
            heading_rad: self.headings_rad[0],
        }
    }

    /// Get the reference window of at most `horizon` points starting at `start`.
    ///
    /// The window is shortened when it would run off the end of the path, so it holds at least
    /// one point whenever `start` is a valid index and `horizon` is non-zero.
    pub fn window(&self, start: usize, horizon: usize) -> Result<RefWindow<'_>, PathError> {
        let len = self.points_m.len();

        if start >= len || horizon == 0 {
            return Err(PathError::DegenerateWindow { start, len });
        }

        let end = len.min(start + horizon);

        Ok(RefWindow {
            start_index: start,
            points_m: &self.points_m[start..end],
            headings_rad: &self.headings_rad[start..end],
        })
    }
}

impl From<QuadTreeError> for PathError {
    fn from(e: QuadTreeError) -> Self {
        match e {
            QuadTreeError::NonFinitePoint(point, index) => PathError::NonFinitePoint(point, index),
            e => PathError::SpatialIndex(e),
        }
    }
}

impl<'a> RefWindow<'a> {
    /// Number of points in the window, always at least 1.
    pub fn len(&self) -> usize {
        self.points_m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_m.is_empty()
    }

    /// Index in the path of the first point of the window.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// The `i`th column of the window.
    ///
    /// # Panics
    /// - If `i` is out of bounds.
    pub fn get(&self, i: usize) -> RefPoint {
        RefPoint {
            position_m: self.points_m[i],
            heading_rad: self.headings_rad[i],
        }
    }

    /// The first column, the reference for the current step.
    pub fn first(&self) -> RefPoint {
        self.get(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = RefPoint> + 'a {
        self.points_m
            .iter()
            .zip(self.headings_rad.iter())
            .map(|(p, h)| RefPoint {
                position_m: *p,
                heading_rad: *h,
            })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
