//! # Path generators
//!
//! Parametric reference paths used for data collection and evaluation. Every generator samples
//! its curve parameter evenly, so the points are dense but not evenly spaced in arc length.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use util::maths::linspace;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of points in each of the training paths.
pub const TRAINING_PATH_POINTS: usize = 1500;

/// Extent in x of the sinusoid.
const SINUSOID_LENGTH_M: f64 = 15.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A parametric path shape.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PathShape {
    Line { length_m: f64 },
    Circle { radius_m: f64 },
    FigureEight { a: f64, b: f64 },
    Sinusoid { amplitude: f64, frequency: f64 },
    Spiral { a: f64, b: f64 },
    Ellipse { a: f64, b: f64 },
}

/// A shape along with the number of points to sample it with.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSpec {
    pub shape: PathShape,
    pub num_points: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PathShape {
    /// Sample the shape with the given number of points.
    pub fn points(&self, num_points: usize) -> Vec<Vector2<f64>> {
        match *self {
            PathShape::Line { length_m } => line(num_points, length_m),
            PathShape::Circle { radius_m } => circle(num_points, radius_m),
            PathShape::FigureEight { a, b } => figure_eight(num_points, a, b),
            PathShape::Sinusoid {
                amplitude,
                frequency,
            } => sinusoid(num_points, amplitude, frequency),
            PathShape::Spiral { a, b } => spiral(num_points, a, b),
            PathShape::Ellipse { a, b } => ellipse(num_points, a, b),
        }
    }
}

impl PathSpec {
    pub fn new(shape: PathShape, num_points: usize) -> Self {
        Self { shape, num_points }
    }

    pub fn points(&self) -> Vec<Vector2<f64>> {
        self.shape.points(self.num_points)
    }
}

impl fmt::Display for PathShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathShape::Line { length_m } => write!(f, "Line length={}", length_m),
            PathShape::Circle { radius_m } => write!(f, "Circle radius={}", radius_m),
            PathShape::FigureEight { a, b } => write!(f, "Fig8 a={},b={}", a, b),
            PathShape::Sinusoid {
                amplitude,
                frequency,
            } => write!(f, "Sinusoid amp={}, freq={}", amplitude, frequency),
            PathShape::Spiral { a, b } => write!(f, "Spiral a={}, b={}", a, b),
            PathShape::Ellipse { a, b } => write!(f, "Ellipse a={},b={}", a, b),
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.shape.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// The standard set of training paths, in the order they are collected.
pub fn training_paths() -> Vec<PathSpec> {
    let mut shapes = Vec::new();

    for length_m in [10.0, 20.0, 30.0].iter() {
        shapes.push(PathShape::Line {
            length_m: *length_m,
        });
    }

    for radius_m in [5.0, 8.0, 12.0].iter() {
        shapes.push(PathShape::Circle {
            radius_m: *radius_m,
        });
    }

    for (a, b) in [(8.0, 3.0), (10.0, 4.0), (12.0, 6.0)].iter() {
        shapes.push(PathShape::FigureEight { a: *a, b: *b });
    }

    for amplitude in [2.0, 4.0].iter() {
        for frequency in [1.0, 2.0].iter() {
            shapes.push(PathShape::Sinusoid {
                amplitude: *amplitude,
                frequency: *frequency,
            });
        }
    }

    for (a, b) in [(2.0, 0.2), (3.0, 0.3), (4.0, 0.5)].iter() {
        shapes.push(PathShape::Spiral { a: *a, b: *b });
    }

    for (a, b) in [(10.0, 5.0), (12.0, 6.0), (14.0, 4.0)].iter() {
        shapes.push(PathShape::Ellipse { a: *a, b: *b });
    }

    shapes
        .into_iter()
        .map(|s| PathSpec::new(s, TRAINING_PATH_POINTS))
        .collect()
}

/// Straight line along +x starting at the origin.
pub fn line(num_points: usize, length_m: f64) -> Vec<Vector2<f64>> {
    linspace(0.0, length_m, num_points)
        .into_iter()
        .map(|x| Vector2::new(x, 0.0))
        .collect()
}

/// Full anticlockwise circle about the origin, starting and ending at `(r, 0)`.
pub fn circle(num_points: usize, radius_m: f64) -> Vec<Vector2<f64>> {
    ellipse(num_points, radius_m, radius_m)
}

/// Figure of eight lying along the x axis, `x = a sin(t)`, `y = b sin(t) cos(t)`.
pub fn figure_eight(num_points: usize, a: f64, b: f64) -> Vec<Vector2<f64>> {
    linspace(0.0, 2.0 * PI, num_points)
        .into_iter()
        .map(|t| {
            let (sin, cos) = t.sin_cos();
            Vector2::new(a * sin, b * sin * cos)
        })
        .collect()
}

/// Sine wave over `x` in `[0, 15]`.
pub fn sinusoid(num_points: usize, amplitude: f64, frequency: f64) -> Vec<Vector2<f64>> {
    linspace(0.0, SINUSOID_LENGTH_M, num_points)
        .into_iter()
        .map(|x| Vector2::new(x, amplitude * (frequency * x * 0.5).sin()))
        .collect()
}

/// Archimedean spiral `r = a + b t` over two turns.
pub fn spiral(num_points: usize, a: f64, b: f64) -> Vec<Vector2<f64>> {
    linspace(0.0, 4.0 * PI, num_points)
        .into_iter()
        .map(|t| {
            let r = a + b * t;
            let (sin, cos) = t.sin_cos();
            Vector2::new(r * cos, r * sin)
        })
        .collect()
}

/// Axis aligned ellipse with semi-axes `a` along x and `b` along y.
pub fn ellipse(num_points: usize, a: f64, b: f64) -> Vec<Vector2<f64>> {
    linspace(0.0, 2.0 * PI, num_points)
        .into_iter()
        .map(|t| {
            let (sin, cos) = t.sin_cos();
            Vector2::new(a * cos, b * sin)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
