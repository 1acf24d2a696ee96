//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use num_traits::Float;

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// Generic version of `f64::rem_euclid`, since `num_traits::Float` doesn't provide it. Due to
/// floating point round-off the result can equal `rhs.abs()` when `lhs` is a tiny negative
/// number.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle into the range [-pi, pi).
pub fn wrap_to_pi<T>(angle: T) -> T
where
    T: Float
{
    let pi_t = T::from(std::f64::consts::PI).unwrap_or_else(T::zero);
    let tau_t = pi_t + pi_t;

    rem_euclid(angle + pi_t, tau_t) - pi_t
}

/// Get the signed shortest angular distance from `a` to `b`, in [-pi, pi).
pub fn ang_dist<T>(a: T, b: T) -> T
where
    T: Float
{
    wrap_to_pi(b - a)
}

/// Shift `angle` by a whole number of turns so that it lies within pi of `reference`.
///
/// Used to make a sequence of `atan2` headings continuous with an unbounded heading.
pub fn unwrap_near<T>(angle: T, reference: T) -> T
where
    T: Float
{
    reference + ang_dist(reference, angle)
}

/// Numerical gradient of a sequence with unit sample spacing.
///
/// Interior samples use the centred difference `(f[i+1] - f[i-1]) / 2`, the two ends use one-sided
/// differences. Sequences shorter than two samples have a zero gradient.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();

    if n < 2 {
        return vec![0.0; n];
    }

    let mut grad = Vec::with_capacity(n);
    grad.push(values[1] - values[0]);
    for i in 1..(n - 1) {
        grad.push((values[i + 1] - values[i - 1]) / 2.0);
    }
    grad.push(values[n - 1] - values[n - 2]);

    grad
}

/// Cumulative Euclidean distance along a sequence of points, starting at 0.
pub fn cumulative_distance(points: &[Vector2<f64>]) -> Vec<f64> {
    let mut dist = Vec::with_capacity(points.len());
    let mut acc = 0f64;

    if !points.is_empty() {
        dist.push(0.0);
    }

    for pair in points.windows(2) {
        acc += (pair[1] - pair[0]).norm();
        dist.push(acc);
    }

    dist
}

/// `num` evenly spaced samples over `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            let mut samples: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();

            // Make sure the final sample is exact
            samples[num - 1] = end;
            samples
        }
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    }
    else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;
    const TAU: f64 = std::f64::consts::TAU;

    #[test]
    fn test_wrap_to_pi() {
        assert!((wrap_to_pi(0.5f64) - 0.5).abs() < 1e-12);
        assert!((wrap_to_pi(TAU + 0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_to_pi(-TAU - 0.5) + 0.5).abs() < 1e-12);
        assert!((wrap_to_pi(PI) + PI).abs() < 1e-12);
    }

    #[test]
    fn test_ang_dist() {
        assert!((ang_dist(1f64, 2f64) - 1.0).abs() < 1e-12);
        assert!((ang_dist(2f64, 1f64) + 1.0).abs() < 1e-12);
        assert!(ang_dist(0f64, TAU).abs() < 1e-12);
        assert!((ang_dist(PI - 0.1, -PI + 0.1) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_unwrap_near() {
        // A heading of -3.0 next to a robot at 3.1 rad is really ~3.28 rad
        let unwrapped = unwrap_near(-3.0f64, 3.1);
        assert!((unwrapped - (TAU - 3.0)).abs() < 1e-12);

        // Several turns away
        let unwrapped = unwrap_near(0.1f64, 4.0 * TAU);
        assert!((unwrapped - (4.0 * TAU + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_gradient() {
        assert_eq!(gradient(&[1.0, 2.0, 4.0, 7.0]), vec![1.0, 1.5, 2.5, 3.0]);
        assert_eq!(gradient(&[3.0, 1.0]), vec![-2.0, -2.0]);
        assert_eq!(gradient(&[3.0]), vec![0.0]);
    }

    #[test]
    fn test_cumulative_distance() {
        let points = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(3.0, 4.0),
            Vector2::new(3.0, 4.0),
            Vector2::new(3.0, 5.0),
        ];

        assert_eq!(cumulative_distance(&points), vec![0.0, 5.0, 5.0, 6.0]);
        assert!(cumulative_distance(&[]).is_empty());
    }

    #[test]
    fn test_linspace() {
        let samples = linspace(0.0, 1.0, 5);
        assert_eq!(samples, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(2.0, 3.0, 0).is_empty());
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mean(&[]), None);
    }
}
