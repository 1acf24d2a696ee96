//! Least squares form of the horizon problem
//!
//! The controls are stacked into a single vector `u = [v_0, omega_0, v_1, omega_1, ...]` and the
//! states are found by forward simulation of the model, so the dynamics hold exactly for any `u`.
//! Each step of the horizon contributes six weighted residuals, in this order:
//!
//! | Row | Residual                       |
//! |-----|--------------------------------|
//! | 0   | `v_t - v_{t-1}`                |
//! | 1   | `omega_t - omega_{t-1}`        |
//! | 2   | `x_t - x_ref_t`                |
//! | 3   | `y_t - y_ref_t`                |
//! | 4   | `theta_t - theta_ref_t`        |
//! | 5   | `v_t * omega_t`                |
//!
//! The cost is the sum of the squared residuals.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector, Vector2};

// Internal
use super::Weights;
use crate::kin_model::{Control, Pose, UnicycleModel};
use crate::path::RefWindow;
use util::maths::unwrap_near;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of residuals per step of the horizon.
pub(super) const RESIDUALS_PER_STEP: usize = 6;

/// Number of controls per step of the horizon.
pub(super) const CONTROLS_PER_STEP: usize = 2;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub(super) struct HorizonProblem {
    model: UnicycleModel,

    initial_pose: Pose,
    prior_control: Control,

    ref_points_m: Vec<Vector2<f64>>,

    /// Reference headings made continuous with the initial heading
    ref_headings_rad: Vec<f64>,

    // Square roots of the objective weights
    sqrt_w_dv: f64,
    sqrt_w_domega: f64,
    sqrt_w_cte: f64,
    sqrt_w_heading: f64,
    sqrt_w_lat: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HorizonProblem {
    pub fn new(
        model: UnicycleModel,
        weights: &Weights,
        initial_pose: &Pose,
        window: &RefWindow,
        prior_control: &Control,
    ) -> Self {
        let ref_points_m = window.iter().map(|r| r.position_m).collect();

        // atan2 headings jump by 2pi, so unwrap the first one onto the current heading and each
        // following one onto its predecessor.
        let mut ref_headings_rad = Vec::with_capacity(window.len());
        let mut previous = initial_pose.heading_rad;
        for point in window.iter() {
            previous = unwrap_near(point.heading_rad, previous);
            ref_headings_rad.push(previous);
        }

        Self {
            model,
            initial_pose: *initial_pose,
            prior_control: *prior_control,
            ref_points_m,
            ref_headings_rad,
            sqrt_w_dv: weights.v_smooth.sqrt(),
            sqrt_w_domega: weights.omega_smooth.sqrt(),
            sqrt_w_cte: weights.cte.sqrt(),
            sqrt_w_heading: weights.heading.sqrt(),
            sqrt_w_lat: weights.lateral_acc.sqrt(),
        }
    }

    /// Length of the horizon.
    pub fn num_steps(&self) -> usize {
        self.ref_points_m.len()
    }

    pub fn num_vars(&self) -> usize {
        self.num_steps() * CONTROLS_PER_STEP
    }

    /// The reference headings after unwrapping.
    #[cfg(test)]
    pub fn ref_headings_rad(&self) -> &[f64] {
        &self.ref_headings_rad
    }

    /// Forward simulate the controls, giving `N + 1` states starting at the initial pose.
    pub fn simulate(&self, u: &DVector<f64>) -> Vec<Pose> {
        let mut states = Vec::with_capacity(self.num_steps() + 1);
        let mut pose = self.initial_pose;
        states.push(pose);

        for t in 0..self.num_steps() {
            pose = self.model.step(&pose, &control_at(u, t));
            states.push(pose);
        }

        states
    }

    /// The weighted residual vector for the given controls and their simulated states.
    pub fn residuals(&self, u: &DVector<f64>, states: &[Pose]) -> DVector<f64> {
        let n = self.num_steps();
        let mut r = DVector::zeros(n * RESIDUALS_PER_STEP);

        for t in 0..n {
            let row = t * RESIDUALS_PER_STEP;
            let control = control_at(u, t);
            let previous = if t == 0 {
                self.prior_control
            }
            else {
                control_at(u, t - 1)
            };
            let state = &states[t];

            r[row] = self.sqrt_w_dv * (control.speed_ms - previous.speed_ms);
            r[row + 1] = self.sqrt_w_domega * (control.turn_rate_rads - previous.turn_rate_rads);
            r[row + 2] = self.sqrt_w_cte * (state.position_m[0] - self.ref_points_m[t][0]);
            r[row + 3] = self.sqrt_w_cte * (state.position_m[1] - self.ref_points_m[t][1]);
            r[row + 4] = self.sqrt_w_heading * (state.heading_rad - self.ref_headings_rad[t]);
            r[row + 5] = self.sqrt_w_lat * control.speed_ms * control.turn_rate_rads;
        }

        r
    }

    /// Jacobian of the residuals with respect to the controls.
    pub fn jacobian(&self, u: &DVector<f64>, states: &[Pose]) -> DMatrix<f64> {
        let n = self.num_steps();
        let dt = self.model.dt_s();
        let mut jac = DMatrix::zeros(n * RESIDUALS_PER_STEP, self.num_vars());

        // Sensitivities of the position at step k to its own heading, scaled by dt^2
        let dx_dtheta: Vec<f64> = (0..n)
            .map(|k| -dt * dt * u[k * 2] * states[k].heading_rad.sin())
            .collect();
        let dy_dtheta: Vec<f64> = (0..n)
            .map(|k| dt * dt * u[k * 2] * states[k].heading_rad.cos())
            .collect();

        for t in 0..n {
            let row = t * RESIDUALS_PER_STEP;
            let v_col = t * CONTROLS_PER_STEP;
            let omega_col = v_col + 1;

            // ---- SMOOTHNESS ----

            jac[(row, v_col)] = self.sqrt_w_dv;
            jac[(row + 1, omega_col)] = self.sqrt_w_domega;
            if t > 0 {
                jac[(row, v_col - 2)] = -self.sqrt_w_dv;
                jac[(row + 1, omega_col - 2)] = -self.sqrt_w_domega;
            }

            // ---- LATERAL ACCELERATION ----

            jac[(row + 5, v_col)] = self.sqrt_w_lat * u[omega_col];
            jac[(row + 5, omega_col)] = self.sqrt_w_lat * u[v_col];

            // ---- TRACKING ----

            // State t depends on the controls applied before it
            for k in 0..t {
                let (sin, cos) = states[k].heading_rad.sin_cos();
                jac[(row + 2, k * 2)] = self.sqrt_w_cte * dt * cos;
                jac[(row + 3, k * 2)] = self.sqrt_w_cte * dt * sin;
                jac[(row + 4, k * 2 + 1)] = self.sqrt_w_heading * dt;
            }

            // A turn rate at step j changes the heading of every step after it, so accumulate
            // backwards from t - 1
            let mut sum_x = 0.0;
            let mut sum_y = 0.0;
            for j in (0..t).rev() {
                jac[(row + 2, j * 2 + 1)] = self.sqrt_w_cte * sum_x;
                jac[(row + 3, j * 2 + 1)] = self.sqrt_w_cte * sum_y;
                sum_x += dx_dtheta[j];
                sum_y += dy_dtheta[j];
            }
        }

        jac
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the control at step `t` from the stacked control vector.
pub(super) fn control_at(u: &DVector<f64>, t: usize) -> Control {
    Control::new(u[t * CONTROLS_PER_STEP], u[t * CONTROLS_PER_STEP + 1])
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::path::{generators, RefPath};
    use std::f64::consts::PI;

    fn problem(path: &RefPath, pose: &Pose, horizon: usize) -> HorizonProblem {
        HorizonProblem::new(
            UnicycleModel::new(0.05).unwrap(),
            &Weights::default(),
            pose,
            &path.window(0, horizon).unwrap(),
            &Control::new(0.3, -0.2),
        )
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let path = RefPath::new(generators::circle(200, 3.0)).unwrap();
        let prob = problem(&path, &Pose::new(3.1, -0.2, 1.4), 12);

        let u = DVector::from_fn(prob.num_vars(), |i, _| {
            if i % 2 == 0 {
                0.5 + 0.1 * i as f64
            }
            else {
                0.3 - 0.07 * i as f64
            }
        });

        let states = prob.simulate(&u);
        let jac = prob.jacobian(&u, &states);
        let eps = 1e-6;

        for col in 0..prob.num_vars() {
            let mut up = u.clone();
            let mut down = u.clone();
            up[col] += eps;
            down[col] -= eps;

            let r_up = prob.residuals(&up, &prob.simulate(&up));
            let r_down = prob.residuals(&down, &prob.simulate(&down));

            for row in 0..jac.nrows() {
                let numeric = (r_up[row] - r_down[row]) / (2.0 * eps);
                let analytic = jac[(row, col)];
                assert!(
                    (numeric - analytic).abs() < 1e-4 * (1.0 + analytic.abs()),
                    "Jacobian mismatch at ({}, {}): {} vs {}",
                    row,
                    col,
                    analytic,
                    numeric
                );
            }
        }
    }

    #[test]
    fn test_reference_headings_unwrapped() {
        // Robot many turns away from the atan2 range
        let path = RefPath::new(generators::circle(100, 2.0)).unwrap();
        let pose = Pose::new(2.0, 0.0, 6.0 * PI + 0.5 * PI);
        let prob = problem(&path, &pose, 100);

        let headings = prob.ref_headings_rad();
        assert!((headings[0] - pose.heading_rad).abs() < 0.1);
        for i in 1..headings.len() {
            assert!((headings[i] - headings[i - 1]).abs() < PI);
        }

        // Once round the circle
        assert!((headings[99] - headings[0] - 2.0 * PI).abs() < 0.1);
    }

    #[test]
    fn test_states_follow_model() {
        let path = RefPath::new(generators::line(50, 5.0)).unwrap();
        let pose = path.start_pose();
        let prob = problem(&path, &pose, 10);
        let model = UnicycleModel::new(0.05).unwrap();

        let u = DVector::from_fn(prob.num_vars(), |i, _| 0.2 * i as f64);
        let states = prob.simulate(&u);

        assert_eq!(states.len(), 11);
        assert_eq!(states[0], pose);
        for t in 0..10 {
            assert_eq!(states[t + 1], model.step(&states[t], &control_at(&u, t)));
        }
    }
}
