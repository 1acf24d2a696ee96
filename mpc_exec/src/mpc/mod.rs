//! # Horizon optimiser
//!
//! Model predictive control over a short horizon of the reference path. Each call to
//! [`MpcSolver::solve`] finds the controls `U = (u_0, ..., u_{N-1})` which minimise
//!
//! ```text
//! sum_t  w_dv (v_t - v_{t-1})^2 + w_domega (omega_t - omega_{t-1})^2
//!      + w_cte |p_t - p_ref_t|^2 + w_heading (theta_t - theta_ref_t)^2
//!      + w_lat (v_t omega_t)^2
//! ```
//!
//! subject to the unicycle dynamics and the box limits on the control, where `u_{-1}` is the
//! control applied on the previous cycle.
//!
//! The dynamics are eliminated by single shooting, the states are always the forward simulation
//! of the controls, which leaves a box constrained nonlinear least squares problem in the
//! controls alone. It is solved with a projected Levenberg-Marquardt iteration: bounds which the
//! gradient pushes against are held fixed, a damped Gauss-Newton step is taken in the remaining
//! variables and the result is projected back into the box.
//!
//! Only the first control of a solution is expected to be applied, the next cycle solves again
//! from the new pose.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod lm;
pub mod params;
mod problem;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::time::Instant;

// Internal
pub use params::{Params, Weights};

use crate::kin_model::{Control, ControlLimits, Pose, UnicycleModel};
use crate::path::RefWindow;
use lm::AdaptiveDamping;
use problem::{control_at, HorizonProblem, CONTROLS_PER_STEP};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Floor on the diagonal used to scale the damping, keeps the damped system positive definite
/// when a control has no influence on the cost.
const MIN_DIAG_SCALE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The horizon optimiser.
///
/// Holds no state between solves, every call to `solve` is independent.
#[derive(Debug, Clone)]
pub struct MpcSolver {
    model: UnicycleModel,
    params: Params,
}

/// A successful solution of the horizon problem.
#[derive(Debug, Clone, Serialize)]
pub struct MpcSolution {
    /// Optimal controls, one per column of the reference window
    pub controls: Vec<Control>,

    /// States reached by applying the controls from the initial pose, one more than the number
    /// of controls
    pub states: Vec<Pose>,

    /// Value of the objective at the solution
    pub cost: f64,

    /// Number of iterations taken
    pub iterations: usize,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Reasons a solve can fail. No partial solution is returned for any of them.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum MpcError {
    #[error("The solver did not converge in {0} iterations")]
    NotConverged(usize),

    #[error("The damping factor saturated after {0} iterations without progress")]
    DampingSaturated(usize),

    #[error("The cost is not finite")]
    NonFiniteCost,

    #[error("The solve exceeded its time limit ({0:.3} s)")]
    Timeout(f64),

    #[error("The reference window is empty")]
    EmptyWindow,

    #[error("Invalid control limits: {0:?}")]
    InvalidLimits(ControlLimits),

    #[error("Invalid objective weights: {0:?}")]
    InvalidWeights(Weights),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MpcSolver {
    pub fn new(model: UnicycleModel, params: Params) -> Result<Self, MpcError> {
        if !params.weights.is_valid() {
            return Err(MpcError::InvalidWeights(params.weights));
        }

        Ok(Self { model, params })
    }

    pub fn model(&self) -> &UnicycleModel {
        &self.model
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Solve the horizon problem from `pose` over the given reference window.
    ///
    /// `prior_control` is the control applied on the previous cycle. It anchors the smoothness
    /// terms of the first step and, clamped into the limits, seeds the initial guess for every
    /// step.
    pub fn solve(
        &self,
        pose: &Pose,
        window: &RefWindow,
        limits: &ControlLimits,
        prior_control: &Control,
    ) -> Result<MpcSolution, MpcError> {
        let start_time = Instant::now();

        // ---- VALIDATION ----

        limits
            .validate()
            .map_err(|_| MpcError::InvalidLimits(*limits))?;

        if window.is_empty() {
            return Err(MpcError::EmptyWindow);
        }

        // ---- SETUP ----

        let problem = HorizonProblem::new(
            self.model,
            &self.params.weights,
            pose,
            window,
            prior_control,
        );
        let num_vars = problem.num_vars();

        let lower = DVector::from_fn(num_vars, |i, _| match i % CONTROLS_PER_STEP {
            0 => limits.v_min,
            _ => limits.omega_min,
        });
        let upper = DVector::from_fn(num_vars, |i, _| match i % CONTROLS_PER_STEP {
            0 => limits.v_max,
            _ => limits.omega_max,
        });

        // Warm start from the prior control
        let guess = limits.clamp(prior_control);
        let mut u = DVector::from_fn(num_vars, |i, _| match i % CONTROLS_PER_STEP {
            0 => guess.speed_ms,
            _ => guess.turn_rate_rads,
        });

        let mut states = problem.simulate(&u);
        let mut residuals = problem.residuals(&u, &states);
        let mut cost = residuals.norm_squared();

        if !cost.is_finite() {
            debug!("Initial cost is not finite ({})", cost);
            return Err(MpcError::NonFiniteCost);
        }

        let mut damping = AdaptiveDamping::new(self.params.initial_damping);

        // ---- ITERATION ----

        for iteration in 0..self.params.max_iterations {
            if let Some(max_time_s) = self.params.max_solve_time_s {
                let elapsed_s = start_time.elapsed().as_secs_f64();
                if elapsed_s >= max_time_s {
                    debug!("Solve timed out after {} iterations", iteration);
                    return Err(MpcError::Timeout(elapsed_s));
                }
            }

            let jac = problem.jacobian(&u, &states);
            let grad = jac.tr_mul(&residuals);

            // Converged if a projected gradient step makes no progress
            let proj_grad_norm = (0..num_vars)
                .map(|i| (clamp(u[i] - grad[i], lower[i], upper[i]) - u[i]).abs())
                .fold(0.0, f64::max);

            if proj_grad_norm <= self.params.gradient_tol * (1.0 + cost) {
                trace!("Converged on gradient after {} iterations", iteration);
                return Ok(build_solution(&u, states, cost, iteration));
            }

            // Hold variables fixed which sit on a bound the gradient pushes against
            let free: Vec<usize> = (0..num_vars)
                .filter(|&i| {
                    let at_lower = u[i] <= lower[i] && grad[i] > 0.0;
                    let at_upper = u[i] >= upper[i] && grad[i] < 0.0;
                    !(at_lower || at_upper)
                })
                .collect();

            if free.is_empty() {
                return Ok(build_solution(&u, states, cost, iteration));
            }

            // ---- DAMPED STEP ----

            let hess = jac.tr_mul(&jac);
            let lambda = damping.damping();
            let num_free = free.len();

            let mut lhs = DMatrix::from_fn(num_free, num_free, |r, c| hess[(free[r], free[c])]);
            for r in 0..num_free {
                lhs[(r, r)] += lambda * hess[(free[r], free[r])].max(MIN_DIAG_SCALE);
            }
            let rhs = DVector::from_fn(num_free, |r, _| -grad[free[r]]);

            let free_step = match lhs.cholesky() {
                Some(chol) => chol.solve(&rhs),
                None => {
                    damping.reject();
                    if damping.is_saturated() {
                        debug!("Damping saturated after {} iterations", iteration + 1);
                        return Err(MpcError::DampingSaturated(iteration + 1));
                    }
                    continue;
                }
            };

            let mut candidate = u.clone();
            for (r, &i) in free.iter().enumerate() {
                candidate[i] = clamp(u[i] + free_step[r], lower[i], upper[i]);
            }
            let step = &candidate - &u;
            let step_small =
                step.norm() <= self.params.step_tol * (u.norm() + self.params.step_tol);

            // Reduction predicted by the linearised model for the projected step
            let predicted = -(2.0 * step.dot(&grad) + step.dot(&(&hess * &step)));

            let candidate_states = problem.simulate(&candidate);
            let candidate_residuals = problem.residuals(&candidate, &candidate_states);
            let candidate_cost = candidate_residuals.norm_squared();

            if candidate_cost.is_finite() && candidate_cost < cost {
                let reduction = cost - candidate_cost;
                let rho = if predicted > 0.0 {
                    reduction / predicted
                }
                else {
                    0.0
                };
                damping.accept(rho);

                let previous_cost = cost;
                u = candidate;
                states = candidate_states;
                residuals = candidate_residuals;
                cost = candidate_cost;

                if reduction <= self.params.cost_tol * previous_cost || step_small {
                    trace!("Converged on cost/step after {} iterations", iteration + 1);
                    return Ok(build_solution(&u, states, cost, iteration + 1));
                }
            }
            else {
                // A rejected step too small to matter means the current point can't be improved
                if step_small {
                    trace!("Converged on step after {} iterations", iteration + 1);
                    return Ok(build_solution(&u, states, cost, iteration + 1));
                }

                damping.reject();
                if damping.is_saturated() {
                    debug!("Damping saturated after {} iterations", iteration + 1);
                    return Err(MpcError::DampingSaturated(iteration + 1));
                }
            }
        }

        debug!(
            "Solver did not converge in {} iterations (cost {})",
            self.params.max_iterations, cost
        );
        Err(MpcError::NotConverged(self.params.max_iterations))
    }
}

impl MpcSolution {
    /// The control to apply now.
    pub fn first_control(&self) -> Control {
        self.controls[0]
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn clamp(value: f64, lower: f64, upper: f64) -> f64 {
    value.max(lower).min(upper)
}

fn build_solution(u: &DVector<f64>, states: Vec<Pose>, cost: f64, iterations: usize) -> MpcSolution {
    MpcSolution {
        controls: (0..u.len() / CONTROLS_PER_STEP)
            .map(|t| control_at(u, t))
            .collect(),
        states,
        cost,
        iterations,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::path::{generators, RefPath};
    use std::f64::consts::PI;

    fn limits() -> ControlLimits {
        ControlLimits {
            v_min: 0.0,
            v_max: 2.0,
            omega_min: -1.5,
            omega_max: 1.5,
        }
    }

    fn solver(params: Params) -> MpcSolver {
        MpcSolver::new(UnicycleModel::new(0.01).unwrap(), params).unwrap()
    }

    fn assert_dynamics_hold(solver: &MpcSolver, pose: &Pose, solution: &MpcSolution) {
        assert_eq!(solution.states.len(), solution.controls.len() + 1);
        assert_eq!(solution.states[0], *pose);

        for (t, control) in solution.controls.iter().enumerate() {
            assert_eq!(
                solution.states[t + 1],
                solver.model().step(&solution.states[t], control)
            );
        }
    }

    #[test]
    fn test_single_step_horizon() {
        let path = RefPath::new(generators::line(100, 10.0)).unwrap();
        let window = path.window(99, 50).unwrap();
        assert_eq!(window.len(), 1);

        let mut params = Params::default();
        params.weights.cte = 0.0;
        let solver = solver(params);

        let pose = Pose::new(4.0, 1.0, 0.3);
        let solution = solver
            .solve(&pose, &window, &limits(), &Control::new(3.0, 2.0))
            .unwrap();

        assert_eq!(solution.controls.len(), 1);
        assert!(limits().contains(&solution.first_control()));
        assert!(solution.cost.is_finite());
        assert_dynamics_hold(&solver, &pose, &solution);

        // Sitting on the only reference point, nothing improves on holding the prior control
        let pose = Pose::new(10.0, 0.0, 0.0);
        let solution = solver
            .solve(&pose, &window, &limits(), &Control::new(1.0, 0.0))
            .unwrap();

        assert_eq!(solution.controls, vec![Control::new(1.0, 0.0)]);
        assert_eq!(solution.cost, 0.0);
        assert_eq!(solution.iterations, 0);
        assert_dynamics_hold(&solver, &pose, &solution);
        assert!((solution.states[1].position_m[0] - 10.01).abs() < 1e-12);
    }

    #[test]
    fn test_straight_line_drives_forward() {
        let path = RefPath::new(generators::line(1500, 20.0)).unwrap();
        let window = path.window(0, 50).unwrap();
        let solver = solver(Params::default());

        let pose = path.start_pose();
        let solution = solver
            .solve(&pose, &window, &limits(), &Control::zero())
            .unwrap();

        assert_eq!(solution.controls.len(), 50);
        assert!(solution.first_control().speed_ms > 0.1);
        assert!(solution.first_control().turn_rate_rads.abs() < 1e-6);
        assert!(solution.controls.iter().all(|c| limits().contains(c)));
        assert_dynamics_hold(&solver, &pose, &solution);

        // The end of the horizon has moved along the line
        assert!(solution.states[50].position_m[0] > 0.1);
    }

    #[test]
    fn test_turns_towards_path() {
        // Path on the left of the robot
        let path = RefPath::from_rows(
            &util::maths::linspace(0.0, 5.0, 400),
            &vec![0.5; 400],
        )
        .unwrap();
        let window = path.window(0, 50).unwrap();
        let solver = solver(Params::default());

        let pose = Pose::new(0.0, 0.0, 0.0);
        let solution = solver
            .solve(&pose, &window, &limits(), &Control::new(1.0, 0.0))
            .unwrap();

        assert!(solution.first_control().turn_rate_rads > 0.0);
        assert!(solution.controls.iter().all(|c| limits().contains(c)));
    }

    #[test]
    fn test_long_horizon_converges() {
        // Running flat out along the flank of a long ellipse, slightly outside the path. The
        // window reaches far beyond where the robot can get to, so the cost stays large and the
        // iteration only creeps towards the optimum.
        let path = RefPath::new(generators::ellipse(1500, 14.0, 4.0)).unwrap();
        let window = path.window(180, 50).unwrap();
        let mpc = solver(Params::default());

        let point = path.point(180);
        let pose = Pose::new(point[0], point[1] - 0.03, path.heading_at(180));
        let solution = mpc
            .solve(&pose, &window, &limits(), &Control::new(2.0, 0.1))
            .unwrap();

        assert!(solution.iterations < 200);
        assert!((solution.first_control().speed_ms - 2.0).abs() < 1e-9);
        assert!(solution.first_control().turn_rate_rads > 0.05);
        assert!(solution.first_control().turn_rate_rads < 0.2);
        assert_dynamics_hold(&mpc, &pose, &solution);

        // A tight relative cost tolerance leaves a long tail of tiny improvements
        let mut params = Params::default();
        params.max_iterations = 200;
        params.cost_tol = 1e-9;
        let result = solver(params).solve(&pose, &window, &limits(), &Control::new(2.0, 0.1));
        assert_eq!(result.unwrap_err(), MpcError::NotConverged(200));
    }

    #[test]
    fn test_heading_wraparound() {
        // Heading several turns away from the atan2 range of the reference
        let path = RefPath::new(generators::line(1500, 20.0)).unwrap();
        let window = path.window(0, 50).unwrap();
        let solver = solver(Params::default());

        let pose = Pose::new(0.0, 0.0, 6.0 * PI);
        let solution = solver
            .solve(&pose, &window, &limits(), &Control::new(1.0, 0.0))
            .unwrap();

        assert!(solution.first_control().turn_rate_rads.abs() < 1e-3);
        assert!((solution.states[50].heading_rad - 6.0 * PI).abs() < 1e-2);
    }

    #[test]
    fn test_prior_outside_limits() {
        let path = RefPath::new(generators::circle(500, 5.0)).unwrap();
        let window = path.window(10, 20).unwrap();
        let solver = solver(Params::default());

        let solution = solver
            .solve(
                &path.start_pose(),
                &window,
                &limits(),
                &Control::new(5.0, -3.0),
            )
            .unwrap();

        assert!(solution.controls.iter().all(|c| limits().contains(c)));
    }

    #[test]
    fn test_invalid_inputs() {
        let path = RefPath::new(generators::line(10, 1.0)).unwrap();
        let window = path.window(0, 5).unwrap();
        let solver = solver(Params::default());

        let inverted = ControlLimits {
            v_min: 2.0,
            v_max: 0.0,
            ..limits()
        };
        assert_eq!(
            solver
                .solve(&path.start_pose(), &window, &inverted, &Control::zero())
                .unwrap_err(),
            MpcError::InvalidLimits(inverted)
        );

        assert_eq!(
            solver
                .solve(
                    &Pose::new(std::f64::NAN, 0.0, 0.0),
                    &window,
                    &limits(),
                    &Control::zero()
                )
                .unwrap_err(),
            MpcError::NonFiniteCost
        );

        let mut params = Params::default();
        params.weights.heading = -1.0;
        assert!(MpcSolver::new(UnicycleModel::new(0.01).unwrap(), params).is_err());
    }

    #[test]
    fn test_time_limit() {
        let path = RefPath::new(generators::circle(500, 5.0)).unwrap();
        let window = path.window(0, 50).unwrap();

        let mut params = Params::default();
        params.max_solve_time_s = Some(0.0);
        let solver = solver(params);

        match solver.solve(&path.start_pose(), &window, &limits(), &Control::zero()) {
            Err(MpcError::Timeout(_)) => (),
            r => panic!("Expected timeout, got {:?}", r),
        }
    }

    #[test]
    fn test_iteration_budget() {
        let path = RefPath::new(generators::circle(500, 5.0)).unwrap();
        let window = path.window(0, 50).unwrap();

        let mut params = Params::default();
        params.max_iterations = 0;
        let solver = solver(params);

        assert_eq!(
            solver
                .solve(&path.start_pose(), &window, &limits(), &Control::zero())
                .unwrap_err(),
            MpcError::NotConverged(0)
        );
    }
}
