//! MPC solver parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the horizon optimiser
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct Params {
    /// Weights on each term of the objective
    pub weights: Weights,

    /// Maximum number of Levenberg-Marquardt iterations before the solve is failed.
    pub max_iterations: usize,

    /// Convergence threshold on the infinity norm of the projected gradient, relative to
    /// `1 + cost`.
    pub gradient_tol: f64,

    /// Convergence threshold on the relative reduction in cost over an accepted step.
    pub cost_tol: f64,

    /// Convergence threshold on the step length relative to the norm of the controls.
    pub step_tol: f64,

    /// Initial damping factor
    pub initial_damping: f64,

    /// Optional wall clock limit on a single solve. Exceeding it fails the solve.
    pub max_solve_time_s: Option<f64>,
}

/// Objective weights.
///
/// Tracking (`cte`) dominates by default.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct Weights {
    /// Change in speed between consecutive steps
    pub v_smooth: f64,

    /// Change in turn rate between consecutive steps
    pub omega_smooth: f64,

    /// Squared distance to the reference point
    pub cte: f64,

    /// Squared heading error
    pub heading: f64,

    /// Squared lateral acceleration, `v * omega`
    pub lateral_acc: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            max_iterations: 10_000,
            gradient_tol: 1e-8,
            cost_tol: 1e-6,
            step_tol: 1e-9,
            initial_damping: 1e-3,
            max_solve_time_s: None,
        }
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            v_smooth: 500.0,
            omega_smooth: 500.0,
            cte: 40000.0,
            heading: 300.0,
            lateral_acc: 100.0,
        }
    }
}

impl Weights {
    /// Returns `true` if every weight is finite and non-negative.
    pub fn is_valid(&self) -> bool {
        [
            self.v_smooth,
            self.omega_smooth,
            self.cte,
            self.heading,
            self.lateral_acc,
        ]
        .iter()
        .all(|w| w.is_finite() && *w >= 0.0)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
