//! Controllers which can drive a rollout
//!
//! The engine doesn't care where its controls come from, only that something implementing
//! [`Controller`] can turn the current pose and reference into a control. Two are provided:
//!
//! - [`MpcController`], which solves the horizon problem each step and can fail.
//! - [`PolicyController`], which wraps an opaque [`Policy`] mapping the 6 element observation to a
//!   control, such as a learned network.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Vector2, Vector6};

// Internal
use crate::kin_model::{Control, ControlLimits, Pose};
use crate::mpc::{MpcError, MpcSolver};
use crate::path::RefWindow;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Observation given to a policy, `(x, y, theta, x_ref, y_ref, theta_ref)`.
///
/// The first three elements are the robot's pose before the step, the last three the first column
/// of the reference window.
pub type Observation = Vector6<f64>;

/// Everything a controller may use to choose a control.
#[derive(Debug, Copy, Clone)]
pub struct ControllerInput<'a> {
    pub pose: Pose,
    pub window: RefWindow<'a>,

    /// The control applied on the previous step, zero before the first step
    pub last_control: Control,

    pub observation: Observation,
}

/// Controller which solves the horizon problem each step.
#[derive(Debug, Clone)]
pub struct MpcController {
    solver: MpcSolver,
    limits: ControlLimits,
}

/// Controller which asks a policy for the control.
pub struct PolicyController<P> {
    policy: P,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ControllerError {
    #[error("The horizon optimiser failed: {0}")]
    SolveFailed(#[from] MpcError),

    #[error("The policy produced a non-finite control: {0:?}")]
    NonFiniteControl(Control),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Something which chooses the control to apply on each step of a rollout.
pub trait Controller {
    fn control(&mut self, input: &ControllerInput) -> Result<Control, ControllerError>;
}

/// A mapping from an observation to a `(v, omega)` control.
///
/// Implemented for any `FnMut(&Observation) -> Vector2<f64>`.
pub trait Policy {
    fn act(&mut self, observation: &Observation) -> Vector2<f64>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> ControllerInput<'a> {
    /// Build the input for the given pose and window, forming the observation from the pose and
    /// the first column of the window.
    pub fn new(pose: Pose, window: RefWindow<'a>, last_control: Control) -> Self {
        let reference = window.first();

        Self {
            pose,
            window,
            last_control,
            observation: Vector6::new(
                pose.position_m[0],
                pose.position_m[1],
                pose.heading_rad,
                reference.position_m[0],
                reference.position_m[1],
                reference.heading_rad,
            ),
        }
    }
}

impl MpcController {
    pub fn new(solver: MpcSolver, limits: ControlLimits) -> Self {
        Self { solver, limits }
    }

    pub fn limits(&self) -> &ControlLimits {
        &self.limits
    }
}

impl Controller for MpcController {
    fn control(&mut self, input: &ControllerInput) -> Result<Control, ControllerError> {
        let solution =
            self.solver
                .solve(&input.pose, &input.window, &self.limits, &input.last_control)?;

        Ok(solution.first_control())
    }
}

impl<P: Policy> PolicyController<P> {
    pub fn new(policy: P) -> Self {
        Self { policy }
    }
}

impl<P: Policy> Controller for PolicyController<P> {
    fn control(&mut self, input: &ControllerInput) -> Result<Control, ControllerError> {
        let control = Control::from_vector(&self.policy.act(&input.observation));

        if control.speed_ms.is_finite() && control.turn_rate_rads.is_finite() {
            Ok(control)
        }
        else {
            Err(ControllerError::NonFiniteControl(control))
        }
    }
}

impl<F> Policy for F
where
    F: FnMut(&Observation) -> Vector2<f64>,
{
    fn act(&mut self, observation: &Observation) -> Vector2<f64> {
        self(observation)
    }
}

impl<C: Controller + ?Sized> Controller for &mut C {
    fn control(&mut self, input: &ControllerInput) -> Result<Control, ControllerError> {
        (**self).control(input)
    }
}

impl<C: Controller + ?Sized> Controller for Box<C> {
    fn control(&mut self, input: &ControllerInput) -> Result<Control, ControllerError> {
        (**self).control(input)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
