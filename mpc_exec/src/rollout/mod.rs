//! # Rollout module
//!
//! A rollout drives the robot along a single reference path, from the path's first point, until
//! it has covered enough of the path or something stops it. Each step:
//!
//! 1. Finds the path point nearest the robot and updates the coverage, the fraction of the path's
//!    arc length up to the furthest point reached so far.
//! 2. Checks, in order, for stale coverage, leaving the track, covering the path, running out of
//!    steps and filling the replay buffer, any of which ends the rollout.
//! 3. Asks the controller for a control given a window of the path starting at the nearest point.
//! 4. Optionally records the observation and control, then advances the robot with the model.
//!
//! Coverage is tracked against the furthest point reached rather than the current nearest point,
//! so doubling back along a closed or self-intersecting path never loses progress.
//!
//! The [`batch`] driver runs rollouts over a sequence of paths while sharing a single replay
//! buffer between them.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod batch;
pub mod controller;
pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
pub use batch::*;
pub use controller::*;
pub use params::{Params, StepLimit};
pub use state::*;

use crate::kin_model::{Control, Pose};
use crate::path::PathError;
use util::maths::mean;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The full record of a finished rollout.
#[derive(Debug, Clone, Serialize)]
pub struct RolloutResult {
    /// Why the rollout ended
    pub reason: TerminationReason,

    /// Every pose visited, starting with the initial pose
    pub trajectory: Vec<Pose>,

    /// Recorded observations, empty unless recording
    pub observations: Vec<Observation>,

    /// Controls applied at the recorded observations
    pub controls: Vec<Control>,

    /// Coverage computed at the start of each step
    pub coverage_trace: Vec<f64>,

    /// Per-step errors, only present when tracking errors
    pub diagnostics: Option<Diagnostics>,

    /// Coverage when the rollout ended
    pub coverage: f64,

    /// Number of controls applied
    pub num_steps: usize,

    /// The failure which aborted the rollout, if any
    #[serde(skip)]
    pub error: Option<ControllerError>,
}

/// Per-step tracking errors measured after each control is applied.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// Distance from the new position to the reference point the control was chosen for
    pub cte_m: Vec<f64>,

    /// Absolute wrapped heading error to the same reference point
    pub yaw_error_rad: Vec<f64>,

    /// Wall clock time spent in the controller
    pub controller_time_s: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reason a rollout stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    /// Coverage reached the threshold
    Covered,

    /// The robot was too far from the path
    OffTrack,

    /// Coverage stopped changing
    Stalled,

    /// The controller failed to produce a control
    SolveFailed,

    /// The step limit was reached
    StepLimit,

    /// The replay buffer is full
    BufferFull,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RolloutError {
    #[error("The coverage threshold must be in (0, 1], got {0}")]
    InvalidCoverageThreshold(f64),

    #[error("The off track distance must be finite and positive, got {0}")]
    InvalidOffTrackDistance(f64),

    #[error("The step limit multiplier must be finite and non-negative, got {0}")]
    InvalidStepLimit(f64),

    #[error("The horizon must contain at least one step")]
    ZeroHorizon,

    #[error("The decimation must be at least 1")]
    ZeroDecimation,

    #[error("Path error: {0}")]
    PathError(#[from] PathError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TerminationReason {
    /// Returns `true` if the rollout was aborted by a failure rather than ending normally.
    pub fn is_abort(&self) -> bool {
        matches!(self, TerminationReason::SolveFailed)
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminationReason::Covered => "COVERED",
            TerminationReason::OffTrack => "OFF_TRACK",
            TerminationReason::Stalled => "STALLED",
            TerminationReason::SolveFailed => "SOLVE_FAILED",
            TerminationReason::StepLimit => "STEP_LIMIT",
            TerminationReason::BufferFull => "BUFFER_FULL",
        };

        write!(f, "{}", s)
    }
}

impl RolloutResult {
    pub fn is_abort(&self) -> bool {
        self.reason.is_abort()
    }

    pub fn num_records(&self) -> usize {
        self.observations.len()
    }
}

impl Diagnostics {
    pub fn mean_cte_m(&self) -> Option<f64> {
        mean(&self.cte_m)
    }

    pub fn mean_yaw_error_rad(&self) -> Option<f64> {
        mean(&self.yaw_error_rad)
    }

    pub fn mean_controller_time_s(&self) -> Option<f64> {
        mean(&self.controller_time_s)
    }
}
