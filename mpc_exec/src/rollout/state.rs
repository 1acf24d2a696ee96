//! Rollout engine state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use std::time::Instant;

// Internal
use super::*;
use crate::kin_model::UnicycleModel;
use crate::path::RefPath;
use util::maths::ang_dist;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Changes in coverage smaller than this count as no change when checking for stale coverage.
pub const STALE_COVERAGE_EPSILON: f64 = 1e-7;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Runs a single rollout of a controller along a path.
///
/// The engine borrows the path, which is never modified, and owns the model and controller for
/// the duration of the rollout. All coverage state is local to [`RolloutEngine::run`], so the
/// same path can be used for any number of rollouts.
pub struct RolloutEngine<'p, C> {
    path: &'p RefPath,
    model: UnicycleModel,
    controller: C,
    params: Params,

    /// Maximum number of records this rollout may make, overriding the cap in the parameters.
    record_capacity: Option<usize>,
}

/// Working state of a rollout in progress.
struct RolloutState {
    pose: Pose,
    last_control: Control,
    num_steps: usize,

    /// Furthest arc length reached so far
    best_arc_m: f64,
    coverage: f64,

    /// Number of consecutive steps the coverage hasn't changed for
    stale_count: usize,

    result: RolloutResult,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'p, C: Controller> RolloutEngine<'p, C> {
    /// Create a new engine, validating the parameters.
    pub fn new(
        path: &'p RefPath,
        model: UnicycleModel,
        controller: C,
        params: Params,
    ) -> Result<Self, RolloutError> {
        params.validate()?;

        let record_capacity = params.replay_buffer_cap;

        Ok(Self {
            path,
            model,
            controller,
            params,
            record_capacity,
        })
    }

    /// Limit the number of records this rollout may make.
    ///
    /// Used to share a single replay buffer between several rollouts.
    pub fn with_record_capacity(mut self, capacity: usize) -> Self {
        self.record_capacity = Some(match self.record_capacity {
            Some(c) => c.min(capacity),
            None => capacity,
        });
        self
    }

    /// Run the rollout to completion.
    pub fn run(mut self) -> Result<RolloutResult, RolloutError> {
        let max_steps = self.params.step_limit.for_path(self.path.num_points());
        let total_arc_m = self.path.total_arc_length();

        let start_pose = self.path.start_pose();
        let mut state = RolloutState {
            pose: start_pose,
            last_control: Control::zero(),
            num_steps: 0,
            best_arc_m: 0.0,
            coverage: 0.0,
            stale_count: 0,
            result: RolloutResult {
                reason: TerminationReason::StepLimit,
                trajectory: vec![start_pose],
                observations: Vec::new(),
                controls: Vec::new(),
                coverage_trace: Vec::new(),
                diagnostics: if self.params.track_errors {
                    Some(Diagnostics::default())
                }
                else {
                    None
                },
                coverage: 0.0,
                num_steps: 0,
                error: None,
            },
        };

        let reason = loop {
            // ---- COVERAGE ----

            let (dist_m, index) = self.path.nearest_index(&state.pose.position_m);

            state.best_arc_m = state.best_arc_m.max(self.path.arc_length(index));
            let previous_coverage = state.coverage;
            state.coverage = if total_arc_m > 0.0 {
                (state.best_arc_m / total_arc_m).min(1.0)
            }
            else {
                1.0
            };
            state.result.coverage_trace.push(state.coverage);

            trace!(
                "Step {}: nearest {} at {:.3} m, coverage {:.4}",
                state.num_steps,
                index,
                dist_m,
                state.coverage
            );

            // ---- TERMINATION CHECKS ----

            if let Some(limit) = self.params.stale_coverage_steps {
                if (state.coverage - previous_coverage).abs() < STALE_COVERAGE_EPSILON {
                    state.stale_count += 1;
                    if state.stale_count > limit {
                        break TerminationReason::Stalled;
                    }
                }
                else {
                    state.stale_count = 0;
                }
            }

            if dist_m > self.params.off_track_distance_m {
                break TerminationReason::OffTrack;
            }

            if state.coverage >= self.params.coverage_threshold {
                break TerminationReason::Covered;
            }

            if state.num_steps >= max_steps {
                break TerminationReason::StepLimit;
            }

            if self.is_buffer_full(&state) {
                break TerminationReason::BufferFull;
            }

            // ---- CONTROL ----

            let window = self.path.window(index, self.params.horizon_steps)?;
            let input = ControllerInput::new(state.pose, window, state.last_control);

            let start_time = Instant::now();
            let control = match self.controller.control(&input) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Controller failed at step {}: {}", state.num_steps, e);
                    state.result.error = Some(e);
                    break TerminationReason::SolveFailed;
                }
            };
            let controller_time_s = start_time.elapsed().as_secs_f64();

            // ---- RECORDING ----

            if let Some(decimation) = self.params.decimation {
                if state.num_steps % decimation == 0 && !self.is_buffer_full(&state) {
                    state.result.observations.push(input.observation);
                    state.result.controls.push(control);
                }
            }

            // ---- ADVANCE ----

            state.pose = self.model.step(&state.pose, &control);
            state.result.trajectory.push(state.pose);
            state.last_control = control;
            state.num_steps += 1;

            if let Some(ref mut diag) = state.result.diagnostics {
                let reference = window.first();
                diag.cte_m
                    .push((state.pose.position_m - reference.position_m).norm());
                diag.yaw_error_rad
                    .push(ang_dist(reference.heading_rad, state.pose.heading_rad).abs());
                diag.controller_time_s.push(controller_time_s);
            }
        };

        debug!(
            "Rollout finished: {} after {} steps, coverage {:.3}, {} records",
            reason,
            state.num_steps,
            state.coverage,
            state.result.observations.len()
        );

        let mut result = state.result;
        result.reason = reason;
        result.coverage = state.coverage;
        result.num_steps = state.num_steps;

        Ok(result)
    }

    /// Returns `true` if recording and no more records can be made.
    fn is_buffer_full(&self, state: &RolloutState) -> bool {
        match (self.params.decimation, self.record_capacity) {
            (Some(_), Some(cap)) => state.result.observations.len() >= cap,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
