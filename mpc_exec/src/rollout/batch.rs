//! Batch driver, runs rollouts over a sequence of paths
//!
//! Paths are processed strictly in order and their records appended to a single dataset, so the
//! order of the dataset matches the order of the paths. When recording, the replay buffer cap in
//! the parameters applies to the whole batch: no new path is started once it is full and each
//! rollout is only allowed the capacity that remains.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::Vector2;
use ndarray::Array2;
use serde::Serialize;

// Internal
use super::*;
use crate::kin_model::UnicycleModel;
use crate::path::{generators::PathSpec, RefPath};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A named producer of path points.
pub struct NamedPath {
    pub name: String,
    producer: Box<dyn Fn() -> Vec<Vector2<f64>>>,
}

/// Observation/control pairs recorded over a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dataset {
    pub observations: Vec<Observation>,
    pub controls: Vec<Control>,
}

/// A single row of the dataset, flattened for archiving.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct DatasetRecord {
    pub x_m: f64,
    pub y_m: f64,
    pub theta_rad: f64,
    pub x_ref_m: f64,
    pub y_ref_m: f64,
    pub theta_ref_rad: f64,
    pub v_ms: f64,
    pub omega_rads: f64,
}

/// Summary of the rollout on one path.
#[derive(Debug, Clone, Serialize)]
pub struct PathSummary {
    pub name: String,
    pub reason: TerminationReason,
    pub coverage: f64,
    pub num_steps: usize,
    pub num_records: usize,

    /// Description of the failure if the rollout was aborted
    pub error: Option<String>,
}

/// Trajectory driven along one path.
#[derive(Debug, Clone, Serialize)]
pub struct PathTrajectory {
    pub name: String,
    pub trajectory: Vec<Pose>,
}

/// Everything produced by a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutput {
    pub dataset: Dataset,
    pub summaries: Vec<PathSummary>,
    pub trajectories: Vec<PathTrajectory>,

    /// Number of paths not attempted because the replay buffer was full
    pub num_skipped: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Path \"{name}\" is invalid: {source}")]
    InvalidPath { name: String, source: PathError },

    #[error("Invalid rollout parameters: {0}")]
    InvalidParams(RolloutError),

    #[error("Could not run the rollout on path \"{name}\": {source}")]
    RolloutFailed { name: String, source: RolloutError },
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Run a rollout on each path in turn.
///
/// Rollouts which abort, for instance because the controller failed, only end their own path.
/// An invalid path aborts the whole batch.
pub fn run_batch<C: Controller>(
    paths: &[NamedPath],
    model: UnicycleModel,
    controller: &mut C,
    params: &Params,
) -> Result<BatchOutput, BatchError> {
    params.validate().map_err(BatchError::InvalidParams)?;

    let mut output = BatchOutput::default();
    let global_cap = if params.is_recording() {
        params.replay_buffer_cap
    }
    else {
        None
    };

    for (i, named) in paths.iter().enumerate() {
        // Stop once the buffer is full
        if let Some(cap) = global_cap {
            if output.dataset.len() >= cap {
                output.num_skipped = paths.len() - i;
                info!(
                    "Replay buffer limit reached, skipping the remaining {} paths",
                    output.num_skipped
                );
                break;
            }
        }

        info!("Running path {}/{}: {}", i + 1, paths.len(), named.name);

        let path = RefPath::new(named.produce()).map_err(|e| BatchError::InvalidPath {
            name: named.name.clone(),
            source: e,
        })?;

        let mut engine = RolloutEngine::new(&path, model, &mut *controller, params.clone())
            .map_err(|e| BatchError::RolloutFailed {
                name: named.name.clone(),
                source: e,
            })?;

        if let Some(cap) = global_cap {
            engine = engine.with_record_capacity(cap - output.dataset.len());
        }

        let result = engine.run().map_err(|e| BatchError::RolloutFailed {
            name: named.name.clone(),
            source: e,
        })?;

        let summary = PathSummary {
            name: named.name.clone(),
            reason: result.reason,
            coverage: result.coverage,
            num_steps: result.num_steps,
            num_records: result.num_records(),
            error: result.error.as_ref().map(|e| e.to_string()),
        };

        output.dataset.observations.extend(result.observations);
        output.dataset.controls.extend(result.controls);

        if result.reason.is_abort() {
            warn!(
                "    {}: aborted ({}) after {} steps, coverage {:.2}",
                summary.name,
                summary.error.as_deref().unwrap_or("unknown error"),
                summary.num_steps,
                summary.coverage
            );
        }
        else {
            info!(
                "    {}: {}, coverage {:.2}, steps {}, data so far {}",
                summary.name,
                summary.reason,
                summary.coverage,
                summary.num_steps,
                output.dataset.len()
            );
        }

        output.trajectories.push(PathTrajectory {
            name: named.name.clone(),
            trajectory: result.trajectory,
        });
        output.summaries.push(summary);
    }

    Ok(output)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NamedPath {
    pub fn new<S, F>(name: S, producer: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Vec<Vector2<f64>> + 'static,
    {
        Self {
            name: name.into(),
            producer: Box::new(producer),
        }
    }

    /// Produce the points of the path.
    pub fn produce(&self) -> Vec<Vector2<f64>> {
        (self.producer)()
    }
}

impl From<PathSpec> for NamedPath {
    fn from(spec: PathSpec) -> Self {
        Self::new(spec.to_string(), move || spec.points())
    }
}

impl std::fmt::Debug for NamedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedPath").field("name", &self.name).finish()
    }
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// The observations as an `N x 6` matrix.
    pub fn observation_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), 6), |(i, j)| self.observations[i][j])
    }

    /// Iterate over the observation/control pairs as flat records.
    pub fn records(&self) -> impl Iterator<Item = DatasetRecord> + '_ {
        self.observations
            .iter()
            .zip(self.controls.iter())
            .map(|(obs, ctrl)| DatasetRecord {
                x_m: obs[0],
                y_m: obs[1],
                theta_rad: obs[2],
                x_ref_m: obs[3],
                y_ref_m: obs[4],
                theta_ref_rad: obs[5],
                v_ms: ctrl.speed_ms,
                omega_rads: ctrl.turn_rate_rads,
            })
    }

    /// The controls as an `N x 2` matrix of `(v, omega)` rows.
    pub fn control_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.controls.len(), 2), |(i, j)| match j {
            0 => self.controls[i].speed_ms,
            _ => self.controls[i].turn_rate_rads,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::path::generators;

    fn model() -> UnicycleModel {
        UnicycleModel::new(0.01).unwrap()
    }

    fn params() -> Params {
        Params {
            horizon_steps: 50,
            coverage_threshold: 0.95,
            off_track_distance_m: 2.0,
            step_limit: StepLimit::PerPathPoint(2.0),
            stale_coverage_steps: None,
            decimation: Some(5),
            replay_buffer_cap: Some(10_000),
            track_errors: false,
        }
    }

    fn lines(n: usize) -> Vec<NamedPath> {
        (0..n)
            .map(|i| NamedPath::new(format!("Line {}", i), || generators::line(500, 5.0)))
            .collect()
    }

    fn forward() -> PolicyController<impl FnMut(&Observation) -> Vector2<f64>> {
        PolicyController::new(|_: &Observation| Vector2::new(1.0, 0.0))
    }

    /// Fails on its first call only.
    struct FailFirst {
        calls: usize,
    }

    impl Controller for FailFirst {
        fn control(&mut self, _: &ControllerInput) -> Result<Control, ControllerError> {
            self.calls += 1;
            if self.calls == 1 {
                Err(ControllerError::NonFiniteControl(Control::new(std::f64::NAN, 0.0)))
            }
            else {
                Ok(Control::new(1.0, 0.0))
            }
        }
    }

    #[test]
    fn test_batch_concatenates() {
        let output = run_batch(&lines(3), model(), &mut forward(), &params()).unwrap();

        assert_eq!(output.summaries.len(), 3);
        assert_eq!(output.trajectories.len(), 3);
        assert_eq!(output.num_skipped, 0);

        let total: usize = output.summaries.iter().map(|s| s.num_records).sum();
        assert_eq!(output.dataset.len(), total);
        assert_eq!(output.dataset.controls.len(), total);

        for summary in output.summaries.iter() {
            assert_eq!(summary.reason, TerminationReason::Covered);
            assert_eq!(summary.num_records, (summary.num_steps + 4) / 5);
        }

        let obs = output.dataset.observation_matrix();
        let ctrl = output.dataset.control_matrix();
        assert_eq!(obs.shape(), &[total, 6]);
        assert_eq!(ctrl.shape(), &[total, 2]);
        assert_eq!(ctrl[[0, 0]], 1.0);
        assert_eq!(obs[[0, 0]], 0.0);

        let records: Vec<DatasetRecord> = output.dataset.records().collect();
        assert_eq!(records.len(), total);
        assert_eq!(records[1].x_m, obs[[1, 0]]);
        assert_eq!(records[1].v_ms, 1.0);
        assert_eq!(records[1].omega_rads, 0.0);
    }

    #[test]
    fn test_batch_continues_after_failure() {
        let mut controller = FailFirst { calls: 0 };
        let output = run_batch(&lines(2), model(), &mut controller, &params()).unwrap();

        assert_eq!(output.summaries.len(), 2);
        assert_eq!(output.summaries[0].reason, TerminationReason::SolveFailed);
        assert_eq!(output.summaries[0].num_steps, 0);
        assert!(output.summaries[0].error.is_some());
        assert_eq!(output.summaries[1].reason, TerminationReason::Covered);
    }

    #[test]
    fn test_batch_aborts_on_invalid_path() {
        let mut paths = lines(1);
        paths.push(NamedPath::new("Single point", || vec![Vector2::new(0.0, 0.0)]));
        paths.extend(lines(1));

        match run_batch(&paths, model(), &mut forward(), &params()) {
            Err(BatchError::InvalidPath { name, source }) => {
                assert_eq!(name, "Single point");
                assert_eq!(source, PathError::InvalidPath(1));
            }
            r => panic!("Expected InvalidPath, got {:?}", r),
        }
    }

    #[test]
    fn test_batch_stops_at_cap() {
        let mut params = params();
        params.decimation = Some(1);
        params.replay_buffer_cap = Some(150);

        let output = run_batch(&lines(3), model(), &mut forward(), &params).unwrap();

        assert_eq!(output.dataset.len(), 150);
        assert_eq!(output.summaries.len(), 1);
        assert_eq!(output.summaries[0].reason, TerminationReason::BufferFull);
        assert_eq!(output.num_skipped, 2);

        // The cap is shared, so a second path only gets what the first left behind
        params.replay_buffer_cap = Some(600);
        let output = run_batch(&lines(3), model(), &mut forward(), &params).unwrap();

        assert_eq!(output.dataset.len(), 600);
        assert_eq!(output.summaries[0].reason, TerminationReason::Covered);
        assert_eq!(output.summaries[1].reason, TerminationReason::BufferFull);
        assert_eq!(
            output.summaries[0].num_records + output.summaries[1].num_records,
            600
        );
        assert_eq!(output.num_skipped, 1);
    }

    #[test]
    fn test_training_paths_convert() {
        let paths: Vec<NamedPath> = generators::training_paths()
            .into_iter()
            .map(NamedPath::from)
            .collect();

        assert_eq!(paths[0].name, "Line length=10");
        assert_eq!(paths[0].produce().len(), generators::TRAINING_PATH_POINTS);
    }
}
