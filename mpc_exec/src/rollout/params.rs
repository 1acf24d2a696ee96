//! Rollout parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use super::RolloutError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for a single rollout
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Params {
    /// Number of reference points given to the controller each step.
    pub horizon_steps: usize,

    /// Fraction of the path's arc length at which the path is considered covered, in (0, 1].
    pub coverage_threshold: f64,

    /// Distance from the nearest path point above which the rollout is abandoned.
    pub off_track_distance_m: f64,

    /// Upper bound on the number of steps.
    pub step_limit: StepLimit,

    /// If set the rollout is stalled once coverage hasn't changed for more than this many
    /// consecutive steps.
    pub stale_coverage_steps: Option<usize>,

    /// If set, record the observation and control every `decimation` steps.
    pub decimation: Option<usize>,

    /// Maximum number of records to hold. Only meaningful when recording.
    pub replay_buffer_cap: Option<usize>,

    /// Compute per-step tracking errors and controller timings.
    pub track_errors: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Upper bound on the number of steps in a rollout.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StepLimit {
    /// A fixed number of steps
    Fixed(usize),

    /// A multiple of the number of points in the path
    PerPathPoint(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Profile used when collecting training data: near complete coverage, up to three passes
    /// worth of steps and every 5th step recorded.
    pub fn collection() -> Self {
        Self {
            horizon_steps: 50,
            coverage_threshold: 0.99,
            off_track_distance_m: 2.0,
            step_limit: StepLimit::PerPathPoint(3.0),
            stale_coverage_steps: None,
            decimation: Some(5),
            replay_buffer_cap: Some(300_000),
            track_errors: false,
        }
    }

    /// Profile used when evaluating a controller: 95% coverage within two passes worth of steps,
    /// nothing recorded and errors tracked.
    pub fn evaluation() -> Self {
        Self {
            horizon_steps: 50,
            coverage_threshold: 0.95,
            off_track_distance_m: 2.0,
            step_limit: StepLimit::PerPathPoint(2.0),
            stale_coverage_steps: None,
            decimation: None,
            replay_buffer_cap: None,
            track_errors: true,
        }
    }

    /// Returns `true` if the rollout records observations.
    pub fn is_recording(&self) -> bool {
        self.decimation.is_some()
    }

    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), RolloutError> {
        if !(self.coverage_threshold > 0.0 && self.coverage_threshold <= 1.0) {
            return Err(RolloutError::InvalidCoverageThreshold(self.coverage_threshold));
        }

        if !(self.off_track_distance_m.is_finite() && self.off_track_distance_m > 0.0) {
            return Err(RolloutError::InvalidOffTrackDistance(self.off_track_distance_m));
        }

        if self.horizon_steps == 0 {
            return Err(RolloutError::ZeroHorizon);
        }

        if self.decimation == Some(0) {
            return Err(RolloutError::ZeroDecimation);
        }

        if let StepLimit::PerPathPoint(m) = self.step_limit {
            if !(m.is_finite() && m >= 0.0) {
                return Err(RolloutError::InvalidStepLimit(m));
            }
        }

        Ok(())
    }
}

impl StepLimit {
    /// The step limit for a path with the given number of points.
    pub fn for_path(&self, num_points: usize) -> usize {
        match *self {
            StepLimit::Fixed(n) => n,
            StepLimit::PerPathPoint(m) => (m * num_points as f64).floor() as usize,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_presets_valid() {
        assert!(Params::collection().validate().is_ok());
        assert!(Params::evaluation().validate().is_ok());
        assert!(Params::collection().is_recording());
        assert!(!Params::evaluation().is_recording());
    }

    #[test]
    fn test_invalid() {
        let mut params = Params::evaluation();
        params.coverage_threshold = 0.0;
        assert_eq!(
            params.validate(),
            Err(RolloutError::InvalidCoverageThreshold(0.0))
        );

        let mut params = Params::evaluation();
        params.decimation = Some(0);
        assert_eq!(params.validate(), Err(RolloutError::ZeroDecimation));

        let mut params = Params::evaluation();
        params.off_track_distance_m = -1.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_step_limit() {
        assert_eq!(StepLimit::Fixed(10).for_path(1500), 10);
        assert_eq!(StepLimit::PerPathPoint(3.0).for_path(1500), 4500);
        assert_eq!(StepLimit::PerPathPoint(0.5).for_path(5), 2);
    }

    #[test]
    fn test_from_toml() {
        let params: Params = util::params::from_str(
            r#"
            horizon_steps = 50
            coverage_threshold = 0.99
            off_track_distance_m = 2.0
            step_limit = { per_path_point = 3.0 }
            decimation = 5
            replay_buffer_cap = 300000
            track_errors = false
            "#,
        )
        .unwrap();

        assert_eq!(params, Params::collection());
    }
}
