//! # Kinematic model
//!
//! Discrete unicycle kinematics. The robot state is a planar [`Pose`] and it is driven by a
//! [`Control`] made of a forward speed and a turn rate, integrated with a single forward Euler
//! step of fixed length:
//!
//! ```text
//! x' = x + v cos(theta) dt
//! y' = y + v sin(theta) dt
//! theta' = theta + omega dt
//! ```
//!
//! There is no saturation or noise in the model, limits on the control are the responsibility of
//! whoever produces it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Planar pose of the robot.
///
/// The heading is not normalised into any range, so any difference of headings must account for
/// wrapping.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// Position in the path frame
    pub position_m: Vector2<f64>,

    /// Heading, angle to the positive x axis
    pub heading_rad: f64,
}

/// Control input to the unicycle.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Control {
    /// Forward speed
    pub speed_ms: f64,

    /// Turn rate, positive anticlockwise
    pub turn_rate_rads: f64,
}

/// Box limits on the control input.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    pub v_min: f64,
    pub v_max: f64,
    pub omega_min: f64,
    pub omega_max: f64,
}

/// Discrete unicycle model with a fixed timestep.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnicycleModel {
    dt_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("The model timestep must be finite and positive, got {0}")]
    InvalidTimestep(f64),

    #[error("Invalid control limits: {0:?}")]
    InvalidLimits(ControlLimits),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad,
        }
    }
}

impl Control {
    pub fn new(speed_ms: f64, turn_rate_rads: f64) -> Self {
        Self {
            speed_ms,
            turn_rate_rads,
        }
    }

    /// The stopped control, used as the prior before any control has been applied.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_vector(vector: &Vector2<f64>) -> Self {
        Self::new(vector[0], vector[1])
    }
}

impl ControlLimits {
    /// Check that both ranges are finite and not inverted.
    pub fn validate(&self) -> Result<(), ModelError> {
        let finite = self.v_min.is_finite()
            && self.v_max.is_finite()
            && self.omega_min.is_finite()
            && self.omega_max.is_finite();

        if finite && self.v_min <= self.v_max && self.omega_min <= self.omega_max {
            Ok(())
        } else {
            Err(ModelError::InvalidLimits(*self))
        }
    }

    /// Saturate the control into the box.
    pub fn clamp(&self, control: &Control) -> Control {
        Control {
            speed_ms: control.speed_ms.max(self.v_min).min(self.v_max),
            turn_rate_rads: control.turn_rate_rads.max(self.omega_min).min(self.omega_max),
        }
    }

    /// Returns `true` if the control is within the box, bounds included.
    pub fn contains(&self, control: &Control) -> bool {
        control.speed_ms >= self.v_min
            && control.speed_ms <= self.v_max
            && control.turn_rate_rads >= self.omega_min
            && control.turn_rate_rads <= self.omega_max
    }
}

impl UnicycleModel {
    /// Create a new model with the given timestep.
    pub fn new(dt_s: f64) -> Result<Self, ModelError> {
        if dt_s.is_finite() && dt_s > 0.0 {
            Ok(Self { dt_s })
        } else {
            Err(ModelError::InvalidTimestep(dt_s))
        }
    }

    pub fn dt_s(&self) -> f64 {
        self.dt_s
    }

    /// Advance the pose by one timestep under the given control.
    pub fn step(&self, pose: &Pose, control: &Control) -> Pose {
        let (sin, cos) = pose.heading_rad.sin_cos();

        Pose {
            position_m: Vector2::new(
                pose.position_m[0] + control.speed_ms * cos * self.dt_s,
                pose.position_m[1] + control.speed_ms * sin * self.dt_s,
            ),
            heading_rad: pose.heading_rad + control.turn_rate_rads * self.dt_s,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_zero_control_is_noop() {
        let poses = [
            Pose::new(0.0, 0.0, 0.0),
            Pose::new(-3.2, 7.9, 1.3),
            Pose::new(1e6, -1e-6, -12.0 * PI),
        ];

        for dt in [1e-4, 0.01, 0.1, 2.5].iter() {
            let model = UnicycleModel::new(*dt).unwrap();
            for pose in poses.iter() {
                assert_eq!(model.step(pose, &Control::zero()), *pose);
            }
        }
    }

    #[test]
    fn test_straight_and_turn() {
        let model = UnicycleModel::new(0.1).unwrap();

        // Straight along +y
        let pose = model.step(&Pose::new(1.0, 2.0, FRAC_PI_2), &Control::new(2.0, 0.0));
        assert!((pose.position_m[0] - 1.0).abs() < 1e-12);
        assert!((pose.position_m[1] - 2.2).abs() < 1e-12);
        assert_eq!(pose.heading_rad, FRAC_PI_2);

        // Heading is integrated after position, so the position uses the old heading
        let pose = model.step(&Pose::new(0.0, 0.0, 0.0), &Control::new(1.0, 3.0));
        assert!((pose.position_m[0] - 0.1).abs() < 1e-12);
        assert_eq!(pose.position_m[1], 0.0);
        assert!((pose.heading_rad - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_heading_not_wrapped() {
        let model = UnicycleModel::new(1.0).unwrap();
        let mut pose = Pose::new(0.0, 0.0, 0.0);

        for _ in 0..10 {
            pose = model.step(&pose, &Control::new(0.0, 1.0));
        }

        assert!((pose.heading_rad - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_timestep() {
        assert_eq!(UnicycleModel::new(0.0), Err(ModelError::InvalidTimestep(0.0)));
        assert!(UnicycleModel::new(-0.1).is_err());
        assert!(UnicycleModel::new(std::f64::NAN).is_err());
    }

    #[test]
    fn test_limits() {
        let limits = ControlLimits {
            v_min: 0.0,
            v_max: 2.0,
            omega_min: -1.5,
            omega_max: 1.5,
        };
        assert!(limits.validate().is_ok());

        let clamped = limits.clamp(&Control::new(3.0, -4.0));
        assert_eq!(clamped, Control::new(2.0, -1.5));
        assert!(limits.contains(&clamped));
        assert!(!limits.contains(&Control::new(-0.1, 0.0)));

        let inverted = ControlLimits { v_min: 1.0, v_max: 0.0, ..limits };
        assert!(inverted.validate().is_err());
    }
}
