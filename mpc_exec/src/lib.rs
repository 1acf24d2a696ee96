//! # MPC path tracking library.
//!
//! This library provides the pieces used by the executables in this crate to drive a simulated
//! unicycle robot along reference paths, either with the receding horizon optimiser or with an
//! external policy, and to record the resulting observation/control pairs.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Kinematic model - discrete unicycle dynamics
pub mod kin_model;

/// Horizon optimiser - solves the MPC problem over a window of the path
pub mod mpc;

/// Executable parameters - the contents of `mpc_exec.toml`
pub mod params;

/// Reference paths - spatial index, arc length and heading of a path, plus path generators
pub mod path;

/// Rollouts - drives a controller along a path and records the result
pub mod rollout;
