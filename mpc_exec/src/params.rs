//! # MPC Executable Parameters
//!
//! This module provides parameters for the executables in this crate.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{
    kin_model::{ControlLimits, ModelError, UnicycleModel},
    mpc, rollout,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MpcExecParams {
    /// Timestep of the kinematic model
    pub dt_s: f64,

    /// Limits on the control input
    pub limits: ControlLimits,

    /// Horizon optimiser parameters
    pub mpc: mpc::Params,

    /// Rollout profile used when collecting data
    pub collect: rollout::Params,

    /// Rollout profile used when evaluating a controller
    pub evaluate: rollout::Params,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl MpcExecParams {
    /// Build the kinematic model, checking the timestep and the limits.
    pub fn model(&self) -> Result<UnicycleModel, ModelError> {
        self.limits.validate()?;
        UnicycleModel::new(self.dt_s)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_file() {
        let params: MpcExecParams =
            util::params::from_str(include_str!("../../params/mpc_exec.toml")).unwrap();

        assert!(params.model().is_ok());
        assert_eq!(params.collect, rollout::Params::collection());
        assert_eq!(params.evaluate, rollout::Params::evaluation());
        assert_eq!(params.mpc, mpc::Params::default());
    }
}
