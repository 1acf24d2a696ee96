//! Adaptive damping for the Levenberg-Marquardt iteration

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const DAMPING_FACTOR: f64 = 10.0;
const MIN_DAMPING: f64 = 1e-7;
const MAX_DAMPING: f64 = 1e7;

/// Gain ratio above which a step is considered very good.
const RHO_GOOD: f64 = 0.75;

/// Gain ratio above which a step is considered acceptable.
const RHO_OK: f64 = 0.25;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Damping factor which adapts to the quality of each step.
///
/// The quality of a step is its gain ratio `rho`, the actual reduction in cost divided by the
/// reduction predicted by the linearised model.
#[derive(Debug, Copy, Clone)]
pub(super) struct AdaptiveDamping {
    lambda: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AdaptiveDamping {
    pub fn new(initial: f64) -> Self {
        Self {
            lambda: initial.max(MIN_DAMPING).min(MAX_DAMPING),
        }
    }

    pub fn damping(&self) -> f64 {
        self.lambda
    }

    /// Update the damping after an accepted step with gain ratio `rho`.
    pub fn accept(&mut self, rho: f64) {
        if rho > RHO_GOOD {
            self.lambda = (self.lambda / DAMPING_FACTOR).max(MIN_DAMPING);
        }
        else if rho > RHO_OK {
            self.lambda = (self.lambda / DAMPING_FACTOR.sqrt()).max(MIN_DAMPING);
        }
        else if rho < 0.0 {
            self.reject();
        }
    }

    /// Increase the damping after a rejected step.
    pub fn reject(&mut self) {
        self.lambda = (self.lambda * DAMPING_FACTOR).min(MAX_DAMPING);
    }

    /// Returns `true` once the damping has saturated, meaning no step is making progress.
    pub fn is_saturated(&self) -> bool {
        self.lambda >= MAX_DAMPING * 0.99
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_damping_adapts() {
        let mut damping = AdaptiveDamping::new(1e-3);

        damping.accept(0.9);
        assert!((damping.damping() - 1e-4).abs() < 1e-12);

        // Marginal steps leave it alone
        damping.accept(0.1);
        assert!((damping.damping() - 1e-4).abs() < 1e-12);

        damping.reject();
        assert!((damping.damping() - 1e-3).abs() < 1e-12);

        for _ in 0..20 {
            damping.accept(1.0);
        }
        assert_eq!(damping.damping(), MIN_DAMPING);
        assert!(!damping.is_saturated());

        for _ in 0..20 {
            damping.reject();
        }
        assert!(damping.is_saturated());
    }
}
