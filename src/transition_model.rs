use std::ops::Deref;

use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};

use crate::error::{ConfigError, Result};
use crate::stats;

/// States within this distance of the track boundary already count as off the track.
pub const TERMINAL_TOLERANCE: f64 = 1e-9;

/// Requires implementation by the user in order to describe the simulated process the planner
/// searches over.
///
/// The planner never advances the real process; it only samples trajectories through this
/// model.  States are scalars and actions are signed integers drawn from the planner's action
/// space.
///
/// All randomness must be drawn from the `rng` handed to [`TransitionModel::step`].  The planner
/// owns exactly one seedable generator and threads it through every call, which is what makes a
/// seeded plan reproducible.
///
/// `TransitionModel` is object safe.  It is also implemented automatically for every type that
/// *dereferences* to a `TransitionModel`, so a `Box<dyn TransitionModel>` or an `&M` can be handed
/// to a [`Planner`](crate::Planner) directly.
pub trait TransitionModel {
    /// Sample a successor of `state` under `action`.
    fn step(&self, state: f64, action: i32, rng: &mut dyn RngCore) -> f64;

    /// Returns true once the process has left the region of interest.
    fn is_terminal(&self, state: f64) -> bool;

    /// The reward for the transition `state --action--> next_state`.
    ///
    /// The triple is passed for generality; [`TrackModel`] only looks at `state`.
    fn reward(&self, state: f64, action: i32, next_state: f64) -> f64;

    /// Probability with which the effect of an action is inverted.
    ///
    /// The heuristic rollout policy reads this to decide which direction an action is likely to
    /// push the state.  Models without such a notion can keep the default of `0.0`.
    fn failure_probability(&self) -> f64 {
        0.0
    }
}

impl<R, T> TransitionModel for R
where
    R: ?Sized + Deref<Target = T>,
    T: ?Sized + TransitionModel,
{
    #[inline(always)]
    fn step(&self, state: f64, action: i32, rng: &mut dyn RngCore) -> f64 {
        <T as TransitionModel>::step(self, state, action, rng)
    }

    #[inline(always)]
    fn is_terminal(&self, state: f64) -> bool {
        <T as TransitionModel>::is_terminal(self, state)
    }

    #[inline(always)]
    fn reward(&self, state: f64, action: i32, next_state: f64) -> f64 {
        <T as TransitionModel>::reward(self, state, action, next_state)
    }

    #[inline(always)]
    fn failure_probability(&self) -> f64 {
        <T as TransitionModel>::failure_probability(self)
    }
}

/// A noisy one-dimensional track: the agent starts inside `(-track_length, track_length)` and
/// is rewarded once it leaves.
///
/// Each step moves the state by the action, with the sign of the action flipped with
/// probability `failure_probability`, plus Gaussian noise with standard deviation
/// `noise_stddev`.
#[derive(Debug, Clone)]
pub struct TrackModel {
    track_length: f64,
    failure_probability: f64,
    noise: Normal<f64>,
    noise_stddev: f64,
}

impl TrackModel {
    /// Construct a model, rejecting parameters that do not describe a probability distribution.
    pub fn new(track_length: f64, noise_stddev: f64, failure_probability: f64) -> Result<Self> {
        if !(track_length.is_finite() && track_length > 0.0) {
            return Err(ConfigError::InvalidTrackLength {
                value: track_length,
            });
        }
        if !(0.0..=1.0).contains(&failure_probability) {
            return Err(ConfigError::OutOfUnitInterval {
                name: "failure_probability",
                value: failure_probability,
            });
        }
        let noise = match Normal::new(0.0, noise_stddev) {
            Ok(n) if noise_stddev.is_finite() => n,
            _ => {
                return Err(ConfigError::Negative {
                    name: "noise_stddev",
                    value: noise_stddev,
                })
            }
        };
        Ok(Self {
            track_length,
            failure_probability,
            noise,
            noise_stddev,
        })
    }

    /// Half of the length of the track.
    pub fn track_length(&self) -> f64 {
        self.track_length
    }

    /// Standard deviation of the additive noise.
    pub fn noise_stddev(&self) -> f64 {
        self.noise_stddev
    }
}

impl TransitionModel for TrackModel {
    fn step(&self, state: f64, action: i32, rng: &mut dyn RngCore) -> f64 {
        let mut effect = f64::from(action);
        if self.failure_probability > 0.0 && rng.gen::<f64>() < self.failure_probability {
            effect = -effect;
        }
        let noise = if self.noise_stddev > 0.0 {
            self.noise.sample(rng)
        } else {
            0.0
        };
        state + effect + noise
    }

    fn is_terminal(&self, state: f64) -> bool {
        !stats::is_less_than(state.abs(), self.track_length, TERMINAL_TOLERANCE)
    }

    fn reward(&self, state: f64, _action: i32, _next_state: f64) -> f64 {
        if self.is_terminal(state) {
            1.0
        } else {
            0.0
        }
    }

    fn failure_probability(&self) -> f64 {
        self.failure_probability
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn reward_boundary_is_sharp() {
        let m = TrackModel::new(5.0, 0.0, 0.0).unwrap();
        assert_eq!(m.reward(4.999999, 1, 5.999999), 0.0);
        assert_eq!(m.reward(5.000001, 1, 6.000001), 1.0);
        assert_eq!(m.reward(-5.000001, -1, -6.000001), 1.0);
        assert!(m.is_terminal(5.0));
        assert!(m.is_terminal(-5.0));
        assert!(!m.is_terminal(0.0));
    }

    #[test]
    fn noiseless_step_is_deterministic() {
        let m = TrackModel::new(5.0, 0.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert_relative_eq!(m.step(1.0, 1, &mut rng), 2.0);
        assert_relative_eq!(m.step(1.0, -1, &mut rng), 0.0);
    }

    #[test]
    fn certain_failure_inverts_action() {
        let m = TrackModel::new(5.0, 0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            assert_relative_eq!(m.step(0.0, 1, &mut rng), -1.0);
        }
    }

    #[test]
    fn noise_is_reproducible_from_seed() {
        let m = TrackModel::new(5.0, 0.5, 0.2).unwrap();
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..10)
                .map(|_| m.step(0.0, 1, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(11), draw(11));
        assert_ne!(draw(11), draw(12));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(
            TrackModel::new(0.0, 0.0, 0.0),
            Err(ConfigError::InvalidTrackLength { .. })
        ));
        assert!(matches!(
            TrackModel::new(5.0, -1.0, 0.0),
            Err(ConfigError::Negative { .. })
        ));
        assert!(matches!(
            TrackModel::new(5.0, 0.0, 1.5),
            Err(ConfigError::OutOfUnitInterval { .. })
        ));
    }

    #[test]
    fn boxed_model_is_a_model() {
        let m: Box<dyn TransitionModel> = Box::new(TrackModel::new(2.0, 0.0, 0.3).unwrap());
        fn uses_model(m: &impl TransitionModel) -> (bool, f64) {
            (m.is_terminal(2.5), m.failure_probability())
        }
        assert_eq!(uses_model(&m), (true, 0.3));
    }
}
