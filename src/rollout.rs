//! The default policy used to estimate returns beyond the frontier of the tree.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::config::PlannerConfig;
use crate::transition_model::TransitionModel;

/// How actions are chosen during a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// Uniformly at random over the action space.
    Random,
    /// Head for the nearest end of the track with probability `1 - epsilon`, act uniformly at
    /// random otherwise.
    EpsilonHeuristic,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        DefaultPolicy::Random
    }
}

impl DefaultPolicy {
    /// Pick an action for `state`.
    pub fn select_action<M>(
        self,
        model: &M,
        state: f64,
        actions: &[i32],
        epsilon: f64,
        rng: &mut dyn RngCore,
    ) -> i32
    where
        M: ?Sized + TransitionModel,
    {
        match self {
            DefaultPolicy::Random => random_action(actions, rng),
            DefaultPolicy::EpsilonHeuristic => {
                epsilon_heuristic_action(model, state, actions, epsilon, rng)
            }
        }
    }
}

fn random_action(actions: &[i32], rng: &mut dyn RngCore) -> i32 {
    *actions.choose(rng).expect("action space is empty")
}

/// The action that pushes `state` away from the centre of the track.
///
/// Among the actions pointing in the escape direction the one with the largest magnitude is
/// taken.  If the model inverts actions more often than not, the opposite direction is the one
/// that escapes.  At the centre, or if no action points the right way, a random action is taken.
pub fn heuristic_action<M>(model: &M, state: f64, actions: &[i32], rng: &mut dyn RngCore) -> i32
where
    M: ?Sized + TransitionModel,
{
    let mut direction = if state > 0.0 {
        1
    } else if state < 0.0 {
        -1
    } else {
        0
    };
    if model.failure_probability() > 0.5 {
        direction = -direction;
    }
    actions
        .iter()
        .copied()
        .filter(|a| direction != 0 && a.signum() == direction)
        .max_by_key(|a| a.abs())
        .unwrap_or_else(|| random_action(actions, rng))
}

/// [`heuristic_action`] with probability `1 - epsilon`, a uniformly random action otherwise.
pub fn epsilon_heuristic_action<M>(
    model: &M,
    state: f64,
    actions: &[i32],
    epsilon: f64,
    rng: &mut dyn RngCore,
) -> i32
where
    M: ?Sized + TransitionModel,
{
    if rng.gen_bool(epsilon) {
        random_action(actions, rng)
    } else {
        heuristic_action(model, state, actions, rng)
    }
}

/// Simulate a discounted trajectory of at most `config.horizon` steps from `state`.
///
/// At step `t` the default policy picks `a`, the model samples `s'` and `discount^t *
/// reward(s, a, s')` is accumulated; the trajectory stops once `s` is terminal.  A terminal
/// `state` is worth a single reward evaluation.
pub(crate) fn rollout<M>(
    model: &M,
    config: &PlannerConfig,
    state: f64,
    rng: &mut dyn RngCore,
) -> f64
where
    M: ?Sized + TransitionModel,
{
    let policy = config.default_policy;
    let actions = &config.action_space;

    if model.is_terminal(state) {
        let a = policy.select_action(model, state, actions, config.epsilon, rng);
        return model.reward(state, a, state);
    }

    let mut ret = 0.0;
    let mut discount = 1.0;
    let mut s = state;
    for _ in 0..config.horizon {
        let a = policy.select_action(model, s, actions, config.epsilon, rng);
        let next = model.step(s, a, rng);
        ret += discount * model.reward(s, a, next);
        if model.is_terminal(s) {
            break;
        }
        discount *= config.discount_factor;
        s = next;
    }
    ret
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transition_model::TrackModel;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn heuristic_config(horizon: u32, discount: f64) -> PlannerConfig {
        PlannerConfig::default()
            .with_horizon(horizon)
            .with_discount_factor(discount)
            .with_epsilon(0.0)
            .with_default_policy(DefaultPolicy::EpsilonHeuristic)
    }

    #[test]
    fn heuristic_escapes_towards_nearest_end() {
        let mut rng = StdRng::seed_from_u64(0);
        let m = TrackModel::new(5.0, 0.0, 0.1).unwrap();
        let actions = [-2, -1, 1, 2];
        assert_eq!(heuristic_action(&m, 1.5, &actions, &mut rng), 2);
        assert_eq!(heuristic_action(&m, -0.5, &actions, &mut rng), -2);
    }

    #[test]
    fn heuristic_corrects_for_likely_inversion() {
        let mut rng = StdRng::seed_from_u64(0);
        let m = TrackModel::new(5.0, 0.0, 0.9).unwrap();
        assert_eq!(heuristic_action(&m, 1.5, &[-1, 1], &mut rng), -1);
        assert_eq!(heuristic_action(&m, -1.5, &[-1, 1], &mut rng), 1);
    }

    #[test]
    fn heuristic_at_centre_is_random() {
        let m = TrackModel::new(5.0, 0.0, 0.0).unwrap();
        let mut seen = [false; 2];
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            match heuristic_action(&m, 0.0, &[-1, 1], &mut rng) {
                -1 => seen[0] = true,
                1 => seen[1] = true,
                a => panic!("unexpected action {}", a),
            }
        }
        assert_eq!(seen, [true, true]);
    }

    #[test]
    fn heuristic_without_matching_action_is_random() {
        let mut rng = StdRng::seed_from_u64(0);
        let m = TrackModel::new(5.0, 0.0, 0.0).unwrap();
        assert_eq!(heuristic_action(&m, 2.0, &[-1], &mut rng), -1);
    }

    #[test]
    fn full_epsilon_is_uniform() {
        let m = TrackModel::new(5.0, 0.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let ups = (0..2000)
            .filter(|_| epsilon_heuristic_action(&m, 3.0, &[-1, 1], 1.0, &mut rng) == 1)
            .count();
        assert!((ups as f64 / 2000.0 - 0.5).abs() < 0.05);
    }

    #[test]
    fn terminal_leaf_is_a_single_reward() {
        let m = TrackModel::new(5.0, 0.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let r = rollout(&m, &heuristic_config(10, 0.5), 5.0, &mut rng);
        assert_relative_eq!(r, 1.0);
    }

    #[test]
    fn heuristic_rollout_is_discounted_by_distance() {
        let m = TrackModel::new(5.0, 0.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        // three moves to reach 5, the reward is collected on the following step
        let r = rollout(&m, &heuristic_config(10, 0.9), 2.0, &mut rng);
        assert_relative_eq!(r, 0.9f64.powi(3), epsilon = 1e-12);
        let r = rollout(&m, &heuristic_config(10, 0.9), -4.0, &mut rng);
        assert_relative_eq!(r, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn short_horizon_sees_nothing() {
        let m = TrackModel::new(5.0, 0.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(rollout(&m, &heuristic_config(3, 0.9), 2.0, &mut rng), 0.0);
        assert_eq!(rollout(&m, &heuristic_config(0, 0.9), 2.0, &mut rng), 0.0);
    }

    #[test]
    fn random_rollout_is_bounded() {
        let m = TrackModel::new(2.0, 0.3, 0.1).unwrap();
        let config = PlannerConfig::default().with_horizon(20).with_discount_factor(0.95);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let r = rollout(&m, &config, 0.0, &mut rng);
            assert!((0.0..=1.0).contains(&r));
        }
    }
}
