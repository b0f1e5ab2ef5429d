//! An [`oluct`](../oluct/index.html) API demonstration on a noisy one-dimensional track. See
//! [code](../src/oluct_test_track/lib.rs.html#1-999).
//!
//! An agent starts in the middle of a track of half-length `L` and moves it by `-1` or `+1` per
//! step.  The effect of an action is inverted with a fixed failure probability and blurred by
//! Gaussian noise.  The episode ends as soon as the agent leaves the track at either end, which
//! is the only rewarded event.
//!
//! The physical [`Track`] is what the agent acts on; the planner never sees it and only searches
//! over its own [`TrackModel`] of the track.  Both static and dynamic dispatch versions of the
//! planner and of the model are exercised.
//!
//! [`TrackModel`]: ../oluct/struct.TrackModel.html

use oluct::prelude::*;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// The process the agent acts on.
#[derive(Debug)]
pub struct Track {
    dynamics: TrackModel,
    state: f64,
    time: usize,
    total_reward: f64,
    rng: StdRng,
}

impl Track {
    #[allow(missing_docs)]
    pub fn new(dynamics: TrackModel, init_state: f64, seed: u64) -> Self {
        Self {
            dynamics,
            state: init_state,
            time: 0,
            total_reward: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[allow(missing_docs)]
    pub fn state(&self) -> f64 {
        self.state
    }

    /// Number of actions applied so far.
    pub fn time(&self) -> usize {
        self.time
    }

    #[allow(missing_docs)]
    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    /// Returns true once the agent has left the track.
    pub fn is_done(&self) -> bool {
        self.dynamics.is_terminal(self.state)
    }

    /// Advance the track by one step and return the new state.  Leaving the track earns the
    /// reward.
    pub fn apply(&mut self, action: i32) -> f64 {
        let next = self.dynamics.step(self.state, action, &mut self.rng);
        self.total_reward += self.dynamics.reward(next, action, next);
        self.state = next;
        self.time += 1;
        next
    }
}

/// The trace of one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    /// The actions in the order they were applied.
    pub actions: Vec<i32>,
    /// The states visited, starting with the initial state.
    pub states: Vec<f64>,
    /// Whether each call to `plan` reused (`true`) or rebuilt (`false`) the tree.
    pub reused: Vec<bool>,
}

/// Let `planner` act on `track` until the agent leaves it or `max_steps` actions were taken.
pub fn run_episode<T>(planner: &mut T, track: &mut Track, max_steps: usize) -> Episode
where
    T: ?Sized + SearchTree,
{
    let mut episode = Episode {
        actions: Vec::new(),
        states: vec![track.state()],
        reused: Vec::new(),
    };
    while !track.is_done() && track.time() < max_steps {
        let action = match planner.plan(track.state()) {
            Status::Action(a) | Status::ActionWip(a) => a,
            Status::Terminal => break,
        };
        // only a promoted root carries statistics of its own
        episode.reused.push(planner.get_root_info().visits > 0);
        episode.actions.push(action);
        episode.states.push(track.apply(action));
    }
    episode
}

#[cfg(test)]
mod test {
    use super::*;

    const TRACK_LENGTH: f64 = 5.0;

    fn noiseless() -> TrackModel {
        TrackModel::new(TRACK_LENGTH, 0.0, 0.0).unwrap()
    }

    // budget 20, horizon 10, uct constant 0.7, discount 0.9
    fn greedy_config(seed: u64) -> PlannerConfig {
        PlannerConfig::default()
            .with_default_policy(DefaultPolicy::EpsilonHeuristic)
            .with_epsilon(0.0)
            .with_seed(seed)
    }

    #[test]
    fn test_noiseless_track_static() {
        for seed in 0..4 {
            let mut planner = Planner::new(greedy_config(seed), noiseless()).unwrap();
            let mut track = Track::new(noiseless(), 0.0, seed);

            let episode = run_episode(&mut planner, &mut track, 20);

            assert!(track.is_done());
            assert_eq!(episode.actions.len(), 5, "episode: {:?}", episode);
            let first = episode.actions[0];
            assert!(episode.actions.iter().all(|&a| a == first));
            assert!(track.state().abs() >= TRACK_LENGTH);
            assert_eq!(track.total_reward(), 1.0);
            assert!(episode.reused.iter().all(|&r| !r));
            assert_eq!(planner.plan(track.state()), Status::Terminal);
        }
    }

    #[test]
    fn test_noiseless_track_random_rollouts() {
        // with random rollouts a budget of 20 may pick a reversal, which costs two extra steps
        let mut lengths = Vec::new();
        for seed in 0..8 {
            let config = PlannerConfig::default().with_seed(seed);
            let mut planner = Planner::new(config, noiseless()).unwrap();
            let mut track = Track::new(noiseless(), 0.0, seed);

            let episode = run_episode(&mut planner, &mut track, 20);

            assert!(track.is_done(), "seed {}: {:?}", seed, episode);
            assert_eq!(episode.actions.len() % 2, 1);
            assert!(episode.actions.len() <= 9, "seed {}: {:?}", seed, episode);
            assert_eq!(track.total_reward(), 1.0);
            lengths.push(episode.actions.len());
        }
        assert!(lengths.contains(&5), "lengths: {:?}", lengths);
    }

    #[test]
    fn test_noiseless_track_dynamic() {
        let seed = 3;
        let mut planner = Planner::new(greedy_config(seed), noiseless()).unwrap();
        let mut track = Track::new(noiseless(), 0.0, seed);
        let expected = run_episode(&mut planner, &mut track, 20);

        let model: Box<dyn TransitionModel> = Box::new(noiseless());
        let planner = Planner::new(greedy_config(seed), model).unwrap();
        let mut planner: Box<dyn SearchTree> = Box::new(planner);
        let mut track = Track::new(noiseless(), 0.0, seed);
        let episode = run_episode(&mut *planner, &mut track, 20);

        assert_eq!(episode, expected);
        assert!(track.is_done());
    }

    #[test]
    fn test_open_loop_episode() {
        let budget = 100;
        let model = TrackModel::new(TRACK_LENGTH, 0.2, 0.1).unwrap();
        let config = PlannerConfig::default()
            .with_budget(budget)
            .with_reuse_tree(true)
            .with_seed(11);
        let mut planner = Planner::new(config, model.clone()).unwrap();
        let mut track = Track::new(model, 0.0, 11);

        let mut trials = 0;
        while !track.is_done() && track.time() < 200 {
            let action = planner.plan(track.state()).action().unwrap();
            match planner.last_decision().unwrap() {
                Retention::Reuse { .. } => {
                    // no planning iteration is spent on a reused tree
                    assert_eq!(planner.trials_count(), trials);
                    assert!(planner.get_root_info().visits > 0);
                }
                Retention::Rebuild(reason) => {
                    assert_ne!(reason, RebuildReason::ReuseDisabled);
                    assert_eq!(planner.trials_count(), budget);
                    assert_eq!(root_children_visits(planner.get_tree()), budget);
                }
            }
            test_structure_helper(planner.get_tree());
            trials = planner.trials_count();
            track.apply(action);
        }
        assert!(track.is_done());
    }

    #[test]
    fn test_bimodal_samples_reject_reuse() {
        // every action is inverted half of the time, so each child's samples form two modes of
        // about equal mass
        let model = TrackModel::new(TRACK_LENGTH, 0.0, 0.5).unwrap();
        let config = PlannerConfig::default()
            .with_budget(100)
            .with_reuse_tree(true)
            .with_criterion(Criterion::StateMultimodality)
            .with_seed(5);
        let mut planner = Planner::new(config, model).unwrap();

        planner.plan(0.0);
        planner.plan(1.0);
        assert_eq!(
            planner.last_decision(),
            Some(Retention::Rebuild(RebuildReason::Rejected(
                Criterion::StateMultimodality
            )))
        );

        // without the criterion the same tree is reused
        let config = planner.config().clone();
        let model = planner.model().clone();
        let mut planner = Planner::new(
            PlannerConfig {
                criteria: Vec::new(),
                ..config
            },
            model,
        )
        .unwrap();
        planner.plan(0.0);
        planner.plan(1.0);
        assert!(matches!(
            planner.last_decision(),
            Some(Retention::Reuse { .. })
        ));
    }
}
