//! Configuration of a [`Planner`](crate::Planner).
//!
//! `PlannerConfig` is plain data: it can be built in code with the `with_*` methods or
//! deserialized by whoever loads configuration files.  [`PlannerConfig::validate`] runs before
//! planning starts, so malformed settings never surface halfway through a tree.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::retention::Criterion;
use crate::rollout::DefaultPolicy;

/// Which planning algorithm answers [`Planner::plan`](crate::Planner::plan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Rebuild the tree from scratch at every decision epoch.
    Uct,
    /// Reuse the subtree below the previously recommended action when the retention
    /// criteria allow it.
    OpenLoopUct,
    /// Grow no tree at all; the epsilon-heuristic default policy picks the action directly.
    EpsilonHeuristic,
}

impl Default for PolicyKind {
    fn default() -> Self {
        PolicyKind::Uct
    }
}

/// Thresholds of the statistical retention [`Criterion`]s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriterionThresholds {
    /// Two sampled states closer than this belong to the same mode.
    pub mode_tolerance: f64,
    /// Share of the samples the observed state's mode must hold in a multimodal family.
    pub mode_mass_ratio: f64,
    /// Largest accepted variance of the sampled states.
    pub max_state_variance: f64,
    /// Largest accepted Mahalanobis distance of the observed state to the sampled states.
    pub max_state_distance: f64,
    /// Largest accepted variance of the backed up returns.
    pub max_outcome_variance: f64,
}

impl Default for CriterionThresholds {
    fn default() -> Self {
        Self {
            mode_tolerance: 1e-6,
            mode_mass_ratio: 0.8,
            max_state_variance: 1.0,
            max_state_distance: 2.0,
            max_outcome_variance: 0.25,
        }
    }
}

/// Every knob of a [`Planner`](crate::Planner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Planning iterations spent whenever the tree is rebuilt.
    pub budget: u32,
    /// Maximum number of steps of a rollout.
    pub horizon: u32,
    /// Exploration constant `C` of the UCT score.
    pub uct_constant: f64,
    /// Discount applied per step, in `[0, 1]`.
    pub discount_factor: f64,
    /// Exploration probability of the epsilon-heuristic default policy.
    pub epsilon: f64,
    /// The legal actions; their order is irrelevant since every node shuffles its own copy.
    pub action_space: Vec<i32>,
    /// The planning algorithm.
    pub policy: PolicyKind,
    /// The policy used during rollouts.
    pub default_policy: DefaultPolicy,
    /// Retention criteria applied by [`PolicyKind::OpenLoopUct`], in evaluation order.
    pub criteria: Vec<Criterion>,
    /// Thresholds of the retention criteria.
    pub thresholds: CriterionThresholds,
    /// Extra samples drawn from a node whose samples are all terminal before it is treated as a
    /// leaf.
    pub terminal_confirmations: u32,
    /// Seed of the planner's random number generator; drawn from entropy if `None`.
    pub seed: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            budget: 20,
            horizon: 10,
            uct_constant: 0.7,
            discount_factor: 0.9,
            epsilon: 1.0,
            action_space: vec![-1, 1],
            policy: PolicyKind::default(),
            default_policy: DefaultPolicy::default(),
            criteria: Vec::new(),
            thresholds: CriterionThresholds::default(),
            terminal_confirmations: 1,
            seed: None,
        }
    }
}

impl PlannerConfig {
    #[allow(missing_docs)]
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    #[allow(missing_docs)]
    pub fn with_horizon(mut self, horizon: u32) -> Self {
        self.horizon = horizon;
        self
    }

    #[allow(missing_docs)]
    pub fn with_uct_constant(mut self, uct_constant: f64) -> Self {
        self.uct_constant = uct_constant;
        self
    }

    #[allow(missing_docs)]
    pub fn with_discount_factor(mut self, discount_factor: f64) -> Self {
        self.discount_factor = discount_factor;
        self
    }

    #[allow(missing_docs)]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    #[allow(missing_docs)]
    pub fn with_action_space(mut self, action_space: Vec<i32>) -> Self {
        self.action_space = action_space;
        self
    }

    #[allow(missing_docs)]
    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Shorthand for switching between [`PolicyKind::OpenLoopUct`] and [`PolicyKind::Uct`].
    pub fn with_reuse_tree(self, reuse_tree: bool) -> Self {
        self.with_policy(if reuse_tree {
            PolicyKind::OpenLoopUct
        } else {
            PolicyKind::Uct
        })
    }

    #[allow(missing_docs)]
    pub fn with_default_policy(mut self, default_policy: DefaultPolicy) -> Self {
        self.default_policy = default_policy;
        self
    }

    /// Enable one more retention criterion.
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    #[allow(missing_docs)]
    pub fn with_thresholds(mut self, thresholds: CriterionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[allow(missing_docs)]
    pub fn with_terminal_confirmations(mut self, terminal_confirmations: u32) -> Self {
        self.terminal_confirmations = terminal_confirmations;
        self
    }

    #[allow(missing_docs)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns true if subtrees may survive from one decision epoch to the next.
    pub fn reuse_tree(&self) -> bool {
        self.policy == PolicyKind::OpenLoopUct
    }

    /// Check every setting, reporting the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.action_space.is_empty() {
            return Err(ConfigError::EmptyActionSpace);
        }
        let mut seen = HashSet::new();
        if let Some(&action) = self.action_space.iter().find(|a| !seen.insert(**a)) {
            return Err(ConfigError::DuplicateAction { action });
        }
        if self.budget == 0 {
            return Err(ConfigError::ZeroBudget);
        }
        unit_interval("discount_factor", self.discount_factor)?;
        unit_interval("epsilon", self.epsilon)?;
        non_negative("uct_constant", self.uct_constant)?;

        let th = &self.thresholds;
        if !(th.mode_mass_ratio > 0.0 && th.mode_mass_ratio <= 1.0) {
            return Err(ConfigError::InvalidModeMassRatio {
                value: th.mode_mass_ratio,
            });
        }
        non_negative("mode_tolerance", th.mode_tolerance)?;
        non_negative("max_state_variance", th.max_state_variance)?;
        // an infinite bound disables the distance test
        if !(th.max_state_distance >= 0.0) {
            return Err(ConfigError::Negative {
                name: "max_state_distance",
                value: th.max_state_distance,
            });
        }
        non_negative("max_outcome_variance", th.max_outcome_variance)?;

        let mut seen = HashSet::new();
        if let Some(c) = self.criteria.iter().find(|c| !seen.insert(**c)) {
            return Err(ConfigError::DuplicateCriterion {
                criterion: c.to_string(),
            });
        }
        Ok(())
    }
}

fn unit_interval(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitInterval { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}
