//! Decides whether the subtree grown during the previous decision epoch may be reused.
//!
//! Reuse requires the root and its best child to be fully expanded.  On top of that, any subset
//! of the [`Criterion`]s can be enabled; each of them compares the state actually observed with
//! the family of states the tree sampled for the best child and may veto the reuse.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::CriterionThresholds;
use crate::stats;
use crate::tree::{Node, Tree};

/// A statistical test that may reject the reuse of a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// The observed state must fall into a mode holding enough of the sampled states.
    StateMultimodality,
    /// The sampled states must not be spread too widely.
    StateVariance,
    /// The observed state must lie close to the mean of the sampled states.
    StateDistance,
    /// The returns backed up through the subtree must agree well enough.
    OutcomeVariance,
}

impl Criterion {
    /// The name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Criterion::StateMultimodality => "state_multimodality",
            Criterion::StateVariance => "state_variance",
            Criterion::StateDistance => "state_distance",
            Criterion::OutcomeVariance => "outcome_variance",
        }
    }

    /// Returns true if `candidate`, the child about to become the root, may be reused after
    /// `observed` was reached.
    pub fn accepts(self, candidate: &Node, observed: f64, thresholds: &CriterionThresholds) -> bool {
        let samples = candidate.samples();
        match self {
            Criterion::StateMultimodality => {
                let tolerance = thresholds.mode_tolerance;
                let modes = stats::modes(samples, tolerance);
                match modes.as_slice() {
                    [only] => stats::is_equal_to(only.value, observed, tolerance),
                    _ => modes
                        .iter()
                        .find(|m| stats::is_equal_to(m.value, observed, tolerance))
                        .map_or(false, |m| {
                            m.count as f64 / samples.len() as f64 >= thresholds.mode_mass_ratio
                        }),
                }
            }
            Criterion::StateVariance => stats::variance(samples)
                .map_or(false, |v| v <= thresholds.max_state_variance),
            Criterion::StateDistance => {
                match (stats::mean(samples), stats::variance(samples)) {
                    (Some(mean), Some(var)) => {
                        stats::mahalanobis_distance_1d(observed, mean, var)
                            <= thresholds.max_state_distance
                    }
                    _ => false,
                }
            }
            Criterion::OutcomeVariance => {
                candidate.outcome_variance() <= thresholds.max_outcome_variance
            }
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a tree was rebuilt instead of reused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RebuildReason {
    /// There was no tree yet.
    NoTree,
    /// The planner does not reuse trees.
    ReuseDisabled,
    /// The observed state is terminal; no subtree applies.
    TerminalState,
    /// Some action of the root was never tried.
    RootNotFullyExpanded,
    /// Some action of the best child was never tried.
    CandidateNotFullyExpanded,
    /// An enabled criterion vetoed the reuse.
    Rejected(Criterion),
}

/// The outcome of the retention test for one decision epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Retention {
    /// Promote the root's child at this index.
    Reuse {
        /// Index into the root's children.
        child: usize,
    },
    /// Discard the tree and plan from scratch.
    Rebuild(RebuildReason),
}

/// Index of the root's child with the highest mean outcome, ties broken at random.
pub(crate) fn best_child_index(tree: &Tree, rng: &mut dyn RngCore) -> Option<usize> {
    let root = tree.node(tree.root());
    let means = root
        .children()
        .iter()
        .map(|&c| tree.node(c).mean_outcome())
        .collect::<Vec<_>>();
    stats::argmax_random(&means, rng)
}

/// Decide whether the tree can be reused now that `observed` has been reached.
pub(crate) fn decide(
    tree: &Tree,
    criteria: &[Criterion],
    thresholds: &CriterionThresholds,
    observed: f64,
    rng: &mut dyn RngCore,
) -> Retention {
    if !tree.has_root() {
        return Retention::Rebuild(RebuildReason::NoTree);
    }
    let root = tree.node(tree.root());
    if !root.is_fully_expanded() || root.children().is_empty() {
        return Retention::Rebuild(RebuildReason::RootNotFullyExpanded);
    }
    let child = match best_child_index(tree, rng) {
        Some(i) => i,
        None => return Retention::Rebuild(RebuildReason::RootNotFullyExpanded),
    };
    let candidate = tree.node(root.children()[child]);
    if !candidate.is_fully_expanded() {
        return Retention::Rebuild(RebuildReason::CandidateNotFullyExpanded);
    }
    match criteria
        .iter()
        .find(|c| !c.accepts(candidate, observed, thresholds))
    {
        Some(&c) => Retention::Rebuild(RebuildReason::Rejected(c)),
        None => Retention::Reuse { child },
    }
}
