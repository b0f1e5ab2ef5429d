//! The planner: selection, expansion, rollout and backup over a [`Tree`], wrapped in the
//! decision loop that rebuilds or reuses the tree at every call to [`SearchTree::plan`].

use std::fmt;

use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{PlannerConfig, PolicyKind};
use crate::error::Result;
use crate::retention::{self, RebuildReason, Retention};
use crate::rollout::{self, rollout};
use crate::stats;
use crate::transition_model::TransitionModel;
use crate::tree::{Node, NodeId, NodeInfo, Status, Tree};

/// The interface to an online planner.
///
/// `SearchTree` is object safe, so planners over different models can be driven through a
/// `Box<dyn SearchTree>`.
pub trait SearchTree {
    /// Prepare the tree for a decision at `state` and return the recommended action.
    ///
    /// Depending on the configured [`PolicyKind`] the tree is either rebuilt with `budget`
    /// planning iterations or, if the retention criteria accept it, the subtree below the
    /// previously recommended action becomes the new tree without any further iteration.
    fn plan(&mut self, state: f64) -> Status<i32>;

    /// Performs one iteration of tree policy, rollout and backup.  Returns `Some(state)` with the
    /// first sampled state of the node that was added to the tree and `None` if the iteration
    /// ended in a terminal node instead.
    ///
    /// # Panics
    ///
    /// If no root has been seeded by [`SearchTree::plan`] yet.
    fn step(&mut self) -> Option<f64>;

    /// Returns a `Status` with the action of the root's child that has the highest mean outcome.
    ///
    /// # Panics
    ///
    /// If no root has been seeded by [`SearchTree::plan`] yet.
    fn best_action(&mut self) -> Status<i32>;

    /// Returns a `NodeInfo` for the tree's root.
    ///
    /// # Panics
    ///
    /// If no root has been seeded by [`SearchTree::plan`] yet.
    fn get_root_info(&self) -> NodeInfo;

    /// Returns the action and `NodeInfo` of every child of the root, or `None` if the root has
    /// not been expanded.
    ///
    /// # Panics
    ///
    /// If no root has been seeded by [`SearchTree::plan`] yet.
    fn get_next_move_info(&self) -> Option<Vec<(i32, NodeInfo)>>;

    /// Returns every node of the tree in post-order together with the distance to the deepest
    /// leaf beneath it.  The root comes last.
    fn find_children_sorted_with_depth(&self) -> Vec<(NodeInfo, usize)>;

    #[doc(hidden)]
    #[cfg(any(test, feature = "test_internals"))]
    fn get_tree(&self) -> &Tree;
}

/// The UCT score of `child`: its mean outcome plus the exploration bonus
/// `2 * uct_constant * sqrt(ln(trials_count) / visits)`.
///
/// # Panics
///
/// If `child` has never been visited or no planning iteration has completed yet.
pub fn uct_score(child: &Node, trials_count: u32, uct_constant: f64) -> f64 {
    assert!(child.visits() > 0, "UCT score of an unvisited child");
    assert!(
        trials_count > 0,
        "UCT score requires at least one completed planning iteration"
    );
    let bonus = (f64::from(trials_count).ln() / f64::from(child.visits())).sqrt();
    child.mean_outcome() + 2.0 * uct_constant * bonus
}

/// An online planner choosing actions for a process described by a [`TransitionModel`].
///
/// The planner owns its tree and its random number generator; every draw (transition noise,
/// action shuffles, tie breaks, rollout actions) comes from that one generator, so a planner
/// built with [`PlannerConfig::seed`] is reproducible.
pub struct Planner<M> {
    config: PlannerConfig,
    model: M,
    tree: Tree,
    rng: StdRng,
    trials_count: u32,
    last_decision: Option<Retention>,
}

impl<M> fmt::Debug for Planner<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("config", &self.config)
            .field("nodes", &self.tree.len())
            .field("trials_count", &self.trials_count)
            .field("last_decision", &self.last_decision)
            .finish()
    }
}

impl<M> Planner<M>
where
    M: TransitionModel,
{
    /// Construct a planner after validating `config`.
    pub fn new(config: PlannerConfig, model: M) -> Result<Self> {
        config.validate()?;
        if config.discount_factor == 0.0 {
            warn!("discount_factor is 0: rollouts only see the immediate reward");
        }
        if !config.criteria.is_empty() && !config.reuse_tree() {
            warn!(
                "retention criteria {:?} are ignored by the {:?} policy",
                config.criteria, config.policy
            );
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            model,
            tree: Tree::new(),
            rng,
            trials_count: 0,
            last_decision: None,
        })
    }

    /// The configuration the planner was built with.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// The transition model searched over.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Number of planning iterations completed since the tree was last rebuilt.
    pub fn trials_count(&self) -> u32 {
        self.trials_count
    }

    /// Whether the latest call to [`SearchTree::plan`] reused or rebuilt the tree; `None` before
    /// the first call and for [`PolicyKind::EpsilonHeuristic`].
    pub fn last_decision(&self) -> Option<Retention> {
        self.last_decision
    }

    fn rebuild(&mut self, state: f64) {
        self.tree
            .reset(state, &self.config.action_space, &mut self.rng);
        self.trials_count = 0;
        for _ in 0..self.config.budget {
            self.step();
        }
    }

    fn is_terminal_node(&self, id: NodeId) -> bool {
        let node = self.tree.node(id);
        if node.is_root() {
            self.model.is_terminal(node.state())
        } else {
            node.samples().iter().all(|&s| self.model.is_terminal(s))
        }
    }

    // simulate `child`'s incoming action once more from its parent's representative state
    fn resample(&mut self, parent: NodeId, child: NodeId) {
        let from = self.tree.node(parent).representative_state();
        let action = self.tree.node(child).incoming_action();
        let s = self.model.step(from, action, &mut self.rng);
        self.tree.node_mut(child).add_sample(s);
    }

    fn uct_child(&mut self, id: NodeId) -> NodeId {
        let children = self.tree.node(id).children();
        let scores = children
            .iter()
            .map(|&c| uct_score(self.tree.node(c), self.trials_count, self.config.uct_constant))
            .collect::<Vec<_>>();
        let best = stats::argmax_random(&scores, &mut self.rng)
            .expect("UCT selection on a node without children");
        children[best]
    }

    // descend from the root to the node whose rollout this iteration evaluates; the flag is true
    // if that node was created by the descent
    fn tree_policy(&mut self) -> (NodeId, bool) {
        let mut cur = self.tree.root();
        loop {
            if self.is_terminal_node(cur) {
                if let Some(parent) = self.tree.node(cur).parent() {
                    for _ in 0..self.config.terminal_confirmations {
                        self.resample(parent, cur);
                    }
                }
                trace!("descent ended in terminal node {:?}", cur);
                return (cur, false);
            }

            let node = self.tree.node(cur);
            if !node.is_fully_expanded() {
                let action = node.next_untried_action();
                let from = node.representative_state();
                let s = self.model.step(from, action, &mut self.rng);
                let child = self.tree.create_child(cur, action, s, &mut self.rng);
                trace!("expanded {:?} with action {} to state {}", cur, action, s);
                return (child, true);
            }

            let child = self.uct_child(cur);
            self.resample(cur, child);
            cur = child;
        }
    }

    fn backup(&mut self, leaf: NodeId, mut ret: f64) {
        let mut cur = leaf;
        while let Some(parent) = self.tree.node(cur).parent() {
            let node = self.tree.node_mut(cur);
            node.increment_visits();
            node.record_outcome(ret);
            ret *= self.config.discount_factor;
            cur = parent;
        }
    }
}

impl<M> SearchTree for Planner<M>
where
    M: TransitionModel,
{
    fn plan(&mut self, state: f64) -> Status<i32> {
        if self.config.policy == PolicyKind::EpsilonHeuristic {
            self.last_decision = None;
            if self.model.is_terminal(state) {
                return Status::Terminal;
            }
            return Status::Action(rollout::epsilon_heuristic_action(
                &self.model,
                state,
                &self.config.action_space,
                self.config.epsilon,
                &mut self.rng,
            ));
        }

        // a terminal state is reported as such whatever subtree is at hand
        let decision = if self.model.is_terminal(state) {
            Retention::Rebuild(RebuildReason::TerminalState)
        } else if self.config.reuse_tree() {
            retention::decide(
                &self.tree,
                &self.config.criteria,
                &self.config.thresholds,
                state,
                &mut self.rng,
            )
        } else if self.tree.has_root() {
            Retention::Rebuild(RebuildReason::ReuseDisabled)
        } else {
            Retention::Rebuild(RebuildReason::NoTree)
        };

        match decision {
            Retention::Reuse { child } => {
                debug!("reusing subtree of child {} at state {}", child, state);
                self.tree.promote_child(child, state);
            }
            Retention::Rebuild(reason) => {
                debug!("rebuilding tree at state {}: {:?}", state, reason);
                self.rebuild(state);
            }
        }
        self.last_decision = Some(decision);
        self.best_action()
    }

    fn step(&mut self) -> Option<f64> {
        let (leaf, expanded) = self.tree_policy();
        let state = self.tree.node(leaf).representative_state();
        let ret = rollout(&self.model, &self.config, state, &mut self.rng);
        self.backup(leaf, ret);
        self.trials_count += 1;
        if expanded {
            Some(state)
        } else {
            None
        }
    }

    fn best_action(&mut self) -> Status<i32> {
        let best = retention::best_child_index(&self.tree, &mut self.rng);
        let root = self.tree.node(self.tree.root());
        match best {
            Some(i) => Status::from_root(root, || root.actions()[i]),
            None => Status::Terminal,
        }
    }

    fn get_root_info(&self) -> NodeInfo {
        self.tree.get_node_info(self.tree.root())
    }

    fn get_next_move_info(&self) -> Option<Vec<(i32, NodeInfo)>> {
        let root = self.tree.node(self.tree.root());
        if root.children().is_empty() {
            return None;
        }
        Some(
            root.actions()
                .iter()
                .zip(root.children())
                .map(|(&a, &c)| (a, self.tree.get_node_info(c)))
                .collect(),
        )
    }

    fn find_children_sorted_with_depth(&self) -> Vec<(NodeInfo, usize)> {
        self.tree
            .find_children_sorted_with_depth(self.tree.root())
            .into_iter()
            .map(|(n, d)| (self.tree.get_node_info(n), d))
            .collect()
    }

    #[doc(hidden)]
    #[cfg(any(test, feature = "test_internals"))]
    fn get_tree(&self) -> &Tree {
        &self.tree
    }
}
