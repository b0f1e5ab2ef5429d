//! The search tree: an arena of nodes addressed by stable [`NodeId`]s.
//!
//! A parent owns its children through the arena; each child keeps the `NodeId` of its parent as
//! its only upward edge.  Promoting a child to the root rebinds the root handle to the child's
//! slot and frees every other slot that is no longer reachable, so a back-reference can never
//! outlive or alias the node it points to.

use rand::seq::SliceRandom;
use rand::Rng;

/// A stable handle to a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The slot index of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

// Statistics of a node that has been reached by an action.  `samples` grows by one state per
// visit because every descent re-samples the transition model ("open loop").
#[derive(Debug, Clone)]
struct Estimate {
    incoming_action: i32,
    samples: Vec<f64>,
    visits: u32,
    outcome_sum: f64,
    outcome_sq_sum: f64,
}

impl Estimate {
    fn new(incoming_action: i32, first_sample: f64) -> Self {
        Self {
            incoming_action,
            samples: vec![first_sample],
            visits: 0,
            outcome_sum: 0.0,
            outcome_sq_sum: 0.0,
        }
    }

    fn mean_outcome(&self) -> Option<f64> {
        if self.visits == 0 {
            None
        } else {
            Some(self.outcome_sum / f64::from(self.visits))
        }
    }
}

#[derive(Debug, Clone)]
enum Kind {
    // `inherited` holds the statistics a promoted root gathered while it was still a child; they
    // are kept for inspection only and never take part in planning
    Root {
        state: f64,
        inherited: Option<Estimate>,
    },
    Internal {
        parent: NodeId,
        estimate: Estimate,
    },
}

/// The fundamental type composing a [`Tree`].
///
/// A root is labelled by a single observed state.  Every other node stands for the family of
/// states sampled when its incoming action was simulated from its parent.
#[derive(Debug, Clone)]
pub struct Node {
    kind: Kind,
    // shuffled once at creation; `children[i]` was created by `actions[i]`
    actions: Vec<i32>,
    children: Vec<NodeId>,
}

impl Node {
    fn new<R>(kind: Kind, action_space: &[i32], rng: &mut R) -> Self
    where
        R: ?Sized + Rng,
    {
        let mut actions = action_space.to_vec();
        actions.shuffle(rng);
        Self {
            kind,
            actions,
            children: Vec::with_capacity(action_space.len()),
        }
    }

    fn estimate(&self) -> &Estimate {
        match self.kind {
            Kind::Internal { ref estimate, .. } => estimate,
            Kind::Root { .. } => panic!("the root node has no incoming action or statistics"),
        }
    }

    fn estimate_mut(&mut self) -> &mut Estimate {
        match self.kind {
            Kind::Internal {
                ref mut estimate, ..
            } => estimate,
            Kind::Root { .. } => panic!("the root node has no incoming action or statistics"),
        }
    }

    /// Returns true if the node is labelled by a unique state.
    pub fn is_root(&self) -> bool {
        matches!(self.kind, Kind::Root { .. })
    }

    /// Returns true once every action of the node has been tried.
    pub fn is_fully_expanded(&self) -> bool {
        self.children.len() == self.actions.len()
    }

    /// The action that the next expansion of this node will try.
    ///
    /// # Panics
    ///
    /// If the node is fully expanded.
    pub fn next_untried_action(&self) -> i32 {
        *self
            .actions
            .get(self.children.len())
            .expect("node is fully expanded")
    }

    /// The node's actions in the (shuffled) order in which they are expanded.
    pub fn actions(&self) -> &[i32] {
        &self.actions
    }

    /// The node's children in order of expansion.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The parent of the node, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        match self.kind {
            Kind::Internal { parent, .. } => Some(parent),
            Kind::Root { .. } => None,
        }
    }

    /// The labelling state of the root.
    ///
    /// # Panics
    ///
    /// If the node is not the root.
    pub fn state(&self) -> f64 {
        match self.kind {
            Kind::Root { state, .. } => state,
            Kind::Internal { .. } => panic!("only the root node is labelled by a unique state"),
        }
    }

    /// The states sampled at this node, oldest first.
    ///
    /// # Panics
    ///
    /// If the node is the root.
    pub fn samples(&self) -> &[f64] {
        &self.estimate().samples
    }

    /// The state the tree policy continues from: the root's label or the latest sample.
    pub fn representative_state(&self) -> f64 {
        match self.kind {
            Kind::Root { state, .. } => state,
            Kind::Internal { ref estimate, .. } => *estimate
                .samples
                .last()
                .expect("internal node without samples"),
        }
    }

    /// The action of the parent that leads to this node.
    ///
    /// # Panics
    ///
    /// If the node is the root.
    pub fn incoming_action(&self) -> i32 {
        self.estimate().incoming_action
    }

    /// Number of completed backups through this node.
    ///
    /// # Panics
    ///
    /// If the node is the root.
    pub fn visits(&self) -> u32 {
        self.estimate().visits
    }

    /// Average return backed up through this node.
    ///
    /// # Panics
    ///
    /// If the node is the root or has never been visited.
    pub fn mean_outcome(&self) -> f64 {
        self.estimate()
            .mean_outcome()
            .expect("mean outcome of an unvisited node")
    }

    /// Population variance of the returns backed up through this node.
    ///
    /// # Panics
    ///
    /// If the node is the root or has never been visited.
    pub fn outcome_variance(&self) -> f64 {
        let e = self.estimate();
        let mean = e.mean_outcome().expect("outcome variance of an unvisited node");
        (e.outcome_sq_sum / f64::from(e.visits) - mean * mean).max(0.0)
    }

    /// Append a freshly sampled state.
    ///
    /// # Panics
    ///
    /// If the node is the root.
    pub fn add_sample(&mut self, state: f64) {
        match self.kind {
            Kind::Internal {
                ref mut estimate, ..
            } => estimate.samples.push(state),
            Kind::Root { .. } => panic!("cannot add a sampled state to the root node"),
        }
    }

    /// Count one more backup through this node.
    pub fn increment_visits(&mut self) {
        self.estimate_mut().visits += 1;
    }

    /// Accumulate one discounted return.
    pub fn record_outcome(&mut self, ret: f64) {
        let e = self.estimate_mut();
        e.outcome_sum += ret;
        e.outcome_sq_sum += ret * ret;
    }

    fn info(&self, depth: usize) -> NodeInfo {
        let (state, incoming_action, estimate) = match self.kind {
            Kind::Root {
                state,
                ref inherited,
            } => (Some(state), None, inherited.as_ref()),
            Kind::Internal { ref estimate, .. } => {
                (None, Some(estimate.incoming_action), Some(estimate))
            }
        };
        NodeInfo {
            depth,
            state,
            incoming_action,
            samples: estimate.map(|e| e.samples.clone()).unwrap_or_default(),
            visits: estimate.map_or(0, |e| e.visits),
            mean_outcome: estimate.and_then(Estimate::mean_outcome),
            n_children: self.children.len(),
            n_actions: self.actions.len(),
        }
    }
}

/// Contains information about a specific `Node`.
///
/// For a root obtained by promotion, `samples`, `visits` and `mean_outcome` are the statistics
/// it carried as a child.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct NodeInfo {
    pub depth: usize,
    /// The labelling state, roots only.
    pub state: Option<f64>,
    pub incoming_action: Option<i32>,
    pub samples: Vec<f64>,
    pub visits: u32,
    pub mean_outcome: Option<f64>,
    pub n_children: usize,
    pub n_actions: usize,
}

/// Provides information about the action recommended from a `Tree`'s root.
#[derive(Debug, Clone, PartialEq)]
pub enum Status<T> {
    /// Some actions of the root were never tried.
    ActionWip(T),
    /// Every action of the root has been tried.
    Action(T),
    /// The root state is terminal; nothing was expanded.
    Terminal,
}

impl<T> Status<T> {
    pub(crate) fn from_root(root: &Node, f: impl FnOnce() -> T) -> Self {
        if root.children.is_empty() {
            Status::Terminal
        } else if root.is_fully_expanded() {
            Status::Action(f())
        } else {
            Status::ActionWip(f())
        }
    }

    /// The recommended action, if any.
    pub fn action(self) -> Option<T> {
        match self {
            Status::Action(a) | Status::ActionWip(a) => Some(a),
            Status::Terminal => None,
        }
    }
}

/// A finite out-tree of `Node`s with a unique root.
#[derive(Debug, Default)]
pub struct Tree {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    root: Option<NodeId>,
    len: usize,
}

impl Tree {
    /// Construct an empty `Tree`; call [`Tree::reset`] to seed a root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every node and seed a fresh root labelled `state`.
    pub fn reset<R>(&mut self, state: f64, action_space: &[i32], rng: &mut R) -> NodeId
    where
        R: ?Sized + Rng,
    {
        self.clear();
        let root = Node::new(
            Kind::Root {
                state,
                inherited: None,
            },
            action_space,
            rng,
        );
        let id = self.insert(root);
        self.root = Some(id);
        id
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    /// Returns true if a root has been seeded.
    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    /// The current root.
    ///
    /// # Panics
    ///
    /// If no root has been seeded yet.
    pub fn root(&self) -> NodeId {
        self.root.expect("tree has no root: plan at least once first")
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the tree holds no node.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the node behind `id`.
    ///
    /// # Panics
    ///
    /// If `id` refers to a node that has been discarded.
    pub fn node(&self, id: NodeId) -> &Node {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .expect("node was discarded")
    }

    /// Mutable access to the node behind `id`.
    ///
    /// # Panics
    ///
    /// If `id` refers to a node that has been discarded.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .expect("node was discarded")
    }

    /// Returns true if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    /// Expand `parent` with a child reached by `action`, whose first sampled state is
    /// `sample`.
    ///
    /// # Panics
    ///
    /// If `parent` is fully expanded or `action` is not its next untried action.
    pub fn create_child<R>(&mut self, parent: NodeId, action: i32, sample: f64, rng: &mut R) -> NodeId
    where
        R: ?Sized + Rng,
    {
        let p = self.node(parent);
        assert_eq!(
            p.next_untried_action(),
            action,
            "children must be created in the order of the parent's actions"
        );
        let child = Node::new(
            Kind::Internal {
                parent,
                estimate: Estimate::new(action, sample),
            },
            &p.actions,
            rng,
        );
        let id = self.insert(child);
        self.node_mut(parent).children.push(id);
        id
    }

    /// Promote the root's `index`th child to be the new root, labelled `new_state`.
    ///
    /// The child keeps its children, its action order and (for inspection) its statistics.  The
    /// old root and all the child's siblings, with their subtrees, are discarded.
    ///
    /// # Panics
    ///
    /// If there is no root or it has no `index`th child.
    pub fn promote_child(&mut self, index: usize, new_state: f64) -> NodeId {
        let old_root = self.root();
        let children = std::mem::take(&mut self.node_mut(old_root).children);
        let chosen = *children.get(index).expect("no child at this index");

        for &sibling in children.iter().filter(|&&c| c != chosen) {
            self.remove_subtree(sibling);
        }
        self.release(old_root);

        let node = self.node_mut(chosen);
        let inherited = match std::mem::replace(
            &mut node.kind,
            Kind::Root {
                state: new_state,
                inherited: None,
            },
        ) {
            Kind::Internal { estimate, .. } => estimate,
            Kind::Root { .. } => unreachable!("a child is never a root"),
        };
        node.kind = Kind::Root {
            state: new_state,
            inherited: Some(inherited),
        };
        // the grandchildren point at `chosen`, which is now the root's slot
        self.root = Some(chosen);
        chosen
    }

    /// Number of edges between `id` and the root.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = id;
        while let Some(p) = self.node(cur).parent() {
            depth += 1;
            cur = p;
        }
        depth
    }

    /// Returns a `NodeInfo` for the node behind `id`.
    pub fn get_node_info(&self, id: NodeId) -> NodeInfo {
        self.node(id).info(self.depth(id))
    }

    /// Returns the nodes below `id` (and `id` itself) in post-order together with the distance
    /// to the deepest leaf beneath each of them.  Index `0` is a leaf and the last element is
    /// `id`; the distance of a child is always strictly smaller than that of its parent.
    pub fn find_children_sorted_with_depth(&self, id: NodeId) -> Vec<(NodeId, usize)> {
        let mut sorted = Vec::new();
        // (node, next child to visit, inverse depth so far)
        let mut stack = vec![(id, 0, 0)];
        while let Some((node, next, inv_depth)) = stack.pop() {
            let children = &self.node(node).children;
            if let Some(&child) = children.get(next) {
                stack.push((node, next + 1, inv_depth));
                stack.push((child, 0, 0));
            } else {
                sorted.push((node, inv_depth));
                if let Some(parent) = stack.last_mut() {
                    parent.2 = parent.2.max(inv_depth + 1);
                }
            }
        }
        sorted
    }

    fn insert(&mut self, node: Node) -> NodeId {
        self.len += 1;
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(node);
                NodeId(i)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        let slot = self.slots[id.0].take();
        debug_assert!(slot.is_some(), "node released twice");
        self.free.push(id.0);
        self.len -= 1;
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            stack.extend_from_slice(&self.node(n).children);
            self.release(n);
        }
    }
}

#[cfg(any(test, feature = "test_internals"))]
pub(crate) mod test {
    use super::*;
    use std::collections::HashSet;

    #[cfg(test)]
    use rand::{rngs::StdRng, SeedableRng};

    // function intended to be used in an external unit test with a constructed `Tree`; checks
    // the structural invariants and returns every node reachable from the root
    #[doc(hidden)]
    pub fn test_structure_helper(t: &Tree) -> HashSet<NodeId> {
        let root = t.root();
        assert!(t.node(root).is_root());
        let sorted = t.find_children_sorted_with_depth(root);
        assert_eq!(sorted.last().map(|(n, _)| *n), Some(root));
        assert_eq!(sorted.len(), t.len(), "unreachable nodes were not freed");

        let reachable = sorted.iter().map(|(n, _)| *n).collect::<HashSet<_>>();
        for &n in &reachable {
            let node = t.node(n);
            assert!(node.children().len() <= node.actions().len());
            assert_eq!(
                node.is_fully_expanded(),
                node.children().len() == node.actions().len()
            );
            for (i, &c) in node.children().iter().enumerate() {
                let child = t.node(c);
                assert_eq!(child.parent(), Some(n), "stale back-reference");
                assert_eq!(child.incoming_action(), node.actions()[i]);
                assert!(!child.samples().is_empty());
            }
        }
        reachable
    }

    // sum of the visit counts of the root's children
    #[doc(hidden)]
    pub fn root_children_visits(t: &Tree) -> u32 {
        t.node(t.root())
            .children()
            .iter()
            .map(|&c| t.node(c).visits())
            .sum()
    }

    #[cfg(test)]
    fn grow(t: &mut Tree, rng: &mut StdRng, n: usize) {
        use rand::Rng;
        for _ in 0..n {
            // walk down random children until a node can still be expanded
            let mut cur = t.root();
            loop {
                let node = t.node(cur);
                if !node.is_fully_expanded() {
                    let a = node.next_untried_action();
                    let s = rng.gen_range(-3.0, 3.0);
                    let c = t.create_child(cur, a, s, rng);
                    t.node_mut(c).increment_visits();
                    t.node_mut(c).record_outcome(s);
                    break;
                }
                cur = node.children()[rng.gen_range(0, node.children().len())];
            }
        }
    }

    #[test]
    fn expansion_follows_shuffled_actions() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut t = Tree::new();
        let root = t.reset(0.0, &[-2, -1, 1, 2], &mut rng);
        let order = t.node(root).actions().to_vec();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec![-2, -1, 1, 2]);

        for (i, &a) in order.iter().enumerate() {
            assert!(!t.node(root).is_fully_expanded());
            assert_eq!(t.node(root).next_untried_action(), a);
            let c = t.create_child(root, a, i as f64, &mut rng);
            assert_eq!(t.node(c).incoming_action(), a);
            assert_eq!(t.node(c).representative_state(), i as f64);
        }
        assert!(t.node(root).is_fully_expanded());
        assert_eq!(t.len(), 5);
    }

    #[test]
    #[should_panic(expected = "children must be created in the order")]
    fn out_of_order_expansion_panics() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut t = Tree::new();
        let root = t.reset(0.0, &[-1, 1], &mut rng);
        let wrong = t.node(root).actions()[1];
        t.create_child(root, wrong, 0.0, &mut rng);
    }

    #[test]
    #[should_panic(expected = "cannot add a sampled state to the root")]
    fn root_rejects_samples() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut t = Tree::new();
        let root = t.reset(0.0, &[-1, 1], &mut rng);
        t.node_mut(root).add_sample(1.0);
    }

    #[test]
    #[should_panic(expected = "only the root node is labelled")]
    fn internal_node_has_no_label() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut t = Tree::new();
        let root = t.reset(0.0, &[-1, 1], &mut rng);
        let a = t.node(root).next_untried_action();
        let c = t.create_child(root, a, 1.0, &mut rng);
        t.node(c).state();
    }

    #[test]
    #[should_panic(expected = "tree has no root")]
    fn empty_tree_has_no_root() {
        Tree::new().root();
    }

    #[test]
    fn outcome_statistics() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut t = Tree::new();
        let root = t.reset(0.0, &[1], &mut rng);
        let c = t.create_child(root, 1, 1.0, &mut rng);
        for &r in &[1.0, 0.0, 0.5] {
            t.node_mut(c).increment_visits();
            t.node_mut(c).record_outcome(r);
        }
        let n = t.node(c);
        assert_eq!(n.visits(), 3);
        approx::assert_relative_eq!(n.mean_outcome(), 0.5);
        approx::assert_relative_eq!(n.outcome_variance(), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn promotion_keeps_grandchildren_and_drops_siblings() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t = Tree::new();
        t.reset(0.0, &[-1, 1], &mut rng);
        grow(&mut t, &mut rng, 30);
        let root = t.root();
        let chosen = t.node(root).children()[1];
        let sibling = t.node(root).children()[0];

        let before = t.find_children_sorted_with_depth(chosen);
        let grandchildren = t.node(chosen).children().to_vec();
        let grand_info = grandchildren
            .iter()
            .map(|&g| t.get_node_info(g))
            .collect::<Vec<_>>();
        let discarded = t
            .find_children_sorted_with_depth(sibling)
            .into_iter()
            .map(|(n, _)| n)
            .collect::<Vec<_>>();
        let samples = t.node(chosen).samples().to_vec();

        let new_root = t.promote_child(1, 0.5);
        assert_eq!(new_root, chosen);
        assert_eq!(t.root(), chosen);
        assert_eq!(t.node(new_root).state(), 0.5);
        assert_eq!(t.node(new_root).children(), &grandchildren[..]);
        assert_eq!(t.get_node_info(new_root).samples, samples);
        for (g, info) in grandchildren.iter().zip(grand_info) {
            let mut after = t.get_node_info(*g);
            after.depth += 1;
            assert_eq!(after, info);
        }

        assert!(!t.contains(root));
        let reachable = test_structure_helper(&t);
        assert_eq!(reachable.len(), before.len());
        for d in discarded {
            assert!(!reachable.contains(&d));
        }
    }

    #[test]
    fn sorted_children_depths() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut t = Tree::new();
        t.reset(0.0, &[-1, 1], &mut rng);
        grow(&mut t, &mut rng, 15);
        let sorted = t.find_children_sorted_with_depth(t.root());
        let depths = sorted.iter().cloned().collect::<std::collections::HashMap<_, _>>();
        for (n, d) in &sorted {
            for c in t.node(*n).children() {
                assert!(depths[c] < *d);
            }
            if t.node(*n).children().is_empty() {
                assert_eq!(*d, 0);
            }
        }
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut t = Tree::new();
        t.reset(0.0, &[-1, 1], &mut rng);
        grow(&mut t, &mut rng, 10);
        let slots = t.slots.len();
        // frees at least the old root and the other child
        t.promote_child(0, 1.0);
        assert!(t.len() <= slots - 2);
        grow(&mut t, &mut rng, 2);
        assert_eq!(t.slots.len(), slots);
        test_structure_helper(&t);
    }

}
