//! An <b>o</b>pen-<b>l</b>oop implementation of [UCT](https://en.wikipedia.org/wiki/Monte_Carlo_tree_search)
//! for noisy one-dimensional control problems.
//!
//! # Features
//!
//! - **_Open loop:_** nodes below the root do not stand for a single state but for the family of
//! states produced by re-simulating a stochastic transition model every time the node is passed.
//! Each descent through the tree draws fresh samples, so the value estimates average over the
//! noise of the process instead of trusting one cached trajectory.
//!
//! - **_Tree reuse:_** between two decisions the subtree below the recommended action can be
//! promoted to the new root instead of being rebuilt.  Whether the old statistics still apply is
//! decided by a plain expansion criterion and any subset of statistical [`Criterion`]s comparing
//! the observed state with the states the tree sampled.
//!
//! - **_Safe:_** the tree is an arena addressed by stable [`NodeId`]s; promotion rebinds a root
//! handle and frees the discarded subtrees, so no back-reference can dangle.  The library is
//! written entirely in safe Rust.
//!
//! - **_Reproducible:_** all randomness (transition noise, expansion order, tie breaks, rollouts)
//! is drawn from one seedable generator owned by the [`Planner`].
//!
//! # Usage
//!
//! Using this library mainly requires implementing the [`TransitionModel`] trait for a process,
//! or using the provided [`TrackModel`].  Interacting with the [`Planner`] is accomplished via the
//! [`SearchTree`] trait.
//!
//! `TransitionModel` is automatically implemented for types that *dereference* to a
//! `TransitionModel`, so a planner can also search over a `Box<dyn TransitionModel>`.
//!
//! ```no_run
//! use oluct::prelude::*;
//!
//! let model = TrackModel::new(5.0, 0.1, 0.05).unwrap();
//! let config = PlannerConfig::default()
//!     .with_budget(200)
//!     .with_reuse_tree(true)
//!     .with_criterion(Criterion::StateMultimodality)
//!     .with_seed(42);
//! let mut planner = Planner::new(config, model).unwrap();
//!
//! let mut state = 0.0;
//! # let mut rng = rand::thread_rng();
//! loop {
//!     match planner.plan(state) {
//!         Status::Terminal => break,
//!         status => {
//!             let action = status.action().unwrap();
//!             dbg!(planner.get_root_info());
//!             // advance the real process; here the model stands in for it
//!             state = planner.model().step(state, action, &mut rng);
//!         }
//!     }
//! }
//! ```
//!
//! [![mit_badge]][mit_url]
//!
//! [mit_badge]: https://img.shields.io/badge/license-MIT-blue.svg
//! [mit_url]: https://opensource.org/licenses/MIT

// Helpful refernces:
// https://banditalgs.com/2016/09/18/the-upper-confidence-bound-algorithm/
// http://incompleteideas.net/book/RLbook2018.pdf

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    missing_debug_implementations,
    missing_docs,
    broken_intra_doc_links
)]

mod config;
mod error;
mod planner;
mod retention;
mod rollout;
mod stats;
mod transition_model;
mod tree;

#[doc(inline)]
pub use prelude::*;

pub use crate::error::Result;

#[doc(hidden)]
pub mod prelude {
    pub use crate::config::{CriterionThresholds, PlannerConfig, PolicyKind};
    pub use crate::error::ConfigError;
    pub use crate::planner::{uct_score, Planner, SearchTree};
    pub use crate::retention::{Criterion, RebuildReason, Retention};
    pub use crate::rollout::{epsilon_heuristic_action, heuristic_action, DefaultPolicy};
    pub use crate::stats::{
        argmax_random, is_equal_to, is_less_than, mahalanobis_distance_1d, mean, modes, variance,
        Mode,
    };
    pub use crate::transition_model::{TrackModel, TransitionModel, TERMINAL_TOLERANCE};
    pub use crate::tree::{Node, NodeId, NodeInfo, Status, Tree};

    #[cfg(feature = "test_internals")]
    pub use crate::tree::test::*;
}
