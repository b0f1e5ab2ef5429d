//! Errors reported before planning starts.
//!
//! Only configuration problems are recoverable.  Violations of the tree's invariants (e.g.
//! asking an internal node for its labelling state) are programmer errors and panic instead.

use thiserror::Error;

/// A problem found while validating a [`PlannerConfig`](crate::PlannerConfig) or a
/// [`TrackModel`](crate::TrackModel).
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("action space is empty")]
    EmptyActionSpace,

    #[error("action {action} appears more than once in the action space")]
    DuplicateAction { action: i32 },

    #[error("budget must be at least one planning iteration")]
    ZeroBudget,

    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfUnitInterval { name: &'static str, value: f64 },

    #[error("{name} must be finite and non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("mode mass ratio must lie in (0, 1], got {value}")]
    InvalidModeMassRatio { value: f64 },

    #[error("decision criterion '{criterion}' is selected more than once")]
    DuplicateCriterion { criterion: String },

    #[error("track length must be finite and positive, got {value}")]
    InvalidTrackLength { value: f64 },
}

/// Convenience type alias for results carrying a [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
