//! Stacked ensembling of the best ranked candidates.

/// Ensembler selecting and scoring the stack.
pub mod combining;
/// Utility functions for ensembles.
pub mod func;
/// Reviewers ensuring safe ensemble output.
pub mod reviewer;
/// Two-stage stacking regressor.
pub mod stacking;

pub use combining::{EnsembleResult, Ensembler};
pub use reviewer::CombinationReviewer;
pub use stacking::{StackMember, StackingRegressor};
