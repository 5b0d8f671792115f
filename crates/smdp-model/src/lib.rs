//! Model, trace and property interfaces for learning-based statistical model checking.
//!
//! The learning engine never looks inside a model. It sees states as opaque map
//! keys, drives a [`Model`] to produce bounded [`Trace`]s, and asks a
//! [`Property`] for a [`SatResult`]. The reference models in [`models`] exist so
//! the engine can be exercised without an external modelling language.

pub mod models;
pub mod property;
pub mod sim;
pub mod state;
pub mod trace;

pub use property::{BoundedReachability, BoundedSafety, Predicate, Property};
pub use sim::{Branches, ChoiceResolver, Model, SimContext, TransitionSystem};
pub use state::{ModelState, State};
pub use trace::{SatResult, Step, Trace};

use thiserror::Error;

/// Errors raised by models and properties while generating or checking a trace.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("choice {choice} out of range: state has {available} choices")]
    InvalidChoice { choice: usize, available: usize },

    #[error("probabilities of a choice at {state} sum to {sum}, expected 1")]
    InvalidDistribution { state: String, sum: f64 },

    #[error("state {0} is not part of the model")]
    UnknownState(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
