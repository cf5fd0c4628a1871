//! Core error types.
//!
//! One `thiserror`-derived enum aggregates every error kind the core can
//! raise. Propagation is `?`-based end to end; nothing is silently
//! coerced to `0.0` or `NaN`.

use thiserror::Error;

/// All errors the core can raise.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Schema mismatch, duplicate variable, unknown parent, or a latent
    /// parent that isn't ordered last.
    #[error("malformed model: {0}")]
    MalformedModel(String),

    /// Topological sort failed: the parent graph has a cycle.
    #[error("cyclic graph: variable '{0}' participates in a cycle")]
    CyclicGraph(String),

    /// A CPT is incomplete or a row group doesn't normalize to 1.0.
    #[error("malformed table for '{variable}': {detail}")]
    MalformedTable {
        variable: String,
        detail: String,
    },

    /// Head/body share a variable, or an unknown variable/outcome was
    /// asserted.
    #[error("query shape error: {0}")]
    QueryShape(String),

    /// Division by zero while applying Bayes' rule.
    #[error("zero probability: denominator vanished while evaluating P({0})")]
    ZeroProbability(String),

    /// Evaluated probability fell outside `[-epsilon, 1 + epsilon]`.
    #[error("numeric drift: P({query}) = {value}, outside [{lo}, {hi}]")]
    NumericDrift {
        query: String,
        value: f64,
        lo: f64,
        hi: f64,
    },

    /// The do-calculus search exhausted its depth/step budget without
    /// eliminating every `do(.)`. Carries the best partial expression seen,
    /// pretty-printed, so a caller can inspect how far the search got.
    #[error("do-calculus search failed at depth {depth_bound} ({steps} steps explored); best partial: {partial}")]
    DoCalculusFailed {
        depth_bound: usize,
        steps: usize,
        partial: String,
    },

    /// The `all` deconfounding-set policy found sets that don't agree
    /// numerically within tolerance.
    #[error("inconsistent deconfounding: sets disagree (max spread {spread})")]
    InconsistentDeconfounding { spread: f64 },
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
