//! # Causal Engine
//!
//! A causal-inference core over discrete Bayesian networks supporting
//! Judea Pearl's do-calculus: observational and interventional probability
//! queries, backdoor/deconfounding analysis, and a symbolic rewrite engine
//! that eliminates `do(·)` from an expression when a direct computation is
//! blocked by latent confounding.
//!
//! Layered leaves-first, each module only depending on the ones above it
//! in this list:
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`model`] | In-memory DAG: variables, outcomes, parents, CPTs, latents |
//! | [`graph`] | Pure graph algorithms: ancestry, d-separation, backdoor/deconfounding search |
//! | [`query`] | Outcome assertions and `(Head, Body)` queries |
//! | [`evaluator`] | Observational probability evaluation with memoization |
//! | [`docalc`] | Symbolic expression algebra, the three-rule search, high-level dispatch |
//! | [`config`] | Figment-loaded configuration, passed explicitly, never a singleton |
//! | [`error`] | The `CoreError` catalogue |
//!
//! No core operation performs I/O, reads environment variables, or installs
//! a process-wide logger; those are the shell binary's job (`bin/causal.rs`).

pub mod config;
pub mod docalc;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod model;
pub mod query;

pub use config::Config;
pub use docalc::{evaluate_expr, infer, infer_with_choice, Expr};
pub use error::{CoreError, CoreResult};
pub use evaluator::{joint_distribution_table, Evaluator};
pub use graph::EdgeGraph;
pub use model::Model;
pub use query::{Assertion, AssertionKind, AssertionSet, Query};
