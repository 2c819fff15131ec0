//! Implements a SAT solver for conda dependency resolution based on the CDCL algorithm
//! (conflict-driven clause learning), in the tradition of [libsolv](https://github.com/openSUSE/libsolv).
//!
//! The CDCL algorithm is masterly explained in [An Extensible
//! SAT-solver](http://minisat.se/downloads/MiniSat.pdf). Regarding the data structures used, we
//! mostly follow the approach taken by libsolv. The code of libsolv is, however, very low level
//! C, so if you are looking for an introduction to CDCL, you are encouraged to look at the paper
//! instead or to keep reading through this codebase and its comments.
//!
//! [`Pool`] is the arena that owns interned package names, match specs and solvables (component
//! A of the wider design). [`Solver`] builds the rule set for a [`SolveJobs`] and runs the DPLL
//! search, producing either a [`Transaction`] or a [`problem::Problem`] that
//! [`problem::Problem::display_user_friendly`] can turn into a human-readable conflict tree
//! (component C, with D folded into the same crate since both operate directly on the rule
//! arena built during a solve).

#![deny(missing_docs)]

mod arena;
mod conda_util;
mod decision_map;
mod decision_tracker;
mod id;
mod pool;
pub mod problem;
mod rules;
mod solvable;
mod solve_jobs;
mod solver;
mod transaction;
mod watch_map;

pub use id::{MatchSpecId, NameId, RepoId, SolvableId};
pub use pool::Pool;
pub use problem::{Problem, ProblemGraph};
pub use solvable::{PackageSolvable, SolvableMetadata};
pub use solve_jobs::SolveJobs;
pub use solver::Solver;
pub use transaction::{Transaction, TransactionKind};
