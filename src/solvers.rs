//! # Interface to SAT Engines
//!
//! The preprocessor consumes a SAT engine only through the small capability
//! set in the [`PropEngine`] trait: clause loading, root-level propagation,
//! implication queries under a single assumption, and a budgeted
//! satisfiability probe. Any external CDCL solver can be adapted by
//! implementing this trait; the crate ships [`ProbeEngine`], a minimal
//! propagation-based implementation sufficient for all preprocessing phases.

use std::fmt;

use crate::types::{Lit, TernaryVal};

pub mod probe;
pub use probe::ProbeEngine;

/// Capability set consumed from a SAT engine
pub trait PropEngine {
    /// Adds a clause to the engine
    fn add_clause(&mut self, lits: &[Lit]);
    /// Like [`PropEngine::add_clause`] but for unit clauses
    fn add_unit(&mut self, lit: Lit) {
        self.add_clause(&[lit]);
    }
    /// Like [`PropEngine::add_clause`] but for clauses with two literals
    fn add_binary(&mut self, lit1: Lit, lit2: Lit) {
        self.add_clause(&[lit1, lit2]);
    }
    /// Whether the engine has derived unsatisfiability at the root level
    fn is_unsat(&self) -> bool;
    /// Runs unit propagation to fixpoint at the root level
    fn propagate(&mut self);
    /// Gets the literals forced at the root level, in propagation order
    fn forced_lits(&self) -> Vec<Lit>;
    /// Gets the root-level fixed value of a literal
    fn fixed_value(&self, lit: Lit) -> TernaryVal;
    /// Gets the literals implied by unit propagation under the single
    /// assumption `lit`, excluding `lit` itself. Returns an empty vector if
    /// `lit` is already fixed or assuming it yields a conflict.
    fn find_implications(&mut self, lit: Lit) -> Vec<Lit>;
    /// Searches for a satisfying assignment, giving up after `max_props`
    /// propagated literals. The engine is back at the root level when this
    /// returns.
    fn solve_budget(&mut self, max_props: u64) -> SolverResult;
}

/// Return value for satisfiability queries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverResult {
    /// The query was found satisfiable
    Sat,
    /// The query was found unsatisfiable
    Unsat,
    /// The query exhausted its budget
    Interrupted,
}

impl fmt::Display for SolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverResult::Sat => write!(f, "SAT"),
            SolverResult::Unsat => write!(f, "UNSAT"),
            SolverResult::Interrupted => write!(f, "INTERRUPTED"),
        }
    }
}
