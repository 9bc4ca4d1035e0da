//! # maxprep - A WCNF Preprocessor and Normalizer
//!
//! `maxprep` transforms weighted partial MaxSAT instances into equivalent,
//! smaller, normalized instances and records the transformations needed to
//! lift a solver's model back to the original vocabulary. It does not solve
//! MaxSAT itself; the intended use is in front of a complete search engine.
//!
//! The transformations are reduction by forced units and equivalent
//! literals (SCCs of the binary implication graph of the hards), duplicate
//! and contradictory clause removal, hardening of high-weight softs by
//! satisfiability probes, and discovery of at-most-one groups among
//! soft-clause indicator literals.
//!
//! ## Example
//!
//! ```
//! use maxprep::{clause, lit, instances::Wcnf, preproc::SimpConfig};
//!
//! let mut wcnf = Wcnf::new();
//! wcnf.add_hard(clause![lit![0], lit![1]]);
//! wcnf.add_soft(clause![lit![0]], 4.0);
//! wcnf.add_soft(clause![!lit![0]], 4.0);
//! wcnf.simplify(&SimpConfig::default());
//! // the contradictory unit pair resolved into forced cost
//! assert_eq!(wcnf.base_cost(), 4.0);
//! assert_eq!(wcnf.n_softs(), 0);
//! assert_eq!(wcnf.total_wt(), 4.0);
//! ```
//!
//! A model of the simplified instance is mapped back with
//! [`Wcnf::rewrite_model_to_input`](instances::Wcnf::rewrite_model_to_input)
//! and can be scored against the unsimplified input with
//! [`Wcnf::check_model`](instances::Wcnf::check_model).

pub mod instances;
pub mod preproc;
pub mod solvers;
pub mod types;
