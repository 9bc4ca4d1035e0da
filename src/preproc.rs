//! # WCNF Preprocessing
//!
//! Model-equivalent transformations of a [`Wcnf`]: hardening of
//! high-weight softs, reduction by hard units and equivalent literals,
//! duplicate removal, discovery and encoding of at-most-one groups among
//! soft-clause indicators, and the final variable remap. After a solver has
//! found a model of the transformed instance,
//! [`Wcnf::rewrite_model_to_input`] converts it to a model of the input
//! formula.

use tracing::info;

use crate::instances::Wcnf;

mod dedup;
mod eqs;
mod harden;
mod mx;
mod remap;

/// Which polarity classes the mutex finder looks at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MxMode {
    /// Do not look for mutexes
    None,
    /// At most one of a set of softs can be falsified
    Cores,
    /// At most one of a set of softs can be satisfied
    #[default]
    NonCores,
    /// Both kinds; non-cores are searched first since they bump the base cost
    Both,
}

/// Configuration of the preprocessing passes
#[derive(Clone, Debug)]
pub struct SimpConfig {
    /// Find and reduce by equalities implied by the hard clauses
    pub eqs: bool,
    /// Reduce by hard units
    pub units: bool,
    /// Try to harden soft clauses by satisfiability tests
    pub harden: bool,
    /// Propagation budget for each hardening feasibility probe
    pub harden_prop_budget: u64,
    /// Mutex search mode
    pub mx_mode: MxMode,
    /// Memory limit in megabytes on the mutex finder's implication cache
    pub mx_mem_limit: u64,
    /// CPU limit in seconds for the mutex search; non-positive means none
    pub mx_cpu_limit: f64,
}

impl Default for SimpConfig {
    fn default() -> Self {
        SimpConfig {
            eqs: true,
            units: true,
            harden: true,
            harden_prop_budget: 1 << 20,
            mx_mode: MxMode::default(),
            mx_mem_limit: 512 * 3,
            mx_cpu_limit: 15.0,
        }
    }
}

impl Wcnf {
    /// Transforms the instance in model-equivalent ways. Only the remaining
    /// hard and soft clauses should be passed to a solver; a model of the
    /// transformed instance is converted back with
    /// [`Wcnf::rewrite_model_to_input`].
    pub fn simplify(&mut self, cfg: &SimpConfig) {
        self.orig_all_lits_soft = self.test_all_lits_are_softs();

        if cfg.harden {
            self.simple_harden(cfg);
        }

        if cfg.eqs || cfg.units {
            self.sub_eqs_and_units(cfg);
        }

        // b-variables are not introduced for soft units; the unit literal
        // doubles as its own b-literal, so softs must be duplicate-free
        // before the mutex search
        self.rem_dup_cls();

        match cfg.mx_mode {
            MxMode::None => (),
            MxMode::Cores => self.mx_bvars(cfg, MxMode::Cores),
            MxMode::NonCores => self.mx_bvars(cfg, MxMode::NonCores),
            MxMode::Both => {
                self.mx_bvars(cfg, MxMode::NonCores);
                self.mx_bvars(cfg, MxMode::Cores);
            }
        }

        // transformations may have shifted weights and the base cost
        self.compute_wt_info();

        self.remap_vars();

        self.log_simp_stats();
        info!(unsat = self.unsat, "simplification done");
    }
}

#[cfg(test)]
mod tests {
    use super::{MxMode, SimpConfig};

    #[test]
    fn default_config() {
        let cfg = SimpConfig::default();
        assert!(cfg.eqs && cfg.units && cfg.harden);
        assert_eq!(cfg.harden_prop_budget, 1 << 20);
        assert_eq!(cfg.mx_mode, MxMode::NonCores);
        assert_eq!(cfg.mx_mem_limit, 1536);
        assert_eq!(cfg.mx_cpu_limit, 15.0);
    }
}
